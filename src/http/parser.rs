use crate::http::request::{HttpVersion, Method, Request, MAX_HEADERS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    InvalidRequestLine,
    UnsupportedVersion,
    InvalidHeader,
    InvalidContentLength,
    UnsupportedEncoding,
    InvalidEncoding,
    /// Declared or accumulated framing exceeds the receive buffer maximum.
    TooLarge,
}

impl ParseError {
    /// Short client-facing description, used in 400 response bodies.
    pub fn message(&self) -> &'static str {
        match self {
            ParseError::InvalidRequestLine => "Malformed request line",
            ParseError::UnsupportedVersion => "Unsupported HTTP version",
            ParseError::InvalidHeader => "Malformed header",
            ParseError::InvalidContentLength => "Invalid Content-Length",
            ParseError::UnsupportedEncoding => "Unsupported transfer encoding",
            ParseError::InvalidEncoding => "Invalid request encoding",
            ParseError::TooLarge => "Request too large",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStatus {
    /// More bytes are required before the next element completes.
    NeedMore,
    /// A full message has been framed. `consumed` counts the bytes of this
    /// message from the start of the buffer; everything beyond it belongs to
    /// a pipelined successor and must not be parsed until the connection is
    /// reset.
    Complete { consumed: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    RequestLine,
    Headers,
    Body,
    Complete,
}

/// Incremental HTTP/1.1 request parser.
///
/// Feed it the connection's accumulated receive bytes after every read; it
/// remembers which element it stopped in and never re-parses completed
/// elements, populating the request as the request line, each header, and
/// finally the body arrive. Returning [`ParseStatus::Complete`] doubles as
/// the pause signal: the caller must not invoke [`advance`] again until
/// [`reset`] has run.
///
/// [`advance`]: RequestParser::advance
/// [`reset`]: RequestParser::reset
#[derive(Debug)]
pub struct RequestParser {
    state: State,
    scan: usize,
    header_count: usize,
    body_start: usize,
    body_len: usize,
    max_message: usize,
}

impl RequestParser {
    /// `max_message` mirrors the receive buffer's hard maximum; a request
    /// whose declared framing cannot fit is rejected without waiting for
    /// the buffer to fill.
    pub fn new(max_message: usize) -> Self {
        Self {
            state: State::RequestLine,
            scan: 0,
            header_count: 0,
            body_start: 0,
            body_len: 0,
            max_message,
        }
    }

    /// Clears all element state for the next request on this connection.
    pub fn reset(&mut self) {
        self.state = State::RequestLine;
        self.scan = 0;
        self.header_count = 0;
        self.body_start = 0;
        self.body_len = 0;
    }

    /// `(offset, length)` of the body within the completed message bytes.
    pub fn body_span(&self) -> (usize, usize) {
        (self.body_start, self.body_len)
    }

    /// Consumes newly arrived bytes, advancing through the message.
    ///
    /// `buf` must always start at the beginning of the current message.
    pub fn advance(&mut self, buf: &[u8], req: &mut Request) -> Result<ParseStatus, ParseError> {
        loop {
            match self.state {
                State::RequestLine => {
                    let Some(end) = find_crlf(buf, self.scan) else {
                        return Ok(ParseStatus::NeedMore);
                    };
                    self.parse_request_line(&buf[self.scan..end], req)?;
                    self.scan = end + 2;
                    self.state = State::Headers;
                }
                State::Headers => {
                    let Some(end) = find_crlf(buf, self.scan) else {
                        return Ok(ParseStatus::NeedMore);
                    };
                    if end == self.scan {
                        // Blank line: headers complete.
                        self.scan = end + 2;
                        self.finish_headers(req)?;
                        if self.body_len == 0 {
                            self.state = State::Complete;
                            return Ok(ParseStatus::Complete { consumed: self.body_start });
                        }
                        self.state = State::Body;
                    } else {
                        self.parse_header_line(&buf[self.scan..end], req)?;
                        self.scan = end + 2;
                    }
                }
                State::Body => {
                    let have = buf.len().saturating_sub(self.body_start);
                    if have < self.body_len {
                        return Ok(ParseStatus::NeedMore);
                    }
                    self.state = State::Complete;
                    return Ok(ParseStatus::Complete {
                        consumed: self.body_start + self.body_len,
                    });
                }
                State::Complete => {
                    return Ok(ParseStatus::Complete {
                        consumed: self.body_start + self.body_len,
                    });
                }
            }
        }
    }

    fn parse_request_line(&mut self, line: &[u8], req: &mut Request) -> Result<(), ParseError> {
        let mut parts = line.split(|&b| b == b' ').filter(|p| !p.is_empty());
        let method = parts.next().ok_or(ParseError::InvalidRequestLine)?;
        let target = parts.next().ok_or(ParseError::InvalidRequestLine)?;
        let version = parts.next().ok_or(ParseError::InvalidRequestLine)?;
        if parts.next().is_some() {
            return Err(ParseError::InvalidRequestLine);
        }

        req.method = Method::from_bytes(method);
        req.version = match version {
            b"HTTP/1.1" => HttpVersion::Http11,
            b"HTTP/1.0" => HttpVersion::Http10,
            _ => return Err(ParseError::UnsupportedVersion),
        };

        let target = std::str::from_utf8(target).map_err(|_| ParseError::InvalidEncoding)?;
        req.uri = target.to_string();
        match target.find('?') {
            Some(idx) => {
                req.path = target[..idx].to_string();
                req.query = Some(target[idx + 1..].to_string());
            }
            None => {
                req.path = target.to_string();
                req.query = None;
            }
        }
        Ok(())
    }

    fn parse_header_line(&mut self, line: &[u8], req: &mut Request) -> Result<(), ParseError> {
        let colon = line
            .iter()
            .position(|&b| b == b':')
            .ok_or(ParseError::InvalidHeader)?;
        if colon == 0 {
            return Err(ParseError::InvalidHeader);
        }
        let name = std::str::from_utf8(&line[..colon]).map_err(|_| ParseError::InvalidEncoding)?;
        let value = std::str::from_utf8(&line[colon + 1..])
            .map_err(|_| ParseError::InvalidEncoding)?
            .trim();

        // Typed mirrors update regardless of whether the list is full.
        if name.eq_ignore_ascii_case("Content-Type") {
            req.content_type = Some(value.to_string());
        } else if name.eq_ignore_ascii_case("Content-Length") {
            let len: u64 = value.parse().map_err(|_| ParseError::InvalidContentLength)?;
            req.content_length = Some(len);
        } else if name.eq_ignore_ascii_case("User-Agent") {
            req.user_agent = Some(value.to_string());
        } else if name.eq_ignore_ascii_case("Connection") {
            req.connection = Some(value.to_string());
        }

        if self.header_count < MAX_HEADERS {
            req.headers.push((name.to_string(), value.to_string()));
        }
        self.header_count += 1;
        Ok(())
    }

    fn finish_headers(&mut self, req: &mut Request) -> Result<(), ParseError> {
        if let Some(te) = req.header("Transfer-Encoding") {
            if te.to_ascii_lowercase().contains("chunked") {
                return Err(ParseError::UnsupportedEncoding);
            }
        }
        self.body_start = self.scan;
        self.body_len = req.content_length.unwrap_or(0) as usize;
        if self
            .body_start
            .checked_add(self.body_len)
            .is_none_or(|total| total > self.max_message)
        {
            return Err(ParseError::TooLarge);
        }
        Ok(())
    }
}

fn find_crlf(buf: &[u8], from: usize) -> Option<usize> {
    if from >= buf.len() {
        return None;
    }
    buf[from..]
        .windows(2)
        .position(|w| w == b"\r\n")
        .map(|pos| from + pos)
}
