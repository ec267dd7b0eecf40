use nvrd::http::parser::{ParseError, ParseStatus, RequestParser};
use nvrd::http::request::{HttpVersion, Method, Request, MAX_HEADERS};

const MAX_MESSAGE: usize = 64 * 1024;

fn parse_all(raw: &[u8]) -> Result<(Request, usize), ParseError> {
    let mut parser = RequestParser::new(MAX_MESSAGE);
    let mut req = Request::default();
    match parser.advance(raw, &mut req)? {
        ParseStatus::Complete { consumed } => {
            let (offset, len) = parser.body_span();
            req.body = bytes::Bytes::copy_from_slice(&raw[offset..offset + len]);
            Ok((req, consumed))
        }
        ParseStatus::NeedMore => panic!("expected a complete message"),
    }
}

#[test]
fn test_parse_simple_get_request() {
    let raw = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";
    let (req, consumed) = parse_all(raw).unwrap();

    assert_eq!(req.method, Method::GET);
    assert_eq!(req.path, "/");
    assert_eq!(req.query, None);
    assert_eq!(req.version, HttpVersion::Http11);
    assert_eq!(req.header("Host"), Some("example.com"));
    assert_eq!(consumed, raw.len());
}

#[test]
fn test_parse_post_request_with_body() {
    let raw = b"POST /api/streams HTTP/1.1\r\nHost: localhost\r\nContent-Length: 5\r\n\r\nhello";
    let (req, consumed) = parse_all(raw).unwrap();

    assert_eq!(req.method, Method::POST);
    assert_eq!(req.content_length, Some(5));
    assert_eq!(&req.body[..], b"hello");
    assert_eq!(consumed, raw.len());
}

#[test]
fn test_parse_splits_path_and_query() {
    let raw = b"GET /api/recordings?stream=frontdoor&page=2 HTTP/1.1\r\nHost: x\r\n\r\n";
    let (req, _) = parse_all(raw).unwrap();

    assert_eq!(req.path, "/api/recordings");
    assert_eq!(req.query.as_deref(), Some("stream=frontdoor&page=2"));
    assert_eq!(req.uri, "/api/recordings?stream=frontdoor&page=2");
}

#[test]
fn test_parse_unknown_method_is_classified_not_rejected() {
    let raw = b"BREW /pot HTTP/1.1\r\nHost: x\r\n\r\n";
    let (req, _) = parse_all(raw).unwrap();
    assert_eq!(req.method, Method::UNKNOWN);
}

#[test]
fn test_typed_header_mirrors() {
    let raw = b"POST /api/zones HTTP/1.1\r\n\
        Host: x\r\n\
        Content-Type: application/json\r\n\
        Content-Length: 2\r\n\
        User-Agent: nvr-ui/2.1\r\n\
        \r\n{}";
    let (req, _) = parse_all(raw).unwrap();

    assert_eq!(req.content_type.as_deref(), Some("application/json"));
    assert_eq!(req.content_length, Some(2));
    assert_eq!(req.user_agent.as_deref(), Some("nvr-ui/2.1"));
}

#[test]
fn test_connection_close_clears_keep_alive() {
    let raw = b"GET / HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n";
    let (req, _) = parse_all(raw).unwrap();
    assert!(!req.keep_alive());
}

#[test]
fn test_http11_defaults_to_keep_alive() {
    let raw = b"GET / HTTP/1.1\r\nHost: x\r\n\r\n";
    let (req, _) = parse_all(raw).unwrap();
    assert!(req.keep_alive());
}

#[test]
fn test_http10_defaults_to_close() {
    let raw = b"GET / HTTP/1.0\r\nHost: x\r\n\r\n";
    let (req, _) = parse_all(raw).unwrap();
    assert_eq!(req.version, HttpVersion::Http10);
    assert!(!req.keep_alive());

    let raw = b"GET / HTTP/1.0\r\nHost: x\r\nConnection: keep-alive\r\n\r\n";
    let (req, _) = parse_all(raw).unwrap();
    assert!(req.keep_alive());
}

#[test]
fn test_incremental_feeding_across_element_boundaries() {
    let raw: &[u8] =
        b"PUT /api/streams/cam1 HTTP/1.1\r\nHost: x\r\nContent-Length: 4\r\n\r\nabcd";
    let mut parser = RequestParser::new(MAX_MESSAGE);
    let mut req = Request::default();

    // Every proper prefix must report NeedMore, never an error.
    for end in 1..raw.len() {
        assert_eq!(
            parser.advance(&raw[..end], &mut req).unwrap(),
            ParseStatus::NeedMore,
            "prefix of {end} bytes"
        );
    }
    assert_eq!(
        parser.advance(raw, &mut req).unwrap(),
        ParseStatus::Complete { consumed: raw.len() }
    );
    assert_eq!(req.method, Method::PUT);
    assert_eq!(req.path, "/api/streams/cam1");
}

#[test]
fn test_pipelined_bytes_are_not_consumed() {
    let first = b"GET /api/health HTTP/1.1\r\nHost: x\r\n\r\n";
    let second = b"GET /api/system/status HTTP/1.1\r\nHost: x\r\n\r\n";
    let mut raw = first.to_vec();
    raw.extend_from_slice(second);

    let mut parser = RequestParser::new(MAX_MESSAGE);
    let mut req = Request::default();
    let status = parser.advance(&raw, &mut req).unwrap();
    assert_eq!(status, ParseStatus::Complete { consumed: first.len() });
    assert_eq!(req.path, "/api/health");

    // After reset, the remainder parses as its own message.
    parser.reset();
    let mut req = Request::default();
    let status = parser.advance(second, &mut req).unwrap();
    assert_eq!(status, ParseStatus::Complete { consumed: second.len() });
    assert_eq!(req.path, "/api/system/status");
}

#[test]
fn test_header_overflow_is_dropped_silently() {
    let mut raw = b"GET / HTTP/1.1\r\n".to_vec();
    for i in 0..MAX_HEADERS + 5 {
        raw.extend_from_slice(format!("X-Extra-{i}: v\r\n").as_bytes());
    }
    // A typed header past the cap must still update its mirror field.
    raw.extend_from_slice(b"Content-Length: 3\r\n\r\nabc");

    let (req, _) = parse_all(&raw).unwrap();
    assert_eq!(req.headers.len(), MAX_HEADERS);
    assert_eq!(req.content_length, Some(3));
    assert_eq!(&req.body[..], b"abc");
}

#[test]
fn test_declared_body_exceeding_maximum_is_rejected() {
    let raw = b"POST /upload HTTP/1.1\r\nHost: x\r\nContent-Length: 2048\r\n\r\n";
    let mut parser = RequestParser::new(1024);
    let mut req = Request::default();
    assert_eq!(parser.advance(raw, &mut req), Err(ParseError::TooLarge));
}

#[test]
fn test_malformed_header_is_rejected() {
    let raw = b"GET / HTTP/1.1\r\nno-colon-here\r\n\r\n";
    let mut parser = RequestParser::new(MAX_MESSAGE);
    let mut req = Request::default();
    assert_eq!(parser.advance(raw, &mut req), Err(ParseError::InvalidHeader));
}

#[test]
fn test_invalid_content_length_is_rejected() {
    let raw = b"GET / HTTP/1.1\r\nContent-Length: banana\r\n\r\n";
    let mut parser = RequestParser::new(MAX_MESSAGE);
    let mut req = Request::default();
    assert_eq!(
        parser.advance(raw, &mut req),
        Err(ParseError::InvalidContentLength)
    );
}

#[test]
fn test_unsupported_version_is_rejected() {
    let raw = b"GET / HTTP/2\r\nHost: x\r\n\r\n";
    let mut parser = RequestParser::new(MAX_MESSAGE);
    let mut req = Request::default();
    assert_eq!(
        parser.advance(raw, &mut req),
        Err(ParseError::UnsupportedVersion)
    );
}

#[test]
fn test_chunked_transfer_encoding_is_rejected() {
    let raw = b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n";
    let mut parser = RequestParser::new(MAX_MESSAGE);
    let mut req = Request::default();
    assert_eq!(
        parser.advance(raw, &mut req),
        Err(ParseError::UnsupportedEncoding)
    );
}

#[test]
fn test_reset_clears_element_state() {
    let raw = b"POST /a HTTP/1.1\r\nContent-Length: 3\r\n\r\nxyz";
    let mut parser = RequestParser::new(MAX_MESSAGE);
    let mut req = Request::default();
    parser.advance(raw, &mut req).unwrap();

    parser.reset();
    let mut req = Request::default();
    let raw2 = b"GET /b HTTP/1.1\r\nHost: x\r\n\r\n";
    let status = parser.advance(raw2, &mut req).unwrap();
    assert_eq!(status, ParseStatus::Complete { consumed: raw2.len() });
    assert_eq!(req.path, "/b");
    assert_eq!(parser.body_span().1, 0);
}
