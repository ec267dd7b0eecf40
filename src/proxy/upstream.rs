//! Upstream connection and request forwarding.
//!
//! Builds the forwarded HTTP request, performs the round trip, and parses
//! the upstream response. The round trip is intentionally blocking: it only
//! ever runs on a dedicated proxy thread, never on the reactor.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;

use crate::http::request::Method;

/// Upstream response headers larger than this abort the round trip.
const MAX_RESPONSE_HEADERS: usize = 64 * 1024;

const RESPONSE_BUFFER_SIZE: usize = 8192;

/// Request data captured before the proxy thread starts, so the thread
/// never touches connection state.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub content_type: Option<String>,
    pub body: Bytes,
}

#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// A fixed upstream target plus its timeouts.
#[derive(Debug, Clone)]
pub struct Upstream {
    base: url::Url,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl Upstream {
    pub fn new(base: &str, connect_timeout: Duration, request_timeout: Duration) -> Result<Self> {
        let base = url::Url::parse(base).context("invalid upstream URL")?;
        base.host_str().context("upstream URL missing host")?;
        Ok(Self {
            base,
            connect_timeout,
            request_timeout,
        })
    }

    /// Forwards the request and reads the full upstream response. Blocking.
    pub fn round_trip(&self, request: &ProxyRequest) -> Result<UpstreamResponse> {
        let host = self.base.host_str().context("upstream URL missing host")?;
        let port = self.base.port().unwrap_or(match self.base.scheme() {
            "https" => 443,
            _ => 80,
        });

        let addr = (host, port)
            .to_socket_addrs()
            .context("failed to resolve upstream address")?
            .next()
            .context("upstream address resolved to nothing")?;

        let mut stream = TcpStream::connect_timeout(&addr, self.connect_timeout)
            .context("failed to connect to upstream")?;
        stream.set_read_timeout(Some(self.request_timeout))?;
        stream.set_write_timeout(Some(self.request_timeout))?;

        let request_bytes = self.build_http_request(request)?;
        stream
            .write_all(&request_bytes)
            .context("failed to send request to upstream")?;

        tracing::trace!(%host, port, path = %request.path, "request sent to upstream");

        self.read_http_response(&mut stream)
    }

    /// Builds the wire-format request forwarded upstream.
    ///
    /// Public for integration testing.
    pub fn build_http_request(&self, request: &ProxyRequest) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();

        let target = match &request.query {
            Some(q) => format!("{}?{}", request.path, q),
            None => request.path.clone(),
        };
        buffer.extend_from_slice(
            format!("{} {} HTTP/1.1\r\n", request.method.as_str(), target).as_bytes(),
        );

        let host = self.base.host_str().context("upstream URL missing host")?;
        let host_value = match self.base.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        buffer.extend_from_slice(format!("Host: {host_value}\r\n").as_bytes());
        buffer.extend_from_slice(b"Connection: close\r\n");

        if let Some(ct) = &request.content_type {
            buffer.extend_from_slice(format!("Content-Type: {ct}\r\n").as_bytes());
        }
        buffer.extend_from_slice(format!("Content-Length: {}\r\n", request.body.len()).as_bytes());

        buffer.extend_from_slice(b"\r\n");
        buffer.extend_from_slice(&request.body);

        Ok(buffer)
    }

    fn read_http_response(&self, stream: &mut TcpStream) -> Result<UpstreamResponse> {
        let mut buffer: Vec<u8> = Vec::with_capacity(RESPONSE_BUFFER_SIZE);
        let mut chunk = [0u8; RESPONSE_BUFFER_SIZE];

        let headers_end = loop {
            if let Some(pos) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos;
            }
            if buffer.len() > MAX_RESPONSE_HEADERS {
                anyhow::bail!("upstream response headers too large");
            }
            let n = stream.read(&mut chunk)?;
            if n == 0 {
                anyhow::bail!("upstream closed before sending complete headers");
            }
            buffer.extend_from_slice(&chunk[..n]);
        };

        let (status, content_type, content_length) =
            parse_response_head(&buffer[..headers_end])?;
        let mut body = buffer.split_off(headers_end + 4);

        match content_length {
            Some(len) => {
                body.reserve(len.saturating_sub(body.len()));
                while body.len() < len {
                    let n = stream.read(&mut chunk)?;
                    if n == 0 {
                        anyhow::bail!("upstream closed before sending complete body");
                    }
                    body.extend_from_slice(&chunk[..n]);
                }
                body.truncate(len);
            }
            None => {
                // No Content-Length: read until the upstream closes.
                loop {
                    let n = stream.read(&mut chunk)?;
                    if n == 0 {
                        break;
                    }
                    body.extend_from_slice(&chunk[..n]);
                }
            }
        }

        Ok(UpstreamResponse {
            status,
            content_type,
            body,
        })
    }
}

fn parse_response_head(head: &[u8]) -> Result<(u16, Option<String>, Option<usize>)> {
    let head = std::str::from_utf8(head).context("invalid UTF-8 in upstream headers")?;
    let mut lines = head.split("\r\n");

    let status_line = lines.next().context("empty upstream response")?;
    let mut parts = status_line.splitn(3, ' ');
    let _version = parts.next().context("invalid upstream status line")?;
    let status: u16 = parts
        .next()
        .context("invalid upstream status line")?
        .parse()
        .context("invalid upstream status code")?;

    let mut content_type = None;
    let mut content_length = None;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if name.eq_ignore_ascii_case("Content-Type") {
            content_type = Some(value.to_string());
        } else if name.eq_ignore_ascii_case("Content-Length") {
            content_length = value.parse().ok();
        }
    }

    Ok((status, content_type, content_length))
}
