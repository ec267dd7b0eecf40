use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::http::connection::Action;
use crate::http::response::Response;

const HTTP_VERSION: &str = "HTTP/1.1";

fn serialize_response(resp: &Response, action: Action) -> Vec<u8> {
    let mut buf = Vec::with_capacity(256 + resp.body.len());

    let status_line = format!(
        "{} {} {}\r\n",
        HTTP_VERSION,
        resp.status.as_u16(),
        resp.status.reason_phrase()
    );
    buf.extend_from_slice(status_line.as_bytes());

    for (k, v) in &resp.headers {
        buf.extend_from_slice(k.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(v.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    match action {
        Action::KeepAlive => buf.extend_from_slice(b"Connection: keep-alive\r\n"),
        Action::Close => buf.extend_from_slice(b"Connection: close\r\n"),
    }

    buf.extend_from_slice(b"\r\n");
    buf.extend_from_slice(&resp.body);

    buf
}

/// Serializes a buffered response and writes it fully to the transport.
pub struct ResponseWriter {
    buffer: Vec<u8>,
    written: usize,
}

impl ResponseWriter {
    pub fn new(response: &Response, action: Action) -> Self {
        Self {
            buffer: serialize_response(response, action),
            written: 0,
        }
    }

    pub async fn write_to_stream(&mut self, stream: &mut TcpStream) -> anyhow::Result<()> {
        while self.written < self.buffer.len() {
            let n = stream.write(&self.buffer[self.written..]).await?;
            if n == 0 {
                return Err(anyhow::anyhow!("connection closed while writing"));
            }
            self.written += n;
        }
        Ok(())
    }
}
