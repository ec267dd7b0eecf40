//! Static file fallback.
//!
//! Serving a file is a two-phase operation. Phase 1 runs on a worker like
//! any handler: it performs the blocking filesystem stats (path join under
//! the web root, directory to index rewrite, pre-compressed sibling lookup)
//! and leaves a plain [`FileServe`] descriptor on the response. Phase 2 runs
//! back on the reactor thread, which owns the transport: it opens the file
//! and streams it, honoring Range requests for video seeking.

use std::path::{Component, Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::StaticConfig;
use crate::http::connection::Action;
use crate::http::mime;
use crate::http::request::Request;
use crate::http::response::{FileServe, Response, StatusCode};

const FILE_CHUNK_SIZE: usize = 64 * 1024;

/// Phase-1 resolver. Cheap to clone into the fallback handler closure.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    web_root: PathBuf,
    index_file: String,
}

impl StaticFiles {
    pub fn new(cfg: &StaticConfig) -> Self {
        Self {
            web_root: cfg.web_root.clone(),
            index_file: cfg.index_file.clone(),
        }
    }

    /// Fallback handler body; runs on a worker thread.
    pub fn handle(&self, req: &Request, res: &mut Response) {
        match self.resolve(&req.path) {
            Some(descriptor) => {
                tracing::debug!(path = %req.path, file = %descriptor.path.display(), "serving static file");
                res.deferred_file = Some(descriptor);
            }
            None => {
                tracing::debug!(path = %req.path, "static file not found");
                *res = Response::not_found("Not Found");
            }
        }
    }

    /// Resolves a request path to a file on disk, or `None` for 404.
    pub fn resolve(&self, request_path: &str) -> Option<FileServe> {
        if has_parent_segment(request_path) {
            return None;
        }

        let mut full = self.web_root.join(request_path.trim_start_matches('/'));

        match std::fs::metadata(&full) {
            Ok(meta) if meta.is_dir() => {
                full.push(&self.index_file);
                let meta = std::fs::metadata(&full).ok()?;
                if !meta.is_file() {
                    return None;
                }
                Some(FileServe {
                    path: full,
                    content_type: None,
                    extra_headers: Vec::new(),
                })
            }
            Ok(meta) if meta.is_file() => Some(FileServe {
                path: full,
                content_type: None,
                extra_headers: Vec::new(),
            }),
            Ok(_) => None,
            // Missing: a pre-compressed sibling may exist. Serve it with the
            // MIME type of the uncompressed name.
            Err(_) => {
                let sibling = gz_sibling(&full)?;
                let meta = std::fs::metadata(&sibling).ok()?;
                if !meta.is_file() {
                    return None;
                }
                Some(FileServe {
                    path: sibling,
                    content_type: Some(mime::from_path(&full).to_string()),
                    extra_headers: vec![("Content-Encoding".to_string(), "gzip".to_string())],
                })
            }
        }
    }
}

fn has_parent_segment(path: &str) -> bool {
    Path::new(path)
        .components()
        .any(|c| matches!(c, Component::ParentDir))
}

fn gz_sibling(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?.to_str()?;
    Some(path.with_file_name(format!("{name}.gz")))
}

/// Why phase 2 could not begin. Anything after headers have gone out is an
/// ordinary transport error instead.
#[derive(Debug)]
pub enum StartError {
    /// The Range header does not describe any satisfiable byte range.
    NotSatisfiable,
    /// Open or stat failed on the reactor; resolution raced a deletion or
    /// the file is unreadable.
    Io(std::io::Error),
}

/// An opened file ready to stream, with the byte window already decided.
pub struct FileStream {
    file: tokio::fs::File,
    status: StatusCode,
    content_type: String,
    extra_headers: Vec<(String, String)>,
    file_size: u64,
    start: u64,
    remaining: u64,
}

/// Phase 2 entry point: opens and stats the resolved file and applies the
/// request's Range header. Must be called on the reactor thread.
pub async fn start(descriptor: &FileServe, range: Option<&str>) -> Result<FileStream, StartError> {
    let file = tokio::fs::File::open(&descriptor.path)
        .await
        .map_err(StartError::Io)?;
    let meta = file.metadata().await.map_err(StartError::Io)?;
    let file_size = meta.len();

    let content_type = descriptor
        .content_type
        .clone()
        .unwrap_or_else(|| mime::from_path(&descriptor.path).to_string());

    let (status, start, remaining) = match range {
        Some(header) => {
            let (start, end) = parse_range(header, file_size).ok_or(StartError::NotSatisfiable)?;
            (StatusCode::PartialContent, start, end - start + 1)
        }
        None => (StatusCode::Ok, 0, file_size),
    };

    Ok(FileStream {
        file,
        status,
        content_type,
        extra_headers: descriptor.extra_headers.clone(),
        file_size,
        start,
        remaining,
    })
}

impl FileStream {
    /// Writes headers and streams the byte window to the client.
    pub async fn send(mut self, stream: &mut TcpStream, action: Action) -> anyhow::Result<()> {
        let mut headers = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nAccept-Ranges: bytes\r\n",
            self.status.as_u16(),
            self.status.reason_phrase(),
            self.content_type,
            self.remaining,
        );
        if self.status == StatusCode::PartialContent {
            headers.push_str(&format!(
                "Content-Range: bytes {}-{}/{}\r\n",
                self.start,
                self.start + self.remaining - 1,
                self.file_size,
            ));
        }
        for (name, value) in &self.extra_headers {
            headers.push_str(&format!("{name}: {value}\r\n"));
        }
        match action {
            Action::KeepAlive => headers.push_str("Connection: keep-alive\r\n"),
            Action::Close => headers.push_str("Connection: close\r\n"),
        }
        headers.push_str("\r\n");
        stream.write_all(headers.as_bytes()).await?;

        if self.start > 0 {
            self.file.seek(std::io::SeekFrom::Start(self.start)).await?;
        }

        let mut buf = vec![0u8; FILE_CHUNK_SIZE];
        while self.remaining > 0 {
            let want = (self.remaining as usize).min(buf.len());
            let n = self.file.read(&mut buf[..want]).await?;
            if n == 0 {
                anyhow::bail!("file truncated while streaming");
            }
            stream.write_all(&buf[..n]).await?;
            self.remaining -= n as u64;
        }

        Ok(())
    }
}

/// Parses a `Range` header against the file size.
///
/// Supports `bytes=N-M`, open-ended `bytes=N-`, and suffix `bytes=-N`.
/// Returns the inclusive `(start, end)` window, or `None` when no byte of
/// the file is addressed.
pub fn parse_range(header: &str, file_size: u64) -> Option<(u64, u64)> {
    let value = header.strip_prefix("bytes=")?;
    if file_size == 0 {
        return None;
    }

    let (start, end) = if let Some(suffix) = value.strip_prefix('-') {
        // Suffix range: the last N bytes.
        let suffix_len: u64 = suffix.parse().ok()?;
        if suffix_len == 0 {
            return None;
        }
        let suffix_len = suffix_len.min(file_size);
        (file_size - suffix_len, file_size - 1)
    } else {
        let (from, to) = value.split_once('-')?;
        let start: u64 = from.parse().ok()?;
        let end = if to.is_empty() {
            file_size - 1
        } else {
            to.parse().ok()?
        };
        (start, end)
    };

    if start >= file_size || start > end {
        return None;
    }
    Some((start, end.min(file_size - 1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_normal_and_open_ended() {
        assert_eq!(parse_range("bytes=0-499", 1000), Some((0, 499)));
        assert_eq!(parse_range("bytes=500-", 1000), Some((500, 999)));
        assert_eq!(parse_range("bytes=0-5000", 1000), Some((0, 999)));
    }

    #[test]
    fn range_suffix() {
        assert_eq!(parse_range("bytes=-200", 1000), Some((800, 999)));
        assert_eq!(parse_range("bytes=-2000", 1000), Some((0, 999)));
    }

    #[test]
    fn range_unsatisfiable() {
        assert_eq!(parse_range("bytes=1000-", 1000), None);
        assert_eq!(parse_range("bytes=5-2", 1000), None);
        assert_eq!(parse_range("bytes=-0", 1000), None);
        assert_eq!(parse_range("bytes=0-", 0), None);
        assert_eq!(parse_range("lines=0-5", 1000), None);
    }

    #[test]
    fn parent_segments_are_rejected() {
        assert!(has_parent_segment("/../etc/passwd"));
        assert!(has_parent_segment("/css/../../secret"));
        assert!(!has_parent_segment("/css/app.css"));
    }
}
