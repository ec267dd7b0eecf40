//! Detached-thread proxy bridge.
//!
//! A single slow upstream call can take tens of seconds; routed through the
//! shared worker pool it would starve every other request behind it. Proxy
//! requests therefore bypass the pool entirely: each one runs on its own
//! short-lived detached thread, capped by a concurrency limit, and the
//! completed response travels back to the connection task over the same
//! oneshot channel the pool uses. If the thread cannot start, the request
//! fails with 503 rather than falling back to the shared pool.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::config::ProxyConfig;
use crate::http::request::Request;
use crate::http::response::{Response, ResponseBuilder, StatusCode};
use crate::proxy::upstream::{ProxyRequest, Upstream};
use crate::server::workers::Completion;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyError {
    /// The concurrent-thread cap has been reached.
    AtCapacity,
    /// Thread spawn failed.
    SpawnFailed,
    ShuttingDown,
}

pub struct ProxyBridge {
    upstream: Arc<Upstream>,
    prefixes: Vec<String>,
    active: Arc<AtomicUsize>,
    max_concurrent: usize,
    shutdown: Arc<AtomicBool>,
}

impl ProxyBridge {
    pub fn new(cfg: &ProxyConfig, shutdown: Arc<AtomicBool>) -> anyhow::Result<Self> {
        let upstream = Upstream::new(
            &cfg.upstream,
            std::time::Duration::from_secs(cfg.connect_timeout_secs),
            std::time::Duration::from_secs(cfg.request_timeout_secs),
        )?;
        Ok(Self {
            upstream: Arc::new(upstream),
            prefixes: cfg.prefixes.clone(),
            active: Arc::new(AtomicUsize::new(0)),
            max_concurrent: cfg.max_concurrent.max(1),
            shutdown,
        })
    }

    /// Whether this path belongs to the proxied upstream.
    pub fn matches(&self, path: &str) -> bool {
        self.prefixes.iter().any(|p| path.starts_with(p.as_str()))
    }

    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Captures the request and starts a dedicated proxy thread. The
    /// returned receiver completes on the reactor with the upstream's
    /// response (or a 502).
    pub fn submit(&self, request: &Request) -> Result<oneshot::Receiver<Completion>, ProxyError> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(ProxyError::ShuttingDown);
        }
        if self.active.load(Ordering::Acquire) >= self.max_concurrent {
            tracing::warn!(
                max = self.max_concurrent,
                path = %request.path,
                "proxy thread cap reached"
            );
            return Err(ProxyError::AtCapacity);
        }

        let captured = ProxyRequest {
            method: request.method,
            path: request.path.clone(),
            query: request.query.clone(),
            content_type: request.content_type.clone(),
            body: request.body.clone(),
        };

        let (reply, rx) = oneshot::channel();
        let upstream = self.upstream.clone();
        let active = self.active.clone();

        active.fetch_add(1, Ordering::AcqRel);
        let spawned = std::thread::Builder::new()
            .name("nvrd-proxy".to_string())
            .spawn(move || {
                let response = match upstream.round_trip(&captured) {
                    Ok(up) => {
                        tracing::debug!(
                            path = %captured.path,
                            status = up.status,
                            bytes = up.body.len(),
                            "proxied request completed"
                        );
                        proxied_response(up.status, up.content_type, up.body)
                    }
                    Err(e) => {
                        tracing::warn!(path = %captured.path, error = %e, "proxy round trip failed");
                        Response::json_error(StatusCode::BadGateway, "Upstream is not responding")
                    }
                };
                // The connection may have gone away; a dropped receiver is fine.
                let _ = reply.send(Completion::Done(response));
                active.fetch_sub(1, Ordering::AcqRel);
            });

        match spawned {
            Ok(_) => Ok(rx),
            Err(e) => {
                self.active.fetch_sub(1, Ordering::AcqRel);
                tracing::error!(error = %e, "failed to spawn proxy thread");
                Err(ProxyError::SpawnFailed)
            }
        }
    }
}

fn proxied_response(status: u16, content_type: Option<String>, body: Vec<u8>) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(match status / 100 {
        2 => StatusCode::Ok,
        3 => StatusCode::Found,
        4 => StatusCode::BadRequest,
        _ => StatusCode::BadGateway,
    });

    let mut builder = ResponseBuilder::new(status)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, PUT, DELETE, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type, Authorization");
    if let Some(ct) = content_type {
        builder = builder.header("Content-Type", ct);
    }
    builder.body(body).build()
}
