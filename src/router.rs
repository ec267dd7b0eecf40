//! Ordered route table.
//!
//! Registration is append-only; matching walks entries in registration
//! order and the first match wins, so more specific patterns must be
//! registered before broader ones.

use std::sync::Arc;

use crate::http::request::{Method, Request};
use crate::http::response::Response;

/// A registered handler. Runs on a worker thread unless registered inline;
/// it must not block when inline.
pub type HandlerFn = Arc<dyn Fn(&Request, &mut Response) + Send + Sync>;

/// Where a matched handler executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// On the worker pool; blocking calls are fine. The default.
    Offload,
    /// Directly on the reactor thread; reserved for trivial handlers.
    Inline,
}

pub struct RouteEntry {
    /// `None` matches any method.
    pub method: Option<Method>,
    pub pattern: String,
    pub handler: HandlerFn,
    pub dispatch: Dispatch,
}

#[derive(Default)]
pub struct Router {
    routes: Vec<RouteEntry>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Registers a handler executed on the worker pool.
    pub fn register<F>(&mut self, method: Option<Method>, pattern: &str, handler: F)
    where
        F: Fn(&Request, &mut Response) + Send + Sync + 'static,
    {
        self.push(method, pattern, Arc::new(handler), Dispatch::Offload);
    }

    /// Registers a handler executed directly on the reactor thread.
    pub fn register_inline<F>(&mut self, method: Option<Method>, pattern: &str, handler: F)
    where
        F: Fn(&Request, &mut Response) + Send + Sync + 'static,
    {
        self.push(method, pattern, Arc::new(handler), Dispatch::Inline);
    }

    fn push(&mut self, method: Option<Method>, pattern: &str, handler: HandlerFn, dispatch: Dispatch) {
        tracing::debug!(
            method = method.map(|m| m.as_str()).unwrap_or("*"),
            pattern,
            "registered route"
        );
        self.routes.push(RouteEntry {
            method,
            pattern: pattern.to_string(),
            handler,
            dispatch,
        });
    }

    /// Finds the first route whose method filter and pattern match.
    pub fn find(&self, method: Method, path: &str) -> Option<&RouteEntry> {
        self.routes.iter().find(|route| {
            route.method.is_none_or(|m| m == method) && path_matches(&route.pattern, path)
        })
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Matches a path against a pattern with two wildcard primitives:
/// `#` matches exactly one path segment (stops at `/`) and `*` matches the
/// remainder of the path unconditionally.
///
/// Examples:
///   - `/api/streams` matches `/api/streams` only
///   - `/api/streams/#` matches `/api/streams/cam1` but not `/api/streams/cam1/zones`
///   - `/api/streams/#/zones` matches `/api/streams/cam1/zones`
///   - `/hls/*` matches anything under `/hls/`
pub fn path_matches(pattern: &str, path: &str) -> bool {
    let pat = pattern.as_bytes();
    let p = path.as_bytes();
    let mut pi = 0;
    let mut si = 0;

    while pi < pat.len() {
        match pat[pi] {
            b'*' => return true,
            b'#' => {
                pi += 1;
                // Consume one segment: everything up to the next '/'.
                while si < p.len() && p[si] != b'/' {
                    si += 1;
                }
                if pi == pat.len() {
                    return si == p.len();
                }
                if si == p.len() {
                    return false;
                }
            }
            c => {
                if si >= p.len() || p[si] != c {
                    return false;
                }
                pi += 1;
                si += 1;
            }
        }
    }

    si == p.len()
}
