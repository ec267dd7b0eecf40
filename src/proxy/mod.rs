//! Reverse proxying to the streaming gateway.
//!
//! Certain path prefixes are served by a slow external upstream rather than
//! local handlers; this module forwards them without tying up the shared
//! worker pool.

pub mod bridge;
pub mod upstream;

pub use bridge::{ProxyBridge, ProxyError};
pub use upstream::{ProxyRequest, Upstream, UpstreamResponse};
