//! HTTP protocol implementation.
//!
//! An HTTP/1.1 server core with keep-alive and pipelining support, built
//! around a single-threaded reactor and a worker pool for blocking handler
//! execution.
//!
//! # Architecture
//!
//! - **`buffer`**: per-connection growable receive buffer with an explicit
//!   growth policy and hard maximum
//! - **`parser`**: incremental request parser consuming bytes as they arrive
//! - **`request`** / **`response`**: the request/response data contract
//!   shared with handlers
//! - **`connection`**: the connection lifecycle state machine tying reads,
//!   parsing, dispatch, and response writing together
//! - **`writer`**: serializes and writes buffered responses
//! - **`mime`**: MIME type detection for static file serving
//!
//! # Connection state machine
//!
//! ```text
//! READING → PARSING → {DISPATCH_INLINE | DISPATCH_OFFLOADED | DISPATCH_PROXIED}
//!     → RESPONDING → {RESET → READING | CLOSING → CLOSED}
//! ```
//!
//! A parse error or transport error transitions to CLOSING from any state.
//! Within one connection requests are strictly sequential: the next
//! request's bytes are never parsed until the current dispatch completed
//! and the connection was reset.

pub mod buffer;
pub mod connection;
pub mod mime;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
