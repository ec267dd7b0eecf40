//! Server assembly: context, accept loop, worker pool, sessions, and the
//! static file fallback.

pub mod context;
pub mod listener;
pub mod sessions;
pub mod static_files;
pub mod workers;

pub use context::ServerContext;
pub use listener::Listener;
