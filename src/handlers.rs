//! Built-in endpoints the engine itself serves.
//!
//! Everything else (settings, recordings, detection, users) registers
//! through the same [`Router`] API from outside the engine.

use std::sync::Arc;

use crate::http::request::Method;
use crate::http::response::{Response, StatusCode};
use crate::router::Router;
use crate::server::sessions::SessionRegistry;

pub fn register_builtin(router: &mut Router, sessions: Arc<SessionRegistry>) {
    // Liveness ping; trivial enough to answer on the reactor.
    router.register_inline(Some(Method::GET), "/api/health", |_req, res| {
        *res = Response::json(StatusCode::Ok, &serde_json::json!({ "status": "ok" }));
    });

    router.register(Some(Method::GET), "/api/system/status", move |_req, res| {
        *res = Response::json(
            StatusCode::Ok,
            &serde_json::json!({
                "status": "ok",
                "active_connections": sessions.active_count(),
                "requests_served": sessions.total_served(),
            }),
        );
    });
}
