//! Session registry.
//!
//! Collaborators (the WebSocket bus, batch progress reporting) need to refer
//! to live connections long after a request handler returned. They get an
//! opaque random token and look the connection up here under synchronization;
//! a token whose connection has gone away simply misses. Nothing ever
//! reconstructs a live reference from a serialized address.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use uuid::Uuid;

/// Opaque, randomly generated per-connection token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionToken(Uuid);

impl SessionToken {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Shared view of one live connection.
#[derive(Debug)]
pub struct SessionInfo {
    pub peer: SocketAddr,
    pub requests_served: AtomicU64,
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionToken, Arc<SessionInfo>>>,
    total_served: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly accepted connection and returns its token plus
    /// the shared info handle the connection updates as it serves requests.
    pub fn register(&self, peer: SocketAddr) -> (SessionToken, Arc<SessionInfo>) {
        let token = SessionToken::generate();
        let info = Arc::new(SessionInfo {
            peer,
            requests_served: AtomicU64::new(0),
        });
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.insert(token, info.clone());
        }
        (token, info)
    }

    /// Removes a connection at destroy time, folding its served count into
    /// the process total.
    pub fn deregister(&self, token: SessionToken) {
        if let Ok(mut sessions) = self.sessions.lock() {
            if let Some(info) = sessions.remove(&token) {
                let served = info.requests_served.load(Ordering::Relaxed);
                self.total_served.fetch_add(served, Ordering::Relaxed);
            }
        }
    }

    pub fn lookup(&self, token: SessionToken) -> Option<Arc<SessionInfo>> {
        self.sessions.lock().ok()?.get(&token).cloned()
    }

    pub fn active_count(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Requests completed on connections that have already closed, plus
    /// none of the still-active ones.
    pub fn total_served(&self) -> u64 {
        self.total_served.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> SocketAddr {
        "127.0.0.1:12345".parse().unwrap()
    }

    #[test]
    fn register_lookup_deregister() {
        let registry = SessionRegistry::new();
        let (token, info) = registry.register(peer());
        assert_eq!(registry.active_count(), 1);
        assert!(registry.lookup(token).is_some());

        info.requests_served.store(3, Ordering::Relaxed);
        registry.deregister(token);
        assert_eq!(registry.active_count(), 0);
        assert!(registry.lookup(token).is_none());
        assert_eq!(registry.total_served(), 3);
    }

    #[test]
    fn tokens_are_unique_and_round_trip() {
        let registry = SessionRegistry::new();
        let (a, _) = registry.register(peer());
        let (b, _) = registry.register(peer());
        assert_ne!(a, b);
        assert_eq!(SessionToken::parse(&a.to_string()), Some(a));
    }
}
