use std::path::PathBuf;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Process configuration.
///
/// Loaded from the YAML file named by `NVRD_CONFIG`, or built from defaults
/// when unset. The `LISTEN` env var overrides the bind address either way.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub workers: WorkerConfig,
    pub static_files: StaticConfig,
    pub proxy: ProxyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Initial per-connection receive buffer size in bytes.
    pub recv_buffer_initial: usize,
    /// Hard maximum the receive buffer may grow to. This bounds the size of
    /// a single request (headers plus body); anything larger is rejected
    /// with 400. Keep it in the low single-digit megabytes.
    pub recv_buffer_max: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            recv_buffer_initial: 4 * 1024,
            recv_buffer_max: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Fixed number of handler worker threads.
    pub threads: usize,
    /// Bounded depth of the work queue; submissions beyond it fail with 503.
    pub queue_depth: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            queue_depth: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticConfig {
    pub web_root: PathBuf,
    pub index_file: String,
}

impl Default for StaticConfig {
    fn default() -> Self {
        Self {
            web_root: PathBuf::from("./web"),
            index_file: "index.html".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Path prefixes forwarded to the upstream instead of being routed.
    pub prefixes: Vec<String>,
    /// Base URL of the upstream, e.g. `http://127.0.0.1:1984`.
    pub upstream: String,
    /// Maximum concurrent proxy threads; beyond it requests get 503.
    pub max_concurrent: usize,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            prefixes: vec!["/proxy/".to_string()],
            upstream: "http://127.0.0.1:1984".to_string(),
            max_concurrent: 32,
            connect_timeout_secs: 5,
            request_timeout_secs: 30,
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = match std::env::var("NVRD_CONFIG") {
            Ok(path) => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read config file {path}"))?;
                serde_yaml::from_str(&raw)
                    .with_context(|| format!("failed to parse config file {path}"))?
            }
            Err(_) => Config::default(),
        };

        if let Ok(listen) = std::env::var("LISTEN") {
            cfg.server.listen_addr = listen;
        }

        Ok(cfg)
    }
}
