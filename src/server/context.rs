//! Process-lifetime server context.
//!
//! One explicitly constructed object owns everything the engine shares:
//! the route table, the worker pool, the proxy bridge, the session registry,
//! and the shutdown flag. Connections hold it by `Arc`; there are no
//! ambient globals.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::Config;
use crate::proxy::ProxyBridge;
use crate::router::{HandlerFn, Router};
use crate::server::sessions::SessionRegistry;
use crate::server::static_files::StaticFiles;
use crate::server::workers::WorkerPool;

pub struct ServerContext {
    pub config: Config,
    pub router: Router,
    pub workers: WorkerPool,
    pub proxy: ProxyBridge,
    pub sessions: Arc<SessionRegistry>,
    /// Fallback handler invoked when no route matches; resolves static
    /// files on a worker like any other handler.
    pub static_handler: HandlerFn,
    shutdown: Arc<AtomicBool>,
}

impl ServerContext {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let workers = WorkerPool::new(config.workers.threads, config.workers.queue_depth);
        let proxy = ProxyBridge::new(&config.proxy, shutdown.clone())?;
        let sessions = Arc::new(SessionRegistry::new());

        let static_files = StaticFiles::new(&config.static_files);
        let static_handler: HandlerFn = Arc::new(move |req, res| static_files.handle(req, res));

        Ok(Self {
            config,
            router: Router::new(),
            workers,
            proxy,
            sessions,
            static_handler,
            shutdown,
        })
    }

    /// Begins engine shutdown: queued work is cancelled and in-flight
    /// completions close their connections without writing. Idempotent.
    pub fn begin_shutdown(&self) {
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            tracing::info!("engine shutdown initiated");
            self.workers.shutdown();
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}
