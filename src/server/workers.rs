//! Bounded worker pool for blocking handler execution.
//!
//! Handlers run business logic that blocks on the database and filesystem,
//! so they must never execute on the reactor thread. A connection submits a
//! work item and suspends on the completion channel; that suspension is the
//! pause that keeps pipelined bytes unparsed while the worker holds the
//! request. The worker only ever touches the request snapshot and its own
//! response, never the transport.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use tokio::sync::oneshot;

use crate::http::request::Request;
use crate::http::response::{Response, StatusCode};
use crate::router::HandlerFn;

/// One queued handler execution. Created at dispatch time, consumed by a
/// worker, gone at completion.
pub struct WorkItem {
    pub request: Arc<Request>,
    pub handler: HandlerFn,
    pub reply: oneshot::Sender<Completion>,
}

/// Outcome delivered back to the connection task.
#[derive(Debug)]
pub enum Completion {
    Done(Response),
    /// The pool is shutting down; the handler did not run (or its output
    /// must be discarded). The connection closes without writing.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    /// The bounded queue is full.
    QueueFull,
    /// The pool has been shut down.
    ShuttingDown,
}

pub struct WorkerPool {
    tx: Mutex<Option<SyncSender<WorkItem>>>,
    shutdown: Arc<AtomicBool>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(threads: usize, queue_depth: usize) -> Self {
        let threads = threads.max(1);
        let (tx, rx) = std::sync::mpsc::sync_channel::<WorkItem>(queue_depth.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut handles = Vec::with_capacity(threads);
        for i in 0..threads {
            let rx = rx.clone();
            let shutdown = shutdown.clone();
            let handle = std::thread::Builder::new()
                .name(format!("nvrd-worker-{i}"))
                .spawn(move || worker_loop(rx, shutdown));
            match handle {
                Ok(h) => handles.push(h),
                Err(e) => tracing::error!(worker = i, error = %e, "failed to spawn worker thread"),
            }
        }
        tracing::info!(threads, queue_depth, "worker pool started");

        Self {
            tx: Mutex::new(Some(tx)),
            shutdown,
            threads: Mutex::new(handles),
        }
    }

    /// Enqueues a work item without blocking the reactor. A full queue is a
    /// submission failure the caller reports inline.
    pub fn submit(&self, item: WorkItem) -> Result<(), SubmitError> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(SubmitError::ShuttingDown);
        }
        let guard = match self.tx.lock() {
            Ok(g) => g,
            Err(_) => return Err(SubmitError::ShuttingDown),
        };
        let Some(tx) = guard.as_ref() else {
            return Err(SubmitError::ShuttingDown);
        };
        match tx.try_send(item) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(SubmitError::QueueFull),
            Err(TrySendError::Disconnected(_)) => Err(SubmitError::ShuttingDown),
        }
    }

    /// Signals shutdown. Queued-but-unstarted items are drained as
    /// [`Completion::Cancelled`]; worker threads exit once the queue is
    /// empty. Does not wait for in-flight handlers.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        if let Ok(mut guard) = self.tx.lock() {
            // Dropping the sender unblocks workers waiting on recv().
            guard.take();
        }
    }

    /// Blocks until every worker thread has exited. Call after
    /// [`shutdown`](WorkerPool::shutdown), from outside the reactor.
    pub fn join(&self) {
        let handles = match self.threads.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(_) => return,
        };
        for handle in handles {
            let _ = handle.join();
        }
    }
}

fn worker_loop(rx: Arc<Mutex<Receiver<WorkItem>>>, shutdown: Arc<AtomicBool>) {
    loop {
        let item = {
            let guard = match rx.lock() {
                Ok(g) => g,
                Err(_) => break,
            };
            match guard.recv() {
                Ok(item) => item,
                Err(_) => break, // all senders dropped
            }
        };

        if shutdown.load(Ordering::Acquire) {
            let _ = item.reply.send(Completion::Cancelled);
            continue;
        }

        let request = item.request;
        let handler = item.handler;
        let result = catch_unwind(AssertUnwindSafe(|| {
            let mut response = Response::new(StatusCode::Ok);
            handler(&request, &mut response);
            response
        }));

        let completion = match result {
            Ok(response) => Completion::Done(response),
            Err(_) => {
                tracing::error!(path = %request.path, "handler panicked");
                Completion::Done(Response::internal_error("Internal server error"))
            }
        };
        // The connection may already be gone; a dropped receiver is fine.
        let _ = item.reply.send(completion);
    }
}
