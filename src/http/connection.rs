//! Connection lifecycle.
//!
//! One [`Connection`] per accepted socket, driven as a task on the reactor
//! thread. The task owns the transport, the receive buffer, the parser, and
//! every flag: the single-writer baton. When a request is dispatched to a
//! worker, the task suspends on the completion channel: no bytes are read
//! and nothing is parsed until the worker hands the baton back, so pipelined
//! bytes of the next request sit untouched in the buffer until `reset` runs.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::oneshot;

use crate::http::buffer::RecvBuffer;
use crate::http::parser::{ParseError, ParseStatus, RequestParser};
use crate::http::request::Request;
use crate::http::response::{FileServe, Response, StatusCode};
use crate::http::writer::ResponseWriter;
use crate::router::{Dispatch, HandlerFn};
use crate::server::context::ServerContext;
use crate::server::sessions::{SessionInfo, SessionToken};
use crate::server::static_files::{self, StartError};
use crate::server::workers::{Completion, SubmitError, WorkItem};
use crate::proxy::ProxyError;

/// What to do with the transport once the response bytes are fully written.
/// Decided at message-complete time, before any offload, so workers never
/// inspect transport state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    KeepAlive,
    Close,
}

enum RecvOutcome {
    /// `self.request` holds a complete message.
    Request,
    PeerClosed,
    ParseFailed(ParseError),
}

enum DispatchOutcome {
    Respond(Response),
    /// Shutdown or worker loss; close without writing.
    Cancelled,
}

pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    ctx: Arc<ServerContext>,
    recv: RecvBuffer,
    parser: RequestParser,
    request: Request,
    keep_alive: bool,
    handler_on_worker: bool,
    async_response_pending: bool,
    deferred_action: Option<Action>,
    token: SessionToken,
    info: Arc<SessionInfo>,
}

impl Connection {
    pub fn new(stream: TcpStream, peer: SocketAddr, ctx: Arc<ServerContext>) -> Self {
        let (token, info) = ctx.sessions.register(peer);
        let recv = RecvBuffer::new(
            ctx.config.server.recv_buffer_initial,
            ctx.config.server.recv_buffer_max,
        );
        let parser = RequestParser::new(ctx.config.server.recv_buffer_max);
        Self {
            stream,
            peer,
            ctx,
            recv,
            parser,
            request: Request::default(),
            keep_alive: true,
            handler_on_worker: false,
            async_response_pending: false,
            deferred_action: None,
            token,
            info,
        }
    }

    /// Serves requests until the connection closes, then deregisters the
    /// session. All teardown funnels through here.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        let result = self.serve_loop().await;
        self.ctx.sessions.deregister(self.token);
        tracing::debug!(
            peer = %self.peer,
            served = self.info.requests_served.load(Ordering::Relaxed),
            "connection closed"
        );
        result
    }

    async fn serve_loop(&mut self) -> anyhow::Result<()> {
        loop {
            match self.read_request().await? {
                RecvOutcome::PeerClosed => return Ok(()),
                RecvOutcome::ParseFailed(e) => {
                    tracing::debug!(peer = %self.peer, error = ?e, "request parse error");
                    let response = Response::json_error(StatusCode::BadRequest, e.message());
                    // Best effort: the 400 goes out if the peer still reads.
                    let _ = self.write_response(&response, Action::Close).await;
                    return Ok(());
                }
                RecvOutcome::Request => {}
            }

            let mut request = std::mem::take(&mut self.request);
            request.session = Some(self.token);
            let request = Arc::new(request);
            self.keep_alive = request.keep_alive();
            // Decided before any offload so workers never inspect transport
            // state; consumed once the response is ready to go out.
            self.deferred_action = Some(if self.keep_alive && !self.ctx.is_shutting_down() {
                Action::KeepAlive
            } else {
                Action::Close
            });

            let outcome = self.dispatch(request.clone()).await;
            let action = self.deferred_action.take().unwrap_or(Action::Close);
            match outcome {
                DispatchOutcome::Cancelled => return Ok(()),
                DispatchOutcome::Respond(mut response) => {
                    if self.ctx.is_shutting_down() {
                        // Cancelled semantics: handler output is discarded.
                        return Ok(());
                    }
                    if let Some(descriptor) = response.deferred_file.take() {
                        self.async_response_pending = true;
                        let sent = self.serve_deferred_file(&request, &descriptor, action).await;
                        self.async_response_pending = false;
                        sent?;
                    } else if self.async_response_pending {
                        // A response is already in flight for this request;
                        // writing another would corrupt the stream.
                        tracing::warn!(peer = %self.peer, "async response pending, skipping send");
                    } else {
                        self.write_response(&response, action).await?;
                    }
                }
            }

            self.info.requests_served.fetch_add(1, Ordering::Relaxed);
            match action {
                Action::KeepAlive => self.reset(),
                Action::Close => return Ok(()),
            }
        }
    }

    /// Reads and parses until one full message is framed. Parsing always
    /// runs before reading so that pipelined bytes already in the buffer
    /// are consumed without touching the socket.
    async fn read_request(&mut self) -> anyhow::Result<RecvOutcome> {
        loop {
            match self.parser.advance(self.recv.filled(), &mut self.request) {
                Ok(ParseStatus::Complete { consumed }) => {
                    let message = self.recv.take_message(consumed);
                    let (offset, len) = self.parser.body_span();
                    self.request.body = message.slice(offset..offset + len);
                    return Ok(RecvOutcome::Request);
                }
                Ok(ParseStatus::NeedMore) => {}
                Err(e) => return Ok(RecvOutcome::ParseFailed(e)),
            }

            let recv = &mut self.recv;
            let stream = &mut self.stream;
            let window = match recv.window() {
                Ok(w) => w,
                Err(_) => return Ok(RecvOutcome::ParseFailed(ParseError::TooLarge)),
            };
            let n = stream.read(window).await?;
            recv.commit(n);
            if n == 0 {
                return Ok(RecvOutcome::PeerClosed);
            }
        }
    }

    async fn dispatch(&mut self, request: Arc<Request>) -> DispatchOutcome {
        if self.ctx.proxy.matches(&request.path) {
            return self.dispatch_proxied(&request).await;
        }

        let matched = self
            .ctx
            .router
            .find(request.method, &request.path)
            .map(|route| (route.handler.clone(), route.dispatch));

        match matched {
            Some((handler, Dispatch::Inline)) => {
                let mut response = Response::new(StatusCode::Ok);
                handler(&request, &mut response);
                DispatchOutcome::Respond(response)
            }
            Some((handler, Dispatch::Offload)) => self.dispatch_offloaded(request, handler).await,
            None => {
                let handler = self.ctx.static_handler.clone();
                self.dispatch_offloaded(request, handler).await
            }
        }
    }

    async fn dispatch_offloaded(
        &mut self,
        request: Arc<Request>,
        handler: HandlerFn,
    ) -> DispatchOutcome {
        let (reply, rx) = oneshot::channel();
        self.handler_on_worker = true;

        let submitted = self.ctx.workers.submit(WorkItem {
            request,
            handler,
            reply,
        });
        if let Err(e) = submitted {
            self.handler_on_worker = false;
            return match e {
                SubmitError::QueueFull => {
                    tracing::warn!(peer = %self.peer, "worker queue full");
                    DispatchOutcome::Respond(Response::json_error(
                        StatusCode::ServiceUnavailable,
                        "Server busy",
                    ))
                }
                SubmitError::ShuttingDown => DispatchOutcome::Cancelled,
            };
        }

        // The pause: reads stay stopped until the worker returns the baton.
        let outcome = match rx.await {
            Ok(Completion::Done(response)) => DispatchOutcome::Respond(response),
            Ok(Completion::Cancelled) | Err(_) => DispatchOutcome::Cancelled,
        };
        self.handler_on_worker = false;
        outcome
    }

    async fn dispatch_proxied(&mut self, request: &Request) -> DispatchOutcome {
        match self.ctx.proxy.submit(request) {
            Ok(rx) => match rx.await {
                Ok(Completion::Done(response)) => DispatchOutcome::Respond(response),
                Ok(Completion::Cancelled) | Err(_) => DispatchOutcome::Cancelled,
            },
            Err(ProxyError::ShuttingDown) => DispatchOutcome::Cancelled,
            Err(ProxyError::AtCapacity) | Err(ProxyError::SpawnFailed) => {
                DispatchOutcome::Respond(Response::json_error(
                    StatusCode::ServiceUnavailable,
                    "Proxy capacity exhausted",
                ))
            }
        }
    }

    /// Phase 2 of deferred file serving, on the reactor thread. Failures
    /// before headers degrade to a buffered error response; failures after
    /// are transport errors and tear the connection down.
    async fn serve_deferred_file(
        &mut self,
        request: &Request,
        descriptor: &FileServe,
        action: Action,
    ) -> anyhow::Result<()> {
        match static_files::start(descriptor, request.header("Range")).await {
            Ok(file_stream) => file_stream.send(&mut self.stream, action).await,
            Err(StartError::NotSatisfiable) => {
                let response = Response::json_error(
                    StatusCode::RangeNotSatisfiable,
                    "Requested range not satisfiable",
                );
                self.write_response(&response, action).await
            }
            Err(StartError::Io(e)) => {
                tracing::error!(
                    file = %descriptor.path.display(),
                    error = %e,
                    "deferred file serve failed"
                );
                let response = Response::internal_error("Failed to serve file");
                self.write_response(&response, action).await
            }
        }
    }

    async fn write_response(&mut self, response: &Response, action: Action) -> anyhow::Result<()> {
        ResponseWriter::new(response, action)
            .write_to_stream(&mut self.stream)
            .await
    }

    /// Prepares for the next request on a keep-alive connection: request,
    /// response, and parser state are reinitialized, every deferred and
    /// async flag is cleared, and consumed bytes are gone from the buffer
    /// while pipelined successors remain. Reading resumes in the next loop
    /// iteration.
    fn reset(&mut self) {
        // The baton must be back on the reactor before buffer reuse.
        debug_assert!(!self.handler_on_worker);
        self.request = Request::default();
        self.parser.reset();
        self.keep_alive = true;
        self.handler_on_worker = false;
        self.async_response_pending = false;
        self.deferred_action = None;
    }
}
