//! TCP server driving the request pipeline.
//!
//! One connection is processed at a time: read once, decode, run the
//! pipeline, write the response, close. A validator rejection ends the
//! accept loop after its response has been written.

use crate::http::{Request, Response};
use crate::pipeline::{Executor, Logger, Outcome, Pipeline, Validator};
use bytes::BytesMut;
use http::StatusCode;
use socket2::{Domain, Protocol, SockRef, Socket, Type};
use std::future::Future;
use std::io;
use std::net::{self as stdnet, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

/// Read size used when the socket's receive buffer size is unavailable
const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Pending connection queue length
const DEFAULT_BACKLOG: u32 = 128;

/// Socket-level tuning.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Listen backlog.
    pub backlog: u32,
    /// Bytes read per connection. `None` uses the socket's receive buffer size.
    pub read_buffer_size: Option<usize>,
    /// Limit on waiting for the request bytes.
    pub read_timeout: Option<Duration>,
    /// Limit on writing the response.
    pub write_timeout: Option<Duration>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            backlog: DEFAULT_BACKLOG,
            read_buffer_size: None,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

/// Lifecycle state of a [`Server`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Created,
    Listening,
    Stopped,
}

/// Why [`Server::start`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// A validator rejected a request.
    Rejected,
    /// [`Server::stop`] or [`ServerHandle::stop`] was called.
    Stopped,
}

/// Fatal server errors
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("transport error: {0}")]
    Io(#[from] io::Error),

    #[error("server cannot start from state {0:?}")]
    InvalidState(ServerState),
}

/// Cloneable remote control for a running server.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    stop: Arc<watch::Sender<bool>>,
}

impl ServerHandle {
    /// Ask the accept loop to exit. A read or write still pending on the
    /// current connection is abandoned.
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }
}

/// Whether the accept loop should keep going after a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
    /// A stop request interrupted the exchange.
    Halted,
}

/// Server instance
pub struct Server {
    local_addr: SocketAddr,
    listener: Option<stdnet::TcpListener>,
    options: ServerOptions,
    pipeline: Pipeline,
    state: ServerState,
    stop: Arc<watch::Sender<bool>>,
}

impl Server {
    /// Create a server bound to `addr` with default options.
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        Self::bind_with(addr, ServerOptions::default())
    }

    /// Create a server listening on `addr`.
    ///
    /// The socket listens immediately, so connections made before
    /// [`Server::start`] wait in the backlog instead of being refused.
    pub fn bind_with(addr: SocketAddr, options: ServerOptions) -> io::Result<Self> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.listen(options.backlog.min(i32::MAX as u32) as i32)?;
        socket.set_nonblocking(true)?;

        let listener: stdnet::TcpListener = socket.into();
        let local_addr = listener.local_addr()?;

        let (stop, _) = watch::channel(false);

        Ok(Server {
            local_addr,
            listener: Some(listener),
            options,
            pipeline: Pipeline::new(),
            state: ServerState::Created,
            stop: Arc::new(stop),
        })
    }

    pub fn add_validator<V: Validator + 'static>(mut self, validator: V) -> Self {
        self.pipeline.push_validator(Box::new(validator));
        self
    }

    pub fn add_executor<E: Executor + 'static>(mut self, executor: E) -> Self {
        self.pipeline.push_executor(Box::new(executor));
        self
    }

    pub fn add_logger<L: Logger + 'static>(mut self, logger: L) -> Self {
        self.pipeline.push_logger(Box::new(logger));
        self
    }

    /// Address the socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            stop: Arc::clone(&self.stop),
        }
    }

    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    /// Accept and process connections until a validator rejects a request,
    /// the server is stopped, or a transport error occurs.
    ///
    /// The listener is released before this returns, whatever the outcome.
    pub async fn start(&mut self) -> Result<Shutdown, ServerError> {
        let listener = match (self.state, self.listener.take()) {
            (ServerState::Created, Some(listener)) => listener,
            (state, _) => return Err(ServerError::InvalidState(state)),
        };

        let mut stop_rx = self.stop.subscribe();

        let listener = match TcpListener::from_std(listener) {
            Ok(listener) => listener,
            Err(e) => {
                self.state = ServerState::Stopped;
                return Err(e.into());
            }
        };

        self.state = ServerState::Listening;
        info!(address = %self.local_addr, "Server listening");

        let result = self.accept_loop(&listener, &mut stop_rx).await;
        drop(listener);
        self.state = ServerState::Stopped;

        match &result {
            Ok(reason) => info!(?reason, "Server stopped"),
            Err(e) => error!(error = %e, "Server stopped on transport error"),
        }

        result
    }

    async fn accept_loop(
        &self,
        listener: &TcpListener,
        stop_rx: &mut watch::Receiver<bool>,
    ) -> Result<Shutdown, ServerError> {
        loop {
            if *stop_rx.borrow_and_update() {
                return Ok(Shutdown::Stopped);
            }

            let (stream, peer) = tokio::select! {
                accepted = listener.accept() => accepted?,
                _ = stop_rx.changed() => continue,
            };

            debug!(peer = %peer, "New connection");

            match self.handle_connection(stream).await? {
                Flow::Continue => {}
                Flow::Stop => {
                    warn!(peer = %peer, "Request rejected, no longer accepting connections");
                    return Ok(Shutdown::Rejected);
                }
                Flow::Halted => return Ok(Shutdown::Stopped),
            }
        }
    }

    /// Handle a single client connection
    async fn handle_connection(&self, mut stream: TcpStream) -> Result<Flow, ServerError> {
        let buffer_size = self.read_buffer_size(&stream);
        self.exchange(&mut stream, buffer_size).await
    }

    /// One read, one pipeline pass, one write, then close the write side.
    ///
    /// A stop request abandons the read or the write it interrupts.
    async fn exchange<S>(&self, stream: &mut S, buffer_size: usize) -> Result<Flow, ServerError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut stop_rx = self.stop.subscribe();
        let mut buffer = BytesMut::zeroed(buffer_size);

        let read = tokio::select! {
            biased;
            read = with_timeout(self.options.read_timeout, stream.read(&mut buffer)) => read,
            _ = stopped(&mut stop_rx) => {
                debug!("Stop requested while reading, dropping connection");
                return Ok(Flow::Halted);
            }
        };

        let n = match read {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                warn!("Read timed out, dropping connection");
                return Ok(Flow::Continue);
            }
            Err(e) => return Err(e.into()),
        };
        buffer.truncate(n);
        trace!(bytes = n, "Read request");

        let raw = String::from_utf8_lossy(&buffer);
        let (response, flow) = match Request::parse(&raw) {
            Ok(request) => match self.pipeline.process(&request).await {
                Outcome::Handled(response) => (response, Flow::Continue),
                Outcome::Rejected(response) => (response, Flow::Stop),
            },
            Err(e) => {
                debug!(error = %e, "Undecodable request");
                self.pipeline.report(&e.to_string()).await;
                let response = Response::new(StatusCode::BAD_REQUEST);
                self.pipeline.log_response(&response).await;
                (response, Flow::Continue)
            }
        };

        let frame = response.encode();
        let written = tokio::select! {
            biased;
            written = with_timeout(self.options.write_timeout, stream.write_all(&frame)) => written,
            _ = stopped(&mut stop_rx) => {
                debug!("Stop requested while writing, dropping connection");
                return Ok(Flow::Halted);
            }
        };

        match written {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                warn!("Write timed out, dropping connection");
                return Ok(flow);
            }
            Err(e) => return Err(e.into()),
        }

        if let Err(e) = stream.shutdown().await {
            trace!(error = %e, "Shutdown after response failed");
        }

        Ok(flow)
    }

    fn read_buffer_size(&self, stream: &TcpStream) -> usize {
        let size = self.options.read_buffer_size.unwrap_or_else(|| {
            SockRef::from(stream)
                .recv_buffer_size()
                .unwrap_or(DEFAULT_READ_BUFFER_SIZE)
        });
        size.max(1)
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop.send_replace(true);
    }
}

/// Resolves once a stop has been requested.
async fn stopped(stop_rx: &mut watch::Receiver<bool>) {
    if stop_rx.wait_for(|stopped| *stopped).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Await `fut`, failing with `TimedOut` once `limit` elapses.
async fn with_timeout<T>(
    limit: Option<Duration>,
    fut: impl Future<Output = io::Result<T>>,
) -> io::Result<T> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "operation timed out"))?,
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::{Behaviour, Check, Journal, Recorder, Route};
    use crate::pipeline::ExecuteResult;
    use async_trait::async_trait;
    use tokio::task::JoinHandle;
    use tokio_test::{assert_err, assert_ok};

    /// Replies with the request body.
    struct Echo;

    #[async_trait]
    impl Executor for Echo {
        async fn execute(&self, request: &Request) -> ExecuteResult {
            Ok(Some(Response::with_body(StatusCode::OK, request.body())))
        }
    }

    fn local() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    fn spawn(mut server: Server) -> (SocketAddr, ServerHandle, JoinHandle<Result<Shutdown, ServerError>>) {
        let addr = server.local_addr();
        let handle = server.handle();
        let task = tokio::spawn(async move { server.start().await });
        (addr, handle, task)
    }

    async fn exchange(addr: SocketAddr, raw: &[u8]) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(raw).await.unwrap();
        stream.shutdown().await.unwrap();
        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).await.unwrap();
        String::from_utf8(reply).unwrap()
    }

    #[tokio::test]
    async fn test_serves_connections_until_stopped() {
        let server = Server::bind(local()).unwrap().add_executor(Echo);
        let (addr, handle, task) = spawn(server);

        let first = exchange(addr, b"POST / HTTP/1.1\r\n\r\none").await;
        let second = exchange(addr, b"POST / HTTP/1.1\r\n\r\ntwo").await;

        assert!(first.starts_with("HTTP/1.1 200 OK\r\nDate: "));
        assert!(first.ends_with("\r\n\r\none\r\n"));
        assert!(second.ends_with("\r\n\r\ntwo\r\n"));

        handle.stop();
        let result = assert_ok!(task.await);
        assert_eq!(assert_ok!(result), Shutdown::Stopped);
    }

    #[tokio::test]
    async fn test_rejection_stops_accept_loop() {
        let journal = Journal::default();
        let server = Server::bind(local())
            .unwrap()
            .add_validator(Check {
                name: "a",
                reject_with: Some(StatusCode::METHOD_NOT_ALLOWED),
                journal: journal.clone(),
            })
            .add_validator(Check {
                name: "b",
                reject_with: None,
                journal: journal.clone(),
            })
            .add_executor(Route {
                name: "x",
                behaviour: Behaviour::Respond(StatusCode::OK, "x"),
                journal: journal.clone(),
            });
        let (addr, _handle, task) = spawn(server);

        let reply = exchange(addr, b"DELETE /thing HTTP/1.1\r\n\r\n").await;
        assert!(reply.starts_with("HTTP/1.1 405 Method Not Allowed\r\n"));

        let result = assert_ok!(task.await);
        assert_eq!(assert_ok!(result), Shutdown::Rejected);
        assert_eq!(journal.entries(), vec!["validate:a"]);

        assert_err!(TcpStream::connect(addr).await);
    }

    #[tokio::test]
    async fn test_malformed_request_line_is_bad_request() {
        let journal = Journal::default();
        let server = Server::bind(local())
            .unwrap()
            .add_executor(Echo)
            .add_logger(Recorder {
                name: "log",
                journal: journal.clone(),
            });
        let (addr, handle, task) = spawn(server);

        let reply = exchange(addr, b"GET\r\n\r\n").await;
        assert!(reply.starts_with("HTTP/1.1 400 Bad Request\r\n"));

        let reply = exchange(addr, b"POST / HTTP/1.1\r\n\r\nok").await;
        assert!(reply.ends_with("\r\n\r\nok\r\n"));

        handle.stop();
        assert_ok!(assert_ok!(task.await));

        let entries = journal.entries();
        assert_eq!(entries[0], "log:message:malformed request line: \"GET\"");
        assert_eq!(entries[1], "log:response:400");
    }

    #[tokio::test]
    async fn test_empty_connection_runs_pipeline_with_empty_request() {
        let journal = Journal::default();
        let server = Server::bind(local()).unwrap().add_logger(Recorder {
            name: "log",
            journal: journal.clone(),
        });
        let (addr, handle, task) = spawn(server);

        let reply = exchange(addr, b"").await;
        assert!(reply.starts_with("HTTP/1.1 404 Not Found\r\n"));

        handle.stop();
        assert_ok!(assert_ok!(task.await));
        assert_eq!(journal.entries(), vec!["log:request:", "log:response:404"]);
    }

    #[tokio::test]
    async fn test_single_read_truncates_large_requests() {
        let server = Server::bind(local()).unwrap().add_executor(Echo);
        let (mut client, mut conn) = tokio::io::duplex(1024);

        // 19 bytes of head, so only 13 body bytes fit in a 32 byte read
        client
            .write_all(b"POST / HTTP/1.1\r\n\r\nabcdefghijklmnopqrstuvwxyz")
            .await
            .unwrap();

        let flow = assert_ok!(server.exchange(&mut conn, 32).await);
        assert_eq!(flow, Flow::Continue);

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        let reply = String::from_utf8(reply).unwrap();
        assert!(reply.ends_with("\r\n\r\nabcdefghijklm\r\n"));
    }

    #[tokio::test]
    async fn test_read_timeout_drops_only_that_connection() {
        let options = ServerOptions {
            read_timeout: Some(Duration::from_millis(50)),
            ..ServerOptions::default()
        };
        let server = Server::bind_with(local(), options).unwrap().add_executor(Echo);
        let (addr, handle, task) = spawn(server);

        let mut idle = TcpStream::connect(addr).await.unwrap();
        let mut leftover = Vec::new();
        idle.read_to_end(&mut leftover).await.unwrap();
        assert!(leftover.is_empty());

        let reply = exchange(addr, b"POST / HTTP/1.1\r\n\r\nstill up").await;
        assert!(reply.ends_with("\r\n\r\nstill up\r\n"));

        handle.stop();
        assert_ok!(assert_ok!(task.await));
    }

    #[tokio::test]
    async fn test_connections_queue_before_start() {
        let server = Server::bind(local()).unwrap().add_executor(Echo);

        let mut early = TcpStream::connect(server.local_addr()).await.unwrap();
        early.write_all(b"POST / HTTP/1.1\r\n\r\nearly").await.unwrap();
        early.shutdown().await.unwrap();

        let (_addr, handle, task) = spawn(server);

        let mut reply = Vec::new();
        early.read_to_end(&mut reply).await.unwrap();
        assert!(String::from_utf8(reply).unwrap().ends_with("\r\n\r\nearly\r\n"));

        handle.stop();
        assert_eq!(assert_ok!(assert_ok!(task.await)), Shutdown::Stopped);
    }

    #[tokio::test]
    async fn test_stop_interrupts_pending_read() {
        let server = Server::bind(local()).unwrap().add_executor(Echo);
        let (_client, mut conn) = tokio::io::duplex(64);

        let stopper = async {
            tokio::task::yield_now().await;
            server.stop();
        };
        let (flow, ()) = tokio::join!(
            tokio::time::timeout(Duration::from_secs(2), server.exchange(&mut conn, 64)),
            stopper
        );

        assert_eq!(assert_ok!(assert_ok!(flow)), Flow::Halted);
    }

    #[tokio::test]
    async fn test_stop_with_idle_client_ends_start() {
        let server = Server::bind(local()).unwrap().add_executor(Echo);
        let (addr, handle, task) = spawn(server);

        let _idle = TcpStream::connect(addr).await.unwrap();
        tokio::task::yield_now().await;
        handle.stop();

        let joined = assert_ok!(tokio::time::timeout(Duration::from_secs(2), task).await);
        assert_eq!(assert_ok!(assert_ok!(joined)), Shutdown::Stopped);
    }

    #[tokio::test]
    async fn test_write_timeout_drops_connection() {
        let options = ServerOptions {
            write_timeout: Some(Duration::from_millis(50)),
            ..ServerOptions::default()
        };
        let server = Server::bind_with(local(), options).unwrap().add_executor(Echo);

        // The response is larger than the pipe and nobody drains it
        let (mut client, mut conn) = tokio::io::duplex(32);
        client.write_all(b"POST / HTTP/1.1\r\n\r\nx").await.unwrap();

        let flow = tokio::time::timeout(Duration::from_secs(2), server.exchange(&mut conn, 64)).await;
        assert_eq!(assert_ok!(assert_ok!(flow)), Flow::Continue);

        drop(conn);
        let mut partial = Vec::new();
        client.read_to_end(&mut partial).await.unwrap();
        assert_eq!(partial.len(), 32);
        assert!(partial.starts_with(b"HTTP/1.1 200 OK\r\n"));
    }

    #[tokio::test]
    async fn test_lifecycle_states() {
        let mut server = Server::bind(local()).unwrap();
        assert_eq!(server.state(), ServerState::Created);

        server.stop();
        assert_eq!(assert_ok!(server.start().await), Shutdown::Stopped);
        assert_eq!(server.state(), ServerState::Stopped);

        match server.start().await {
            Err(ServerError::InvalidState(ServerState::Stopped)) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }
}
