//! The server: one listener, a bounded connection pool and an HTTP connection
//! task per admitted stream.

use std::fmt;
use std::future::{self, Future};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use plexer_http::connection::HttpConnection;
use plexer_http::endpoint::Endpoint;
use plexer_net::{
    Accepted, BoxError, ConnectionContext, ConnectionPool, EndpointAddress, Listener, ListenerDisposition, ListenerError,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::subscriber::SetGlobalDefaultError;
use tracing::{Instrument, Span, debug, info, info_span, warn};

use crate::config::{ConfigError, DEFAULT_MAX_CONNECTIONS, ServerConfig};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("address must be set")]
    MissingAddress,

    #[error(transparent)]
    Listen(#[from] ListenerError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("can't install logging: {0}")]
    Logging(#[from] SetGlobalDefaultError),
}

/// The pool entry of an admitted connection.
#[derive(Debug)]
struct ConnectionHandle {
    context: ConnectionContext,
    token: CancellationToken,
}

impl ConnectionHandle {
    fn force_close(&self, reason: &'static str) {
        info!(
            id = self.context.id(),
            peer = ?self.context.peer(),
            uid = self.context.uid(),
            gid = self.context.gid(),
            pid = self.context.pid(),
            reason,
            "force closing connection"
        );
        self.token.cancel();
    }
}

type SharedPool = Arc<Mutex<ConnectionPool<ConnectionHandle>>>;

fn lock(pool: &Mutex<ConnectionPool<ConnectionHandle>>) -> MutexGuard<'_, ConnectionPool<ConnectionHandle>> {
    pool.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct ServerBuilder {
    address: Option<EndpointAddress>,
    max_connections: usize,
    root: Option<Arc<dyn Endpoint>>,
    span: Option<Span>,
}

impl fmt::Debug for ServerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerBuilder")
            .field("address", &self.address)
            .field("max_connections", &self.max_connections)
            .field("has_root", &self.root.is_some())
            .finish_non_exhaustive()
    }
}

impl ServerBuilder {
    fn new() -> Self {
        Self { address: None, max_connections: DEFAULT_MAX_CONNECTIONS, root: None, span: None }
    }

    #[must_use]
    pub fn address(mut self, address: EndpointAddress) -> Self {
        self.address = Some(address);
        self
    }

    /// Takes the listen address and connection limit from `config`.
    pub fn config(self, config: &ServerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(self.address(config.endpoint_address()?).max_connections(config.max_connections))
    }

    #[must_use]
    pub fn max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    #[must_use]
    pub fn root_endpoint(self, root: impl Endpoint + 'static) -> Self {
        self.root_endpoint_arc(Arc::new(root))
    }

    #[must_use]
    pub fn root_endpoint_arc(mut self, root: Arc<dyn Endpoint>) -> Self {
        self.root = Some(root);
        self
    }

    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Binds the listen address and starts listening.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Result<Server, ServerError> {
        let address = self.address.ok_or(ServerError::MissingAddress)?;
        let span = self.span.unwrap_or_else(|| info_span!("server", address = %address));

        let pool: SharedPool = Arc::new(Mutex::new(ConnectionPool::new(self.max_connections)));
        let connections = CancellationToken::new();
        let tracker = TaskTracker::new();

        let admission = Admission {
            pool: Arc::clone(&pool),
            root: self.root,
            connections: connections.clone(),
            tracker: tracker.clone(),
            span: span.clone(),
        };

        let mut listener = Listener::new(address).with_span(info_span!(parent: &span, "listener"));
        listener.set_error_handler(error_disposition);
        listener.set_connection_handler(move |accepted| admission.admit(accepted));
        listener.listen()?;

        Ok(Server { listener, pool, stop: CancellationToken::new(), connections, tracker, span })
    }
}

/// What the server does after a listener failure.
///
/// A failed peer lookup is ignored and the stream served anyway, a peer that
/// went away before its accept completed is skipped, anything else stops
/// the listener.
fn error_disposition(error: &io::Error, context: &str) -> ListenerDisposition {
    match (context, error.kind()) {
        ("remote_endpoint", _) => ListenerDisposition::IgnoreError,
        ("accept", io::ErrorKind::ConnectionAborted | io::ErrorKind::ConnectionReset | io::ErrorKind::Interrupted) => {
            ListenerDisposition::IgnoreConnection
        }
        _ => ListenerDisposition::CancelAndStop,
    }
}

struct Admission {
    pool: SharedPool,
    root: Option<Arc<dyn Endpoint>>,
    connections: CancellationToken,
    tracker: TaskTracker,
    span: Span,
}

impl Admission {
    fn admit(&self, accepted: Accepted) -> Result<(), BoxError> {
        let Accepted { stream, peer } = accepted;
        let mut pool = lock(&self.pool);

        if pool.is_full() {
            warn!(
                parent: &self.span,
                peer = ?peer,
                maximum = pool.maximum_connection_count(),
                "connection limit reached, closing accepted stream"
            );
            drop(stream);
            return Ok(());
        }

        let mut connection = HttpConnection::new(stream, peer);
        if let Some(root) = &self.root {
            connection.set_root_endpoint(root);
        }

        let token = self.connections.child_token();
        let slot = pool.add_connection(ConnectionHandle { context: connection.context().clone(), token: token.clone() })?;
        debug!(
            parent: &self.span,
            id = connection.context().id(),
            slot,
            active = pool.active_connection_count(),
            "connection admitted"
        );
        drop(pool);

        let span = connection.connection().span().clone();
        self.tracker.spawn(serve_connection(connection, token, Arc::clone(&self.pool)).instrument(span));
        Ok(())
    }
}

async fn serve_connection(mut connection: HttpConnection, token: CancellationToken, pool: SharedPool) {
    let id = connection.context().id();

    while connection.is_open() {
        tokio::select! {
            biased;
            () = token.cancelled() => {
                connection.abort();
            }
            result = connection.async_read() => {
                if let Err(e) = result {
                    warn!(id, cause = %e, "connection failed");
                    connection.close().await;
                }
            }
        }
    }

    lock(&pool).remove_where(|handle| handle.context.id() == id);
    debug!(id, "connection released");
}

/// A listening server.
///
/// Created by [`ServerBuilder::build`], driven by [`Server::run`] or
/// [`Server::run_until`].
pub struct Server {
    listener: Listener,
    pool: SharedPool,
    stop: CancellationToken,
    connections: CancellationToken,
    tracker: TaskTracker,
    span: Span,
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server").field("listener", &self.listener).field("pool", &self.pool).finish_non_exhaustive()
    }
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    pub fn local_endpoint(&self) -> Result<EndpointAddress, ServerError> {
        Ok(self.listener.local_endpoint()?)
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle { pool: Arc::clone(&self.pool), stop: self.stop.clone() }
    }

    /// Serves until [`ServerHandle::shutdown`] is called or the listener stops.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(future::pending()).await
    }

    /// Serves until `signal` completes, [`ServerHandle::shutdown`] is called
    /// or the listener stops.
    ///
    /// Connections still open afterwards are force-closed before returning.
    pub async fn run_until<F: Future<Output = ()>>(mut self, signal: F) -> Result<(), ServerError> {
        info!(parent: &self.span, local_endpoint = ?self.listener.local_endpoint().ok(), "server started");

        let stop = self.stop.clone();
        let result = tokio::select! {
            result = self.listener.run() => result,
            () = signal => {
                info!(parent: &self.span, "shutdown signal received");
                Ok(())
            }
            () = stop.cancelled() => {
                info!(parent: &self.span, "shutdown requested");
                Ok(())
            }
        };

        self.shutdown().await;
        result.map_err(ServerError::from)
    }

    async fn shutdown(&mut self) {
        self.listener.stop();

        let remaining = lock(&self.pool).drain();
        for handle in &remaining {
            handle.force_close("shutdown");
        }
        self.connections.cancel();

        self.tracker.close();
        self.tracker.wait().await;
        info!(parent: &self.span, force_closed = remaining.len(), "server stopped");
    }
}

/// Inspects and adjusts a running server from elsewhere.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    pool: SharedPool,
    stop: CancellationToken,
}

impl ServerHandle {
    pub fn active_connection_count(&self) -> usize {
        lock(&self.pool).active_connection_count()
    }

    pub fn maximum_connection_count(&self) -> usize {
        lock(&self.pool).maximum_connection_count()
    }

    /// Changes the connection limit and returns how many connections were evicted.
    ///
    /// Active connections are kept ahead of free slots; those that still do not
    /// fit are force-closed.
    pub fn set_maximum_connections(&self, maximum: usize) -> usize {
        let evicted = lock(&self.pool).set_maximum(maximum);
        for handle in &evicted {
            handle.force_close("evicted");
        }
        evicted.len()
    }

    /// Asks the server to stop accepting and close every connection.
    pub fn shutdown(&self) {
        self.stop.cancel();
    }
}
