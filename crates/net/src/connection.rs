//! A single stream socket with lifecycle hooks.
//!
//! Every operation on a [`Connection`] finishes by calling one hook. The hook
//! returns a [`Disposition`] which the connection applies before handing it
//! back to the caller: keep going, shut the stream down gracefully, or drop it
//! on the floor.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::BytesMut;
use socket2::SockRef;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::field::Empty;
use tracing::{Span, debug, info_span, warn};

use crate::address::{EndpointAddress, PeerAddr};
use crate::credentials::Credentials;
use crate::stream::Stream;

const READ_CHUNK: usize = 8 * 1024;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// What a connection does once a hook has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Disposition {
    Normal,
    /// Shut the stream down gracefully and close it.
    Disconnect,
    /// Close the stream without a graceful shutdown.
    Abort,
}

/// The operation a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Connect,
    Read,
    Write,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connect => "connect",
            Self::Read => "read",
            Self::Write => "write",
        })
    }
}

/// Immutable identity of a connection, handed to hooks and endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionContext {
    id: u64,
    peer: Option<PeerAddr>,
    credentials: Option<Credentials>,
}

impl ConnectionContext {
    fn new(peer: Option<PeerAddr>, credentials: Option<Credentials>) -> Self {
        Self { id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed), peer, credentials }
    }

    /// Process-wide unique, increasing with every connection created.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> Option<&PeerAddr> {
        self.peer.as_ref()
    }

    /// Only local-domain connections carry credentials.
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn uid(&self) -> Option<u32> {
        self.credentials.as_ref().map(Credentials::uid)
    }

    pub fn gid(&self) -> Option<u32> {
        self.credentials.as_ref().map(Credentials::gid)
    }

    pub fn pid(&self) -> Option<i32> {
        self.credentials.as_ref().and_then(Credentials::pid)
    }
}

/// Lifecycle callbacks of a [`Connection`].
///
/// Every hook defaults to [`Disposition::Disconnect`].
pub trait ConnectionHooks: Send {
    fn on_connected(&mut self, context: &ConnectionContext) -> Disposition {
        let _ = context;
        Disposition::Disconnect
    }

    /// `bytes_read` is 0 when the peer closed its side.
    fn on_read_complete(&mut self, context: &ConnectionContext, bytes_read: usize) -> Disposition {
        let _ = (context, bytes_read);
        Disposition::Disconnect
    }

    fn on_write_complete(&mut self, context: &ConnectionContext, bytes_written: usize) -> Disposition {
        let _ = (context, bytes_written);
        Disposition::Disconnect
    }

    fn on_error(&mut self, context: &ConnectionContext, operation: Operation, error: &io::Error) -> Disposition {
        let _ = (context, operation, error);
        Disposition::Disconnect
    }

    /// Called exactly once for every stream the connection closes.
    fn on_disconnect(&mut self, context: &ConnectionContext) {
        let _ = context;
    }
}

/// Hooks that disconnect after every operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullHooks;

impl ConnectionHooks for NullHooks {}

pub struct Connection<H: ConnectionHooks = NullHooks> {
    stream: Option<Stream>,
    read_buffer: BytesMut,
    context: ConnectionContext,
    hooks: H,
    span: Span,
}

impl<H: ConnectionHooks + fmt::Debug> fmt::Debug for Connection<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("stream", &self.stream)
            .field("buffered", &self.read_buffer.len())
            .field("context", &self.context)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

impl<H: ConnectionHooks> Connection<H> {
    /// An unconnected connection, see [`Connection::connect`].
    pub fn new(hooks: H) -> Self {
        Self::with_parts(None, ConnectionContext::new(None, None), hooks)
    }

    /// Wraps an accepted stream, capturing the peer credentials of local-domain streams.
    pub fn from_stream(stream: Stream, peer: Option<PeerAddr>, hooks: H) -> Self {
        let credentials = capture_credentials(&stream);
        Self::with_parts(Some(stream), ConnectionContext::new(peer, credentials), hooks)
    }

    fn with_parts(stream: Option<Stream>, context: ConnectionContext, hooks: H) -> Self {
        let span = info_span!("connection", id = context.id, uid = Empty, gid = Empty, pid = Empty);
        record_credentials(&span, &context);
        Self { stream, read_buffer: BytesMut::with_capacity(READ_CHUNK), context, hooks, span }
    }

    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn context(&self) -> &ConnectionContext {
        &self.context
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut H {
        &mut self.hooks
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Bytes read from the stream and not consumed yet.
    pub fn read_buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.read_buffer
    }

    pub async fn connect(&mut self, address: &EndpointAddress) -> Disposition {
        let result = if self.is_open() {
            Err(io::Error::new(io::ErrorKind::AlreadyExists, "connection is already open"))
        } else {
            Stream::connect(address).await
        };

        let disposition = match result {
            Ok(stream) => {
                let peer = stream.peer_addr().ok();
                let credentials = capture_credentials(&stream);
                self.context = ConnectionContext { peer, credentials, ..self.context.clone() };
                self.stream = Some(stream);
                record_credentials(&self.span, &self.context);
                debug!(parent: &self.span, address = %address, "connected");
                self.hooks.on_connected(&self.context)
            }
            Err(e) => self.hooks.on_error(&self.context, Operation::Connect, &e),
        };

        self.apply(disposition).await
    }

    /// Reads whatever is available into the read buffer.
    pub async fn read(&mut self) -> Disposition {
        let result = match &mut self.stream {
            Some(stream) => {
                self.read_buffer.reserve(READ_CHUNK);
                stream.read_buf(&mut self.read_buffer).await
            }
            None => Err(not_connected()),
        };

        let disposition = match result {
            Ok(bytes_read) => self.hooks.on_read_complete(&self.context, bytes_read),
            Err(e) => self.hooks.on_error(&self.context, Operation::Read, &e),
        };

        self.apply(disposition).await
    }

    /// Writes all of `bytes` and flushes.
    pub async fn write(&mut self, bytes: &[u8]) -> Disposition {
        let result = match &mut self.stream {
            Some(stream) => match stream.write_all(bytes).await {
                Ok(()) => stream.flush().await,
                Err(e) => Err(e),
            },
            None => Err(not_connected()),
        };

        let disposition = match result {
            Ok(()) => self.hooks.on_write_complete(&self.context, bytes.len()),
            Err(e) => self.hooks.on_error(&self.context, Operation::Write, &e),
        };

        self.apply(disposition).await
    }

    /// Shuts the stream down gracefully and closes it.
    pub async fn close(&mut self) {
        let Some(mut stream) = self.stream.take() else {
            return;
        };

        if let Err(e) = stream.shutdown().await {
            debug!(parent: &self.span, cause = %e, "graceful shutdown failed");
        }
        drop(stream);
        self.disconnected();
    }

    /// Closes the stream without a graceful shutdown.
    pub fn abort(&mut self) {
        let Some(stream) = self.stream.take() else {
            return;
        };

        // a zero linger makes the kernel reset the connection on close
        if let Stream::Tcp(tcp) = &stream
            && let Err(e) = SockRef::from(tcp).set_linger(Some(Duration::ZERO))
        {
            debug!(parent: &self.span, cause = %e, "failed to set zero linger");
        }
        drop(stream);
        self.disconnected();
    }

    async fn apply(&mut self, disposition: Disposition) -> Disposition {
        match disposition {
            Disposition::Normal => {}
            Disposition::Disconnect => self.close().await,
            Disposition::Abort => self.abort(),
        }
        disposition
    }

    fn disconnected(&mut self) {
        self.read_buffer.clear();
        self.hooks.on_disconnect(&self.context);
        debug!(parent: &self.span, "disconnected");
    }
}

fn capture_credentials(stream: &Stream) -> Option<Credentials> {
    let local = stream.as_local()?;
    match Credentials::capture(local) {
        Ok(credentials) => Some(credentials),
        Err(e) => {
            warn!(cause = %e, "failed to read peer credentials");
            None
        }
    }
}

fn record_credentials(span: &Span, context: &ConnectionContext) {
    if let Some(credentials) = context.credentials() {
        span.record("uid", credentials.uid());
        span.record("gid", credentials.gid());
        span.record("pid", credentials.pid());
    }
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "connection is not open")
}
