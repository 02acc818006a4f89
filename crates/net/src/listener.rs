//! The accepting side of the server.
//!
//! A [`Listener`] owns one acceptor bound to an [`EndpointAddress`] and walks
//! it through *unopened → open → bound → listening*. [`Listener::run`] keeps
//! exactly one accept outstanding and hands every accepted stream to the
//! installed connection handler.
//!
//! Every failure, whether while setting the acceptor up or while accepting,
//! goes through a single error-disposition path: the failure is recorded, the
//! installed error handler decides a [`ListenerDisposition`], and the outcome
//! is logged. Without a handler the listener stops on the first failure.

use std::fmt;
use std::io;
use std::mem;
use std::ops::ControlFlow;
use std::panic::{self, AssertUnwindSafe};

use socket2::{SockAddr, SockRef, Socket, Type};
use tokio::net::{TcpListener, UnixListener};
use tracing::{Span, debug, error, info, info_span, warn};

use crate::address::{EndpointAddress, PeerAddr};
use crate::error::{BoxError, ListenerError, panic_message};
use crate::stream::Stream;

/// Pending connection queue length handed to `listen(2)`.
pub const LISTEN_BACKLOG: i32 = 1024;

/// Decides what the listener does after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum ListenerDisposition {
    /// Close the acceptor and end the accept loop.
    CancelAndStop,
    /// Carry on as if nothing happened.
    IgnoreError,
    /// Drop the connection being set up and accept the next one.
    IgnoreConnection,
}

impl fmt::Display for ListenerDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::CancelAndStop => "cancel_and_stop",
            Self::IgnoreError => "ignore_error",
            Self::IgnoreConnection => "ignore_connection",
        })
    }
}

/// A freshly accepted stream and what is known about its peer.
#[derive(Debug)]
pub struct Accepted {
    pub stream: Stream,
    /// `None` when the peer lookup failed and the error handler chose to ignore it.
    pub peer: Option<PeerAddr>,
}

/// Invoked for every accepted stream.
pub type ConnectionHandler = Box<dyn FnMut(Accepted) -> Result<(), BoxError> + Send>;

/// Invoked for every failure together with the name of the failing step.
pub type ErrorHandler = Box<dyn FnMut(&io::Error, &str) -> ListenerDisposition + Send>;

/// The most recent failure recorded by a listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastError {
    kind: io::ErrorKind,
    message: String,
    context: &'static str,
}

impl LastError {
    fn new(error: &io::Error, context: &'static str) -> Self {
        Self { kind: error.kind(), message: error.to_string(), context }
    }

    pub fn kind(&self) -> io::ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The step that failed, e.g. `"bind"` or `"accept"`.
    pub fn context(&self) -> &'static str {
        self.context
    }
}

#[derive(Debug)]
enum Acceptor {
    Tcp(TcpListener),
    Local(UnixListener),
}

impl Acceptor {
    /// Must be called from within a tokio runtime.
    fn from_socket(socket: Socket, is_local: bool) -> io::Result<Self> {
        if is_local {
            UnixListener::from_std(socket.into()).map(Self::Local)
        } else {
            TcpListener::from_std(socket.into()).map(Self::Tcp)
        }
    }

    async fn accept(&self) -> io::Result<Stream> {
        match self {
            Self::Tcp(listener) => listener.accept().await.map(|(stream, _)| Stream::Tcp(stream)),
            Self::Local(listener) => listener.accept().await.map(|(stream, _)| Stream::Local(stream)),
        }
    }

    fn sock_ref(&self) -> SockRef<'_> {
        match self {
            Self::Tcp(listener) => SockRef::from(listener),
            Self::Local(listener) => SockRef::from(listener),
        }
    }
}

#[cfg(target_os = "linux")]
fn accepts_connections(socket: &SockRef<'_>) -> bool {
    socket.is_listener().unwrap_or(false)
}

#[cfg(not(target_os = "linux"))]
fn accepts_connections(socket: &SockRef<'_>) -> bool {
    socket.r#type().is_ok()
}

/// An unbound TCP socket reports port 0, an unbound local one nothing past
/// the address family.
fn is_bound_address(address: &SockAddr) -> bool {
    match address.as_socket() {
        Some(socket) => socket.port() != 0,
        None => usize::try_from(address.len()).is_ok_and(|length| length > mem::size_of::<u16>()),
    }
}

#[derive(Debug)]
enum Handle {
    Closed,
    Socket(Socket),
    Listening(Acceptor),
}

pub struct Listener {
    address: EndpointAddress,
    handle: Handle,
    local_endpoint: Option<EndpointAddress>,
    last_error: Option<LastError>,
    accepts_armed: u64,
    connection_handler: Option<ConnectionHandler>,
    error_handler: Option<ErrorHandler>,
    span: Span,
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("address", &self.address)
            .field("handle", &self.handle)
            .field("local_endpoint", &self.local_endpoint)
            .field("last_error", &self.last_error)
            .field("accepts_armed", &self.accepts_armed)
            .finish_non_exhaustive()
    }
}

impl Listener {
    pub fn new(address: EndpointAddress) -> Self {
        let span = info_span!("listener", address = %address);
        Self {
            address,
            handle: Handle::Closed,
            local_endpoint: None,
            last_error: None,
            accepts_armed: 0,
            connection_handler: None,
            error_handler: None,
            span,
        }
    }

    /// Replaces the span every event of this listener is emitted under.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn set_connection_handler<F>(&mut self, handler: F)
    where
        F: FnMut(Accepted) -> Result<(), BoxError> + Send + 'static,
    {
        self.connection_handler = Some(Box::new(handler));
    }

    pub fn set_error_handler<F>(&mut self, handler: F)
    where
        F: FnMut(&io::Error, &str) -> ListenerDisposition + Send + 'static,
    {
        self.error_handler = Some(Box::new(handler));
    }

    pub fn address(&self) -> &EndpointAddress {
        &self.address
    }

    fn sock_ref(&self) -> Option<SockRef<'_>> {
        match &self.handle {
            Handle::Closed => None,
            Handle::Socket(socket) => Some(SockRef::from(socket)),
            Handle::Listening(acceptor) => Some(acceptor.sock_ref()),
        }
    }

    /// Asks the OS whether the acceptor is a valid socket.
    pub fn is_open(&self) -> bool {
        self.sock_ref().is_some_and(|socket| socket.r#type().is_ok())
    }

    /// Asks the OS whether the acceptor has a local address.
    pub fn is_bound(&self) -> bool {
        self.sock_ref().is_some_and(|socket| socket.local_addr().is_ok_and(|address| is_bound_address(&address)))
    }

    /// Asks the OS whether the acceptor is in the listening state.
    pub fn is_listening(&self) -> bool {
        match &self.handle {
            Handle::Listening(acceptor) => accepts_connections(&acceptor.sock_ref()),
            Handle::Closed | Handle::Socket(_) => false,
        }
    }

    /// The address actually bound; TCP port 0 resolves to the assigned port.
    pub fn local_endpoint(&self) -> Result<EndpointAddress, ListenerError> {
        self.local_endpoint.clone().ok_or(ListenerError::NotBound)
    }

    pub fn last_error(&self) -> Option<&LastError> {
        self.last_error.as_ref()
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// How many accepts the loop has armed so far.
    pub fn accepts_armed(&self) -> u64 {
        self.accepts_armed
    }

    pub fn open(&mut self) -> Result<(), ListenerError> {
        if self.is_open() {
            return Ok(());
        }

        let is_local = self.address.is_local();
        let opened = Socket::new(self.address.domain(), Type::STREAM, None).and_then(|socket| {
            if !is_local {
                socket.set_reuse_address(true)?;
            }
            socket.set_nonblocking(true)?;
            Ok(socket)
        });

        match opened {
            Ok(socket) => {
                debug!(parent: &self.span, "acceptor opened");
                self.handle = Handle::Socket(socket);
                Ok(())
            }
            Err(e) => Err(self.failed(e, "open")),
        }
    }

    pub fn bind(&mut self) -> Result<(), ListenerError> {
        self.open()?;
        if self.is_bound() {
            return Ok(());
        }

        let Handle::Socket(socket) = &self.handle else {
            return Err(ListenerError::NotBound);
        };

        let bound = self
            .address
            .to_sock_addr()
            .and_then(|address| socket.bind(&address))
            .and_then(|()| match &self.address {
                EndpointAddress::Tcp(_) => socket
                    .local_addr()?
                    .as_socket()
                    .map(EndpointAddress::Tcp)
                    .ok_or_else(|| io::Error::other("bound socket has no inet address")),
                EndpointAddress::Local(_) => Ok(self.address.clone()),
            });

        match bound {
            Ok(local_endpoint) => {
                debug!(parent: &self.span, local_endpoint = %local_endpoint, "acceptor bound");
                self.local_endpoint = Some(local_endpoint);
                Ok(())
            }
            Err(e) => Err(self.failed(e, "bind")),
        }
    }

    /// Binds if needed and starts listening. Must run inside a tokio runtime.
    pub fn listen(&mut self) -> Result<(), ListenerError> {
        self.bind()?;
        if matches!(self.handle, Handle::Listening(_)) {
            return Ok(());
        }

        let Handle::Socket(socket) = mem::replace(&mut self.handle, Handle::Closed) else {
            return Err(ListenerError::NotBound);
        };

        if let Err(e) = socket.listen(LISTEN_BACKLOG) {
            self.handle = Handle::Socket(socket);
            return Err(self.failed(e, "listen"));
        }

        match Acceptor::from_socket(socket, self.address.is_local()) {
            Ok(acceptor) => {
                self.handle = Handle::Listening(acceptor);
                info!(parent: &self.span, local_endpoint = ?self.local_endpoint, backlog = LISTEN_BACKLOG, "listening");
                Ok(())
            }
            Err(e) => {
                self.local_endpoint = None;
                Err(self.failed(e, "listen"))
            }
        }
    }

    /// Closes the acceptor. Calling it on a closed listener does nothing.
    pub fn stop(&mut self) {
        let was_open = self.is_open();
        self.handle = Handle::Closed;

        if let Some(EndpointAddress::Local(local)) = self.local_endpoint.take()
            && !local.is_abstract()
            && let Err(e) = std::fs::remove_file(local.path())
        {
            debug!(parent: &self.span, cause = %e, "could not remove socket file");
        }

        if was_open {
            info!(parent: &self.span, "listener stopped");
        }
    }

    /// Accepts connections until the listener is stopped.
    ///
    /// Returns `Ok(())` once an error disposition stops the listener, or
    /// straight away when it is not listening. A failing or panicking
    /// connection handler ends the loop with an error.
    pub async fn run(&mut self) -> Result<(), ListenerError> {
        loop {
            let Handle::Listening(acceptor) = &self.handle else {
                return Ok(());
            };

            self.accepts_armed += 1;
            let accepted = acceptor.accept().await;

            if self.on_accept(accepted)?.is_break() {
                return Ok(());
            }
        }
    }

    fn on_accept(&mut self, accepted: io::Result<Stream>) -> Result<ControlFlow<()>, ListenerError> {
        let stream = match accepted {
            Ok(stream) => stream,
            Err(e) => {
                return Ok(match self.fail(&e, "accept") {
                    ListenerDisposition::CancelAndStop => ControlFlow::Break(()),
                    ListenerDisposition::IgnoreError | ListenerDisposition::IgnoreConnection => ControlFlow::Continue(()),
                });
            }
        };

        let peer = match stream.peer_addr() {
            Ok(peer) => Some(peer),
            Err(e) => match self.fail(&e, "remote_endpoint") {
                ListenerDisposition::CancelAndStop => return Ok(ControlFlow::Break(())),
                ListenerDisposition::IgnoreConnection => return Ok(ControlFlow::Continue(())),
                ListenerDisposition::IgnoreError => None,
            },
        };

        self.deliver(Accepted { stream, peer })?;
        Ok(ControlFlow::Continue(()))
    }

    fn deliver(&mut self, accepted: Accepted) -> Result<(), ListenerError> {
        let Some(handler) = &mut self.connection_handler else {
            debug!(parent: &self.span, peer = ?accepted.peer, "no connection handler installed, closing accepted stream");
            return Ok(());
        };

        match panic::catch_unwind(AssertUnwindSafe(|| handler(accepted))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                error!(parent: &self.span, cause = %e, "new connection handler failed");
                Err(ListenerError::connection_callback(e))
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(parent: &self.span, panic = %message, "new connection handler panicked");
                Err(ListenerError::callback_panic(message))
            }
        }
    }

    /// Records `error`, asks the error handler what to do and applies the answer.
    pub fn fail(&mut self, error: &io::Error, context: &'static str) -> ListenerDisposition {
        self.last_error = Some(LastError::new(error, context));

        let disposition = match &mut self.error_handler {
            None => ListenerDisposition::CancelAndStop,
            Some(handler) => match panic::catch_unwind(AssertUnwindSafe(|| handler(error, context))) {
                Ok(disposition) => disposition,
                Err(payload) => {
                    error!(
                        parent: &self.span,
                        context,
                        cause = %error,
                        panic = %panic_message(payload.as_ref()),
                        "listener error handler panicked"
                    );
                    ListenerDisposition::CancelAndStop
                }
            },
        };

        match disposition {
            ListenerDisposition::CancelAndStop => {
                warn!(parent: &self.span, context, cause = %error, %disposition, "listener failure, stopping");
                self.stop();
            }
            ListenerDisposition::IgnoreError | ListenerDisposition::IgnoreConnection => {
                info!(parent: &self.span, context, cause = %error, %disposition, "listener failure ignored");
            }
        }

        disposition
    }

    fn failed(&mut self, error: io::Error, context: &'static str) -> ListenerError {
        let _ = self.fail(&error, context);
        ListenerError::io(context, error)
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.stop();
    }
}
