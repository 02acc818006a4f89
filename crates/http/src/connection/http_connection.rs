use std::fmt;
use std::io;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};

use bytes::BytesMut;
use futures::FutureExt;
use http::{Request, Response, StatusCode};
use plexer_net::{Connection, ConnectionContext, ConnectionHooks, Disposition, Operation, PeerAddr, Stream};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, error, info, trace, warn};

use crate::codec::{RequestDecoder, ResponseEncoder};
use crate::endpoint::Endpoint;
use crate::protocol::response::{is_closed_without_response, no_root_endpoint_response, response, response_keep_alive};
use crate::protocol::{HttpError, keep_alive};

/// Serves HTTP/1.x requests over one accepted stream.
///
/// Each [`HttpConnection::async_read`] call reads one complete request,
/// routes it through the root endpoint and writes the response. The
/// connection closes itself when the response does not keep it alive, when
/// the endpoint asks to close without a response, or when the peer goes away.
///
/// The root endpoint is held weakly: once its owner drops it, requests get
/// the same `500` as a connection that never had one.
pub struct HttpConnection {
    connection: Connection<HttpHooks>,
    root: Option<Weak<dyn Endpoint>>,
    keep_alive: bool,
    decoder: RequestDecoder,
    encoder: ResponseEncoder,
    write_buffer: BytesMut,
}

impl fmt::Debug for HttpConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpConnection")
            .field("connection", &self.connection)
            .field("has_root", &self.root.is_some())
            .field("keep_alive", &self.keep_alive)
            .finish_non_exhaustive()
    }
}

impl HttpConnection {
    pub fn new(stream: Stream, peer: Option<PeerAddr>) -> Self {
        Self::from_connection(Connection::from_stream(stream, peer, HttpHooks))
    }

    pub fn from_connection(connection: Connection<HttpHooks>) -> Self {
        log_connected(connection.context());
        Self {
            connection,
            root: None,
            keep_alive: true,
            decoder: RequestDecoder::new(),
            encoder: ResponseEncoder::new(),
            write_buffer: BytesMut::new(),
        }
    }

    pub fn set_root_endpoint(&mut self, root: &Arc<dyn Endpoint>) {
        self.root = Some(Arc::downgrade(root));
    }

    #[must_use]
    pub fn with_root_endpoint(mut self, root: &Arc<dyn Endpoint>) -> Self {
        self.set_root_endpoint(root);
        self
    }

    pub fn context(&self) -> &ConnectionContext {
        self.connection.context()
    }

    pub fn connection(&self) -> &Connection<HttpHooks> {
        &self.connection
    }

    pub fn is_open(&self) -> bool {
        self.connection.is_open()
    }

    /// The keep-alive flag of the most recent response.
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    pub async fn close(&mut self) {
        self.connection.close().await;
    }

    pub fn abort(&mut self) {
        self.connection.abort();
    }

    /// Serves requests until the connection closes.
    pub async fn serve(&mut self) -> Result<(), HttpError> {
        while self.is_open() {
            self.async_read().await?;
        }
        Ok(())
    }

    /// Reads, routes and answers one request.
    ///
    /// Returns once the response is written or the connection has closed. A
    /// malformed request is answered with `400`, the connection closed and the
    /// parse error returned.
    pub async fn async_read(&mut self) -> Result<(), HttpError> {
        let Some(request) = self.read_request().await? else {
            return Ok(());
        };

        let method = request.method().clone();
        let path = request.uri().path().to_string();
        let request_keep_alive = keep_alive(request.version(), request.headers());

        let response = self.route(request).await;

        let context = self.connection.context();
        if is_closed_without_response(&response) {
            info!(
                parent: self.connection.span(),
                %method,
                path = %path,
                uid = context.uid(),
                gid = context.gid(),
                pid = context.pid(),
                "closing without response"
            );
            self.connection.close().await;
            return Ok(());
        }

        info!(
            parent: self.connection.span(),
            %method,
            path = %path,
            status = response.status().as_u16(),
            uid = context.uid(),
            gid = context.gid(),
            pid = context.pid(),
            "request handled"
        );
        self.send(response, request_keep_alive).await
    }

    async fn read_request(&mut self) -> Result<Option<Request<String>>, HttpError> {
        loop {
            match self.decoder.decode(self.connection.read_buffer_mut()) {
                Ok(Some(request)) => return Ok(Some(request)),
                Ok(None) => {}
                Err(e) => {
                    warn!(parent: self.connection.span(), cause = %e, "malformed request");
                    self.send(response(StatusCode::BAD_REQUEST, false, ""), false).await?;
                    return Err(e.into());
                }
            }

            if !self.connection.is_open() {
                return Ok(None);
            }

            let buffered = self.connection.read_buffer_mut().len();
            let _ = self.connection.read().await;
            if !self.connection.is_open() {
                return Ok(None);
            }
            if self.connection.read_buffer_mut().len() == buffered {
                // end of stream that the hooks chose not to act on
                self.connection.close().await;
                return Ok(None);
            }
        }
    }

    async fn route(&self, request: Request<String>) -> Response<String> {
        let Some(root) = self.root.as_ref().and_then(Weak::upgrade) else {
            debug!(parent: self.connection.span(), "no root endpoint installed");
            return no_root_endpoint_response();
        };

        match AssertUnwindSafe(root.handle(self.connection.context(), request)).catch_unwind().await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                error!(parent: self.connection.span(), cause = %e, "endpoint failed");
                response(StatusCode::INTERNAL_SERVER_ERROR, false, "")
            }
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|message| (*message).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_default();
                error!(parent: self.connection.span(), panic = %message, "endpoint panicked");
                response(StatusCode::INTERNAL_SERVER_ERROR, false, "")
            }
        }
    }

    /// Writes `outgoing`, or a `500` when it can't be encoded, and closes
    /// unless both sides keep the connection alive.
    async fn send(&mut self, outgoing: Response<String>, request_keep_alive: bool) -> Result<(), HttpError> {
        self.keep_alive = request_keep_alive && response_keep_alive(&outgoing);

        self.write_buffer.clear();
        if let Err(e) = self.encoder.encode(outgoing, &mut self.write_buffer) {
            error!(parent: self.connection.span(), cause = %e, "endpoint response can't be encoded, answering 500");
            self.keep_alive = false;
            self.write_buffer.clear();
            self.encoder.encode(response(StatusCode::INTERNAL_SERVER_ERROR, false, ""), &mut self.write_buffer)?;
        }
        let _ = self.connection.write(&self.write_buffer).await;

        if !self.keep_alive {
            self.connection.close().await;
        }
        Ok(())
    }
}

/// Connection hooks of [`HttpConnection`].
///
/// Reads and writes carry on, end of stream and peer resets disconnect
/// gracefully and any other transport error aborts.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpHooks;

impl ConnectionHooks for HttpHooks {
    fn on_connected(&mut self, context: &ConnectionContext) -> Disposition {
        log_connected(context);
        Disposition::Normal
    }

    fn on_read_complete(&mut self, context: &ConnectionContext, bytes_read: usize) -> Disposition {
        if bytes_read == 0 {
            debug!(id = context.id(), "peer closed the connection");
            return Disposition::Disconnect;
        }
        trace!(id = context.id(), bytes_read, "read");
        Disposition::Normal
    }

    fn on_write_complete(&mut self, context: &ConnectionContext, bytes_written: usize) -> Disposition {
        trace!(id = context.id(), bytes_written, "written");
        Disposition::Normal
    }

    fn on_error(&mut self, context: &ConnectionContext, operation: Operation, error: &io::Error) -> Disposition {
        match error.kind() {
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::NotConnected => {
                debug!(
                    id = context.id(),
                    %operation,
                    cause = %error,
                    uid = context.uid(),
                    gid = context.gid(),
                    pid = context.pid(),
                    "peer went away"
                );
                Disposition::Disconnect
            }
            _ => {
                warn!(
                    id = context.id(),
                    %operation,
                    cause = %error,
                    uid = context.uid(),
                    gid = context.gid(),
                    pid = context.pid(),
                    "connection error"
                );
                Disposition::Abort
            }
        }
    }

    fn on_disconnect(&mut self, context: &ConnectionContext) {
        info!(
            id = context.id(),
            peer = ?context.peer(),
            uid = context.uid(),
            gid = context.gid(),
            pid = context.pid(),
            "disconnected"
        );
    }
}

fn log_connected(context: &ConnectionContext) {
    info!(
        id = context.id(),
        peer = ?context.peer(),
        uid = context.uid(),
        gid = context.gid(),
        pid = context.pid(),
        "connected"
    );
}
