//! HTTP/1.x on top of the plexer connection primitives.
//!
//! This crate turns an accepted [`plexer_net::Stream`] into an HTTP connection
//! that decodes requests, routes them through an endpoint tree and writes the
//! responses back, honouring keep-alive.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use http::StatusCode;
//! use plexer_http::connection::HttpConnection;
//! use plexer_http::endpoint::{endpoint_fn, get, Endpoint, PathEndpoint, PathSet};
//! use plexer_http::protocol::response::response_for;
//! use plexer_net::{BoxError, EndpointAddress, Listener};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), BoxError> {
//!     let root: Arc<dyn Endpoint> = Arc::new(PathSet::new().route(PathEndpoint::exact(
//!         "/",
//!         get(endpoint_fn(|_context, request| async move {
//!             Ok::<_, BoxError>(response_for(&request, StatusCode::OK, "Hello World!\r\n"))
//!         })),
//!     )));
//!
//!     let mut listener = Listener::new(EndpointAddress::tcp(([127, 0, 0, 1], 8080)));
//!     listener.set_connection_handler(move |accepted| {
//!         let mut connection = HttpConnection::new(accepted.stream, accepted.peer).with_root_endpoint(&root);
//!         tokio::spawn(async move {
//!             let _ = connection.serve().await;
//!         });
//!         Ok(())
//!     });
//!     listener.listen()?;
//!     listener.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - [`protocol`]: request head, keep-alive rules, response helpers and errors
//! - [`codec`]: request decoder and response encoder
//! - [`connection`]: the per-connection read, route, write cycle
//! - [`endpoint`]: the endpoint tree
//!
//! # Limitations
//!
//! - HTTP/1.0 and HTTP/1.1 with `Content-Length` bodies only, no chunked transfer coding
//! - Bodies are UTF-8 text of at most 1MiB
//! - Maximum header size: 8KB
//! - Maximum number of headers: 64

pub mod codec;
pub mod connection;
pub mod endpoint;
pub mod protocol;

mod utils;
pub(crate) use utils::ensure;
