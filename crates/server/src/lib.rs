//! A connection-limited HTTP server over TCP or local-domain sockets.
//!
//! [`Server`] ties the pieces of `plexer-net` and `plexer-http` together: one
//! listener, a fixed-size connection pool and a task per admitted connection.
//! Streams accepted while the pool is full are closed straight away.
//!
//! # Example
//!
//! ```no_run
//! use http::StatusCode;
//! use plexer::{Server, ServerError};
//! use plexer_http::endpoint::{endpoint_fn, get, PathEndpoint, PathSet};
//! use plexer_http::protocol::response::response_for;
//! use plexer_net::{BoxError, EndpointAddress};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ServerError> {
//!     let root = PathSet::new().route(PathEndpoint::exact(
//!         "/",
//!         get(endpoint_fn(|_context, request| async move {
//!             Ok::<_, BoxError>(response_for(&request, StatusCode::OK, "Hello World!\r\n"))
//!         })),
//!     ));
//!
//!     let server = Server::builder()
//!         .address(EndpointAddress::local("plexer", true))
//!         .max_connections(16)
//!         .root_endpoint(root)
//!         .build()?;
//!
//!     server.run_until(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//! }
//! ```

pub mod config;
pub mod logging;
mod server;

pub use config::{ConfigError, ListenConfig, ServerConfig};
pub use logging::init_logging;
pub use server::{Server, ServerBuilder, ServerError, ServerHandle};
