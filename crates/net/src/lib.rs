//! Listener, connection and connection pool primitives.
//!
//! # Architecture
//!
//! - [`address`]: bind targets ([`EndpointAddress`]) including abstract local-domain names
//! - [`listener`]: the accept loop and its error-disposition protocol
//! - [`connection`]: one stream socket driven through lifecycle hooks
//! - [`pool`]: fixed-capacity connection slot table with active-first eviction
//! - [`credentials`]: peer identity of local-domain connections
//!
//! The crate has no logging setup of its own. Components emit `tracing`
//! events under a span handed to them at construction.
//!
//! # Example
//!
//! ```no_run
//! use plexer_net::{EndpointAddress, Listener, ListenerDisposition};
//!
//! # async fn serve() -> Result<(), plexer_net::ListenerError> {
//! let mut listener = Listener::new(EndpointAddress::local("plexer", true));
//! listener.set_error_handler(|_error, _context| ListenerDisposition::IgnoreConnection);
//! listener.set_connection_handler(|accepted| {
//!     println!("accepted a stream from {:?}", accepted.peer);
//!     Ok(())
//! });
//! listener.listen()?;
//! listener.run().await
//! # }
//! ```

pub mod address;
pub mod connection;
pub mod credentials;
pub mod listener;
pub mod pool;
pub mod stream;

mod error;

pub use address::{EndpointAddress, LocalAddress, PeerAddr};
pub use connection::{Connection, ConnectionContext, ConnectionHooks, Disposition, NullHooks, Operation};
pub use credentials::Credentials;
pub use error::{BoxError, ListenerError, PoolError};
pub use listener::{Accepted, LastError, Listener, ListenerDisposition};
pub use pool::ConnectionPool;
pub use stream::Stream;
