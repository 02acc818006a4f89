//! HTTP connection handling.
//!
//! [`HttpConnection`] runs the read, route, write cycle over one accepted
//! stream. Transport events go through [`HttpHooks`], which log every connect
//! and disconnect together with the peer credentials of local-domain clients.

mod http_connection;

pub use http_connection::{HttpConnection, HttpHooks};
