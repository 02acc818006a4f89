//! The endpoint tree requests are routed through.
//!
//! An [`Endpoint`] turns a request into a response. Endpoints compose into a
//! tree:
//!
//! - [`FnEndpoint`] answers every request with an async function
//! - [`VerbEndpoint`] only lets one HTTP method through (`405` otherwise)
//! - [`PathEndpoint`] only lets one path, or everything below it, through (`404` otherwise)
//! - [`PathSet`] tries its path endpoints in order and uses the first match (`404` otherwise)
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use http::StatusCode;
//! use plexer_http::endpoint::{endpoint_fn, get, Endpoint, PathEndpoint, PathSet};
//! use plexer_http::protocol::response::response_for;
//!
//! let root: Arc<dyn Endpoint> = Arc::new(
//!     PathSet::new()
//!         .route(PathEndpoint::exact("/", get(endpoint_fn(|_context, request| async move {
//!             Ok::<_, std::convert::Infallible>(response_for(&request, StatusCode::OK, "hello\n"))
//!         }))))
//! );
//! ```

mod fn_endpoint;
mod path;
mod verb;

use std::sync::Arc;

use async_trait::async_trait;
use http::{Request, Response};
use plexer_net::{BoxError, ConnectionContext};

pub use fn_endpoint::{FnEndpoint, endpoint_fn};
pub use path::{PathEndpoint, PathMatch, PathSet};
pub use verb::{VerbEndpoint, connect, delete, get, head, options, patch, post, put, trace};

/// A node of the endpoint tree.
///
/// Returning `Err` or panicking makes the connection answer `500` and close.
#[async_trait]
pub trait Endpoint: Send + Sync {
    async fn handle(&self, context: &ConnectionContext, request: Request<String>) -> Result<Response<String>, BoxError>;
}

#[async_trait]
impl<E: Endpoint + ?Sized> Endpoint for Box<E> {
    async fn handle(&self, context: &ConnectionContext, request: Request<String>) -> Result<Response<String>, BoxError> {
        (**self).handle(context, request).await
    }
}

#[async_trait]
impl<E: Endpoint + ?Sized> Endpoint for Arc<E> {
    async fn handle(&self, context: &ConnectionContext, request: Request<String>) -> Result<Response<String>, BoxError> {
        (**self).handle(context, request).await
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use http::{Method, StatusCode};
    use plexer_net::{Connection, NullHooks};

    pub(crate) fn context() -> ConnectionContext {
        Connection::new(NullHooks).context().clone()
    }

    pub(crate) fn request(method: Method, uri: &str) -> Request<String> {
        Request::builder().method(method).uri(uri).body(String::new()).unwrap()
    }

    /// Answers with its name so tests can tell which branch handled a request.
    pub(crate) fn named(name: &'static str) -> impl Endpoint {
        endpoint_fn(move |_, _| std::future::ready(Ok::<_, BoxError>(Response::new(name.to_string()))))
    }

    pub(crate) async fn status_of(endpoint: &dyn Endpoint, method: Method, uri: &str) -> (StatusCode, String) {
        let response = endpoint.handle(&context(), request(method, uri)).await.unwrap();
        (response.status(), response.into_body())
    }
}
