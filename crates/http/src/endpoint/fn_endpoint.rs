use std::future::Future;

use async_trait::async_trait;
use http::{Request, Response};
use plexer_net::{BoxError, ConnectionContext};

use crate::endpoint::Endpoint;

/// An endpoint answering every request with an async function.
///
/// The function receives its own copy of the connection context so the
/// returned future does not borrow from the connection.
#[derive(Debug, Clone)]
pub struct FnEndpoint<F> {
    f: F,
}

#[async_trait]
impl<F, Fut, Err> Endpoint for FnEndpoint<F>
where
    F: Fn(ConnectionContext, Request<String>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response<String>, Err>> + Send,
    Err: Into<BoxError>,
{
    async fn handle(&self, context: &ConnectionContext, request: Request<String>) -> Result<Response<String>, BoxError> {
        (self.f)(context.clone(), request).await.map_err(Into::into)
    }
}

pub fn endpoint_fn<F, Fut, Err>(f: F) -> FnEndpoint<F>
where
    F: Fn(ConnectionContext, Request<String>) -> Fut,
    Fut: Future<Output = Result<Response<String>, Err>>,
    Err: Into<BoxError>,
{
    FnEndpoint { f }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::test_support::{context, request};
    use http::{Method, StatusCode};

    #[tokio::test]
    async fn sees_the_connection_context() {
        let endpoint = endpoint_fn(|context: ConnectionContext, request: Request<String>| async move {
            let body = format!("{} {}", context.id(), request.uri().path());
            Ok::<_, BoxError>(Response::new(body))
        });
        let context = context();

        let response = endpoint.handle(&context, request(Method::GET, "/whoami")).await.unwrap();

        assert_eq!(response.body(), &format!("{} /whoami", context.id()));
    }

    #[tokio::test]
    async fn errors_are_boxed() {
        let endpoint = endpoint_fn(|_, _| async { Err::<Response<String>, _>(std::io::Error::other("backend down")) });

        let error = endpoint.handle(&context(), request(Method::GET, "/")).await.unwrap_err();

        assert_eq!(error.to_string(), "backend down");
    }

    #[tokio::test]
    async fn boxed_and_shared_endpoints() {
        let ok = || endpoint_fn(|_, _| async { Ok::<_, BoxError>(Response::builder().status(StatusCode::ACCEPTED).body(String::new())?) });

        let boxed: Box<dyn Endpoint> = Box::new(ok());
        let shared: std::sync::Arc<dyn Endpoint> = std::sync::Arc::new(ok());

        assert_eq!(boxed.handle(&context(), request(Method::GET, "/")).await.unwrap().status(), StatusCode::ACCEPTED);
        assert_eq!(shared.handle(&context(), request(Method::GET, "/")).await.unwrap().status(), StatusCode::ACCEPTED);
    }
}
