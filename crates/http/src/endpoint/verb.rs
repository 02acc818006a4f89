use std::fmt;

use async_trait::async_trait;
use http::header::ALLOW;
use http::{HeaderValue, Method, Request, Response, StatusCode};
use plexer_net::{BoxError, ConnectionContext};

use crate::endpoint::Endpoint;
use crate::protocol::response::response_for;

/// Passes requests with one method on and answers the rest with `405 Method Not Allowed`.
pub struct VerbEndpoint {
    method: Method,
    endpoint: Box<dyn Endpoint>,
}

impl VerbEndpoint {
    pub fn new(method: Method, endpoint: impl Endpoint + 'static) -> Self {
        Self { method, endpoint: Box::new(endpoint) }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }
}

impl fmt::Debug for VerbEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerbEndpoint").field("method", &self.method).finish_non_exhaustive()
    }
}

#[async_trait]
impl Endpoint for VerbEndpoint {
    async fn handle(&self, context: &ConnectionContext, request: Request<String>) -> Result<Response<String>, BoxError> {
        if request.method() == self.method {
            return self.endpoint.handle(context, request).await;
        }

        let mut response = response_for(&request, StatusCode::METHOD_NOT_ALLOWED, "");
        response.headers_mut().insert(ALLOW, HeaderValue::from_str(self.method.as_str())?);
        Ok(response)
    }
}

macro_rules! verb_endpoint {
    ($fn_name:ident, $method:ident) => {
        #[doc = concat!("Passes ", stringify!($method), " requests to `endpoint`, anything else gets `405`.")]
        #[inline]
        pub fn $fn_name(endpoint: impl Endpoint + 'static) -> VerbEndpoint {
            VerbEndpoint::new(Method::$method, endpoint)
        }
    };
}

verb_endpoint!(get, GET);
verb_endpoint!(post, POST);
verb_endpoint!(put, PUT);
verb_endpoint!(delete, DELETE);
verb_endpoint!(head, HEAD);
verb_endpoint!(options, OPTIONS);
verb_endpoint!(connect, CONNECT);
verb_endpoint!(patch, PATCH);
verb_endpoint!(trace, TRACE);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::test_support::{named, status_of};

    #[tokio::test]
    async fn matching_method_is_delegated() {
        let endpoint = post(named("created"));
        assert_eq!(status_of(&endpoint, Method::POST, "/items").await, (StatusCode::OK, "created".to_string()));
    }

    #[tokio::test]
    async fn other_methods_get_405_with_allow() {
        let endpoint = get(named("index"));

        let response = endpoint.handle(&crate::endpoint::test_support::context(), crate::endpoint::test_support::request(Method::DELETE, "/")).await.unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers().get(ALLOW).unwrap(), "GET");
        assert_eq!(endpoint.method(), Method::GET);
    }
}
