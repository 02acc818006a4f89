use std::fmt;

use async_trait::async_trait;
use http::{Request, Response, StatusCode};
use plexer_net::{BoxError, ConnectionContext};

use crate::endpoint::Endpoint;
use crate::protocol::response::response_for;

/// How a [`PathEndpoint`] compares its path with the request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathMatch {
    /// Byte for byte equality.
    Exact,
    /// The path itself or anything below it on a `/` boundary.
    Prefix,
}

/// Passes requests for one path on and answers the rest with `404 Not Found`.
///
/// The query string never takes part in matching.
pub struct PathEndpoint {
    path: String,
    matching: PathMatch,
    endpoint: Box<dyn Endpoint>,
}

impl PathEndpoint {
    pub fn new(path: impl Into<String>, matching: PathMatch, endpoint: impl Endpoint + 'static) -> Self {
        Self { path: path.into(), matching, endpoint: Box::new(endpoint) }
    }

    pub fn exact(path: impl Into<String>, endpoint: impl Endpoint + 'static) -> Self {
        Self::new(path, PathMatch::Exact, endpoint)
    }

    /// Matches `path` and everything below it, so `/api` matches `/api/users` but not `/apis`.
    pub fn prefix(path: impl Into<String>, endpoint: impl Endpoint + 'static) -> Self {
        Self::new(path, PathMatch::Prefix, endpoint)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn matches(&self, request_path: &str) -> bool {
        match self.matching {
            PathMatch::Exact => request_path == self.path,
            PathMatch::Prefix => request_path
                .strip_prefix(self.path.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/') || self.path.ends_with('/')),
        }
    }
}

impl fmt::Debug for PathEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathEndpoint").field("path", &self.path).field("matching", &self.matching).finish_non_exhaustive()
    }
}

#[async_trait]
impl Endpoint for PathEndpoint {
    async fn handle(&self, context: &ConnectionContext, request: Request<String>) -> Result<Response<String>, BoxError> {
        if self.matches(request.uri().path()) {
            self.endpoint.handle(context, request).await
        } else {
            Ok(response_for(&request, StatusCode::NOT_FOUND, ""))
        }
    }
}

/// Ordered path endpoints; the first one matching the request handles it.
#[derive(Debug, Default)]
pub struct PathSet {
    routes: Vec<PathEndpoint>,
}

impl PathSet {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn route(mut self, endpoint: PathEndpoint) -> Self {
        self.routes.push(endpoint);
        self
    }

    pub fn push(&mut self, endpoint: PathEndpoint) {
        self.routes.push(endpoint);
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[async_trait]
impl Endpoint for PathSet {
    async fn handle(&self, context: &ConnectionContext, request: Request<String>) -> Result<Response<String>, BoxError> {
        let path = request.uri().path();
        match self.routes.iter().find(|route| route.matches(path)) {
            Some(route) => route.endpoint.handle(context, request).await,
            None => Ok(response_for(&request, StatusCode::NOT_FOUND, "")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::test_support::{named, status_of};
    use http::Method;

    #[test]
    fn exact_ignores_query_and_trailing_segments() {
        let endpoint = PathEndpoint::exact("/status", named("status"));
        assert!(endpoint.matches("/status"));
        assert!(!endpoint.matches("/status/"));
        assert!(!endpoint.matches("/statuses"));
    }

    #[test]
    fn prefix_respects_segment_boundaries() {
        let endpoint = PathEndpoint::prefix("/api", named("api"));
        assert!(endpoint.matches("/api"));
        assert!(endpoint.matches("/api/users/7"));
        assert!(!endpoint.matches("/apis"));

        let root = PathEndpoint::prefix("/", named("root"));
        assert!(root.matches("/"));
        assert!(root.matches("/anything"));
    }

    #[tokio::test]
    async fn path_endpoint_answers_404_on_mismatch() {
        let endpoint = PathEndpoint::exact("/status", named("status"));

        assert_eq!(status_of(&endpoint, Method::GET, "/status?verbose=1").await, (StatusCode::OK, "status".to_string()));
        assert_eq!(status_of(&endpoint, Method::GET, "/other").await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn first_matching_route_wins() {
        let set = PathSet::new()
            .route(PathEndpoint::exact("/api/health", named("health")))
            .route(PathEndpoint::prefix("/api", named("api")))
            .route(PathEndpoint::prefix("/", named("fallback")));

        assert_eq!(set.len(), 3);
        assert_eq!(status_of(&set, Method::GET, "/api/health").await.1, "health");
        assert_eq!(status_of(&set, Method::GET, "/api/users").await.1, "api");
        assert_eq!(status_of(&set, Method::GET, "/index.html").await.1, "fallback");
    }

    #[tokio::test]
    async fn empty_set_answers_404() {
        let set = PathSet::new();
        assert!(set.is_empty());
        assert_eq!(status_of(&set, Method::GET, "/").await.0, StatusCode::NOT_FOUND);
    }
}
