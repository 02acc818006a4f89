//! HTTP request header handling.
//!
//! A [`RequestHeader`] is the decoded start line and header fields of a
//! request, before its body has been read.

use http::request::Parts;
use http::{HeaderMap, Method, Request, Uri, Version};

use crate::protocol::keep_alive;

/// The head of an HTTP request.
#[derive(Debug)]
pub struct RequestHeader {
    inner: Request<()>,
}

impl AsRef<Request<()>> for RequestHeader {
    fn as_ref(&self) -> &Request<()> {
        &self.inner
    }
}

impl AsMut<Request<()>> for RequestHeader {
    fn as_mut(&mut self) -> &mut Request<()> {
        &mut self.inner
    }
}

impl RequestHeader {
    pub fn into_inner(self) -> Request<()> {
        self.inner
    }

    /// Attaches a body, producing the full request.
    pub fn body<T>(self, body: T) -> Request<T> {
        self.inner.map(|()| body)
    }

    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    pub fn uri(&self) -> &Uri {
        self.inner.uri()
    }

    pub fn version(&self) -> Version {
        self.inner.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Whether the client asked for the connection to stay open.
    pub fn keep_alive(&self) -> bool {
        keep_alive(self.version(), self.headers())
    }

    /// Methods that never carry a body: GET, HEAD, DELETE, OPTIONS and CONNECT.
    pub fn need_body(&self) -> bool {
        !matches!(self.method(), &Method::GET | &Method::HEAD | &Method::DELETE | &Method::OPTIONS | &Method::CONNECT)
    }
}

impl From<Parts> for RequestHeader {
    #[inline]
    fn from(parts: Parts) -> Self {
        Self { inner: Request::from_parts(parts, ()) }
    }
}

impl From<Request<()>> for RequestHeader {
    #[inline]
    fn from(inner: Request<()>) -> Self {
        Self { inner }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(method: Method, version: Version, connection: Option<&str>) -> RequestHeader {
        let mut builder = Request::builder().method(method).uri("/status").version(version);
        if let Some(value) = connection {
            builder = builder.header(http::header::CONNECTION, value);
        }
        RequestHeader::from(builder.body(()).unwrap())
    }

    #[test]
    fn keep_alive_follows_version_and_connection_header() {
        assert!(header(Method::GET, Version::HTTP_11, None).keep_alive());
        assert!(!header(Method::GET, Version::HTTP_10, None).keep_alive());
        assert!(!header(Method::GET, Version::HTTP_11, Some("close")).keep_alive());
        assert!(header(Method::GET, Version::HTTP_10, Some("keep-alive")).keep_alive());
    }

    #[test]
    fn body_carrying_methods() {
        assert!(!header(Method::GET, Version::HTTP_11, None).need_body());
        assert!(!header(Method::HEAD, Version::HTTP_11, None).need_body());
        assert!(header(Method::POST, Version::HTTP_11, None).need_body());
        assert!(header(Method::PUT, Version::HTTP_11, None).need_body());
    }

    #[test]
    fn attach_body() {
        let request = header(Method::POST, Version::HTTP_11, None).body("payload".to_string());
        assert_eq!(request.uri().path(), "/status");
        assert_eq!(request.body(), "payload");
    }
}
