//! Response construction helpers.
//!
//! Responses are plain `http::Response<String>` values. Whether the connection
//! stays open after a response is written is derived from its version and
//! `Connection` header, the same way as for requests (see [`keep_alive`]).
//!
//! Status `444` is reserved as a sentinel: an endpoint returning it asks the
//! connection to close without writing anything.

use http::header::{CONNECTION, CONTENT_TYPE, HeaderValue};
use http::{Request, Response, StatusCode, Version};
use once_cell::sync::Lazy;

use crate::protocol::keep_alive;

/// The "connection closed without response" sentinel status.
pub static CLOSED_WITHOUT_RESPONSE: Lazy<StatusCode> =
    Lazy::new(|| StatusCode::from_u16(444).expect("444 lies in the valid status code range"));

/// A response with the given status, `Connection` header and body.
pub fn response(status: StatusCode, keep_alive: bool, body: impl Into<String>) -> Response<String> {
    let mut response = Response::new(body.into());
    *response.status_mut() = status;
    *response.version_mut() = Version::HTTP_11;
    let connection = if keep_alive { HeaderValue::from_static("keep-alive") } else { HeaderValue::from_static("close") };
    response.headers_mut().insert(CONNECTION, connection);
    response
}

/// A response whose keep-alive mirrors what `request` asked for.
pub fn response_for<T>(request: &Request<T>, status: StatusCode, body: impl Into<String>) -> Response<String> {
    response(status, keep_alive(request.version(), request.headers()), body)
}

/// Like [`response_for`], with a `text/plain; charset=utf-8` content type.
pub fn text_response_for<T>(request: &Request<T>, status: StatusCode, body: impl Into<String>) -> Response<String> {
    let mut response = response_for(request, status, body);
    if let Ok(content_type) = HeaderValue::from_str(mime::TEXT_PLAIN_UTF_8.as_ref()) {
        response.headers_mut().insert(CONTENT_TYPE, content_type);
    }
    response
}

/// What a connection answers when it has no root endpoint to route to.
pub fn no_root_endpoint_response() -> Response<String> {
    let mut response = response(StatusCode::INTERNAL_SERVER_ERROR, false, String::new());
    response.headers_mut().insert("comments", HeaderValue::from_static("no-root-endpoint-installed"));
    response
}

/// Asks the connection to close without writing a response.
pub fn closed_without_response() -> Response<String> {
    response(*CLOSED_WITHOUT_RESPONSE, false, String::new())
}

pub fn is_closed_without_response<T>(response: &Response<T>) -> bool {
    response.status() == *CLOSED_WITHOUT_RESPONSE
}

/// Whether the connection stays open after `response` is written.
pub fn response_keep_alive<T>(response: &Response<T>) -> bool {
    keep_alive(response.version(), response.headers())
}
