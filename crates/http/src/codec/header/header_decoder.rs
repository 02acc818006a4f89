//! Decoding of request heads.
//!
//! [`HeaderDecoder`] parses the start line and header fields with `httparse`
//! and works out how many body bytes follow. Only `Content-Length` framing is
//! understood; a request announcing a `Transfer-Encoding` is rejected.
//!
//! # Limits
//!
//! - Maximum number of headers: 64
//! - Maximum header size: 8KB
//! - Maximum body size: 1MiB
//! - HTTP/1.0 and HTTP/1.1 only

use bytes::{Buf, BytesMut};
use http::{HeaderName, HeaderValue, Method, Request, Uri, Version};
use httparse::{Error, Status};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::ensure;
use crate::protocol::{ParseError, RequestHeader};

/// Maximum number of headers allowed in a request
pub const MAX_HEADER_NUM: usize = 64;

/// Maximum size in bytes allowed for the entire header section
pub const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Maximum size in bytes of a request body
pub const MAX_BODY_BYTES: u64 = 1024 * 1024;

/// Shortest possible request head, `GET / HTTP/1.1\r\n\r\n`.
const MIN_HEADER_BYTES: usize = 18;

/// Decodes a [`RequestHeader`] together with the length of the body that follows it.
///
/// On success the head is consumed from the buffer, leaving the body bytes in place.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderDecoder;

impl Decoder for HeaderDecoder {
    type Item = (RequestHeader, usize);
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < MIN_HEADER_BYTES {
            return Ok(None);
        }

        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
        let mut req = httparse::Request::new(&mut headers);

        let parsed = req.parse(src).map_err(|e| match e {
            Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
            e => ParseError::invalid_header(e.to_string()),
        })?;

        let body_offset = match parsed {
            Status::Complete(body_offset) => body_offset,
            Status::Partial => {
                ensure!(src.len() <= MAX_HEADER_BYTES, ParseError::too_large_header(src.len(), MAX_HEADER_BYTES));
                return Ok(None);
            }
        };

        trace!(header_size = body_offset, "parsed request head");
        ensure!(body_offset <= MAX_HEADER_BYTES, ParseError::too_large_header(body_offset, MAX_HEADER_BYTES));

        let version = match req.version {
            Some(0) => Version::HTTP_10,
            Some(1) => Version::HTTP_11,
            // HTTP/2 and HTTP/3 are not supported
            other => return Err(ParseError::InvalidVersion(other)),
        };
        let method = req.method.ok_or_else(|| ParseError::invalid_method("missing"))?;
        let method = Method::from_bytes(method.as_bytes()).map_err(ParseError::invalid_method)?;
        let path = req.path.ok_or_else(|| ParseError::invalid_uri("missing"))?;
        let uri = Uri::try_from(path).map_err(|e| ParseError::invalid_uri(format!("{path:?}: {e}")))?;

        let mut request = Request::new(());
        *request.method_mut() = method;
        *request.uri_mut() = uri;
        *request.version_mut() = version;

        let header_map = request.headers_mut();
        header_map.reserve(req.headers.len());
        for header in req.headers.iter() {
            let name = HeaderName::from_bytes(header.name.as_bytes()).map_err(ParseError::invalid_header)?;
            let value = HeaderValue::from_bytes(header.value).map_err(ParseError::invalid_header)?;
            header_map.append(name, value);
        }

        let header = RequestHeader::from(request);
        let body_length = body_length(&header)?;

        src.advance(body_offset);
        Ok(Some((header, body_length)))
    }
}

/// Reads the body length announced by `Content-Length`, zero when absent.
fn body_length(header: &RequestHeader) -> Result<usize, ParseError> {
    let headers = header.headers();

    // refer: https://www.rfc-editor.org/rfc/rfc9112.html#name-transfer-encoding
    if let Some(te_value) = headers.get(http::header::TRANSFER_ENCODING) {
        return Err(ParseError::unsupported_transfer_encoding(String::from_utf8_lossy(te_value.as_bytes())));
    }

    let Some(cl_value) = headers.get(http::header::CONTENT_LENGTH) else {
        return Ok(0);
    };

    let cl_str = cl_value.to_str().map_err(|e| ParseError::invalid_content_length(format!("value can't to_str: {e}")))?;
    let length = cl_str
        .trim()
        .parse::<u64>()
        .map_err(|e| ParseError::invalid_content_length(format!("value {cl_str} is not u64: {e}")))?;

    ensure!(length <= MAX_BODY_BYTES, ParseError::too_large_body(length, MAX_BODY_BYTES));
    usize::try_from(length).map_err(|e| ParseError::invalid_content_length(format!("value {length} is not usize: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn leaves_body_in_buffer() {
        let str = indoc! {r##"
        POST /index.html HTTP/1.1
        Host: 127.0.0.1:8080
        Content-Length: 3

        123"##};

        let mut bytes = BytesMut::from(str);

        let (header, body_length) = HeaderDecoder.decode(&mut bytes).unwrap().unwrap();

        assert_eq!(header.method(), &Method::POST);
        assert_eq!(body_length, 3);
        assert_eq!(&bytes[..], &b"123"[..]);
    }

    #[test]
    fn from_curl() {
        let str = indoc! {r##"
        GET /index.html?a=1 HTTP/1.1
        Host: 127.0.0.1:8080
        User-Agent: curl/7.79.1
        Accept: */*

        "##};

        let mut buf = BytesMut::from(str);

        let (header, body_length) = HeaderDecoder.decode(&mut buf).unwrap().unwrap();

        assert_eq!(body_length, 0);
        assert!(buf.is_empty());
        assert_eq!(header.method(), &Method::GET);
        assert_eq!(header.version(), Version::HTTP_11);
        assert_eq!(header.uri().path(), "/index.html");
        assert_eq!(header.uri().query(), Some("a=1"));
        assert_eq!(header.headers().len(), 3);
        assert_eq!(header.headers().get(http::header::USER_AGENT).unwrap(), "curl/7.79.1");
    }

    #[test]
    fn partial_head_needs_more_bytes() {
        let mut buf = BytesMut::from("GET /index.html HTTP/1.1\r\nHost: local");
        assert!(HeaderDecoder.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 37);
    }

    #[test]
    fn oversized_head_is_rejected() {
        let mut buf = BytesMut::from("GET / HTTP/1.1\r\n");
        buf.extend_from_slice(format!("X-Filler: {}\r\n", "a".repeat(MAX_HEADER_BYTES)).as_bytes());

        assert!(matches!(HeaderDecoder.decode(&mut buf), Err(ParseError::TooLargeHeader { .. })));
    }

    #[test]
    fn chunked_body_is_unsupported() {
        let mut buf = BytesMut::from("POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n");
        assert!(matches!(HeaderDecoder.decode(&mut buf), Err(ParseError::UnsupportedTransferEncoding { .. })));
    }

    #[test]
    fn invalid_content_length() {
        let mut buf = BytesMut::from("POST / HTTP/1.1\r\nContent-Length: abc\r\n\r\n");
        let error = HeaderDecoder.decode(&mut buf).unwrap_err();
        assert!(matches!(error, ParseError::InvalidContentLength { .. }));
        assert_eq!(error.to_string(), "invalid content-length header: value abc is not u64: invalid digit found in string");

        let mut buf = BytesMut::from(format!("POST / HTTP/1.1\r\nContent-Length: {}\r\n\r\n", MAX_BODY_BYTES + 1).as_str());
        assert!(matches!(HeaderDecoder.decode(&mut buf), Err(ParseError::TooLargeBody { .. })));
    }

    #[test]
    fn http_10() {
        let mut buf = BytesMut::from("GET / HTTP/1.0\r\n\r\n");
        let (header, _) = HeaderDecoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(header.version(), Version::HTTP_10);
        assert!(!header.keep_alive());
    }
}
