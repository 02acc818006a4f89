//! HTTP request decoder.
//!
//! # Example
//!
//! ```
//! use plexer_http::codec::RequestDecoder;
//! use tokio_util::codec::Decoder;
//! use bytes::BytesMut;
//!
//! let mut decoder = RequestDecoder::new();
//! let mut buffer = BytesMut::from("POST /echo HTTP/1.1\r\nContent-Length: 2\r\n\r\nhi");
//! let request = decoder.decode(&mut buffer).unwrap().unwrap();
//! assert_eq!(request.body(), "hi");
//! ```

use bytes::BytesMut;
use http::Request;
use tokio_util::codec::Decoder;

use crate::codec::header::HeaderDecoder;
use crate::protocol::{ParseError, RequestHeader};

/// Decodes complete requests, head and `Content-Length` body, as `Request<String>`.
///
/// The decoder works in two phases. While `pending` is `None` it parses a
/// head; afterwards it waits until the whole body is buffered.
#[derive(Debug, Default)]
pub struct RequestDecoder {
    header_decoder: HeaderDecoder,
    pending: Option<(RequestHeader, usize)>,
}

impl RequestDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for RequestDecoder {
    type Item = Request<String>;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let (header, body_length) = match self.pending.take() {
            Some(pending) => pending,
            None => match self.header_decoder.decode(src)? {
                Some(decoded) => decoded,
                None => return Ok(None),
            },
        };

        if src.len() < body_length {
            src.reserve(body_length - src.len());
            self.pending = Some((header, body_length));
            return Ok(None);
        }

        let body = src.split_to(body_length);
        let body = String::from_utf8(body.to_vec()).map_err(ParseError::invalid_body)?;
        Ok(Some(header.body(body)))
    }
}
