//! HTTP codec: request decoding and response encoding.
//!
//! Both sides implement the `tokio_util::codec` traits so they can drive a
//! plain `BytesMut` buffer as well as a framed stream.
//!
//! - [`RequestDecoder`]: yields complete `Request<String>` values
//! - [`ResponseEncoder`]: writes `Response<String>` with `Content-Length` framing
//!
//! # Example
//!
//! ```
//! use plexer_http::codec::{RequestDecoder, ResponseEncoder};
//! use tokio_util::codec::{Decoder, Encoder};
//! use bytes::BytesMut;
//! use http::Response;
//!
//! let mut request_buffer = BytesMut::from("GET / HTTP/1.1\r\n\r\n");
//! let request = RequestDecoder::new().decode(&mut request_buffer).unwrap();
//! assert!(request.is_some());
//!
//! let mut response_buffer = BytesMut::new();
//! ResponseEncoder::new().encode(Response::new("ok".to_string()), &mut response_buffer).unwrap();
//! ```

mod header;
mod request_decoder;
mod response_encoder;

pub use header::{MAX_BODY_BYTES, MAX_HEADER_BYTES, MAX_HEADER_NUM};
pub use request_decoder::RequestDecoder;
pub use response_encoder::ResponseEncoder;
