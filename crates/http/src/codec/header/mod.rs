//! Request head decoding and response head encoding.
//!
//! - [`HeaderDecoder`]: parses a request head and the announced body length
//! - [`HeaderEncoder`]: writes a response status line and header fields

mod header_decoder;
mod header_encoder;

pub use header_decoder::{HeaderDecoder, MAX_BODY_BYTES, MAX_HEADER_BYTES, MAX_HEADER_NUM};
pub use header_encoder::HeaderEncoder;
