use bytes::{BufMut, BytesMut};
use http::Response;
use tokio_util::codec::Encoder;
use tracing::error;

use crate::codec::header::HeaderEncoder;
use crate::protocol::SendError;
use crate::protocol::response::is_closed_without_response;

/// Encodes a `Response<String>` as a `Content-Length` framed HTTP/1.x message.
///
/// The "close without response" sentinel status is refused; the connection
/// has to close instead of writing it.
#[derive(Debug, Default)]
pub struct ResponseEncoder {
    header_encoder: HeaderEncoder,
}

impl ResponseEncoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Encoder<Response<String>> for ResponseEncoder {
    type Error = SendError;

    fn encode(&mut self, item: Response<String>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if is_closed_without_response(&item) {
            error!(status = item.status().as_u16(), "refusing to serialize the close-without-response status");
            return Err(SendError::unsendable_status(item.status().as_u16()));
        }

        let (head, body) = item.into_parts();
        self.header_encoder.encode((head, body.len()), dst)?;
        dst.put_slice(body.as_bytes());
        Ok(())
    }
}
