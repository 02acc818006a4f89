//! HTTP protocol types shared by the codec, the connection and the endpoint tree.
//!
//! - [`RequestHeader`]: the decoded head of a request
//! - [`keep_alive`]: persistent connection negotiation for requests and responses
//! - [`response`] helpers, including the status `444` "close without response" sentinel
//! - errors: [`HttpError`] wrapping [`ParseError`] and [`SendError`]

mod request;
pub use request::RequestHeader;

mod keep_alive;
pub use keep_alive::keep_alive;

pub mod response;

mod error;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;
