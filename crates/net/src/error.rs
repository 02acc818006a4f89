use std::error::Error;
use std::io;

use thiserror::Error;

/// Error type accepted from user supplied callbacks.
pub type BoxError = Box<dyn Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("listener is not bound to a local endpoint")]
    NotBound,

    #[error("{context} failed: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("new connection callback failed: {source}")]
    ConnectionCallback { source: BoxError },

    #[error("new connection callback panicked: {message}")]
    CallbackPanic { message: String },
}

impl ListenerError {
    pub fn io(context: &'static str, source: io::Error) -> Self {
        Self::Io { context, source }
    }

    pub fn connection_callback<E: Into<BoxError>>(e: E) -> Self {
        Self::ConnectionCallback { source: e.into() }
    }

    pub fn callback_panic<S: ToString>(message: S) -> Self {
        Self::CallbackPanic { message: message.to_string() }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("connection pool is full, maximum {maximum} connections")]
    CapacityExceeded { maximum: usize },
}

impl PoolError {
    pub fn capacity_exceeded(maximum: usize) -> Self {
        Self::CapacityExceeded { maximum }
    }
}

/// Renders a caught panic payload for logging.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
