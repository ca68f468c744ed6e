use advance_core::CoreError;
use thiserror::Error;

/// Failure to complete a request/response exchange with the server.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("server returned {code}: {message}")]
    Status { code: u16, message: String },

    #[error("decode error: {0}")]
    Decode(String),
}

impl From<CoreError> for TransportError {
    fn from(e: CoreError) -> Self {
        Self::Decode(e.to_string())
    }
}
