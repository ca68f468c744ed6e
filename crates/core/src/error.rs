use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("invalid config: {0}")]
    Config(String),

    #[error("invalid data: {0}")]
    InvalidData(String),
}
