use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A caller violated a precondition (missing database or resource,
    /// open sessions where none may remain, foreign lock file).
    #[error("usage error: {0}")]
    Usage(String),

    /// Configuration file missing or malformed.
    #[error("configuration error: {0}")]
    Config(String),

    /// Operation on a closed database or closed session.
    #[error("invalid state: {0}")]
    State(String),

    /// The initial commit of a freshly created resource failed.
    #[error("resource bootstrap failed: {0}")]
    Bootstrap(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("encryption error: {0}")]
    Encryption(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

// Error conversions for common error types

impl From<serde_json::Error> for DbError {
    fn from(e: serde_json::Error) -> Self {
        DbError::Serialization(e.to_string())
    }
}

impl From<bincode::error::EncodeError> for DbError {
    fn from(e: bincode::error::EncodeError) -> Self {
        DbError::Serialization(e.to_string())
    }
}

impl From<bincode::error::DecodeError> for DbError {
    fn from(e: bincode::error::DecodeError) -> Self {
        DbError::Serialization(e.to_string())
    }
}
