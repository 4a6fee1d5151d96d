use thiserror::Error;

#[derive(Error, Debug)]
pub enum KillfeedError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Remote fetch failed or timed out. Retried on the next cycle.
    #[error("Transient IO error: {0}")]
    TransientIo(String),

    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),
}

impl KillfeedError {
    /// True for failures that the next scheduled cycle is expected to recover from.
    pub fn is_transient(&self) -> bool {
        matches!(self, KillfeedError::TransientIo(_) | KillfeedError::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, KillfeedError>;
