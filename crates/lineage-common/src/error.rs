//! Error types shared across the lineage workspace

use thiserror::Error;

/// Result type alias for lineage operations
pub type Result<T> = std::result::Result<T, LineageError>;

/// Main error type for lineage operations
#[derive(Error, Debug)]
pub enum LineageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Unknown parser kind: {0}")]
    UnknownParserKind(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl LineageError {
    /// Create an invalid URL error
    pub fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
