//! Error types for settings storage operations.
//!
//! None of these errors escape the persistence layer on the dispatch path:
//! the bridge, the hydration loader, and the registered-degree cache log
//! and swallow them. They are returned directly only by the backend traits.

use thiserror::Error;

/// Errors that can occur while reading or writing persisted settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Invalid key format.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Cannot connect to or communicate with the storage backend.
    #[error("connection error: {0}")]
    ConnectionError(String),

    /// Local storage quota would be exceeded by the write.
    #[error("quota exceeded: {needed} bytes needed, {quota} bytes allowed")]
    QuotaExceeded { needed: usize, quota: usize },

    /// Storage medium is not available at all.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Serialization or deserialization error.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Database error from SQLx.
    #[error("database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    /// I/O error.
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type alias for settings storage operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

impl From<serde_json::Error> for SettingsError {
    fn from(err: serde_json::Error) -> Self {
        SettingsError::SerializationError(err.to_string())
    }
}
