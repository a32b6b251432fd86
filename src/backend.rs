//! StorageBackend trait - the async key-value capability the settings
//! store persists through.
//!
//! The persistence bridge and hydration loader depend only on this trait.
//! Implementations live in [`crate::memory`] and [`crate::sqlite`];
//! applications may supply their own.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::SystemTime;

use crate::error::{Result, SettingsError};

/// Maximum key length in bytes.
pub const MAX_KEY_LENGTH: usize = 1024;

/// A stored entry with metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    /// The key.
    pub key: String,
    /// The value (opaque bytes, JSON for settings records).
    pub value: Vec<u8>,
    /// Number of writes this key has seen.
    pub version: u64,
    /// When the entry was last written.
    pub updated_at: SystemTime,
}

impl Entry {
    /// Deserialize the value as JSON.
    pub fn value_json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.value).map_err(Into::into)
    }
}

/// Validate that a key is well-formed.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(SettingsError::InvalidKey("key cannot be empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(SettingsError::InvalidKey(format!(
            "key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        )));
    }
    if key.chars().any(char::is_control) {
        return Err(SettingsError::InvalidKey(
            "key cannot contain control characters".to_string(),
        ));
    }
    Ok(())
}

/// Async key-value storage used for the main settings snapshot.
///
/// All operations may fail; callers in this crate treat every failure as
/// advisory and never let it reach the dispatcher.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Get an entry by key.
    ///
    /// Returns `None` if the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<Entry>>;

    /// Set a key to a value, creating or overwriting it.
    ///
    /// Returns the new version number.
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<u64>;

    /// Delete a key.
    ///
    /// Returns `Ok(())` if the key was deleted or didn't exist.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check if a key exists.
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }
}

/// JSON helpers available on every backend, including `dyn StorageBackend`.
#[async_trait]
pub trait StorageBackendExt: StorageBackend {
    /// Get an entry and deserialize as JSON.
    async fn get_json<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await? {
            Some(entry) => Ok(Some(entry.value_json()?)),
            None => Ok(None),
        }
    }

    /// Set a key to a JSON-encoded value.
    async fn set_json<T: Serialize + Send + Sync>(&self, key: &str, value: &T) -> Result<u64> {
        let bytes = serde_json::to_vec(value)?;
        self.set(key, bytes).await
    }
}

impl<B: StorageBackend + ?Sized> StorageBackendExt for B {}
