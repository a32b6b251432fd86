//! In-memory storage backend.
//!
//! This implementation is NOT durable - data is lost on process exit.
//! Use for testing and development, or as the backend of a session that
//! should never touch disk.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use crate::backend::{validate_key, Entry, StorageBackend};
use crate::error::{Result, SettingsError};

/// In-memory implementation of [`StorageBackend`].
///
/// Uses a BTreeMap for ordered key iteration and RwLock for concurrency.
/// Clones share the same underlying map, so a test can keep one handle
/// while the settings store owns another.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    data: Arc<RwLock<BTreeMap<String, Entry>>>,
    writes: Arc<AtomicU64>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryBackend {
    /// Create a new empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of entries in the backend.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Check if the backend is empty.
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Clear all entries.
    pub fn clear(&self) {
        self.data.write().clear();
    }

    /// Total number of successful `set` calls across all keys.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every subsequent operation fail with
    /// [`SettingsError::Unavailable`] until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SettingsError::Unavailable(
                "memory backend switched off".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Entry>> {
        validate_key(key)?;
        self.check_available()?;
        Ok(self.data.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<u64> {
        validate_key(key)?;
        self.check_available()?;

        let mut data = self.data.write();
        let new_version = data.get(key).map(|e| e.version + 1).unwrap_or(1);

        data.insert(
            key.to_string(),
            Entry {
                key: key.to_string(),
                value,
                version: new_version,
                updated_at: SystemTime::now(),
            },
        );
        self.writes.fetch_add(1, Ordering::SeqCst);

        Ok(new_version)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        self.check_available()?;

        self.data.write().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StorageBackendExt;

    #[tokio::test]
    async fn test_set_and_get() {
        let backend = MemoryBackend::new();

        let version = backend.set("user-settings", b"value".to_vec()).await.unwrap();
        assert_eq!(version, 1);

        let entry = backend.get("user-settings").await.unwrap().unwrap();
        assert_eq!(entry.key, "user-settings");
        assert_eq!(entry.value, b"value");
        assert_eq!(entry.version, 1);
    }

    #[tokio::test]
    async fn test_set_increments_version() {
        let backend = MemoryBackend::new();

        let v1 = backend.set("key", b"v1".to_vec()).await.unwrap();
        let v2 = backend.set("key", b"v2".to_vec()).await.unwrap();
        let v3 = backend.set("key", b"v3".to_vec()).await.unwrap();

        assert_eq!((v1, v2, v3), (1, 2, 3));
        assert_eq!(backend.write_count(), 3);
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let backend = MemoryBackend::new();
        assert!(backend.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete() {
        let backend = MemoryBackend::new();

        backend.set("key", b"value".to_vec()).await.unwrap();
        assert!(backend.exists("key").await.unwrap());

        backend.delete("key").await.unwrap();
        assert!(!backend.exists("key").await.unwrap());

        // Deleting again is not an error
        backend.delete("key").await.unwrap();
    }

    #[tokio::test]
    async fn test_clones_share_data() {
        let backend = MemoryBackend::new();
        let other = backend.clone();

        other.set("shared", b"x".to_vec()).await.unwrap();
        assert_eq!(backend.len(), 1);

        backend.clear();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn test_unavailable() {
        let backend = MemoryBackend::new();
        backend.set("key", b"v".to_vec()).await.unwrap();

        backend.set_unavailable(true);
        assert!(matches!(
            backend.get("key").await,
            Err(SettingsError::Unavailable(_))
        ));
        assert!(matches!(
            backend.set("key", b"w".to_vec()).await,
            Err(SettingsError::Unavailable(_))
        ));
        assert_eq!(backend.write_count(), 1);

        backend.set_unavailable(false);
        let entry = backend.get("key").await.unwrap().unwrap();
        assert_eq!(entry.value, b"v");
    }

    #[tokio::test]
    async fn test_json_operations() {
        use serde::{Deserialize, Serialize};

        #[derive(Debug, Serialize, Deserialize, PartialEq)]
        struct Prefs {
            language: String,
            dev_mode: bool,
        }

        let backend = MemoryBackend::new();
        let prefs = Prefs {
            language: "he".to_string(),
            dev_mode: true,
        };

        backend.set_json("prefs", &prefs).await.unwrap();
        let loaded: Prefs = backend.get_json("prefs").await.unwrap().unwrap();
        assert_eq!(prefs, loaded);
    }

    #[tokio::test]
    async fn test_invalid_key() {
        let backend = MemoryBackend::new();

        let result = backend.set("", b"v".to_vec()).await;
        assert!(matches!(result, Err(SettingsError::InvalidKey(_))));
    }
}
