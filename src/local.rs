//! Synchronous local key-value storage for small side-channel records.
//!
//! Unlike [`crate::backend::StorageBackend`], every operation here completes
//! before returning. Values are strings; callers serialize themselves.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::backend::validate_key;
use crate::error::{Result, SettingsError};

/// Synchronous string storage, modelled on a browser's `localStorage`.
pub trait LocalStorage: Send + Sync {
    /// Read a value. Returns `None` if the key is absent.
    fn get_item(&self, key: &str) -> Result<Option<String>>;
    /// Write a value, replacing any previous one.
    fn set_item(&self, key: &str, value: &str) -> Result<()>;
    /// Remove a key. Removing an absent key is not an error.
    fn remove_item(&self, key: &str) -> Result<()>;
}

/// In-process local storage with an optional size quota.
///
/// The quota counts key and value bytes across all entries, the way
/// browsers account `localStorage`.
#[derive(Clone, Default)]
pub struct MemoryLocalStorage {
    items: Arc<Mutex<HashMap<String, String>>>,
    quota: Option<usize>,
}

impl MemoryLocalStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage that rejects writes once `quota` bytes would be exceeded.
    pub fn with_quota(quota: usize) -> Self {
        Self {
            items: Arc::default(),
            quota: Some(quota),
        }
    }

    /// Bytes currently used by keys and values.
    pub fn used_bytes(&self) -> usize {
        self.items
            .lock()
            .iter()
            .map(|(k, v)| k.len() + v.len())
            .sum()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

impl LocalStorage for MemoryLocalStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items.lock().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        validate_key(key)?;

        let mut items = self.items.lock();
        if let Some(quota) = self.quota {
            let others: usize = items
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let needed = others + key.len() + value.len();
            if needed > quota {
                return Err(SettingsError::QuotaExceeded { needed, quota });
            }
        }
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.items.lock().remove(key);
        Ok(())
    }
}

/// Local storage keeping one file per key under a directory.
pub struct FileLocalStorage {
    base: PathBuf,
}

impl FileLocalStorage {
    /// Create a storage rooted at `base`, creating the directory if needed.
    pub fn new(base: impl Into<PathBuf>) -> Result<Self> {
        let base = base.into();
        fs::create_dir_all(&base)?;
        Ok(Self { base })
    }

    /// Directory holding the files.
    pub fn base(&self) -> &Path {
        &self.base
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        if key.contains(['/', '\\']) || key == "." || key == ".." {
            return Err(SettingsError::InvalidKey(format!(
                "key is not a valid file name: {key}"
            )));
        }
        Ok(self.base.join(format!("{key}.json")))
    }
}

impl LocalStorage for FileLocalStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)?) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        // Write then rename so a crash never leaves a half-written record
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)?) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
