//! Registered-degree side channel.
//!
//! The degree a user registered for is cached in synchronous
//! [`LocalStorage`], outside the debounced backend path, so it can be read
//! without waiting on hydration. On session start the cached record is
//! merged into the settings store and wins over the hydrated values for
//! `degree_id`, `institution_id` and `degree_title`.
//!
//! Nothing here returns an error: storage failures are logged and the
//! cache behaves as if it were empty.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::{SettingsConfig, REGISTERED_DEGREE_STORAGE_KEY};
use crate::error::SettingsError;
use crate::local::LocalStorage;
use crate::settings::{SettingsPatch, UserSettings};
use crate::store::SettingsStore;

/// Cached registered-degree record.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredDegree {
    #[serde(default)]
    pub degree_id: Option<String>,
    #[serde(default)]
    pub institution_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degree_title: Option<String>,
    /// Set on every save; absent on the empty record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl RegisteredDegree {
    pub fn new(
        degree_id: Option<String>,
        institution_id: Option<String>,
        degree_title: Option<String>,
    ) -> Self {
        Self {
            degree_id,
            institution_id,
            degree_title,
            updated_at: None,
        }
    }

    /// The record stored when nothing is registered.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Patch carrying this record's fields into the settings snapshot.
    pub fn to_patch(&self) -> SettingsPatch {
        SettingsPatch::new()
            .degree_id(self.degree_id.clone())
            .institution_id(self.institution_id.clone())
            .degree_title(self.degree_title.clone())
    }
}

/// Reads and writes the [`RegisteredDegree`] record in local storage.
#[derive(Clone)]
pub struct RegisteredDegreeCache {
    storage: Arc<dyn LocalStorage>,
    key: String,
}

impl RegisteredDegreeCache {
    /// Cache under the default `lumina-registered-degree` key.
    pub fn new(storage: Arc<dyn LocalStorage>) -> Self {
        Self::with_key(storage, REGISTERED_DEGREE_STORAGE_KEY)
    }

    /// Cache under `config.registered_degree_key`.
    pub fn from_config(storage: Arc<dyn LocalStorage>, config: &SettingsConfig) -> Self {
        Self::with_key(storage, config.registered_degree_key.clone())
    }

    pub fn with_key(storage: Arc<dyn LocalStorage>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Stamp `record` with the current time and write it.
    ///
    /// Returns the stamped record, whether or not the write succeeded.
    pub fn save(&self, record: &RegisteredDegree) -> RegisteredDegree {
        let stamped = RegisteredDegree {
            updated_at: Some(Utc::now()),
            ..record.clone()
        };

        let written = serde_json::to_string(&stamped)
            .map_err(SettingsError::from)
            .and_then(|json| self.storage.set_item(&self.key, &json));
        match written {
            Ok(()) => debug!(key = %self.key, "saved registered degree"),
            Err(e) => warn!(key = %self.key, error = %e, "Failed to save registered degree"),
        }
        stamped
    }

    /// Read the record, or the empty record if absent or unreadable.
    pub fn load(&self) -> RegisteredDegree {
        let raw = match self.storage.get_item(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return RegisteredDegree::empty(),
            Err(e) => {
                warn!(key = %self.key, error = %e, "Failed to retrieve registered degree");
                return RegisteredDegree::empty();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(e) => {
                warn!(key = %self.key, error = %e, "Failed to retrieve registered degree");
                RegisteredDegree::empty()
            }
        }
    }

    /// Remove the record.
    pub fn clear(&self) {
        if let Err(e) = self.storage.remove_item(&self.key) {
            warn!(key = %self.key, error = %e, "Failed to clear registered degree");
        }
    }
}

/// Per-session view of the registered degree, kept in sync with the store.
pub struct RegisteredDegreeSession {
    store: SettingsStore,
    cache: RegisteredDegreeCache,
    current: RwLock<RegisteredDegree>,
}

impl RegisteredDegreeSession {
    /// Read the cached record and reconcile it into `store`.
    ///
    /// If the record names a degree, its degree, institution and title
    /// replace whatever the store currently holds for those fields.
    pub fn start(store: SettingsStore, cache: RegisteredDegreeCache) -> Self {
        let record = cache.load();
        if record.degree_id.is_some() {
            debug!(degree_id = ?record.degree_id, "reconciling registered degree into settings");
            store.dispatch(record.to_patch());
        }

        Self {
            store,
            cache,
            current: RwLock::new(record),
        }
    }

    /// Start a session over `storage`, keyed by the store's configuration.
    pub fn open(store: SettingsStore, storage: Arc<dyn LocalStorage>) -> Self {
        let cache = RegisteredDegreeCache::from_config(storage, store.config());
        Self::start(store, cache)
    }

    /// The registered degree as this session last saw it.
    pub fn registered_degree(&self) -> RegisteredDegree {
        self.current.read().clone()
    }

    /// Register a degree: cache it and push it into the store.
    pub fn set_registered_degree(
        &self,
        degree_id: Option<String>,
        institution_id: Option<String>,
        degree_title: Option<String>,
    ) -> UserSettings {
        let record = RegisteredDegree::new(degree_id, institution_id, degree_title);
        let stamped = self.cache.save(&record);
        *self.current.write() = stamped;
        self.store.dispatch(record.to_patch())
    }

    /// Forget the registered degree in the cache and the store.
    pub fn clear_registered_degree(&self) -> UserSettings {
        *self.current.write() = RegisteredDegree::empty();
        self.cache.clear();
        self.store.dispatch(RegisteredDegree::empty().to_patch())
    }

    /// Returns true if `degree_id` is the registered degree.
    pub fn is_degree_registered(&self, degree_id: &str) -> bool {
        self.current.read().degree_id.as_deref() == Some(degree_id)
    }

    pub fn store(&self) -> &SettingsStore {
        &self.store
    }

    pub fn cache(&self) -> &RegisteredDegreeCache {
        &self.cache
    }
}
