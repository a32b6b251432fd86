//! Store configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::Result;

/// Key the main settings snapshot is persisted under.
pub const STORAGE_KEY: &str = "user-settings";

/// Key the registered-degree record is cached under.
pub const REGISTERED_DEGREE_STORAGE_KEY: &str = "lumina-registered-degree";

/// Default quiet period before a burst of changes is written.
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;

/// Options for [`crate::SettingsStore::create`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SettingsConfig {
    /// Backend key for the settings snapshot.
    pub storage_key: String,

    /// Local-storage key for the registered-degree record.
    pub registered_degree_key: String,

    /// Quiet period, in milliseconds, that collapses bursts of changes
    /// into one backend write.
    pub debounce_ms: u64,

    /// Write changes back to the backend. Hydration still runs when off.
    pub persist: bool,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            storage_key: STORAGE_KEY.to_string(),
            registered_degree_key: REGISTERED_DEGREE_STORAGE_KEY.to_string(),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            persist: true,
        }
    }
}

impl SettingsConfig {
    /// Parse a JSON configuration document. Missing fields keep defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// The debounce quiet period.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    pub fn with_registered_degree_key(mut self, key: impl Into<String>) -> Self {
        self.registered_degree_key = key.into();
        self
    }

    /// Set the quiet period. Sub-millisecond parts round up.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        let mut millis = debounce.as_millis();
        if debounce.subsec_nanos() % 1_000_000 != 0 {
            millis += 1;
        }
        self.debounce_ms = u64::try_from(millis).unwrap_or(u64::MAX);
        self
    }

    pub fn with_persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }
}
