//! # lumina-settings
//!
//! User settings store with debounced persistence to a pluggable key-value
//! backend.
//!
//! - **Synchronous store**: [`SettingsStore::dispatch`] applies a
//!   [`Transformation`] and returns the new snapshot immediately
//! - **Debounced write-through**: bursts of changes collapse into one
//!   backend write of the latest snapshot
//! - **Hydration**: [`SettingsStore::create`] loads the persisted snapshot
//!   before handing out the store
//! - **Side channel**: the registered degree is cached in synchronous
//!   [`LocalStorage`] and reconciled into the store on session start
//!
//! Persistence is best effort. Backend failures are logged and never reach
//! the caller or alter the in-memory snapshot.
//!
//! ## Backends
//!
//! - [`SqliteBackend`]: Embedded SQLite database, durable
//! - [`MemoryBackend`]: In-memory (testing and development)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lumina_settings::{Language, MemoryBackend, SettingsConfig, SettingsStore};
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = Arc::new(MemoryBackend::new());
//!     let store = SettingsStore::create(backend, SettingsConfig::default()).await;
//!
//!     store.set_language(Language::He);
//!     assert_eq!(store.language(), Language::He);
//!
//!     // Write the last change before exiting
//!     store.shutdown().await;
//! }
//! ```
//!
//! ## Registered Degree
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lumina_settings::{
//!     MemoryLocalStorage, RegisteredDegreeCache, RegisteredDegreeSession, SettingsStore,
//! };
//!
//! let store = SettingsStore::default();
//! let cache = RegisteredDegreeCache::new(Arc::new(MemoryLocalStorage::new()));
//! let session = RegisteredDegreeSession::start(store.clone(), cache);
//!
//! session.set_registered_degree(Some("cs-bsc".into()), Some("tau".into()), None);
//! assert_eq!(store.degree_id().as_deref(), Some("cs-bsc"));
//! ```

pub mod accessors;
pub mod backend;
pub mod config;
pub mod error;
pub mod local;
pub mod memory;
pub mod persistence;
pub mod registered_degree;
pub mod settings;
pub mod sqlite;
pub mod store;
pub mod watch;

// Re-export main types
pub use backend::{Entry, StorageBackend, StorageBackendExt, MAX_KEY_LENGTH};
pub use config::{
    SettingsConfig, DEFAULT_DEBOUNCE_MS, REGISTERED_DEGREE_STORAGE_KEY, STORAGE_KEY,
};
pub use error::{Result, SettingsError};
pub use local::{FileLocalStorage, LocalStorage, MemoryLocalStorage};
pub use memory::MemoryBackend;
pub use persistence::{clear_persisted_settings, load_persisted_settings, PersistenceBridge};
pub use registered_degree::{RegisteredDegree, RegisteredDegreeCache, RegisteredDegreeSession};
pub use settings::{FieldValue, Language, SettingsPatch, Transformation, UserSettings};
pub use sqlite::SqliteBackend;
pub use store::SettingsStore;
pub use watch::{SettingsEvent, SubscriptionId, WatchStream};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::backend::{StorageBackend, StorageBackendExt};
    pub use crate::config::SettingsConfig;
    pub use crate::error::{Result, SettingsError};
    pub use crate::local::LocalStorage;
    pub use crate::registered_degree::{RegisteredDegreeCache, RegisteredDegreeSession};
    pub use crate::settings::{FieldValue, Language, SettingsPatch, Transformation, UserSettings};
    pub use crate::store::SettingsStore;
}
