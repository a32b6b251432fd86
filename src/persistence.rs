//! Persistence of the settings snapshot to a [`StorageBackend`].
//!
//! - [`PersistenceBridge`]: debounced, fire-and-forget write-through
//! - [`load_persisted_settings`]: startup hydration
//! - [`clear_persisted_settings`]: removal of the persisted record
//!
//! Persistence is advisory. Every backend failure is logged here and never
//! reaches the code that changed the settings.

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backend::{StorageBackend, StorageBackendExt};
use crate::settings::{UserSettings, SETTINGS_DOMAIN};

struct PendingWrite {
    generation: u64,
    token: CancellationToken,
}

#[derive(Default)]
struct PendingSlot {
    next_generation: u64,
    current: Option<PendingWrite>,
}

/// Debounced writer of the settings snapshot.
///
/// At most one write waits on its quiet period at any time. Scheduling a
/// new write cancels the waiting one; a write that has already started is
/// never cancelled. When the quiet period ends the task reads the snapshot
/// as it is *then*, so a burst of changes produces one write of the final
/// state.
pub struct PersistenceBridge {
    backend: Arc<dyn StorageBackend>,
    state: Arc<RwLock<UserSettings>>,
    key: String,
    debounce: Duration,
    runtime: Handle,
    pending: Arc<Mutex<PendingSlot>>,
}

impl PersistenceBridge {
    /// Create a bridge that writes `state` under `key`.
    ///
    /// Write tasks are spawned on `runtime`.
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        state: Arc<RwLock<UserSettings>>,
        key: impl Into<String>,
        debounce: Duration,
        runtime: Handle,
    ) -> Self {
        Self {
            backend,
            state,
            key: key.into(),
            debounce,
            runtime,
            pending: Arc::new(Mutex::new(PendingSlot::default())),
        }
    }

    /// The backend key snapshots are written under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The quiet period.
    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// React to a committed transformation.
    ///
    /// Tags outside the settings domain are ignored. Returns true if a write
    /// was scheduled. Never blocks.
    pub fn observe(&self, tag: &str) -> bool {
        if !tag.starts_with(SETTINGS_DOMAIN) {
            return false;
        }
        self.schedule();
        true
    }

    /// Returns true while a write is waiting on its quiet period.
    pub fn has_pending(&self) -> bool {
        self.pending.lock().current.is_some()
    }

    fn schedule(&self) {
        let token = CancellationToken::new();
        let generation = {
            let mut slot = self.pending.lock();
            let generation = slot.next_generation;
            slot.next_generation += 1;
            let previous = slot.current.replace(PendingWrite {
                generation,
                token: token.clone(),
            });
            if let Some(previous) = previous {
                previous.token.cancel();
            }
            generation
        };

        let backend = Arc::clone(&self.backend);
        let state = Arc::clone(&self.state);
        let pending = Arc::clone(&self.pending);
        let key = self.key.clone();
        let debounce = self.debounce;

        debug!(generation, ?debounce, "settings write scheduled");

        self.runtime.spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!(generation, "settings write superseded");
                    return;
                }
                _ = tokio::time::sleep(debounce) => {}
            }

            {
                let mut slot = pending.lock();
                if slot
                    .current
                    .as_ref()
                    .is_some_and(|p| p.generation == generation)
                {
                    slot.current = None;
                }
            }

            let snapshot = state.read().clone();
            write_snapshot(backend.as_ref(), &key, &snapshot).await;
        });
    }

    /// Cancel the waiting write, if any, and write the current snapshot now.
    ///
    /// Returns true if a write was pending. Used on teardown; a write whose
    /// quiet period already ended is not waited for. If such a write is still
    /// in flight this returns false, and on a slow backend it may land after
    /// a later write.
    pub async fn flush(&self) -> bool {
        let waiting = self.pending.lock().current.take();
        let Some(waiting) = waiting else {
            return false;
        };
        waiting.token.cancel();

        let snapshot = self.state.read().clone();
        write_snapshot(self.backend.as_ref(), &self.key, &snapshot).await;
        true
    }
}

impl std::fmt::Debug for PersistenceBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceBridge")
            .field("key", &self.key)
            .field("debounce", &self.debounce)
            .field("pending", &self.has_pending())
            .finish()
    }
}

async fn write_snapshot(backend: &dyn StorageBackend, key: &str, snapshot: &UserSettings) {
    match backend.set_json(key, snapshot).await {
        Ok(version) => debug!(key, version, "persisted user settings"),
        Err(e) => error!(key, error = %e, "Failed to persist user settings"),
    }
}

/// Read the persisted snapshot under `key`.
///
/// Returns `None` when the record is absent, unreadable, or undecodable.
/// Never fails.
pub async fn load_persisted_settings(
    backend: &dyn StorageBackend,
    key: &str,
) -> Option<UserSettings> {
    match backend.get_json::<UserSettings>(key).await {
        Ok(Some(settings)) => {
            info!(key, "loaded persisted user settings");
            Some(settings)
        }
        Ok(None) => {
            debug!(key, "no persisted user settings");
            None
        }
        Err(e) => {
            warn!(key, error = %e, "Failed to load persisted user settings");
            None
        }
    }
}

/// Remove the persisted snapshot under `key`. Failures are logged only.
pub async fn clear_persisted_settings(backend: &dyn StorageBackend, key: &str) {
    match backend.delete(key).await {
        Ok(()) => debug!(key, "cleared persisted user settings"),
        Err(e) => error!(key, error = %e, "Failed to clear persisted user settings"),
    }
}
