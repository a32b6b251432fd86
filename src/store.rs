//! SettingsStore - the in-memory owner of the settings snapshot.
//!
//! Dispatch is synchronous: the transformation is applied under a write
//! lock, subscribers are notified, and a backend write is scheduled on the
//! persistence bridge without waiting for it.
//!
//! Committed changes are queued in commit order and delivered by a single
//! dispatch at a time. A dispatch made from inside a subscriber commits
//! immediately, and its notification is delivered after the one currently
//! running, so every observer sees snapshots in the order they were
//! committed and ends on the latest one.

use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::backend::StorageBackend;
use crate::config::SettingsConfig;
use crate::persistence::{load_persisted_settings, PersistenceBridge};
use crate::settings::{Transformation, UserSettings};
use crate::watch::{SettingsEvent, Subscribers, SubscriptionId, WatchSender, WatchStream};

#[derive(Default)]
struct Outbox {
    delivering: bool,
    queue: VecDeque<SettingsEvent>,
}

/// Clears the delivering flag when a subscriber panics mid-delivery.
struct Delivering<'a>(&'a Mutex<Outbox>);

impl Drop for Delivering<'_> {
    fn drop(&mut self) {
        self.0.lock().delivering = false;
    }
}

struct Inner {
    state: Arc<RwLock<UserSettings>>,
    outbox: Mutex<Outbox>,
    subscribers: Subscribers,
    watcher: WatchSender,
    bridge: Option<PersistenceBridge>,
    config: SettingsConfig,
}

/// Shared handle to a settings store. Clones refer to the same store.
#[derive(Clone)]
pub struct SettingsStore {
    inner: Arc<Inner>,
}

impl SettingsStore {
    /// Create a store with the given initial snapshot and no persistence.
    pub fn new(initial: UserSettings) -> Self {
        Self::assemble(
            Arc::new(RwLock::new(initial)),
            None,
            SettingsConfig::default().with_persist(false),
        )
    }

    /// Create a store backed by `backend`.
    ///
    /// Hydration completes before this returns: if the backend holds a
    /// snapshot under the configured key, the store starts from it,
    /// otherwise from [`UserSettings::default`]. A failed read is treated
    /// as "nothing persisted".
    ///
    /// # Panics
    ///
    /// * If called outside a tokio runtime
    pub async fn create(backend: Arc<dyn StorageBackend>, config: SettingsConfig) -> Self {
        let hydrated = load_persisted_settings(backend.as_ref(), &config.storage_key).await;
        let from_backend = hydrated.is_some();
        let state = Arc::new(RwLock::new(hydrated.unwrap_or_default()));

        let bridge = config.persist.then(|| {
            PersistenceBridge::new(
                backend,
                Arc::clone(&state),
                config.storage_key.clone(),
                config.debounce(),
                Handle::current(),
            )
        });

        info!(
            key = %config.storage_key,
            from_backend,
            persist = config.persist,
            "settings store ready"
        );
        Self::assemble(state, bridge, config)
    }

    fn assemble(
        state: Arc<RwLock<UserSettings>>,
        bridge: Option<PersistenceBridge>,
        config: SettingsConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state,
                outbox: Mutex::new(Outbox::default()),
                subscribers: Subscribers::new(),
                watcher: WatchSender::default(),
                bridge,
                config,
            }),
        }
    }

    /// Apply a transformation and return the new snapshot.
    ///
    /// Subscribers run before this returns, except when another dispatch is
    /// already delivering notifications (for example when called from inside
    /// a subscriber). The change is then queued and delivered by that
    /// dispatch once the current notification finishes. The backend write,
    /// if any, is only scheduled.
    pub fn dispatch(&self, transformation: impl Into<Transformation>) -> UserSettings {
        let transformation = transformation.into();
        let tag = transformation.tag();

        let next = {
            let mut state = self.inner.state.write();
            let next = transformation.apply(&state);
            *state = next.clone();
            // Queued under the state lock so queue order is commit order
            self.inner.outbox.lock().queue.push_back(SettingsEvent {
                tag,
                snapshot: next.clone(),
            });
            next
        };
        debug!(tag, "settings transformation applied");

        self.deliver();
        next
    }

    /// Drain queued notifications unless another dispatch already is.
    fn deliver(&self) {
        {
            let mut outbox = self.inner.outbox.lock();
            if outbox.delivering {
                return;
            }
            outbox.delivering = true;
        }
        let delivering = Delivering(&self.inner.outbox);

        loop {
            let event = {
                let mut outbox = self.inner.outbox.lock();
                match outbox.queue.pop_front() {
                    Some(event) => event,
                    None => {
                        // Cleared under the same lock that saw the queue empty
                        outbox.delivering = false;
                        break;
                    }
                }
            };

            self.inner.subscribers.notify(&event.snapshot);
            let tag = event.tag;
            self.inner.watcher.send(event);
            if let Some(bridge) = &self.inner.bridge {
                bridge.observe(tag);
            }
        }
        std::mem::forget(delivering);
    }

    /// The current snapshot, by value.
    pub fn snapshot(&self) -> UserSettings {
        self.inner.state.read().clone()
    }

    /// Register a callback run after every committed transformation.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&UserSettings) + Send + Sync + 'static,
    {
        self.inner.subscribers.subscribe(callback)
    }

    /// Remove a callback. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.subscribers.unsubscribe(id)
    }

    /// Stream of change events from now on.
    pub fn watch(&self) -> WatchStream {
        self.inner.watcher.subscribe()
    }

    /// The configuration the store was created with.
    pub fn config(&self) -> &SettingsConfig {
        &self.inner.config
    }

    /// The persistence bridge, if persistence is enabled.
    pub fn bridge(&self) -> Option<&PersistenceBridge> {
        self.inner.bridge.as_ref()
    }

    /// Write any pending change immediately.
    ///
    /// Best effort: call before teardown to avoid losing the last quiet
    /// period. Returns true if a pending write was flushed.
    pub async fn shutdown(&self) -> bool {
        match &self.inner.bridge {
            Some(bridge) => bridge.flush().await,
            None => false,
        }
    }
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new(UserSettings::default())
    }
}

impl std::fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsStore")
            .field("snapshot", &self.snapshot())
            .field("bridge", &self.inner.bridge)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StorageBackendExt;
    use crate::memory::MemoryBackend;
    use crate::settings::{FieldValue, Language, SettingsPatch};
    use std::time::Duration;
    use tokio_stream::StreamExt;

    const QUIET: Duration = Duration::from_millis(300);

    async fn persisted(backend: &MemoryBackend) -> Option<UserSettings> {
        backend.get_json("user-settings").await.unwrap()
    }

    #[test]
    fn test_dispatch_matches_left_fold() {
        let store = SettingsStore::default();
        let transformations: Vec<Transformation> = vec![
            FieldValue::Language(Language::He).into(),
            SettingsPatch::new()
                .degree_id(Some("d1".to_string()))
                .dev_mode(true)
                .into(),
            FieldValue::ShuffleQuestions(true).into(),
            Transformation::Reset,
            FieldValue::FontFamily(Some("Rubik".to_string())).into(),
            SettingsPatch::new().institution_id(Some("tau".to_string())).into(),
        ];

        let expected = transformations
            .iter()
            .fold(UserSettings::default(), |acc, t| t.apply(&acc));
        let mut last = UserSettings::default();
        for t in transformations {
            last = store.dispatch(t);
        }

        assert_eq!(last, expected);
        assert_eq!(store.snapshot(), expected);
    }

    #[test]
    fn test_subscribers_run_synchronously() {
        let store = SettingsStore::default();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let id = store.subscribe(move |s| sink.lock().push(s.dev_mode));

        store.dispatch(FieldValue::DevMode(true));
        assert_eq!(*seen.lock(), vec![true]);

        assert!(store.unsubscribe(id));
        store.dispatch(FieldValue::DevMode(false));
        assert_eq!(*seen.lock(), vec![true]);
    }

    #[test]
    fn test_subscriber_may_dispatch() {
        let store = SettingsStore::default();
        let handle = store.clone();
        store.subscribe(move |s| {
            if s.language == Language::He && !s.shuffle_questions {
                handle.dispatch(FieldValue::ShuffleQuestions(true));
            }
        });

        store.dispatch(FieldValue::Language(Language::He));
        let snapshot = store.snapshot();
        assert_eq!(snapshot.language, Language::He);
        assert!(snapshot.shuffle_questions);
    }

    #[tokio::test]
    async fn test_nested_dispatch_delivered_in_commit_order() {
        let store = SettingsStore::default();
        let mut events = store.watch();

        let handle = store.clone();
        store.subscribe(move |s| {
            if s.language == Language::He && !s.shuffle_questions {
                handle.dispatch(FieldValue::ShuffleQuestions(true));
            }
        });
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        store.subscribe(move |s| sink.lock().push(s.clone()));

        let returned = store.dispatch(FieldValue::Language(Language::He));
        assert!(!returned.shuffle_questions);

        let current = store.snapshot();
        assert!(current.shuffle_questions);

        let seen = seen.lock().clone();
        assert_eq!(seen.len(), 2);
        assert!(!seen[0].shuffle_questions);
        assert_eq!(seen.last(), Some(&current));

        let first = events.next().await.unwrap();
        let second = events.next().await.unwrap();
        assert_eq!(first.tag, "userSettings/setLanguage");
        assert_eq!(second.tag, "userSettings/setShuffleQuestions");
        assert_eq!(second.snapshot, current);
    }

    #[test]
    fn test_delivery_recovers_after_subscriber_panic() {
        let store = SettingsStore::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        store.subscribe(move |s| {
            if s.dev_mode {
                panic!("subscriber failure");
            }
            sink.lock().push(s.language);
        });

        let panicking = store.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            panicking.dispatch(FieldValue::DevMode(true));
        }));
        assert!(result.is_err());

        store.dispatch(FieldValue::DevMode(false));
        store.dispatch(FieldValue::Language(Language::He));
        assert_eq!(*seen.lock(), vec![Language::En, Language::He]);
    }

    #[test]
    fn test_reset_twice_equals_default() {
        let store = SettingsStore::new(UserSettings {
            language: Language::He,
            dev_mode: true,
            ..Default::default()
        });
        let once = store.dispatch(Transformation::Reset);
        let twice = store.dispatch(Transformation::Reset);
        assert_eq!(once, UserSettings::default());
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn test_watch_receives_tagged_events() {
        let store = SettingsStore::default();
        let mut events = store.watch();

        store.dispatch(FieldValue::Language(Language::He));
        let event = events.next().await.unwrap();
        assert_eq!(event.tag, "userSettings/setLanguage");
        assert_eq!(event.snapshot.language, Language::He);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_with_empty_backend_uses_default() {
        let backend = MemoryBackend::new();
        let store = SettingsStore::create(Arc::new(backend.clone()), SettingsConfig::default()).await;

        assert_eq!(store.snapshot(), UserSettings::default());
        // Hydration alone does not write back
        tokio::time::sleep(QUIET * 2).await;
        assert_eq!(backend.write_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_hydrates_from_backend() {
        let backend = MemoryBackend::new();
        let saved = UserSettings {
            language: Language::He,
            degree_id: Some("cs-bsc".to_string()),
            font_family: Some("Rubik".to_string()),
            shuffle_questions: true,
            ..Default::default()
        };
        backend.set_json("user-settings", &saved).await.unwrap();

        let store = SettingsStore::create(Arc::new(backend), SettingsConfig::default()).await;
        assert_eq!(store.snapshot(), saved);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_with_failing_backend_uses_default() {
        let backend = MemoryBackend::new();
        backend
            .set_json(
                "user-settings",
                &UserSettings {
                    dev_mode: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        backend.set_unavailable(true);

        let store = SettingsStore::create(Arc::new(backend), SettingsConfig::default()).await;
        assert_eq!(store.snapshot(), UserSettings::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_language_then_persist() {
        let backend = MemoryBackend::new();
        let store = SettingsStore::create(Arc::new(backend.clone()), SettingsConfig::default()).await;

        let next = store.dispatch(FieldValue::Language(Language::He));
        assert_eq!(next.language, Language::He);
        assert_eq!(store.snapshot().language, Language::He);
        assert!(persisted(&backend).await.is_none());

        tokio::time::sleep(QUIET + Duration::from_millis(50)).await;
        let saved = persisted(&backend).await.unwrap();
        assert_eq!(saved, store.snapshot());

        let raw = backend.get("user-settings").await.unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&raw.value).unwrap();
        assert_eq!(json["language"], "he");
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_dispatches_writes_once() {
        let backend = MemoryBackend::new();
        let store = SettingsStore::create(Arc::new(backend.clone()), SettingsConfig::default()).await;

        store.dispatch(FieldValue::Language(Language::He));
        store.dispatch(FieldValue::DegreeId(Some("d1".to_string())));
        store.dispatch(SettingsPatch::new().degree_id(Some("d2".to_string())).dev_mode(true));
        let last = store.dispatch(FieldValue::FontFamily(Some("Assistant".to_string())));

        tokio::time::sleep(QUIET * 2).await;
        assert_eq!(backend.write_count(), 1);
        assert_eq!(persisted(&backend).await.unwrap(), last);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spaced_dispatches_write_twice() {
        let backend = MemoryBackend::new();
        let store = SettingsStore::create(Arc::new(backend.clone()), SettingsConfig::default()).await;

        store.dispatch(FieldValue::DevMode(true));
        tokio::time::sleep(QUIET + Duration::from_millis(100)).await;
        store.dispatch(FieldValue::DevMode(false));
        tokio::time::sleep(QUIET + Duration::from_millis(100)).await;

        assert_eq!(backend.write_count(), 2);
        assert!(!persisted(&backend).await.unwrap().dev_mode);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_does_not_touch_snapshot() {
        let backend = MemoryBackend::new();
        let store = SettingsStore::create(Arc::new(backend.clone()), SettingsConfig::default()).await;
        backend.set_unavailable(true);

        let next = store.dispatch(FieldValue::Language(Language::He));
        tokio::time::sleep(QUIET * 2).await;

        assert_eq!(store.snapshot(), next);
        assert_eq!(store.snapshot().language, Language::He);
        assert_eq!(backend.write_count(), 0);

        // Still usable once the backend returns
        backend.set_unavailable(false);
        store.dispatch(FieldValue::DevMode(true));
        tokio::time::sleep(QUIET * 2).await;
        assert_eq!(persisted(&backend).await.unwrap(), store.snapshot());
    }

    #[tokio::test(start_paused = true)]
    async fn test_persist_disabled() {
        let backend = MemoryBackend::new();
        let config = SettingsConfig::default().with_persist(false);
        let store = SettingsStore::create(Arc::new(backend.clone()), config).await;
        assert!(store.bridge().is_none());

        store.dispatch(FieldValue::DevMode(true));
        tokio::time::sleep(QUIET * 2).await;
        assert_eq!(backend.write_count(), 0);
        assert!(!store.shutdown().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_key_and_debounce() {
        let backend = MemoryBackend::new();
        let config = SettingsConfig::default()
            .with_storage_key("app:user-settings")
            .with_debounce(Duration::from_millis(50));
        let store = SettingsStore::create(Arc::new(backend.clone()), config).await;

        store.dispatch(FieldValue::ShuffleQuestions(true));
        tokio::time::sleep(Duration::from_millis(60)).await;

        let saved: UserSettings = backend.get_json("app:user-settings").await.unwrap().unwrap();
        assert!(saved.shuffle_questions);
        assert_eq!(store.config().storage_key, "app:user-settings");
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_flushes_pending_write() {
        let backend = MemoryBackend::new();
        let store = SettingsStore::create(Arc::new(backend.clone()), SettingsConfig::default()).await;

        store.dispatch(FieldValue::Language(Language::He));
        assert!(store.bridge().unwrap().has_pending());
        assert!(store.shutdown().await);

        assert_eq!(persisted(&backend).await.unwrap().language, Language::He);
        assert!(!store.shutdown().await);
    }
}
