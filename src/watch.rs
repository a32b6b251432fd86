//! Change notification for the settings store.
//!
//! Two delivery paths, both fed after a transformation commits:
//! - synchronous callbacks registered with [`Subscribers`]
//! - async [`WatchStream`]s backed by a broadcast channel

use parking_lot::Mutex;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tokio_stream::Stream;

use crate::settings::UserSettings;

/// A committed change: the transformation tag and the snapshot it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsEvent {
    /// Tag of the transformation that was applied.
    pub tag: &'static str,
    /// Snapshot after the transformation.
    pub snapshot: UserSettings,
}

/// Handle returned by [`Subscribers::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn(&UserSettings) + Send + Sync>;

/// Registry of synchronous change callbacks.
#[derive(Default)]
pub struct Subscribers {
    next_id: AtomicU64,
    callbacks: Mutex<Vec<(SubscriptionId, Callback)>>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback; it runs after every committed transformation.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&UserSettings) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.callbacks.lock().push((id, Arc::new(callback)));
        id
    }

    /// Remove a callback. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut callbacks = self.callbacks.lock();
        let before = callbacks.len();
        callbacks.retain(|(existing, _)| *existing != id);
        callbacks.len() != before
    }

    /// Invoke every callback with `snapshot`, in registration order.
    ///
    /// The registry lock is released before any callback runs, so callbacks
    /// may subscribe, unsubscribe, or dispatch.
    pub fn notify(&self, snapshot: &UserSettings) {
        let callbacks: Vec<Callback> = self
            .callbacks
            .lock()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in callbacks {
            callback(snapshot);
        }
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.callbacks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle for sending change events to watch streams.
#[derive(Clone)]
pub struct WatchSender {
    sender: broadcast::Sender<SettingsEvent>,
}

impl WatchSender {
    /// Create a new watch sender with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Send an event to all streams.
    pub fn send(&self, event: SettingsEvent) {
        // No receivers is not an error
        let _ = self.sender.send(event);
    }

    /// Open a new stream. It sees events sent after this call.
    pub fn subscribe(&self) -> WatchStream {
        WatchStream::new(self.sender.subscribe())
    }

    /// Get the number of open streams.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for WatchSender {
    fn default() -> Self {
        Self::new(256)
    }
}

/// A stream of settings change events.
///
/// A stream that falls behind the channel capacity skips the events it
/// missed and continues with the next one.
pub struct WatchStream {
    inner: BroadcastStream<SettingsEvent>,
}

impl WatchStream {
    fn new(receiver: broadcast::Receiver<SettingsEvent>) -> Self {
        Self {
            inner: BroadcastStream::new(receiver),
        }
    }
}

impl Stream for WatchStream {
    type Item = SettingsEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(event))) => return Poll::Ready(Some(event)),
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(skipped)))) => {
                    tracing::debug!(skipped, "settings watch stream lagged");
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
