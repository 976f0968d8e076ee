//! Change subscriptions
//!
//! Backends deliver one [`ChangeEvent`] per changed key, to every sink, for
//! every writer (including other instances sharing the same store).

use crate::edit::WriterId;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Notification that the value stored under `key` changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Changed key
    pub key: String,
    /// Writer of the edit, when known
    pub origin: Option<WriterId>,
}

impl ChangeEvent {
    /// Create an event
    #[inline]
    #[must_use]
    pub fn new(key: impl Into<String>, origin: Option<WriterId>) -> Self {
        Self {
            key: key.into(),
            origin,
        }
    }

    /// Whether `writer` produced the change
    #[inline]
    #[must_use]
    pub fn is_from(&self, writer: WriterId) -> bool {
        self.origin == Some(writer)
    }
}

/// Callback receiving change events
pub type ChangeSink = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Handle returned by `subscribe`, needed to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Subscriber bookkeeping shared by backend implementations
///
/// Sinks are invoked outside the internal lock, so a sink may subscribe or
/// unsubscribe while being notified.
#[derive(Default)]
pub struct SubscriberList {
    next_id: AtomicU64,
    sinks: RwLock<Vec<(SubscriptionId, ChangeSink)>>,
}

impl SubscriberList {
    /// Create an empty list
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sink
    pub fn subscribe(&self, sink: ChangeSink) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.sinks.write().push((id, sink));
        id
    }

    /// Drop a sink; returns whether it was registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut sinks = self.sinks.write();
        let before = sinks.len();
        sinks.retain(|(sid, _)| *sid != id);
        sinks.len() != before
    }

    /// Number of registered sinks
    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.read().len()
    }

    /// Whether no sink is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.read().is_empty()
    }

    /// Deliver `events` in order to every sink
    pub fn notify(&self, events: &[ChangeEvent]) {
        if events.is_empty() {
            return;
        }
        let sinks: Vec<ChangeSink> = self.sinks.read().iter().map(|(_, s)| Arc::clone(s)).collect();
        for event in events {
            tracing::trace!(key = %event.key, "delivering change event");
            for sink in &sinks {
                sink(event);
            }
        }
    }
}

impl std::fmt::Debug for SubscriberList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberList")
            .field("sinks", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn notify_reaches_every_sink_in_order() {
        let list = SubscriberList::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["a", "b"] {
            let seen = Arc::clone(&seen);
            list.subscribe(Arc::new(move |event: &ChangeEvent| {
                seen.lock().push(format!("{tag}:{}", event.key));
            }));
        }

        list.notify(&[ChangeEvent::new("k1", None), ChangeEvent::new("k2", None)]);

        assert_eq!(
            *seen.lock(),
            vec!["a:k1", "b:k1", "a:k2", "b:k2"]
        );
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let list = SubscriberList::new();
        let count = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&count);
        let id = list.subscribe(Arc::new(move |_: &ChangeEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        list.notify(&[ChangeEvent::new("k", None)]);
        assert!(list.unsubscribe(id));
        assert!(!list.unsubscribe(id));
        list.notify(&[ChangeEvent::new("k", None)]);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(list.is_empty());
    }

    #[test]
    fn event_origin_check() {
        let writer = WriterId::new();
        let event = ChangeEvent::new("k", Some(writer));
        assert!(event.is_from(writer));
        assert!(!event.is_from(WriterId::new()));
        assert!(!ChangeEvent::new("k", None).is_from(writer));
    }
}
