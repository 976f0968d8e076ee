//! In-process backing store
//!
//! Clones of a [`MemoryBackend`] share one map and one subscriber list, so
//! two clones behave like two cooperating instances over the same store:
//! a write through either is visible to, and notified on, both.

use crate::backend::{apply_edit, KeyValueBackend, Snapshot};
use crate::edit::Edit;
use crate::error::BackendResult;
use crate::primitive::Primitive;
use crate::subscription::{ChangeSink, SubscriberList, SubscriptionId};
use parking_lot::{ReentrantMutex, RwLock};
use std::sync::Arc;

/// Shared in-memory store
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    values: RwLock<Snapshot>,
    subscribers: SubscriberList,
    /// Serializes writers so per-key delivery order matches write order.
    /// Reentrant: a sink may write back from inside a notification.
    write_order: ReentrantMutex<()>,
}

impl MemoryBackend {
    /// Create an empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `values`
    #[must_use]
    pub fn with_values(values: Snapshot) -> Self {
        let backend = Self::new();
        *backend.inner.values.write() = values;
        backend
    }

    /// Copy of the current contents
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.inner.values.read().clone()
    }

    /// Number of stored keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.values.read().len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.values.read().is_empty()
    }

    /// Number of registered change sinks
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    fn write(&self, edit: &Edit) {
        let _order = self.inner.write_order.lock();
        let events = {
            let mut values = self.inner.values.write();
            let (next, events) = apply_edit(&values, edit);
            *values = next;
            events
        };
        self.inner.subscribers.notify(&events);
    }
}

impl KeyValueBackend for MemoryBackend {
    fn get(&self, key: &str) -> Option<Primitive> {
        self.inner.values.read().get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.inner.values.read().keys().cloned().collect()
    }

    fn commit(&self, edit: Edit) -> BackendResult<()> {
        self.write(&edit);
        Ok(())
    }

    fn apply(&self, edit: Edit) {
        self.write(&edit);
    }

    fn subscribe(&self, sink: ChangeSink) -> SubscriptionId {
        self.inner.subscribers.subscribe(sink)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.subscribers.unsubscribe(id)
    }
}
