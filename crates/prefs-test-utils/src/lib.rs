//! Testing utilities for the prefs workspace
//!
//! Shared fixtures: a recording, fault-injecting backend, recording
//! listeners and callbacks, and store constructors.

#![allow(missing_docs)]

use parking_lot::Mutex;
use prefs_backend::{
    BackendError, BackendResult, ChangeSink, Edit, KeyValueBackend, MemoryBackend, Primitive,
    Snapshot, SubscriptionId,
};
use prefs_core::{
    ChangeCallback, ListenerHandle, PreferenceListener, Preferences, PreferencesConfig,
    SideEffect, ThreadPolicy,
};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Commit,
    Apply,
}

/// One edit that reached the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    pub kind: WriteKind,
    pub keys: Vec<String>,
    pub ops: usize,
}

/// Memory backend that records writes, counts reads and can fail commits
#[derive(Debug, Clone, Default)]
pub struct RecordingBackend {
    inner: MemoryBackend,
    writes: Arc<Mutex<Vec<RecordedWrite>>>,
    reads: Arc<AtomicUsize>,
    failing_commits: Arc<AtomicUsize>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values(values: Snapshot) -> Self {
        Self {
            inner: MemoryBackend::with_values(values),
            ..Self::default()
        }
    }

    /// Shared memory store underneath; writes through it bypass recording
    pub fn memory(&self) -> &MemoryBackend {
        &self.inner
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.writes.lock().clone()
    }

    pub fn commit_count(&self) -> usize {
        self.count(WriteKind::Commit)
    }

    pub fn apply_count(&self) -> usize {
        self.count(WriteKind::Apply)
    }

    /// Commits plus applies
    pub fn write_count(&self) -> usize {
        self.writes.lock().len()
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn reset_counts(&self) {
        self.writes.lock().clear();
        self.reads.store(0, Ordering::SeqCst);
    }

    /// Make the next `n` commits fail without touching the store
    pub fn fail_next_commits(&self, n: usize) {
        self.failing_commits.store(n, Ordering::SeqCst);
    }

    fn count(&self, kind: WriteKind) -> usize {
        self.writes.lock().iter().filter(|w| w.kind == kind).count()
    }

    fn record(&self, kind: WriteKind, edit: &Edit) {
        self.writes.lock().push(RecordedWrite {
            kind,
            keys: edit.keys(),
            ops: edit.len(),
        });
    }

    fn take_failure(&self) -> bool {
        self.failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl KeyValueBackend for RecordingBackend {
    fn get(&self, key: &str) -> Option<Primitive> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key)
    }

    fn keys(&self) -> Vec<String> {
        self.inner.keys()
    }

    fn commit(&self, edit: Edit) -> BackendResult<()> {
        if self.take_failure() {
            return Err(BackendError::CommitRejected("injected failure".to_string()));
        }
        self.record(WriteKind::Commit, &edit);
        self.inner.commit(edit)
    }

    fn apply(&self, edit: Edit) {
        self.record(WriteKind::Apply, &edit);
        self.inner.apply(edit);
    }

    fn subscribe(&self, sink: ChangeSink) -> SubscriptionId {
        self.inner.subscribe(sink)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.unsubscribe(id)
    }
}

/// Listener remembering every delivery as `(key, forced)`
#[derive(Debug, Default)]
pub struct RecordingListener {
    events: Mutex<Vec<(String, bool)>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn handle(self: &Arc<Self>) -> ListenerHandle {
        Arc::clone(self) as ListenerHandle
    }

    pub fn events(&self) -> Vec<(String, bool)> {
        self.events.lock().clone()
    }

    pub fn forced_count(&self) -> usize {
        self.events.lock().iter().filter(|(_, forced)| *forced).count()
    }

    pub fn change_count(&self) -> usize {
        self.events.lock().iter().filter(|(_, forced)| !*forced).count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl PreferenceListener for RecordingListener {
    fn on_value_changed(&self, key: &str, _prefs: &Preferences, forced: bool) {
        self.events.lock().push((key.to_string(), forced));
    }
}

/// Side-effect receiver remembering every effect
#[derive(Debug, Default)]
pub struct RecordingCallback {
    effects: Mutex<Vec<SideEffect>>,
}

impl RecordingCallback {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn effects(&self) -> Vec<SideEffect> {
        self.effects.lock().clone()
    }

    pub fn count(&self, effect: SideEffect) -> usize {
        self.effects.lock().iter().filter(|e| **e == effect).count()
    }
}

impl ChangeCallback for RecordingCallback {
    fn on_side_effect(&self, effect: SideEffect) {
        self.effects.lock().push(effect);
    }
}

/// Configuration usable from any test thread
pub fn test_config() -> PreferencesConfig {
    PreferencesConfig::new()
        .with_name("test_prefs")
        .with_thread_policy(ThreadPolicy::Unchecked)
}

/// Store over a fresh recording backend
pub fn test_prefs() -> (RecordingBackend, Preferences) {
    test_prefs_with(RecordingBackend::new(), test_config())
}

/// Store over `backend` with `config`
pub fn test_prefs_with(backend: RecordingBackend, config: PreferencesConfig) -> (RecordingBackend, Preferences) {
    let prefs = Preferences::with_backend(Arc::new(backend.clone()), config)
        .expect("test configuration is valid");
    (backend, prefs)
}

pub fn string_set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}
