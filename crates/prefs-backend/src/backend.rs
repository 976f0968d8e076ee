//! Backing store contract
//!
//! [`KeyValueBackend`] is the narrow interface the preference layer consumes:
//! point reads, buffered edits finished by a synchronous `commit` or a
//! fire-and-forget `apply`, and change subscriptions.

use crate::edit::{Edit, EditOp};
use crate::error::BackendResult;
use crate::primitive::Primitive;
use crate::subscription::{ChangeEvent, ChangeSink, SubscriptionId};
use std::collections::{BTreeMap, BTreeSet};

/// In-memory image of a store
pub type Snapshot = BTreeMap<String, Primitive>;

/// Flat string-keyed persistent store
///
/// Typed getters never fail: a missing key or a value of another kind
/// yields the supplied default.
pub trait KeyValueBackend: Send + Sync {
    /// Raw value stored under `key`
    fn get(&self, key: &str) -> Option<Primitive>;

    /// All keys currently stored, sorted
    fn keys(&self) -> Vec<String>;

    /// Apply `edit` and wait until it is durable
    ///
    /// # Errors
    /// Returns an error if the store could not persist the edit; in that
    /// case no change is visible.
    fn commit(&self, edit: Edit) -> BackendResult<()>;

    /// Apply `edit` in memory now and persist it in the background
    fn apply(&self, edit: Edit);

    /// Register a change sink
    fn subscribe(&self, sink: ChangeSink) -> SubscriptionId;

    /// Remove a change sink; returns whether it was registered
    fn unsubscribe(&self, id: SubscriptionId) -> bool;

    /// Whether `key` holds a value
    fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Bool stored under `key`, or `default`
    fn get_bool(&self, key: &str, default: bool) -> bool {
        typed(self.get(key), key, default, |p| p.as_bool())
    }

    /// Int stored under `key`, or `default`
    fn get_int(&self, key: &str, default: i32) -> i32 {
        typed(self.get(key), key, default, |p| p.as_int())
    }

    /// Float stored under `key`, or `default`
    fn get_float(&self, key: &str, default: f32) -> f32 {
        typed(self.get(key), key, default, |p| p.as_float())
    }

    /// String stored under `key`, or `default`
    fn get_string(&self, key: &str, default: &str) -> String {
        typed(self.get(key), key, default.to_string(), |p| {
            p.as_str().map(str::to_string)
        })
    }

    /// String set stored under `key`, or `default`
    fn get_string_set(&self, key: &str, default: &BTreeSet<String>) -> BTreeSet<String> {
        typed(self.get(key), key, default.clone(), |p| p.as_string_set().cloned())
    }

    /// Start an empty edit
    fn edit(&self) -> Edit {
        Edit::new()
    }
}

fn typed<T>(raw: Option<Primitive>, key: &str, default: T, pick: impl FnOnce(&Primitive) -> Option<T>) -> T {
    match raw {
        None => default,
        Some(value) => match pick(&value) {
            Some(v) => v,
            None => {
                tracing::debug!(key, found = %value.kind(), "stored value has unexpected kind, using default");
                default
            }
        },
    }
}

/// Apply `edit` to a copy of `current`
///
/// Returns the resulting snapshot and one event per key whose value
/// actually changed: touched keys first in first-touch order, then keys
/// that disappeared through a clear.
#[must_use]
pub fn apply_edit(current: &Snapshot, edit: &Edit) -> (Snapshot, Vec<ChangeEvent>) {
    let mut next = if edit.clears() {
        Snapshot::new()
    } else {
        current.clone()
    };

    for op in edit.ops() {
        match op {
            EditOp::Put { key, value } => {
                next.insert(key.clone(), value.clone());
            }
            EditOp::Remove { key } => {
                next.remove(key);
            }
            EditOp::Clear => {}
        }
    }

    let origin = edit.origin();
    let mut changed: Vec<String> = edit
        .keys()
        .into_iter()
        .filter(|key| current.get(key) != next.get(key))
        .collect();
    if edit.clears() {
        for key in current.keys() {
            if !next.contains_key(key) && !changed.contains(key) {
                changed.push(key.clone());
            }
        }
    }

    let events = changed
        .into_iter()
        .map(|key| ChangeEvent::new(key, origin))
        .collect();
    (next, events)
}
