//! Mutable collection cells
//!
//! List and map cells hold a fully materialized copy of the decoded JSON
//! container. Every mutation updates the copy and rewrites the whole
//! container as one string write. Changes made by other writers reload the
//! copy; this store's own echoes are ignored, except that a finished bulk
//! edit reloads every collection it wrote.

use crate::codec::{decode_list, decode_map, encode_list, encode_map, Flatten};
use crate::error::{PrefError, PrefResult};
use crate::hub::{ChangeHook, OnChange};
use crate::store::Preferences;
use parking_lot::Mutex;
use prefs_backend::Primitive;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// Stored JSON text for `key`, `None` when absent or not a string
fn stored_json(prefs: &Preferences, key: &str) -> Option<String> {
    match prefs.backend().get(key) {
        Some(Primitive::String(json)) => Some(json),
        Some(other) => {
            tracing::debug!(key, found = %other.kind(), "collection stored as non-string, using default");
            None
        }
        None => None,
    }
}

struct ListState<T> {
    key: String,
    default: Vec<T>,
    flattener: Box<dyn Flatten<T>>,
    items: Mutex<Vec<T>>,
    on_change: OnChange,
}

impl<T: Clone> ListState<T> {
    fn load(&self, prefs: &Preferences) -> Vec<T> {
        stored_json(prefs, &self.key)
            .and_then(|json| {
                decode_list(&json, self.flattener.as_ref())
                    .map_err(|err| tracing::debug!(key = %self.key, %err, "malformed list, using default"))
                    .ok()
            })
            .unwrap_or_else(|| self.default.clone())
    }
}

impl<T: Clone + Send + Sync + 'static> ChangeHook for ListState<T> {
    fn invalidate(&self, prefs: &Preferences) {
        let fresh = self.load(prefs);
        *self.items.lock() = fresh;
    }

    fn fire(&self, prefs: &Preferences) {
        self.on_change.fire(prefs);
    }
}

/// List cell; ordered, duplicates allowed
pub struct MutableListPref<T> {
    prefs: Preferences,
    state: Arc<ListState<T>>,
}

impl<T> MutableListPref<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    pub(crate) fn new(
        prefs: Preferences,
        key: String,
        default: Vec<T>,
        flattener: Box<dyn Flatten<T>>,
        on_change: OnChange,
    ) -> Self {
        let state = ListState {
            key,
            default,
            flattener,
            items: Mutex::new(Vec::new()),
            on_change,
        };
        *state.items.lock() = state.load(&prefs);

        let state = Arc::new(state);
        let hook: Arc<dyn ChangeHook> = state.clone();
        prefs.register_hook(&state.key, Arc::downgrade(&hook));
        Self { prefs, state }
    }

    /// Backend key
    #[inline]
    #[must_use]
    pub fn key(&self) -> &str {
        &self.state.key
    }

    /// Element at `index`
    #[must_use]
    pub fn get(&self, index: usize) -> Option<T> {
        self.prefs.assert_owner("list get");
        self.state.items.lock().get(index).cloned()
    }

    /// Number of elements
    #[must_use]
    pub fn len(&self) -> usize {
        self.prefs.assert_owner("list len");
        self.state.items.lock().len()
    }

    /// Whether the list is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prefs.assert_owner("list is_empty");
        self.state.items.lock().is_empty()
    }

    /// Whether `item` is present
    #[must_use]
    pub fn contains(&self, item: &T) -> bool {
        self.prefs.assert_owner("list contains");
        self.state.items.lock().contains(item)
    }

    /// Copy of the whole list
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.prefs.assert_owner("list read");
        self.state.items.lock().clone()
    }

    /// Replace the element at `index`
    ///
    /// # Errors
    /// `PrefError::IndexOutOfBounds` for `index >= len`; write errors as for
    /// [`crate::Pref::set`].
    pub fn set(&self, index: usize, item: T) -> PrefResult<()> {
        self.mutate(|items| {
            let len = items.len();
            let slot = items.get_mut(index).ok_or_else(|| self.out_of_bounds(index, len))?;
            *slot = item;
            Ok(true)
        })
    }

    /// Replace the whole list; structurally equal contents write nothing
    ///
    /// # Errors
    /// Write errors as for [`crate::Pref::set`].
    pub fn set_all(&self, items: Vec<T>) -> PrefResult<()> {
        self.mutate(|current| {
            if *current == items {
                return Ok(false);
            }
            *current = items;
            Ok(true)
        })
    }

    /// Replace the whole list unconditionally
    ///
    /// # Errors
    /// Write errors as for [`crate::Pref::set`].
    pub fn replace_with(&self, items: Vec<T>) -> PrefResult<()> {
        self.mutate(|current| {
            *current = items;
            Ok(true)
        })
    }

    /// Append `item`
    ///
    /// # Errors
    /// Write errors as for [`crate::Pref::set`].
    pub fn add(&self, item: T) -> PrefResult<()> {
        self.mutate(|items| {
            items.push(item);
            Ok(true)
        })
    }

    /// Insert `item` at `index`, shifting later elements
    ///
    /// # Errors
    /// `PrefError::IndexOutOfBounds` for `index > len`; write errors as for
    /// [`crate::Pref::set`].
    pub fn add_at(&self, index: usize, item: T) -> PrefResult<()> {
        self.mutate(|items| {
            if index > items.len() {
                return Err(self.out_of_bounds(index, items.len()));
            }
            items.insert(index, item);
            Ok(true)
        })
    }

    /// Remove the first element equal to `item`; `false` if none matched
    ///
    /// # Errors
    /// Write errors as for [`crate::Pref::set`].
    pub fn remove(&self, item: &T) -> PrefResult<bool> {
        let mut found = false;
        self.mutate(|items| {
            if let Some(pos) = items.iter().position(|x| x == item) {
                items.remove(pos);
                found = true;
            }
            Ok(found)
        })?;
        Ok(found)
    }

    /// Remove and return the element at `index`
    ///
    /// # Errors
    /// `PrefError::IndexOutOfBounds` for `index >= len`; write errors as for
    /// [`crate::Pref::set`].
    pub fn remove_at(&self, index: usize) -> PrefResult<T> {
        let mut removed = None;
        self.mutate(|items| {
            if index >= items.len() {
                return Err(self.out_of_bounds(index, items.len()));
            }
            removed = Some(items.remove(index));
            Ok(true)
        })?;
        removed.ok_or_else(|| self.out_of_bounds(index, 0))
    }

    /// Re-read the list from the backend, discarding the in-memory copy
    pub fn reload(&self) {
        self.prefs.assert_owner("list reload");
        self.state.invalidate(&self.prefs);
    }

    fn out_of_bounds(&self, index: usize, len: usize) -> PrefError {
        PrefError::IndexOutOfBounds {
            key: self.state.key.clone(),
            index,
            len,
        }
    }

    /// Apply `change` and persist when it reports a modification
    fn mutate(&self, change: impl FnOnce(&mut Vec<T>) -> PrefResult<bool>) -> PrefResult<()> {
        self.prefs.assert_owner("list write");
        let state = &*self.state;
        let json = {
            let mut items = state.items.lock();
            if !change(&mut items)? {
                return Ok(());
            }
            encode_list(&items, state.flattener.as_ref())
        };

        let written = self.prefs.transactions().write(|edit| {
            edit.put_string(state.key.as_str(), json);
        });
        if let Err(err) = written {
            state.invalidate(&self.prefs);
            return Err(err);
        }
        state.on_change.fire(&self.prefs);
        Ok(())
    }
}

impl<T> Clone for MutableListPref<T> {
    fn clone(&self) -> Self {
        Self {
            prefs: self.prefs.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for MutableListPref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutableListPref")
            .field("key", &self.state.key)
            .field("items", &*self.state.items.lock())
            .finish_non_exhaustive()
    }
}

struct MapState<K, V> {
    key: String,
    default: HashMap<K, V>,
    keys: Box<dyn Flatten<K>>,
    values: Box<dyn Flatten<V>>,
    entries: Mutex<HashMap<K, V>>,
    on_change: OnChange,
}

impl<K: Clone + Eq + Hash, V: Clone> MapState<K, V> {
    fn load(&self, prefs: &Preferences) -> HashMap<K, V> {
        stored_json(prefs, &self.key)
            .and_then(|json| {
                decode_map(&json, self.keys.as_ref(), self.values.as_ref())
                    .map_err(|err| tracing::debug!(key = %self.key, %err, "malformed map, using default"))
                    .ok()
            })
            .unwrap_or_else(|| self.default.clone())
    }
}

impl<K, V> ChangeHook for MapState<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn invalidate(&self, prefs: &Preferences) {
        let fresh = self.load(prefs);
        *self.entries.lock() = fresh;
    }

    fn fire(&self, prefs: &Preferences) {
        self.on_change.fire(prefs);
    }
}

/// Map cell; keys unique, order not significant
pub struct MutableMapPref<K, V> {
    prefs: Preferences,
    state: Arc<MapState<K, V>>,
}

impl<K, V> MutableMapPref<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        prefs: Preferences,
        key: String,
        default: HashMap<K, V>,
        keys: Box<dyn Flatten<K>>,
        values: Box<dyn Flatten<V>>,
        on_change: OnChange,
    ) -> Self {
        let state = MapState {
            key,
            default,
            keys,
            values,
            entries: Mutex::new(HashMap::new()),
            on_change,
        };
        *state.entries.lock() = state.load(&prefs);

        let state = Arc::new(state);
        let hook: Arc<dyn ChangeHook> = state.clone();
        prefs.register_hook(&state.key, Arc::downgrade(&hook));
        Self { prefs, state }
    }

    /// Backend key
    #[inline]
    #[must_use]
    pub fn key(&self) -> &str {
        &self.state.key
    }

    /// Value stored under `key`
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        self.prefs.assert_owner("map get");
        self.state.entries.lock().get(key).cloned()
    }

    /// Whether `key` is present
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.prefs.assert_owner("map contains_key");
        self.state.entries.lock().contains_key(key)
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.prefs.assert_owner("map len");
        self.state.entries.lock().len()
    }

    /// Whether the map is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prefs.assert_owner("map is_empty");
        self.state.entries.lock().is_empty()
    }

    /// Copy of the whole map
    #[must_use]
    pub fn to_map(&self) -> HashMap<K, V> {
        self.prefs.assert_owner("map read");
        self.state.entries.lock().clone()
    }

    /// Store `value` under `key`; `None` removes the entry
    ///
    /// # Errors
    /// Write errors as for [`crate::Pref::set`].
    pub fn set(&self, key: K, value: Option<V>) -> PrefResult<()> {
        self.prefs.assert_owner("map write");
        let state = &*self.state;
        let json = {
            let mut entries = state.entries.lock();
            match value {
                Some(value) => {
                    entries.insert(key, value);
                }
                None => {
                    entries.remove(&key);
                }
            }
            encode_map(&entries, state.keys.as_ref(), state.values.as_ref())
        };

        let written = self.prefs.transactions().write(|edit| {
            edit.put_string(state.key.as_str(), json);
        });
        if let Err(err) = written {
            state.invalidate(&self.prefs);
            return Err(err);
        }
        state.on_change.fire(&self.prefs);
        Ok(())
    }

    /// Re-read the map from the backend, discarding the in-memory copy
    pub fn reload(&self) {
        self.prefs.assert_owner("map reload");
        self.state.invalidate(&self.prefs);
    }
}

impl<K, V> Clone for MutableMapPref<K, V> {
    fn clone(&self) -> Self {
        Self {
            prefs: self.prefs.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for MutableMapPref<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutableMapPref")
            .field("key", &self.state.key)
            .field("entries", &*self.state.entries.lock())
            .finish_non_exhaustive()
    }
}
