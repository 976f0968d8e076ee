//! Typed property cell
//!
//! A [`Pref<T>`] is the cached, typed handle for one backend key. Reads hit
//! the backend only when the cache is empty; local writes replace the cache
//! and fire the key's side effect once, synchronously.

use crate::codec::{decode_or_default, ValueCodec};
use crate::error::PrefResult;
use crate::hub::{ChangeHook, OnChange};
use crate::store::Preferences;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

type Disposer<T> = Box<dyn Fn(T) + Send + Sync>;

pub(crate) struct CellState<T> {
    key: String,
    default: T,
    codec: Box<dyn ValueCodec<T>>,
    cache: Mutex<Option<T>>,
    on_change: OnChange,
    dispose: Option<Disposer<T>>,
}

impl<T: Clone + Send + Sync + 'static> CellState<T> {
    pub(crate) fn new(
        key: String,
        default: T,
        codec: Box<dyn ValueCodec<T>>,
        on_change: OnChange,
        dispose: Option<Disposer<T>>,
    ) -> Self {
        Self {
            key,
            default,
            codec,
            cache: Mutex::new(None),
            on_change,
            dispose,
        }
    }

    fn release(&self, previous: Option<T>) {
        if let (Some(value), Some(dispose)) = (previous, self.dispose.as_ref()) {
            dispose(value);
        }
    }

    fn clear_cache(&self) {
        let previous = self.cache.lock().take();
        if previous.is_some() {
            tracing::debug!(key = %self.key, "cache invalidated");
        }
        self.release(previous);
    }
}

impl<T: Clone + Send + Sync + 'static> ChangeHook for CellState<T> {
    fn invalidate(&self, _prefs: &Preferences) {
        self.clear_cache();
    }

    fn refresh(&self, prefs: &Preferences) {
        let stored = prefs.backend().get(&self.key);
        let mut cache = self.cache.lock();
        let current = match cache.as_ref() {
            Some(value) => self.codec.encode(value) == stored,
            None => return,
        };
        if !current {
            let previous = cache.take();
            drop(cache);
            tracing::debug!(key = %self.key, "cached value differs from the store, dropped");
            self.release(previous);
        }
    }

    fn fire(&self, prefs: &Preferences) {
        self.on_change.fire(prefs);
    }
}

/// Cached typed handle for one preference key
pub struct Pref<T> {
    prefs: Preferences,
    state: Arc<CellState<T>>,
}

impl<T: Clone + Send + Sync + 'static> Pref<T> {
    pub(crate) fn new(prefs: Preferences, state: CellState<T>) -> Self {
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

    /// Declared default
    #[inline]
    #[must_use]
    pub fn default_value(&self) -> &T {
        &self.state.default
    }

    /// Whether a value is cached
    #[must_use]
    pub fn is_cached(&self) -> bool {
        self.prefs.assert_owner("is_cached");
        self.state.cache.lock().is_some()
    }

    /// Current value
    ///
    /// Absent or undecodable stored values read as the default.
    #[must_use]
    pub fn get(&self) -> T {
        self.prefs.assert_owner("get");
        let state = &*self.state;
        let mut cache = state.cache.lock();
        if let Some(value) = cache.as_ref() {
            return value.clone();
        }

        let raw = self.prefs.backend().get(&state.key);
        let value = decode_or_default(state.codec.as_ref(), &state.key, raw.as_ref(), &state.default);
        *cache = Some(value.clone());
        value
    }

    /// Write `value` through the current transaction mode
    ///
    /// The key's side effect runs after the write is recorded, even when
    /// the value is unchanged.
    ///
    /// # Errors
    /// Returns `PrefError::CommitFailed` if a blocking commit fails; the
    /// previously cached value is kept and `value` is dropped undisposed.
    pub fn set(&self, value: T) -> PrefResult<()> {
        self.prefs.assert_owner("set");
        let state = &*self.state;
        let encoded = state.codec.encode(&value);
        let previous = state.cache.lock().replace(value);

        let written = self.prefs.transactions().write(|edit| {
            match encoded {
                Some(raw) => edit.put(state.key.as_str(), raw),
                None => edit.remove(state.key.as_str()),
            };
        });
        if let Err(err) = written {
            *state.cache.lock() = previous;
            return Err(err);
        }

        state.release(previous);
        state.on_change.fire(&self.prefs);
        Ok(())
    }

    /// Drop the cached value; the next read goes to the backend
    pub fn invalidate(&self) {
        self.prefs.assert_owner("invalidate");
        self.state.clear_cache();
    }

    /// Store this cell belongs to
    #[inline]
    #[must_use]
    pub fn preferences(&self) -> &Preferences {
        &self.prefs
    }
}

impl<T> Clone for Pref<T> {
    fn clone(&self) -> Self {
        Self {
            prefs: self.prefs.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Pref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pref")
            .field("key", &self.state.key)
            .field("default", &self.state.default)
            .field("cached", &*self.state.cache.lock())
            .field("on_change", &self.state.on_change)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::codec::{IntCodec, StringIntCodec};
    use crate::config::{PreferencesConfig, ThreadPolicy};
    use crate::hub::OnChange;
    use crate::store::Preferences;
    use prefs_backend::{Edit, KeyValueBackend, MemoryBackend};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn store(backend: &MemoryBackend) -> Preferences {
        let config = PreferencesConfig::new().with_thread_policy(ThreadPolicy::Unchecked);
        Preferences::with_backend(Arc::new(backend.clone()), config).unwrap()
    }

    #[test]
    fn absent_key_reads_default_and_caches() {
        let backend = MemoryBackend::new();
        let prefs = store(&backend);
        let columns = prefs.define_int("columns", 5, OnChange::Nothing);

        assert!(!columns.is_cached());
        assert_eq!(columns.get(), 5);
        assert!(columns.is_cached());
    }

    #[test]
    fn corrupt_value_reads_default() {
        let backend = MemoryBackend::new();
        let mut edit = Edit::new();
        edit.put_string("workspace_columns", "five");
        backend.commit(edit).unwrap();

        let prefs = store(&backend);
        let columns = prefs.define("workspace_columns", 4, StringIntCodec, OnChange::Nothing);
        assert_eq!(columns.get(), 4);
    }

    #[test]
    fn local_write_fires_side_effect_once() {
        let backend = MemoryBackend::new();
        let prefs = store(&backend);
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let rows = prefs.define(
            "rows",
            4,
            IntCodec,
            OnChange::custom(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        rows.set(6).unwrap();
        assert_eq!(rows.get(), 6);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(backend.get_int("rows", 0), 6);
    }

    #[test]
    fn external_write_invalidates_and_fires() {
        let backend = MemoryBackend::new();
        let prefs = store(&backend);
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let rows = prefs.define(
            "rows",
            4,
            IntCodec,
            OnChange::custom(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert_eq!(rows.get(), 4);

        let mut edit = Edit::new();
        edit.put_int("rows", 7);
        backend.apply(edit);

        assert!(!rows.is_cached());
        assert_eq!(rows.get(), 7);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn disposal_receives_replaced_value() {
        let backend = MemoryBackend::new();
        let prefs = store(&backend);
        let disposed = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&disposed);
        let icon = prefs.define_string_based(
            "icon_pack",
            "system".to_string(),
            crate::codec::StringBasedCodec::new(
                |raw: &str| Ok::<_, std::convert::Infallible>(raw.to_string()),
                String::clone,
            ),
            OnChange::Nothing,
            move |old: String| sink.lock().push(old),
        );

        assert_eq!(icon.get(), "system");
        icon.set("pixel".to_string()).unwrap();
        icon.set("arcticons".to_string()).unwrap();

        assert_eq!(*disposed.lock(), vec!["system".to_string(), "pixel".to_string()]);
    }
}
