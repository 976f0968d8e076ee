//! Preference store handle
//!
//! [`Preferences`] owns one backend handle, the transaction controller, the
//! change hub and the derived-value registry. Handles are cheap clones of
//! one shared store; cells keep their store alive.
//!
//! # Lifecycle
//!
//! 1. Construct with [`Preferences::with_backend`], [`Preferences::init`]
//!    (runs the version gate) or [`Preferences::open`] (file-backed, with
//!    the legacy rename)
//! 2. Define cells with the `define_*` factories
//! 3. [`Preferences::destroy`] detaches listeners, the callback, derived
//!    values and the backend subscription
//!
//! # Change events from other threads
//!
//! Under [`ThreadPolicy::OwnerOnly`] a change event raised on another thread
//! is queued. It is delivered on the owner thread by the attached
//! [`MainThreadHandle`] (see [`Preferences::deliver_events_on`]), by
//! [`Preferences::pump_events`], or ahead of the next event raised on the
//! owner thread. Cells may read stale values until then.

use crate::cell::{CellState, Pref};
use crate::codec::{
    AlphaCodec, BoolCodec, DimensionCodec, Flatten, FloatCodec, IntCodec, NullableStringCodec,
    StringBasedCodec, StringCodec, StringIntCodec, StringSetCodec, ValueCodec,
};
use crate::collections::{MutableListPref, MutableMapPref};
use crate::config::{PreferencesConfig, ThreadPolicy};
use crate::derived::{Resettable, ResettableLazy};
use crate::dispatcher::MainThreadHandle;
use crate::error::{PrefError, PrefResult};
use crate::hub::{ChangeCallback, ChangeHook, ChangeHub, ListenerHandle, OnChange, SideEffect};
use crate::transaction::TransactionController;
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use prefs_backend::{
    migrate_legacy_file, ChangeEvent, Edit, FileBackend, KeyValueBackend, SubscriptionId, WriterId,
};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Weak};
use std::thread::ThreadId;

struct Inner {
    config: PreferencesConfig,
    backend: Arc<dyn KeyValueBackend>,
    tx: TransactionController,
    hub: ChangeHub,
    owner: ThreadId,
    derived: Mutex<Vec<Weak<dyn Resettable>>>,
    subscription: Mutex<Option<SubscriptionId>>,
    // raw-written keys whose cells refresh once the bulk edit lands
    raw_pending: Mutex<Vec<String>>,
    queued_tx: Sender<ChangeEvent>,
    queued_rx: Receiver<ChangeEvent>,
    event_thread: Mutex<Option<MainThreadHandle>>,
}

impl Inner {
    fn detach(&self) {
        if let Some(id) = self.subscription.lock().take() {
            self.backend.unsubscribe(id);
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if self.tx.is_bulk() {
            tracing::warn!("preference store dropped with an open bulk edit; buffered writes discarded");
        }
        self.detach();
    }
}

/// Typed, cached, observable view over one backend
#[derive(Clone)]
pub struct Preferences {
    inner: Arc<Inner>,
}

impl Preferences {
    /// Create a store over `backend` without running the version gate
    ///
    /// The calling thread becomes the owner thread.
    ///
    /// # Errors
    /// Returns `PrefError::Config` if `config` is invalid.
    pub fn with_backend(
        backend: Arc<dyn KeyValueBackend>,
        config: PreferencesConfig,
    ) -> PrefResult<Self> {
        config.validate()?;
        let writer = WriterId::new();
        let (queued_tx, queued_rx) = channel::unbounded();
        let prefs = Self {
            inner: Arc::new(Inner {
                tx: TransactionController::new(Arc::clone(&backend), writer),
                config,
                backend,
                hub: ChangeHub::default(),
                owner: std::thread::current().id(),
                derived: Mutex::new(Vec::new()),
                subscription: Mutex::new(None),
                raw_pending: Mutex::new(Vec::new()),
                queued_tx,
                queued_rx,
                event_thread: Mutex::new(None),
            }),
        };

        let weak = Arc::downgrade(&prefs.inner);
        let id = prefs.inner.backend.subscribe(Arc::new(move |event: &ChangeEvent| {
            if let Some(inner) = weak.upgrade() {
                Preferences { inner }.receive(event);
            }
        }));
        *prefs.inner.subscription.lock() = Some(id);

        tracing::debug!(name = %prefs.inner.config.name, %writer, "preference store created");
        Ok(prefs)
    }

    /// Create a store over `backend` and run the version gate
    ///
    /// # Errors
    /// Configuration errors, or the version gate's errors.
    pub fn init<E, F>(
        backend: Arc<dyn KeyValueBackend>,
        config: PreferencesConfig,
        migrate: F,
    ) -> PrefResult<Self>
    where
        E: fmt::Display,
        F: FnOnce(&Preferences, i32) -> Result<(), E>,
    {
        let prefs = Self::with_backend(backend, config)?;
        prefs.run_version_gate(migrate)?;
        Ok(prefs)
    }

    /// Open the file-backed store described by `config`
    ///
    /// Renames the legacy document first when `legacy_name` is set. The
    /// version gate is not run.
    ///
    /// # Errors
    /// `PrefError::Config` without a directory, `PrefError::Backend` if the
    /// document cannot be read.
    pub fn open(config: PreferencesConfig) -> PrefResult<Self> {
        config.validate()?;
        let dir = config
            .directory
            .clone()
            .ok_or_else(|| {
                PrefError::Config("directory is required to open a file store".to_string())
            })?;

        if let Some(legacy) = config.legacy_name.as_deref() {
            if let Err(err) = migrate_legacy_file(&dir, legacy, &config.name) {
                tracing::warn!(%err, legacy, "legacy preference file rename failed");
            }
        }

        let backend = FileBackend::open_in(&dir, &config.name)?;
        Self::with_backend(Arc::new(backend), config)
    }

    /// [`open`](Self::open) followed by the version gate
    ///
    /// # Errors
    /// As for [`open`](Self::open) and [`run_version_gate`](Self::run_version_gate).
    pub fn open_with_migration<E, F>(config: PreferencesConfig, migrate: F) -> PrefResult<Self>
    where
        E: fmt::Display,
        F: FnOnce(&Preferences, i32) -> Result<(), E>,
    {
        let prefs = Self::open(config)?;
        prefs.run_version_gate(migrate)?;
        Ok(prefs)
    }

    /// Store configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &PreferencesConfig {
        &self.inner.config
    }

    /// Underlying backend
    #[inline]
    #[must_use]
    pub fn backend(&self) -> &dyn KeyValueBackend {
        self.inner.backend.as_ref()
    }

    /// Identity stamped on this store's edits
    #[inline]
    #[must_use]
    pub fn writer_id(&self) -> WriterId {
        self.inner.tx.origin()
    }

    /// Thread that constructed the store
    #[inline]
    #[must_use]
    pub fn owner_thread(&self) -> ThreadId {
        self.inner.owner
    }

    /// Whether the calling thread owns the store
    #[must_use]
    pub fn is_owner_thread(&self) -> bool {
        std::thread::current().id() == self.inner.owner
    }

    /// Whether two handles refer to the same store
    #[must_use]
    pub fn same_store(&self, other: &Preferences) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn transactions(&self) -> &TransactionController {
        &self.inner.tx
    }

    pub(crate) fn assert_owner(&self, op: &str) {
        if self.inner.config.thread_policy == ThreadPolicy::OwnerOnly {
            let current = std::thread::current().id();
            assert!(
                current == self.inner.owner,
                "preferences used off the owner thread during {op}: current {current:?}, owner {:?}",
                self.inner.owner
            );
        }
    }

    pub(crate) fn register_hook(&self, key: &str, hook: Weak<dyn ChangeHook>) {
        self.inner.hub.register_hook(key, hook);
    }

    pub(crate) fn emit(&self, effect: SideEffect) {
        match self.inner.hub.callback() {
            Some(callback) => callback.on_side_effect(effect),
            None => tracing::trace!(?effect, "no change callback registered"),
        }
    }

    fn dispatch(&self, event: &ChangeEvent) {
        self.inner.hub.dispatch(self, event, self.writer_id());
    }

    /// Backend subscription entry point; may run on any writer's thread
    fn receive(&self, event: &ChangeEvent) {
        if self.inner.config.thread_policy == ThreadPolicy::Unchecked || self.is_owner_thread() {
            self.pump_events();
            self.dispatch(event);
            return;
        }

        // the receiver lives in `inner`, so the send cannot fail
        let _ = self.inner.queued_tx.send(event.clone());
        tracing::trace!(key = %event.key, "change event queued for the owner thread");

        let target = self.inner.event_thread.lock().clone();
        if let Some(main) = target {
            let weak = Arc::downgrade(&self.inner);
            let posted = main.post(move || {
                if let Some(inner) = weak.upgrade() {
                    Preferences { inner }.pump_events();
                }
            });
            if let Err(err) = posted {
                tracing::debug!(%err, "event thread gone; event waits for pump_events");
            }
        }
    }

    /// Deliver change events queued by writers on other threads
    ///
    /// Returns the number delivered.
    pub fn pump_events(&self) -> usize {
        self.assert_owner("pump_events");
        let mut delivered = 0;
        while let Ok(event) = self.inner.queued_rx.try_recv() {
            self.dispatch(&event);
            delivered += 1;
        }
        delivered
    }

    /// Deliver events from other threads on `main` as they arrive
    ///
    /// # Errors
    /// `PrefError::Config` unless `main` is the owner thread.
    pub fn deliver_events_on(&self, main: MainThreadHandle) -> PrefResult<()> {
        if main.thread_id() != self.inner.owner {
            return Err(PrefError::Config(
                "events can only be delivered on the owner thread".to_string(),
            ));
        }
        *self.inner.event_thread.lock() = Some(main);
        Ok(())
    }

    // ---- cell factories -------------------------------------------------

    /// Cell with a custom codec
    pub fn define<T, C>(
        &self,
        key: impl Into<String>,
        default: T,
        codec: C,
        on_change: impl Into<OnChange>,
    ) -> Pref<T>
    where
        T: Clone + Send + Sync + 'static,
        C: ValueCodec<T> + 'static,
    {
        self.assert_owner("define");
        let state = CellState::new(key.into(), default, Box::new(codec), on_change.into(), None);
        Pref::new(self.clone(), state)
    }

    /// Cell with a custom codec and a hook receiving replaced values
    pub fn define_with_disposal<T, C>(
        &self,
        key: impl Into<String>,
        default: T,
        codec: C,
        on_change: impl Into<OnChange>,
        dispose: impl Fn(T) + Send + Sync + 'static,
    ) -> Pref<T>
    where
        T: Clone + Send + Sync + 'static,
        C: ValueCodec<T> + 'static,
    {
        self.assert_owner("define");
        let state = CellState::new(
            key.into(),
            default,
            Box::new(codec),
            on_change.into(),
            Some(Box::new(dispose)),
        );
        Pref::new(self.clone(), state)
    }

    /// Bool cell
    pub fn define_bool(
        &self,
        key: impl Into<String>,
        default: bool,
        on_change: impl Into<OnChange>,
    ) -> Pref<bool> {
        self.define(key, default, BoolCodec, on_change)
    }

    /// Int cell
    pub fn define_int(
        &self,
        key: impl Into<String>,
        default: i32,
        on_change: impl Into<OnChange>,
    ) -> Pref<i32> {
        self.define(key, default, IntCodec, on_change)
    }

    /// Float cell
    pub fn define_float(
        &self,
        key: impl Into<String>,
        default: f32,
        on_change: impl Into<OnChange>,
    ) -> Pref<f32> {
        self.define(key, default, FloatCodec, on_change)
    }

    /// String cell
    pub fn define_string(
        &self,
        key: impl Into<String>,
        default: impl Into<String>,
        on_change: impl Into<OnChange>,
    ) -> Pref<String> {
        self.define(key, default.into(), StringCodec, on_change)
    }

    /// Optional string cell; setting `None` removes the key
    pub fn define_nullable_string(
        &self,
        key: impl Into<String>,
        default: Option<String>,
        on_change: impl Into<OnChange>,
    ) -> Pref<Option<String>> {
        self.define(key, default, NullableStringCodec, on_change)
    }

    /// String-set cell
    pub fn define_string_set(
        &self,
        key: impl Into<String>,
        default: BTreeSet<String>,
        on_change: impl Into<OnChange>,
    ) -> Pref<BTreeSet<String>> {
        self.define(key, default, StringSetCodec, on_change)
    }

    /// Int cell stored as a decimal string
    pub fn define_string_int(
        &self,
        key: impl Into<String>,
        default: i32,
        on_change: impl Into<OnChange>,
    ) -> Pref<i32> {
        self.define(key, default, StringIntCodec, on_change)
    }

    /// Alpha (0..=255) cell stored as a fraction
    pub fn define_alpha(
        &self,
        key: impl Into<String>,
        default: i32,
        on_change: impl Into<OnChange>,
    ) -> Pref<i32> {
        self.define(key, default, AlphaCodec, on_change)
    }

    /// Pixel dimension cell; `default` is in density-independent units
    pub fn define_dimension(
        &self,
        key: impl Into<String>,
        default: f32,
        on_change: impl Into<OnChange>,
    ) -> Pref<f32> {
        let codec = DimensionCodec::new(self.inner.config.density);
        self.define(key, default, codec, on_change)
    }

    /// Cell stored through a string conversion pair
    pub fn define_string_based<T>(
        &self,
        key: impl Into<String>,
        default: T,
        codec: StringBasedCodec<T>,
        on_change: impl Into<OnChange>,
        dispose: impl Fn(T) + Send + Sync + 'static,
    ) -> Pref<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.define_with_disposal(key, default, codec, on_change, dispose)
    }

    /// List cell stored as a JSON array
    pub fn define_list<T>(
        &self,
        key: impl Into<String>,
        default: Vec<T>,
        flattener: impl Flatten<T> + 'static,
        on_change: impl Into<OnChange>,
    ) -> MutableListPref<T>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
    {
        self.assert_owner("define_list");
        MutableListPref::new(
            self.clone(),
            key.into(),
            default,
            Box::new(flattener),
            on_change.into(),
        )
    }

    /// Map cell stored as a JSON object
    pub fn define_map<K, V>(
        &self,
        key: impl Into<String>,
        default: HashMap<K, V>,
        keys: impl Flatten<K> + 'static,
        values: impl Flatten<V> + 'static,
        on_change: impl Into<OnChange>,
    ) -> MutableMapPref<K, V>
    where
        K: Clone + Eq + Hash + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        self.assert_owner("define_map");
        MutableMapPref::new(
            self.clone(),
            key.into(),
            default,
            Box::new(keys),
            Box::new(values),
            on_change.into(),
        )
    }

    /// Value computed on first access and reset by [`destroy`](Self::destroy)
    pub fn derived<T: Send + Sync + 'static>(
        &self,
        create: impl Fn() -> T + Send + Sync + 'static,
    ) -> ResettableLazy<T> {
        self.assert_owner("derived");
        let lazy = ResettableLazy::new(create);
        let mut derived = self.inner.derived.lock();
        derived.retain(|d| d.strong_count() > 0);
        derived.push(lazy.as_resettable());
        lazy
    }

    // ---- transactions ---------------------------------------------------

    /// Whether writes commit synchronously
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        self.assert_owner("is_blocking");
        self.inner.tx.is_blocking()
    }

    /// Switch blocking mode, returning the previous setting
    pub fn set_blocking(&self, blocking: bool) -> bool {
        self.assert_owner("set_blocking");
        self.inner.tx.set_blocking(blocking)
    }

    /// Whether a bulk edit is open
    #[must_use]
    pub fn is_bulk(&self) -> bool {
        self.assert_owner("is_bulk");
        self.inner.tx.is_bulk()
    }

    /// Open a bulk edit
    ///
    /// # Errors
    /// `TransactionError::BulkAlreadyActive` if one is open.
    pub fn begin_bulk(&self) -> PrefResult<()> {
        self.assert_owner("begin_bulk");
        self.inner.tx.begin_bulk()
    }

    /// Finish the bulk edit as one backend operation
    ///
    /// # Errors
    /// `TransactionError::BulkNotActive` without an open edit;
    /// `PrefError::CommitFailed` if the blocking commit fails, in which case
    /// every cell written during the session is refreshed from the backend.
    pub fn end_bulk(&self) -> PrefResult<()> {
        self.assert_owner("end_bulk");
        let edit = self.inner.tx.take_bulk()?;
        let keys = edit.keys();
        let raw = std::mem::take(&mut *self.inner.raw_pending.lock());
        match self.inner.tx.finish_bulk(edit) {
            Ok(()) => {
                // other writers may have changed these keys mid-session and
                // the echo of this commit does not reach the cells
                self.invalidate_keys(&raw);
                self.refresh_keys(&keys);
                Ok(())
            }
            Err(err) => {
                self.invalidate_keys(&keys);
                Err(err)
            }
        }
    }

    /// Discard the bulk edit, returning the keys it touched
    ///
    /// # Errors
    /// `TransactionError::BulkNotActive` without an open edit.
    pub fn abort_bulk(&self) -> PrefResult<Vec<String>> {
        self.assert_owner("abort_bulk");
        self.discard_bulk()
    }

    fn discard_bulk(&self) -> PrefResult<Vec<String>> {
        let edit = self.inner.tx.take_bulk()?;
        let keys = edit.keys();
        self.inner.raw_pending.lock().clear();
        tracing::warn!(ops = edit.len(), "bulk edit discarded");
        self.invalidate_keys(&keys);
        Ok(keys)
    }

    fn invalidate_keys(&self, keys: &[String]) {
        for key in keys {
            if let Some(hook) = self.inner.hub.hook(key) {
                hook.invalidate(self);
            }
        }
    }

    fn refresh_keys(&self, keys: &[String]) {
        for key in keys {
            if let Some(hook) = self.inner.hub.hook(key) {
                hook.refresh(self);
            }
        }
    }

    /// Run `f` with blocking mode on, then restore the previous mode
    pub fn blocking_edit<R>(&self, f: impl FnOnce() -> R) -> R {
        let _restore = BlockingScope {
            tx: &self.inner.tx,
            previous: self.set_blocking(true),
        };
        f()
    }

    /// Run `f` inside a bulk edit and finish it
    ///
    /// # Errors
    /// Transaction misuse or a failed blocking commit.
    pub fn bulk_edit<R>(&self, f: impl FnOnce() -> R) -> PrefResult<R> {
        self.try_bulk_edit(|| Ok(f()))
    }

    /// Run `f` inside a bulk edit; finish it on `Ok`, discard it on `Err`
    ///
    /// # Errors
    /// The error of `f`, transaction misuse, or a failed blocking commit.
    pub fn try_bulk_edit<R>(&self, f: impl FnOnce() -> PrefResult<R>) -> PrefResult<R> {
        self.begin_bulk()?;
        let mut scope = BulkScope { prefs: self, armed: true };
        let result = f();
        scope.armed = false;

        match result {
            Ok(value) => {
                self.end_bulk()?;
                Ok(value)
            }
            Err(err) => {
                self.discard_bulk()?;
                Err(err)
            }
        }
    }

    /// Write raw ops through the current transaction mode
    ///
    /// Cells defined for the touched keys are refreshed from the backend
    /// once the write lands (at the end of the bulk edit, if one is open).
    /// Their side effects do not fire.
    ///
    /// # Errors
    /// `PrefError::CommitFailed` if a blocking commit fails.
    pub fn write_raw(&self, fill: impl FnOnce(&mut Edit)) -> PrefResult<()> {
        self.assert_owner("write_raw");
        let mut raw = Edit::new();
        fill(&mut raw);
        let keys = raw.keys();
        self.inner.tx.write(|edit| edit.extend(raw))?;

        if self.inner.tx.is_bulk() {
            self.inner.raw_pending.lock().extend(keys);
        } else {
            self.invalidate_keys(&keys);
        }
        Ok(())
    }

    // ---- version gate ---------------------------------------------------

    /// Stored schema version
    ///
    /// Absent versions read as the current version, or as `0` when the
    /// store was restored from a backup.
    #[must_use]
    pub fn config_version(&self) -> i32 {
        self.assert_owner("config_version");
        let config = &self.inner.config;
        let restored = self.backend().get_bool(&config.restore_key, false);
        let fallback = if restored { 0 } else { config.current_version };
        self.backend().get_int(&config.version_key, fallback)
    }

    /// Migrate when the stored version differs from the current one
    ///
    /// `migrate` receives the stored version and runs in blocking + bulk
    /// mode; the new version is written last, in the same edit. Returns
    /// whether a migration ran.
    ///
    /// # Errors
    /// `PrefError::Migration` if `migrate` fails (nothing it wrote is kept),
    /// or `PrefError::CommitFailed` if the final commit fails.
    pub fn run_version_gate<E, F>(&self, migrate: F) -> PrefResult<bool>
    where
        E: fmt::Display,
        F: FnOnce(&Preferences, i32) -> Result<(), E>,
    {
        let stored = self.config_version();
        let target = self.inner.config.current_version;
        if stored == target {
            tracing::debug!(version = stored, "preferences up to date");
            return Ok(false);
        }

        tracing::info!(from = stored, to = target, "migrating preferences");
        let version_key = self.inner.config.version_key.clone();
        self.blocking_edit(|| {
            self.try_bulk_edit(|| {
                migrate(self, stored).map_err(|err| PrefError::migration(target, err))?;
                self.inner.tx.write(|edit| {
                    edit.put_int(version_key, target);
                })
            })
        })?;
        tracing::info!(version = target, "preferences migrated");
        Ok(true)
    }

    // ---- listeners ------------------------------------------------------

    /// Register `listener` for each of `keys`
    ///
    /// Each key is delivered once immediately with `forced = true`, also
    /// when the listener was already registered for it.
    pub fn add_listener(&self, keys: &[&str], listener: ListenerHandle) {
        self.assert_owner("add_listener");
        for key in keys {
            if !self.inner.hub.add_listener(key, &listener) {
                tracing::trace!(key, "listener already registered");
            }
            listener.on_value_changed(key, self, true);
        }
    }

    /// Unregister `listener` from each of `keys`
    pub fn remove_listener(&self, keys: &[&str], listener: &ListenerHandle) {
        self.assert_owner("remove_listener");
        for key in keys {
            self.inner.hub.remove_listener(key, listener);
        }
    }

    /// Number of listener registrations across all keys
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.assert_owner("listener_count");
        self.inner.hub.listener_count()
    }

    /// Install the system-wide side-effect receiver, replacing any other
    pub fn register_callback(&self, callback: Arc<dyn ChangeCallback>) {
        self.assert_owner("register_callback");
        self.inner.hub.set_callback(Some(callback));
    }

    /// Remove the side-effect receiver
    pub fn unregister_callback(&self) {
        self.assert_owner("unregister_callback");
        self.inner.hub.set_callback(None);
    }

    // ---- teardown -------------------------------------------------------

    /// Detach from the backend and drop registrations and derived values
    ///
    /// Cells keep working against the backend but no longer see changes
    /// made by other writers.
    pub fn destroy(&self) {
        self.assert_owner("destroy");
        if self.inner.tx.is_bulk() {
            if let Ok(edit) = self.inner.tx.take_bulk() {
                tracing::warn!(ops = edit.len(), "bulk edit open at teardown; discarded");
            }
        }
        self.inner.raw_pending.lock().clear();
        self.inner.event_thread.lock().take();
        while self.inner.queued_rx.try_recv().is_ok() {}
        self.inner.hub.clear();
        for derived in self.inner.derived.lock().drain(..) {
            if let Some(derived) = derived.upgrade() {
                derived.reset();
            }
        }
        self.inner.detach();
        tracing::debug!(name = %self.inner.config.name, "preference store destroyed");
    }
}

impl fmt::Debug for Preferences {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Preferences")
            .field("name", &self.inner.config.name)
            .field("writer", &self.writer_id())
            .field("tx", &self.inner.tx)
            .field("hub", &self.inner.hub)
            .finish_non_exhaustive()
    }
}

struct BlockingScope<'a> {
    tx: &'a TransactionController,
    previous: bool,
}

impl Drop for BlockingScope<'_> {
    fn drop(&mut self) {
        self.tx.set_blocking(self.previous);
    }
}

struct BulkScope<'a> {
    prefs: &'a Preferences,
    armed: bool,
}

impl Drop for BulkScope<'_> {
    fn drop(&mut self) {
        if self.armed {
            // unwinding out of the closure
            let _ = self.prefs.discard_bulk();
        }
    }
}
