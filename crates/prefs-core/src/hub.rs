//! Change notification hub
//!
//! Fans backend change events out to:
//! 1. the cell registered for the key (cache invalidation + side effect)
//! 2. every keyed listener registered for the key
//! 3. the single system-wide [`ChangeCallback`], via the cell's
//!    [`OnChange::Effect`]
//!
//! Events that echo this store's own writes skip step 1: the cell already
//! holds the written value and fired its side effect at write time. A
//! finished bulk edit re-checks its cells separately, since other writers
//! may have changed them while it was open.

use crate::store::Preferences;
use dashmap::DashMap;
use parking_lot::RwLock;
use prefs_backend::{ChangeEvent, WriterId};
use std::fmt;
use std::sync::{Arc, Weak};

/// High-level reaction requested by a preference change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SideEffect {
    /// Recreate the UI
    Recreate,
    /// Restart the process
    Restart,
    /// Reload the app list
    ReloadApps,
    /// Reload everything
    ReloadAll,
    /// Reload icons
    ReloadIcons,
    /// Recompute the grid
    RefreshGrid,
    /// Update background blur
    UpdateBlur,
    /// Update the smartspace widget
    UpdateSmartspace,
    /// Switch smartspace data provider
    UpdateSmartspaceProvider,
    /// Reset every app customization
    ResetAllApps,
    /// Redraw the page indicator
    UpdatePageIndicator,
}

/// Receiver of [`SideEffect`]s; at most one per store
pub trait ChangeCallback: Send + Sync {
    /// Perform `effect`
    fn on_side_effect(&self, effect: SideEffect);
}

/// Per-key reaction attached to a cell
#[derive(Clone, Default)]
pub enum OnChange {
    /// No reaction
    #[default]
    Nothing,
    /// Forward to the registered [`ChangeCallback`]
    Effect(SideEffect),
    /// Run a closure with the store
    Custom(Arc<dyn Fn(&Preferences) + Send + Sync>),
}

impl OnChange {
    /// Reaction running `f`
    pub fn custom(f: impl Fn(&Preferences) + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }

    pub(crate) fn fire(&self, prefs: &Preferences) {
        match self {
            Self::Nothing => {}
            Self::Effect(effect) => prefs.emit(*effect),
            Self::Custom(f) => f(prefs),
        }
    }
}

impl From<SideEffect> for OnChange {
    fn from(effect: SideEffect) -> Self {
        Self::Effect(effect)
    }
}

impl fmt::Debug for OnChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nothing => f.write_str("Nothing"),
            Self::Effect(effect) => f.debug_tuple("Effect").field(effect).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Observer of keyed value changes
///
/// `forced` is `true` only for the delivery made at registration time and
/// means "resynchronize", not "changed".
pub trait PreferenceListener: Send + Sync {
    /// Called for each change of a key this listener is registered on
    fn on_value_changed(&self, key: &str, prefs: &Preferences, forced: bool);
}

impl<F> PreferenceListener for F
where
    F: Fn(&str, &Preferences, bool) + Send + Sync,
{
    fn on_value_changed(&self, key: &str, prefs: &Preferences, forced: bool) {
        self(key, prefs, forced);
    }
}

/// Shared listener handle; identity is the allocation
pub type ListenerHandle = Arc<dyn PreferenceListener>;

fn same_listener(a: &ListenerHandle, b: &ListenerHandle) -> bool {
    Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
}

/// Cell-side reaction to a change made by another writer
pub(crate) trait ChangeHook: Send + Sync {
    /// Drop or refresh the cached value
    fn invalidate(&self, prefs: &Preferences);

    /// Re-check the cached value against the backend after this store's
    /// own write lands; no side effect
    fn refresh(&self, prefs: &Preferences) {
        self.invalidate(prefs);
    }

    /// Run the key's side effect
    fn fire(&self, prefs: &Preferences);
}

#[derive(Default)]
pub(crate) struct ChangeHub {
    hooks: DashMap<String, Weak<dyn ChangeHook>>,
    listeners: DashMap<String, Vec<ListenerHandle>>,
    callback: RwLock<Option<Arc<dyn ChangeCallback>>>,
}

impl ChangeHub {
    pub(crate) fn register_hook(&self, key: &str, hook: Weak<dyn ChangeHook>) {
        if let Some(previous) = self.hooks.insert(key.to_string(), hook) {
            if previous.strong_count() > 0 {
                tracing::debug!(key, "cell re-registered; the newest cell receives changes");
            }
        }
    }

    pub(crate) fn hook(&self, key: &str) -> Option<Arc<dyn ChangeHook>> {
        self.hooks.get(key).and_then(|hook| hook.upgrade())
    }

    /// Add `listener` for `key`; `false` if it was already registered
    pub(crate) fn add_listener(&self, key: &str, listener: &ListenerHandle) -> bool {
        let mut entry = self.listeners.entry(key.to_string()).or_default();
        if entry.iter().any(|l| same_listener(l, listener)) {
            return false;
        }
        entry.push(Arc::clone(listener));
        true
    }

    pub(crate) fn remove_listener(&self, key: &str, listener: &ListenerHandle) -> bool {
        let removed = match self.listeners.get_mut(key) {
            Some(mut entry) => {
                let before = entry.len();
                entry.retain(|l| !same_listener(l, listener));
                entry.len() != before
            }
            None => false,
        };
        self.listeners.remove_if(key, |_, list| list.is_empty());
        removed
    }

    pub(crate) fn listeners(&self, key: &str) -> Vec<ListenerHandle> {
        self.listeners
            .get(key)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    pub(crate) fn listener_count(&self) -> usize {
        self.listeners.iter().map(|entry| entry.len()).sum()
    }

    pub(crate) fn set_callback(&self, callback: Option<Arc<dyn ChangeCallback>>) {
        *self.callback.write() = callback;
    }

    pub(crate) fn callback(&self) -> Option<Arc<dyn ChangeCallback>> {
        self.callback.read().clone()
    }

    pub(crate) fn clear(&self) {
        self.listeners.clear();
        self.hooks.clear();
        self.set_callback(None);
    }

    /// Deliver one backend event; no registry lock is held while calling out
    pub(crate) fn dispatch(&self, prefs: &Preferences, event: &ChangeEvent, writer: WriterId) {
        let key = event.key.as_str();
        if event.is_from(writer) {
            tracing::trace!(key, "own write echoed");
        } else if let Some(hook) = self.hook(key) {
            tracing::trace!(key, "external change");
            hook.invalidate(prefs);
            hook.fire(prefs);
        }

        for listener in self.listeners(key) {
            listener.on_value_changed(key, prefs, false);
        }
    }
}

impl fmt::Debug for ChangeHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeHub")
            .field("hooks", &self.hooks.len())
            .field("listeners", &self.listener_count())
            .field("callback", &self.callback.read().is_some())
            .finish()
    }
}
