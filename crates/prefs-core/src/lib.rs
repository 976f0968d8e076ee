//! Prefs Core - typed preference cells
//!
//! Sits on a flat [`KeyValueBackend`](prefs_backend::KeyValueBackend) and
//! provides:
//! - Typed cells with per-key encodings ([`Pref`])
//! - List and map cells persisted as JSON ([`MutableListPref`], [`MutableMapPref`])
//! - Cache invalidation on changes by other writers
//! - Keyed listeners with forced delivery on registration
//! - Bulk and blocking edit modes
//! - A version gate for one-time migrations
//!
//! # Example
//!
//! ```rust
//! use prefs_backend::MemoryBackend;
//! use prefs_core::{OnChange, Preferences, PreferencesConfig, SideEffect};
//! use std::sync::Arc;
//!
//! let prefs = Preferences::with_backend(
//!     Arc::new(MemoryBackend::new()),
//!     PreferencesConfig::new(),
//! )?;
//!
//! let columns = prefs.define_string_int("workspace_columns", 4, SideEffect::RefreshGrid);
//! let blur = prefs.define_bool("blur", false, OnChange::Nothing);
//!
//! prefs.bulk_edit(|| -> prefs_core::PrefResult<()> {
//!     columns.set(5)?;
//!     blur.set(true)
//! })??;
//!
//! assert_eq!(columns.get(), 5);
//! # Ok::<(), prefs_core::PrefError>(())
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Core modules
pub mod cell;
pub mod codec;
pub mod collections;
pub mod config;
pub mod derived;
pub mod dispatcher;
pub mod error;
pub mod global;
pub mod hub;
pub mod store;
pub mod transaction;

// Re-exports for convenience
pub use cell::Pref;
pub use codec::{
    decode_list, decode_map, decode_or_default, encode_list, encode_map, AlphaCodec, BoolCodec,
    DimensionCodec, Flatten, FloatCodec, FnFlattener, IntCodec, NullableStringCodec,
    ParseFlattener, StringBasedCodec, StringCodec, StringFlattener, StringIntCodec,
    StringSetCodec, ValueCodec,
};
pub use collections::{MutableListPref, MutableMapPref};
pub use config::{PreferencesConfig, ThreadPolicy, DEFAULT_CURRENT_VERSION};
pub use derived::ResettableLazy;
pub use dispatcher::{MainThread, MainThreadHandle};
pub use error::{CodecError, PrefError, PrefResult, TransactionError};
pub use hub::{ChangeCallback, ListenerHandle, OnChange, PreferenceListener, SideEffect};
pub use store::Preferences;
pub use transaction::TransactionController;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for defining and observing preferences
    pub use crate::{
        ChangeCallback, MutableListPref, MutableMapPref, OnChange, Pref, PrefError, PrefResult,
        PreferenceListener, Preferences, PreferencesConfig, SideEffect,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
