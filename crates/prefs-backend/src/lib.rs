//! Prefs Backend
//!
//! The flat, string-keyed persistence layer underneath the typed preference
//! store.
//!
//! # Overview
//!
//! - [`Primitive`]: the five storable shapes (bool, int, float, string,
//!   string set)
//! - [`Edit`]: buffered puts/removes, finished by `commit` (durable,
//!   reported) or `apply` (in memory now, persisted in the background)
//! - [`KeyValueBackend`]: the contract consumed by `prefs-core`
//! - [`MemoryBackend`]: shared in-process store
//! - [`FileBackend`]: JSON document on disk with a background writer
//!
//! # Example
//!
//! ```rust
//! use prefs_backend::{KeyValueBackend, MemoryBackend};
//!
//! let backend = MemoryBackend::new();
//! let mut edit = backend.edit();
//! edit.put_int("columns", 5);
//! backend.commit(edit).unwrap();
//!
//! assert_eq!(backend.get_int("columns", 4), 5);
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod backend;
pub mod edit;
pub mod error;
pub mod file;
pub mod legacy;
pub mod memory;
pub mod primitive;
pub mod subscription;

// Re-exports
pub use backend::{apply_edit, KeyValueBackend, Snapshot};
pub use edit::{Edit, EditOp, WriterId};
pub use error::{BackendError, BackendResult};
pub use file::{store_path, FileBackend, STORE_EXTENSION};
pub use legacy::migrate_legacy_file;
pub use memory::MemoryBackend;
pub use primitive::{Primitive, PrimitiveKind};
pub use subscription::{ChangeEvent, ChangeSink, SubscriberList, SubscriptionId};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
