//! One-time rename of a store document saved under an old name

use crate::error::{BackendError, BackendResult};
use crate::file::store_path;
use std::fs;
use std::path::Path;

/// Move `dir/<old_name>.json` to `dir/<new_name>.json`
///
/// Only happens when the old document exists and the new one does not.
/// Returns whether a rename took place. Not transactional: callers run it
/// once, before opening the store.
///
/// # Errors
/// Returns `BackendError::Io` if the rename itself fails.
pub fn migrate_legacy_file(dir: &Path, old_name: &str, new_name: &str) -> BackendResult<bool> {
    let old_path = store_path(dir, old_name);
    let new_path = store_path(dir, new_name);
    if old_name == new_name || !old_path.exists() || new_path.exists() {
        return Ok(false);
    }

    fs::rename(&old_path, &new_path).map_err(|e| BackendError::io_error(&old_path, e))?;
    tracing::info!(
        from = %old_path.display(),
        to = %new_path.display(),
        "renamed legacy preference file"
    );
    Ok(true)
}
