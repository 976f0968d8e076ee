//! Version-gated migration, restore marker and file-backed opening.

use pretty_assertions::assert_eq;
use prefs_backend::{Edit, FileBackend, KeyValueBackend, Primitive};
use prefs_core::{OnChange, PrefError, Preferences, PreferencesConfig, ThreadPolicy};
use prefs_test_utils::{test_config, test_prefs, test_prefs_with, RecordingBackend, WriteKind};
use std::sync::Arc;

/// Moves the legacy int grid setting to the string-encoded key.
fn migrate_grid(prefs: &Preferences, _from: i32) -> Result<(), PrefError> {
    let legacy = prefs.backend().get("grid_cols").and_then(|p| p.as_int());
    if let Some(columns) = legacy {
        prefs.write_raw(|e| {
            e.put_string("workspace_columns", columns.to_string())
                .remove("grid_cols");
        })?;
    }
    Ok(())
}

fn seeded(version: i32, grid_cols: i32) -> RecordingBackend {
    let backend = RecordingBackend::new();
    let mut edit = Edit::new();
    edit.put_int("config_version", version).put_int("grid_cols", grid_cols);
    backend.memory().commit(edit).unwrap();
    backend
}

#[test]
fn fresh_store_skips_migration() {
    let (backend, prefs) = test_prefs();
    let ran = prefs.run_version_gate(|_, _| Err::<(), _>("must not run")).unwrap();

    assert!(!ran);
    assert_eq!(backend.write_count(), 0);
    assert_eq!(prefs.config_version(), prefs.config().current_version);
}

#[test]
fn migration_runs_once_in_one_blocking_commit() {
    let (backend, prefs) = test_prefs_with(seeded(100, 6), test_config());

    let mut seen_from = None;
    let ran = prefs
        .run_version_gate(|p, from| {
            seen_from = Some(from);
            migrate_grid(p, from)
        })
        .unwrap();

    assert!(ran);
    assert_eq!(seen_from, Some(100));
    let writes = backend.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].kind, WriteKind::Commit);
    assert_eq!(writes[0].keys, vec!["workspace_columns", "grid_cols", "config_version"]);
    assert!(!prefs.is_bulk());
    assert!(!prefs.is_blocking());

    let columns = prefs.define_string_int("workspace_columns", 4, OnChange::Nothing);
    assert_eq!(columns.get(), 6);
    assert_eq!(prefs.config_version(), 200);

    assert!(!prefs.run_version_gate(migrate_grid).unwrap());
    assert_eq!(backend.write_count(), 1);
}

#[test]
fn rerunning_an_interrupted_migration_converges() {
    let (backend, prefs) = test_prefs_with(seeded(100, 6), test_config());
    prefs.run_version_gate(migrate_grid).unwrap();
    let once = backend.memory().snapshot();

    // Interrupted before the version landed: the version is stale again.
    let mut edit = Edit::new();
    edit.put_int("config_version", 100);
    backend.memory().commit(edit).unwrap();

    assert!(prefs.run_version_gate(migrate_grid).unwrap());
    assert_eq!(backend.memory().snapshot(), once);
}

#[test]
fn failed_migration_keeps_nothing() {
    let (backend, prefs) = test_prefs_with(seeded(100, 6), test_config());
    let columns = prefs.define_string_int("workspace_columns", 4, OnChange::Nothing);

    let err = prefs
        .run_version_gate(|p, _| {
            columns.set(9)?;
            p.write_raw(|e| {
                e.remove("grid_cols");
            })?;
            Err(PrefError::Config("disk layout unknown".to_string()))
        })
        .unwrap_err();

    assert!(matches!(err, PrefError::Migration { target: 200, .. }));
    assert_eq!(backend.write_count(), 0);
    assert_eq!(prefs.config_version(), 100);
    assert_eq!(backend.memory().get("grid_cols"), Some(Primitive::Int(6)));
    assert_eq!(columns.get(), 4);
    assert!(!prefs.is_bulk());
}

#[test]
fn restored_backup_always_migrates() {
    let backend = RecordingBackend::new();
    let mut edit = Edit::new();
    edit.put_bool("pref_restoreSuccess", true);
    backend.memory().commit(edit).unwrap();

    let mut ran_from = None;
    let prefs = Preferences::init(Arc::new(backend.clone()), test_config(), |_, from| {
        ran_from = Some(from);
        Ok::<_, PrefError>(())
    })
    .unwrap();

    assert_eq!(ran_from, Some(0));
    assert_eq!(prefs.config_version(), 200);
}

#[test]
fn file_store_renames_legacy_document_and_migrates() {
    let dir = tempfile::tempdir().unwrap();
    {
        let legacy = FileBackend::open_in(dir.path(), "launcher").unwrap();
        let mut edit = Edit::new();
        edit.put_int("config_version", 100).put_int("grid_cols", 5);
        legacy.commit(edit).unwrap();
    }

    let config = PreferencesConfig::new()
        .with_name("launcher_prefs")
        .with_legacy_name("launcher")
        .with_directory(dir.path())
        .with_thread_policy(ThreadPolicy::Unchecked);
    let prefs = Preferences::open_with_migration(config, migrate_grid).unwrap();

    assert!(!dir.path().join("launcher.json").exists());
    assert!(dir.path().join("launcher_prefs.json").exists());
    assert_eq!(prefs.config_version(), 200);
    drop(prefs);

    let reopened = FileBackend::open_in(dir.path(), "launcher_prefs").unwrap();
    assert_eq!(reopened.get_string("workspace_columns", ""), "5");
    assert_eq!(reopened.get_int("config_version", 0), 200);
    assert!(!reopened.contains("grid_cols"));
}

#[test]
fn opening_without_directory_is_a_config_error() {
    let result = Preferences::open(PreferencesConfig::new());
    assert!(matches!(result, Err(PrefError::Config(_))));
}
