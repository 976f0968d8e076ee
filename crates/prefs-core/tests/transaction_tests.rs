//! Bulk and blocking edit modes against a recording backend.

use pretty_assertions::assert_eq;
use prefs_backend::KeyValueBackend;
use prefs_core::{OnChange, PrefError, SideEffect, StringFlattener, TransactionError};
use prefs_test_utils::{
    test_config, test_prefs, test_prefs_with, RecordedWrite, RecordingCallback, RecordingListener,
    WriteKind,
};

fn keys(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

#[test]
fn bulk_session_produces_one_commit() {
    let (backend, prefs) = test_prefs();
    let columns = prefs.define_int("columns", 4, OnChange::Nothing);
    let blur = prefs.define_bool("blur", false, OnChange::Nothing);
    let hidden = prefs.define_list("hidden_apps", Vec::new(), StringFlattener, OnChange::Nothing);

    prefs.set_blocking(true);
    prefs.begin_bulk().unwrap();
    columns.set(5).unwrap();
    blur.set(true).unwrap();
    hidden.add("clock".to_string()).unwrap();
    assert_eq!(backend.write_count(), 0);
    prefs.end_bulk().unwrap();

    assert_eq!(
        backend.writes(),
        vec![RecordedWrite {
            kind: WriteKind::Commit,
            keys: keys(&["columns", "blur", "hidden_apps"]),
            ops: 3,
        }]
    );
}

#[test]
fn non_blocking_bulk_session_produces_one_apply() {
    let (backend, prefs) = test_prefs();
    let columns = prefs.define_int("columns", 4, OnChange::Nothing);

    prefs
        .bulk_edit(|| {
            for n in 0..10 {
                columns.set(n).unwrap();
            }
        })
        .unwrap();

    assert_eq!(backend.apply_count(), 1);
    assert_eq!(backend.commit_count(), 0);
    assert_eq!(backend.writes()[0].ops, 10);
    assert_eq!(backend.memory().get_int("columns", 0), 9);
}

#[test]
fn listeners_hear_bulk_writes_on_end() {
    let (_backend, prefs) = test_prefs();
    let columns = prefs.define_int("columns", 4, OnChange::Nothing);
    let listener = RecordingListener::new();
    prefs.add_listener(&["columns"], listener.handle());

    prefs.begin_bulk().unwrap();
    columns.set(5).unwrap();
    assert_eq!(listener.change_count(), 0);
    prefs.end_bulk().unwrap();

    assert_eq!(listener.change_count(), 1);
}

#[test]
fn nested_bulk_is_a_hard_error_that_keeps_buffered_writes() {
    let (backend, prefs) = test_prefs();
    let columns = prefs.define_int("columns", 4, OnChange::Nothing);

    prefs.begin_bulk().unwrap();
    columns.set(6).unwrap();
    let err = prefs.begin_bulk().unwrap_err();
    assert!(matches!(
        err,
        PrefError::Transaction(TransactionError::BulkAlreadyActive)
    ));
    assert!(err.is_misuse());

    prefs.end_bulk().unwrap();
    assert_eq!(backend.memory().get_int("columns", 4), 6);
}

#[test]
fn ending_without_session_is_an_error() {
    let (_backend, prefs) = test_prefs();
    assert!(matches!(
        prefs.end_bulk(),
        Err(PrefError::Transaction(TransactionError::BulkNotActive))
    ));
    assert!(matches!(
        prefs.abort_bulk(),
        Err(PrefError::Transaction(TransactionError::BulkNotActive))
    ));
}

#[test]
fn blocking_commit_failure_reaches_the_writer() {
    let (backend, prefs) = test_prefs();
    let callback = RecordingCallback::new();
    prefs.register_callback(callback.clone());
    let columns = prefs.define_int("columns", 4, SideEffect::RefreshGrid);

    prefs.set_blocking(true);
    backend.fail_next_commits(1);
    let err = columns.set(6).unwrap_err();

    assert!(matches!(err, PrefError::CommitFailed(_)));
    assert!(!columns.is_cached());
    assert_eq!(columns.get(), 4);
    assert!(callback.effects().is_empty());

    // not retried, but the next write goes through
    columns.set(6).unwrap();
    assert_eq!(backend.memory().get_int("columns", 4), 6);
}

#[test]
fn failed_bulk_commit_refreshes_written_cells() {
    let (backend, prefs) = test_prefs();
    let columns = prefs.define_int("columns", 4, OnChange::Nothing);
    let hidden = prefs.define_list("hidden_apps", Vec::new(), StringFlattener, OnChange::Nothing);

    let result = prefs.blocking_edit(|| {
        prefs.bulk_edit(|| {
            columns.set(7).unwrap();
            hidden.add("mail".to_string()).unwrap();
            backend.fail_next_commits(1);
        })
    });

    assert!(matches!(result, Err(PrefError::CommitFailed(_))));
    assert!(!prefs.is_bulk());
    assert!(!prefs.is_blocking());
    assert_eq!(columns.get(), 4);
    assert!(hidden.is_empty());
}

#[test]
fn aborted_bulk_returns_touched_keys() {
    let (backend, prefs) = test_prefs();
    let columns = prefs.define_int("columns", 4, OnChange::Nothing);

    prefs.begin_bulk().unwrap();
    columns.set(8).unwrap();
    prefs.write_raw(|e| {
        e.remove("legacy_grid");
    })
    .unwrap();

    let touched = prefs.abort_bulk().unwrap();
    assert_eq!(touched, keys(&["columns", "legacy_grid"]));
    assert_eq!(columns.get(), 4);
    assert_eq!(backend.write_count(), 0);
}

#[test]
fn empty_bulk_session_writes_nothing() {
    let (backend, prefs) = test_prefs();
    prefs.bulk_edit(|| ()).unwrap();
    assert_eq!(backend.write_count(), 0);
}

#[test]
fn finished_bulk_corrects_cells_that_read_a_foreign_write() {
    let (backend, ours) = test_prefs();
    let (_, theirs) = test_prefs_with(backend.clone(), test_config());
    let rows = ours.define_int("rows", 4, OnChange::Nothing);
    let hidden = ours.define_list("hidden_apps", Vec::new(), StringFlattener, OnChange::Nothing);
    let their_rows = theirs.define_int("rows", 4, OnChange::Nothing);
    let their_hidden = theirs.define_list("hidden_apps", Vec::new(), StringFlattener, OnChange::Nothing);

    ours.begin_bulk().unwrap();
    rows.set(1).unwrap();
    hidden.add("mail".to_string()).unwrap();
    their_rows.set(2).unwrap();
    their_hidden.add("clock".to_string()).unwrap();
    assert_eq!(rows.get(), 2);
    assert_eq!(hidden.to_vec(), keys(&["clock"]));
    ours.end_bulk().unwrap();

    assert_eq!(backend.memory().get_int("rows", 0), 1);
    assert_eq!(rows.get(), 1);
    assert_eq!(hidden.to_vec(), keys(&["mail"]));
    assert_eq!(their_rows.get(), 1);
    assert_eq!(their_hidden.to_vec(), keys(&["mail"]));
}

#[test]
fn finished_bulk_keeps_matching_cached_values() {
    let (backend, prefs) = test_prefs();
    let rows = prefs.define_int("rows", 4, OnChange::Nothing);

    prefs.bulk_edit(|| rows.set(3).unwrap()).unwrap();
    backend.reset_counts();

    assert!(rows.is_cached());
    assert_eq!(rows.get(), 3);
    assert_eq!(backend.read_count(), 0);
}
