//! Process-wide instance slot and designated-thread construction.
//!
//! The slot is process-global, so the whole lifecycle runs in one test.

use prefs_backend::MemoryBackend;
use prefs_core::{global, MainThread, OnChange, PrefError, Preferences, PreferencesConfig};
use std::sync::Arc;

fn factory() -> Result<Preferences, PrefError> {
    Preferences::with_backend(Arc::new(MemoryBackend::new()), PreferencesConfig::new())
}

#[test]
fn shared_instance_lifecycle() {
    let main = MainThread::spawn("prefs-main").unwrap();
    assert!(global::instance_no_create().is_none());

    // Construction is marshalled to the designated thread.
    let prefs = global::instance(&main, factory).unwrap();
    assert_eq!(prefs.owner_thread(), main.thread_id());
    assert!(!prefs.is_owner_thread());

    // Later callers get the same store without running their factory.
    let again = global::instance(&main, || Err(PrefError::Config("ran twice".to_string()))).unwrap();
    assert!(prefs.same_store(&again));

    let from_worker = {
        let main = &main;
        std::thread::scope(|s| s.spawn(move || global::instance(main, factory)).join().unwrap())
    }
    .unwrap();
    assert!(prefs.same_store(&from_worker));

    // Owner-only cells are used on the designated thread.
    let definer = prefs.clone();
    let columns = main
        .run_blocking(move || definer.define_int("columns", 4, OnChange::Nothing))
        .unwrap();
    let on_main = columns.clone();
    main.run_blocking(move || on_main.set(6)).unwrap().unwrap();
    let read = columns.clone();
    assert_eq!(main.run_blocking(move || read.get()).unwrap(), 6);

    assert!(global::destroy_instance(&main).unwrap());
    assert!(!global::destroy_instance(&main).unwrap());
    assert!(global::instance_no_create().is_none());

    // A failing factory leaves the slot empty.
    let err = global::instance(&main, || Err(PrefError::Config("no disk".to_string()))).unwrap_err();
    assert!(matches!(err, PrefError::Config(_)));
    assert!(global::instance_no_create().is_none());

    // A panicking factory surfaces as a marshalling error.
    let err = global::instance(&main, || -> Result<Preferences, PrefError> {
        panic!("factory exploded")
    })
    .unwrap_err();
    assert!(matches!(err, PrefError::Marshal(_)));
    assert!(global::instance_no_create().is_none());
}
