//! Process-wide store slot
//!
//! The first [`instance`] call constructs the store on the designated
//! thread; later calls return the same handle until [`destroy_instance`].
//! Change events raised on other threads are delivered on the designated
//! thread.

use crate::dispatcher::{MainThread, MainThreadHandle};
use crate::error::PrefResult;
use crate::store::Preferences;
use parking_lot::{const_mutex, Mutex};

static INSTANCE: Mutex<Option<Preferences>> = const_mutex(None);

/// Shared store, created by `factory` on `main` if none exists
///
/// Callers on other threads block until construction finishes.
///
/// # Errors
/// The factory's error, or `PrefError::Marshal` if construction could not
/// run on the designated thread.
pub fn instance<F>(main: &MainThread, factory: F) -> PrefResult<Preferences>
where
    F: FnOnce() -> PrefResult<Preferences> + Send + 'static,
{
    if let Some(existing) = instance_no_create() {
        return Ok(existing);
    }

    let handle = main.handle();
    if main.is_current() {
        create(factory, handle)
    } else {
        main.run_blocking(move || create(factory, handle))?
    }
}

fn create<F>(factory: F, main: MainThreadHandle) -> PrefResult<Preferences>
where
    F: FnOnce() -> PrefResult<Preferences>,
{
    if let Some(existing) = instance_no_create() {
        return Ok(existing);
    }

    let created = factory()?;
    if created.is_owner_thread() {
        created.deliver_events_on(main)?;
    } else {
        tracing::debug!("factory returned a store owned by another thread");
    }

    let mut slot = INSTANCE.lock();
    match slot.as_ref() {
        // a factory that itself called `instance` won the race
        Some(existing) => Ok(existing.clone()),
        None => {
            tracing::debug!(name = %created.config().name, "shared preference store installed");
            *slot = Some(created.clone());
            Ok(created)
        }
    }
}

/// Shared store if it has been created
#[must_use]
pub fn instance_no_create() -> Option<Preferences> {
    INSTANCE.lock().clone()
}

/// Destroy and forget the shared store; `false` if there was none
///
/// Teardown runs on `main`, the thread that owns the store.
///
/// # Errors
/// `PrefError::Marshal` if teardown could not run on the designated thread.
pub fn destroy_instance(main: &MainThread) -> PrefResult<bool> {
    let taken = INSTANCE.lock().take();
    match taken {
        Some(prefs) => {
            main.run_blocking(move || prefs.destroy())?;
            Ok(true)
        }
        None => Ok(false),
    }
}
