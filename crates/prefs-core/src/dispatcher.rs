//! Designated-thread dispatcher
//!
//! Stores are constructed on one designated thread. [`MainThread`] owns
//! that thread and runs jobs on it; callers on other threads block until
//! their job finishes. A [`MainThreadHandle`] posts jobs without waiting;
//! stores use one to deliver change events that arrive on other threads.

use crate::error::{PrefError, PrefResult};
use crossbeam::channel::{self, Sender};
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{JoinHandle, ThreadId};

type Job = Box<dyn FnOnce() + Send>;

enum Msg {
    Run(Job),
    Stop,
}

/// Handle to the designated thread
pub struct MainThread {
    handle: MainThreadHandle,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl MainThread {
    /// Spawn the designated thread
    ///
    /// # Errors
    /// Returns `PrefError::Marshal` if the thread cannot be spawned.
    pub fn spawn(name: impl Into<String>) -> PrefResult<Self> {
        let (tx, rx) = channel::unbounded::<Msg>();
        let thread = std::thread::Builder::new()
            .name(name.into())
            .spawn(move || {
                for msg in rx {
                    match msg {
                        Msg::Run(job) => job(),
                        Msg::Stop => break,
                    }
                }
            })
            .map_err(|e| PrefError::Marshal(format!("cannot spawn designated thread: {e}")))?;

        Ok(Self {
            handle: MainThreadHandle {
                jobs: tx,
                thread_id: thread.thread().id(),
            },
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Id of the designated thread
    #[inline]
    #[must_use]
    pub fn thread_id(&self) -> ThreadId {
        self.handle.thread_id
    }

    /// Whether the caller is the designated thread
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.handle.is_current()
    }

    /// Cloneable handle for posting jobs
    #[must_use]
    pub fn handle(&self) -> MainThreadHandle {
        self.handle.clone()
    }

    /// Run `job` on the designated thread and wait for its result
    ///
    /// Runs inline when already on the designated thread.
    ///
    /// # Errors
    /// Returns `PrefError::Marshal` if the thread is gone or `job` panics.
    pub fn run_blocking<R, F>(&self, job: F) -> PrefResult<R>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        if self.is_current() {
            return Ok(job());
        }

        let (done_tx, done_rx) = channel::bounded(1);
        self.handle.send(Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(job));
            let _ = done_tx.send(outcome);
        }))?;

        match done_rx.recv() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(panic)) => Err(PrefError::Marshal(panic_message(panic.as_ref()))),
            Err(_) => Err(PrefError::Marshal("designated thread dropped the job".to_string())),
        }
    }

    /// Queue `job` on the designated thread without waiting
    ///
    /// # Errors
    /// Returns `PrefError::Marshal` if the thread is gone.
    pub fn post(&self, job: impl FnOnce() + Send + 'static) -> PrefResult<()> {
        self.handle.post(job)
    }
}

/// Posting side of a [`MainThread`]
///
/// Outliving the thread is harmless: posts then fail with
/// `PrefError::Marshal`.
#[derive(Clone)]
pub struct MainThreadHandle {
    jobs: Sender<Msg>,
    thread_id: ThreadId,
}

impl MainThreadHandle {
    /// Id of the designated thread
    #[inline]
    #[must_use]
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Whether the caller is the designated thread
    #[must_use]
    pub fn is_current(&self) -> bool {
        std::thread::current().id() == self.thread_id
    }

    /// Queue `job` on the designated thread without waiting
    ///
    /// A panicking job is logged and does not stop the thread.
    ///
    /// # Errors
    /// Returns `PrefError::Marshal` if the thread is gone.
    pub fn post(&self, job: impl FnOnce() + Send + 'static) -> PrefResult<()> {
        self.send(Box::new(move || {
            if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(job)) {
                tracing::warn!(reason = %panic_message(panic.as_ref()), "posted job panicked");
            }
        }))
    }

    fn send(&self, job: Job) -> PrefResult<()> {
        self.jobs
            .send(Msg::Run(job))
            .map_err(|_| PrefError::Marshal("designated thread stopped".to_string()))
    }
}

impl std::fmt::Debug for MainThreadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MainThreadHandle")
            .field("thread_id", &self.thread_id)
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "job panicked".to_string()
    }
}

impl Drop for MainThread {
    fn drop(&mut self) {
        // handles may still hold senders, so the loop is stopped explicitly
        let _ = self.handle.jobs.send(Msg::Stop);
        if let Some(thread) = self.thread.lock().take() {
            if thread.thread().id() != std::thread::current().id() && thread.join().is_err() {
                tracing::warn!("designated thread panicked");
            }
        }
    }
}

impl std::fmt::Debug for MainThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MainThread")
            .field("thread_id", &self.handle.thread_id)
            .field("running", &self.thread.lock().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_job_on_designated_thread() {
        let main = MainThread::spawn("prefs-main").unwrap();
        let expected = main.thread_id();
        let ran_on = main.run_blocking(|| std::thread::current().id()).unwrap();
        assert_eq!(ran_on, expected);
        assert!(!main.is_current());
    }

    #[test]
    fn panicking_job_becomes_marshal_error() {
        let main = MainThread::spawn("prefs-main").unwrap();
        let result: PrefResult<()> = main.run_blocking(|| panic!("factory exploded"));
        match result {
            Err(PrefError::Marshal(msg)) => assert!(msg.contains("factory exploded")),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(main.run_blocking(|| 7).unwrap(), 7);
    }

    #[test]
    fn posted_jobs_run_in_order_and_survive_panics() {
        let main = MainThread::spawn("prefs-main").unwrap();
        let handle = main.handle();
        let (tx, rx) = channel::unbounded();

        let first = tx.clone();
        handle.post(move || first.send(1).unwrap()).unwrap();
        handle.post(|| panic!("listener exploded")).unwrap();
        handle.post(move || tx.send(2).unwrap()).unwrap();

        assert_eq!(rx.recv().unwrap(), 1);
        assert_eq!(rx.recv().unwrap(), 2);
    }

    #[test]
    fn handle_outliving_thread_reports_marshal_error() {
        let main = MainThread::spawn("prefs-main").unwrap();
        let handle = main.handle();
        drop(main);
        assert!(matches!(handle.post(|| ()), Err(PrefError::Marshal(_))));
    }
}
