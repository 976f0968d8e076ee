//! Transaction controller
//!
//! Two independent switches shared by every cell of one store:
//!
//! - **blocking**: each finished edit is `commit`ted and its failure
//!   reported, instead of being `apply`d in the background
//! - **bulk**: writes append to one open edit that is finished only when
//!   the bulk session ends
//!
//! The state lock is never held while the backend runs, so change
//! listeners invoked by a commit may write again.

use crate::error::{PrefError, PrefResult, TransactionError};
use parking_lot::Mutex;
use prefs_backend::{Edit, KeyValueBackend, WriterId};
use std::sync::Arc;

#[derive(Debug, Default)]
struct TxState {
    blocking: bool,
    bulk: Option<Edit>,
}

/// Routes cell writes into the backend according to the current mode
pub struct TransactionController {
    backend: Arc<dyn KeyValueBackend>,
    origin: WriterId,
    state: Mutex<TxState>,
}

impl TransactionController {
    /// Create controller writing to `backend` as `origin`
    #[must_use]
    pub fn new(backend: Arc<dyn KeyValueBackend>, origin: WriterId) -> Self {
        Self {
            backend,
            origin,
            state: Mutex::new(TxState::default()),
        }
    }

    /// Writer identity stamped on every edit
    #[inline]
    #[must_use]
    pub fn origin(&self) -> WriterId {
        self.origin
    }

    /// Whether writes currently commit synchronously
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        self.state.lock().blocking
    }

    /// Whether a bulk edit is open
    #[must_use]
    pub fn is_bulk(&self) -> bool {
        self.state.lock().bulk.is_some()
    }

    /// Switch blocking mode, returning the previous setting
    pub fn set_blocking(&self, blocking: bool) -> bool {
        std::mem::replace(&mut self.state.lock().blocking, blocking)
    }

    /// Record one write
    ///
    /// Inside a bulk session the ops are appended to the open edit and
    /// nothing reaches the backend yet.
    ///
    /// # Errors
    /// Returns `PrefError::CommitFailed` if a blocking commit fails.
    pub fn write(&self, fill: impl FnOnce(&mut Edit)) -> PrefResult<()> {
        let blocking = {
            let mut state = self.state.lock();
            if let Some(bulk) = state.bulk.as_mut() {
                fill(bulk);
                return Ok(());
            }
            state.blocking
        };

        let mut edit = Edit::from_writer(self.origin);
        fill(&mut edit);
        self.finish(edit, blocking)
    }

    /// Open a bulk session
    ///
    /// # Errors
    /// Returns `TransactionError::BulkAlreadyActive` if one is open; the
    /// buffered edit is left untouched.
    pub fn begin_bulk(&self) -> PrefResult<()> {
        let mut state = self.state.lock();
        if state.bulk.is_some() {
            return Err(TransactionError::BulkAlreadyActive.into());
        }
        state.bulk = Some(Edit::from_writer(self.origin));
        Ok(())
    }

    /// Close the bulk session and hand back its edit unfinished
    ///
    /// # Errors
    /// Returns `TransactionError::BulkNotActive` without an open session.
    pub fn take_bulk(&self) -> PrefResult<Edit> {
        self.state
            .lock()
            .bulk
            .take()
            .ok_or_else(|| TransactionError::BulkNotActive.into())
    }

    /// Finish `edit` as one backend operation in the current blocking mode
    ///
    /// # Errors
    /// Returns `PrefError::CommitFailed` if a blocking commit fails.
    pub fn finish_bulk(&self, edit: Edit) -> PrefResult<()> {
        let blocking = self.is_blocking();
        self.finish(edit, blocking)
    }

    fn finish(&self, edit: Edit, blocking: bool) -> PrefResult<()> {
        if edit.is_empty() {
            return Ok(());
        }
        if blocking {
            self.backend.commit(edit).map_err(|err| {
                tracing::warn!(%err, "blocking commit failed");
                PrefError::CommitFailed(err)
            })
        } else {
            self.backend.apply(edit);
            Ok(())
        }
    }
}

impl std::fmt::Debug for TransactionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TransactionController")
            .field("origin", &self.origin)
            .field("blocking", &state.blocking)
            .field("bulk_ops", &state.bulk.as_ref().map(Edit::len))
            .finish()
    }
}
