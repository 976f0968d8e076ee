//! Durable file-backed store
//!
//! The whole store is one JSON document mapping keys to tagged
//! [`Primitive`]s. Reads are served from memory. `apply` updates memory,
//! notifies, and hands the new snapshot to a background writer thread;
//! `commit` routes the snapshot through the same writer and waits for the
//! result, so disk writes always land in edit order.

use crate::backend::{apply_edit, KeyValueBackend, Snapshot};
use crate::edit::Edit;
use crate::error::{BackendError, BackendResult};
use crate::primitive::Primitive;
use crate::subscription::{ChangeEvent, ChangeSink, SubscriberList, SubscriptionId};
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;

/// File extension of store documents
pub const STORE_EXTENSION: &str = "json";

/// File-backed store
#[derive(Debug, Clone)]
pub struct FileBackend {
    inner: Arc<FileInner>,
}

#[derive(Debug)]
struct FileInner {
    path: PathBuf,
    values: RwLock<Snapshot>,
    subscribers: SubscriberList,
    write_order: ReentrantMutex<()>,
    writer: Mutex<Option<WriterHandle>>,
}

#[derive(Debug)]
struct WriterHandle {
    tx: Sender<WriterMsg>,
    thread: JoinHandle<()>,
}

#[derive(Debug)]
enum WriterMsg {
    Persist(Snapshot),
    Sync {
        snapshot: Snapshot,
        ack: Sender<BackendResult<()>>,
    },
    Flush(Sender<()>),
}

/// Path of the store document `name` inside `dir`
#[must_use]
pub fn store_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.{STORE_EXTENSION}"))
}

impl FileBackend {
    /// Open (or create on first write) the store document at `path`
    ///
    /// # Errors
    /// - `BackendError::Io` if the file exists but cannot be read or the
    ///   writer thread cannot be started
    /// - `BackendError::Malformed` if the file is not a valid store document
    pub fn open(path: impl Into<PathBuf>) -> BackendResult<Self> {
        let path = path.into();
        let values = read_snapshot(&path)?;
        tracing::debug!(path = %path.display(), keys = values.len(), "opened store file");

        let (tx, rx) = channel::unbounded();
        let thread_path = path.clone();
        let thread = std::thread::Builder::new()
            .name("prefs-writer".to_string())
            .spawn(move || writer_loop(&thread_path, &rx))
            .map_err(|e| BackendError::io_error(&path, e))?;

        Ok(Self {
            inner: Arc::new(FileInner {
                path,
                values: RwLock::new(values),
                subscribers: SubscriberList::new(),
                write_order: ReentrantMutex::new(()),
                writer: Mutex::new(Some(WriterHandle { tx, thread })),
            }),
        })
    }

    /// Open the store `name` inside `dir`
    ///
    /// # Errors
    /// See [`FileBackend::open`].
    pub fn open_in(dir: impl AsRef<Path>, name: &str) -> BackendResult<Self> {
        Self::open(store_path(dir.as_ref(), name))
    }

    /// Location of the store document
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Copy of the in-memory view
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.inner.values.read().clone()
    }

    /// Wait until every queued background write has reached disk
    ///
    /// # Errors
    /// Returns `BackendError::WriterUnavailable` if the writer thread is gone.
    pub fn flush(&self) -> BackendResult<()> {
        let (ack_tx, ack_rx) = channel::bounded(1);
        self.send(WriterMsg::Flush(ack_tx))?;
        ack_rx
            .recv()
            .map_err(|e| BackendError::WriterUnavailable(e.to_string()))
    }

    /// Re-read the document from disk and notify every key that differs
    ///
    /// Picks up writes made by another process. Events carry no origin.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed; the in-memory
    /// view is left untouched in that case.
    pub fn reload(&self) -> BackendResult<usize> {
        let fresh = read_snapshot(&self.inner.path)?;
        let _order = self.inner.write_order.lock();
        let events = {
            let mut values = self.inner.values.write();
            let events = diff(&values, &fresh);
            *values = fresh;
            events
        };
        tracing::debug!(changed = events.len(), "reloaded store file");
        self.inner.subscribers.notify(&events);
        Ok(events.len())
    }

    fn send(&self, msg: WriterMsg) -> BackendResult<()> {
        let writer = self.inner.writer.lock();
        let handle = writer
            .as_ref()
            .ok_or_else(|| BackendError::WriterUnavailable("writer stopped".to_string()))?;
        handle
            .tx
            .send(msg)
            .map_err(|e| BackendError::WriterUnavailable(e.to_string()))
    }
}

impl KeyValueBackend for FileBackend {
    fn get(&self, key: &str) -> Option<Primitive> {
        self.inner.values.read().get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.inner.values.read().keys().cloned().collect()
    }

    fn commit(&self, edit: Edit) -> BackendResult<()> {
        let _order = self.inner.write_order.lock();
        let (next, events) = apply_edit(&self.inner.values.read(), &edit);

        let (ack_tx, ack_rx) = channel::bounded(1);
        self.send(WriterMsg::Sync {
            snapshot: next.clone(),
            ack: ack_tx,
        })?;
        ack_rx
            .recv()
            .map_err(|e| BackendError::WriterUnavailable(e.to_string()))??;

        *self.inner.values.write() = next;
        self.inner.subscribers.notify(&events);
        Ok(())
    }

    fn apply(&self, edit: Edit) {
        let _order = self.inner.write_order.lock();
        let (next, events) = apply_edit(&self.inner.values.read(), &edit);
        *self.inner.values.write() = next.clone();
        if let Err(e) = self.send(WriterMsg::Persist(next)) {
            tracing::warn!(path = %self.inner.path.display(), "background persist dropped: {e}");
        }
        self.inner.subscribers.notify(&events);
    }

    fn subscribe(&self, sink: ChangeSink) -> SubscriptionId {
        self.inner.subscribers.subscribe(sink)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.subscribers.unsubscribe(id)
    }
}

impl Drop for FileInner {
    fn drop(&mut self) {
        if let Some(WriterHandle { tx, thread }) = self.writer.get_mut().take() {
            drop(tx);
            if thread.join().is_err() {
                tracing::warn!(path = %self.path.display(), "store writer thread panicked");
            }
        }
    }
}

fn writer_loop(path: &Path, rx: &Receiver<WriterMsg>) {
    while let Ok(msg) = rx.recv() {
        match msg {
            WriterMsg::Persist(snapshot) => {
                if let Err(e) = write_snapshot(path, &snapshot) {
                    tracing::warn!(path = %path.display(), "background persist failed: {e}");
                }
            }
            WriterMsg::Sync { snapshot, ack } => {
                let _ = ack.send(write_snapshot(path, &snapshot));
            }
            WriterMsg::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
}

fn read_snapshot(path: &Path) -> BackendResult<Snapshot> {
    match fs::read_to_string(path) {
        Ok(contents) if contents.trim().is_empty() => Ok(Snapshot::new()),
        Ok(contents) => {
            serde_json::from_str(&contents).map_err(|e| BackendError::malformed(path, e))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Snapshot::new()),
        Err(e) => Err(BackendError::io_error(path, e)),
    }
}

/// Write via a sibling temp file and rename, so readers never see a torn file
fn write_snapshot(path: &Path, snapshot: &Snapshot) -> BackendResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| BackendError::io_error(parent, e))?;
        }
    }
    let json = serde_json::to_string_pretty(snapshot)?;
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, json).map_err(|e| BackendError::io_error(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| BackendError::io_error(path, e))
}

fn diff(old: &Snapshot, new: &Snapshot) -> Vec<ChangeEvent> {
    let mut keys: Vec<&String> = old.keys().chain(new.keys()).collect();
    keys.sort();
    keys.dedup();
    keys.into_iter()
        .filter(|key| old.get(*key) != new.get(*key))
        .map(|key| ChangeEvent::new(key.clone(), None))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open_in(dir.path(), "prefs").unwrap();
        assert!(backend.keys().is_empty());
        assert!(!backend.path().exists());
    }

    #[test]
    fn commit_is_durable_before_returning() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open_in(dir.path(), "prefs").unwrap();

        let mut edit = Edit::new();
        edit.put_int("columns", 5);
        backend.commit(edit).unwrap();

        let on_disk = read_snapshot(backend.path()).unwrap();
        assert_eq!(on_disk.get("columns"), Some(&Primitive::Int(5)));
    }

    #[test]
    fn malformed_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = store_path(dir.path(), "prefs");
        fs::write(&path, "{ not json").unwrap();

        let result = FileBackend::open(&path);
        assert!(matches!(result, Err(BackendError::Malformed { .. })));
    }

    #[test]
    fn diff_reports_added_removed_and_changed() {
        let mut old = Snapshot::new();
        old.insert("same".into(), Primitive::Int(1));
        old.insert("gone".into(), Primitive::Int(2));
        old.insert("changed".into(), Primitive::Bool(false));
        let mut new = Snapshot::new();
        new.insert("same".into(), Primitive::Int(1));
        new.insert("changed".into(), Primitive::Bool(true));
        new.insert("added".into(), Primitive::from("x"));

        let keys: Vec<String> = diff(&old, &new).into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec!["added", "changed", "gone"]);
    }
}
