//! Buffered edit transactions
//!
//! An [`Edit`] collects puts and removes without touching the store. It is
//! handed to [`KeyValueBackend::commit`](crate::KeyValueBackend::commit) or
//! [`KeyValueBackend::apply`](crate::KeyValueBackend::apply) as one unit.

use crate::primitive::Primitive;
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Identity of a writer (one store instance)
///
/// Carried on every edit and echoed back on the change events the edit
/// produces, so a writer can recognise its own writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WriterId(Uuid);

impl WriterId {
    /// Generate a fresh writer id
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WriterId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WriterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One buffered operation
#[derive(Debug, Clone, PartialEq)]
pub enum EditOp {
    /// Store `value` under `key`
    Put {
        /// Target key
        key: String,
        /// New value
        value: Primitive,
    },
    /// Delete `key`
    Remove {
        /// Target key
        key: String,
    },
    /// Delete every key (applied before any other op of the same edit)
    Clear,
}

impl EditOp {
    /// Key touched by this op, if any
    #[inline]
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Put { key, .. } | Self::Remove { key } => Some(key),
            Self::Clear => None,
        }
    }
}

/// Buffered set of writes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Edit {
    origin: Option<WriterId>,
    ops: Vec<EditOp>,
}

impl Edit {
    /// Create an anonymous edit
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an edit tagged with its writer
    #[inline]
    #[must_use]
    pub fn from_writer(origin: WriterId) -> Self {
        Self {
            origin: Some(origin),
            ops: Vec::new(),
        }
    }

    /// Writer that produced this edit
    #[inline]
    #[must_use]
    pub fn origin(&self) -> Option<WriterId> {
        self.origin
    }

    /// Buffered operations, in insertion order
    #[inline]
    #[must_use]
    pub fn ops(&self) -> &[EditOp] {
        &self.ops
    }

    /// Number of buffered operations
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether nothing is buffered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Whether the edit wipes the store
    #[must_use]
    pub fn clears(&self) -> bool {
        self.ops.iter().any(|op| matches!(op, EditOp::Clear))
    }

    /// Distinct keys touched, in first-touch order
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.ops
            .iter()
            .filter_map(EditOp::key)
            .filter(|key| seen.insert(*key))
            .map(str::to_string)
            .collect()
    }

    /// Buffer an arbitrary value
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Primitive>) -> &mut Self {
        self.ops.push(EditOp::Put {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// Buffer a bool
    pub fn put_bool(&mut self, key: impl Into<String>, value: bool) -> &mut Self {
        self.put(key, Primitive::Bool(value))
    }

    /// Buffer an int
    pub fn put_int(&mut self, key: impl Into<String>, value: i32) -> &mut Self {
        self.put(key, Primitive::Int(value))
    }

    /// Buffer a float
    pub fn put_float(&mut self, key: impl Into<String>, value: f32) -> &mut Self {
        self.put(key, Primitive::Float(value))
    }

    /// Buffer a string
    pub fn put_string(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.put(key, Primitive::String(value.into()))
    }

    /// Buffer a string set
    pub fn put_string_set(&mut self, key: impl Into<String>, value: BTreeSet<String>) -> &mut Self {
        self.put(key, Primitive::StringSet(value))
    }

    /// Buffer a removal
    pub fn remove(&mut self, key: impl Into<String>) -> &mut Self {
        self.ops.push(EditOp::Remove { key: key.into() });
        self
    }

    /// Buffer a full wipe
    pub fn clear(&mut self) -> &mut Self {
        self.ops.push(EditOp::Clear);
        self
    }

    /// Append every op of `other` to this edit
    pub fn extend(&mut self, other: Edit) {
        self.ops.extend(other.ops);
    }

    /// Consume the edit into its ops
    #[must_use]
    pub fn into_ops(self) -> Vec<EditOp> {
        self.ops
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_deduplicated_in_first_touch_order() {
        let mut edit = Edit::new();
        edit.put_int("b", 1).put_bool("a", true).remove("b").clear();

        assert_eq!(edit.len(), 4);
        assert_eq!(edit.keys(), vec!["b".to_string(), "a".to_string()]);
        assert!(edit.clears());
    }

    #[test]
    fn origin_is_preserved() {
        let writer = WriterId::new();
        let edit = Edit::from_writer(writer);
        assert_eq!(edit.origin(), Some(writer));
        assert_eq!(Edit::new().origin(), None);
    }

    #[test]
    fn extend_concatenates_ops() {
        let mut first = Edit::new();
        first.put_string("k", "v");
        let mut second = Edit::new();
        second.put_float("f", 0.25);

        first.extend(second);
        assert_eq!(first.len(), 2);
        assert_eq!(first.ops()[1].key(), Some("f"));
    }
}
