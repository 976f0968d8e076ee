//! Stored value model
//!
//! The backing store only knows five shapes of value. Everything richer
//! (lists, maps, enums, scaled numbers) is encoded into one of these by the
//! codec layer above.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A value as held by the backing store
///
/// Serialized with an explicit type tag so a stored file stays readable and
/// hand-editable:
///
/// ```json
/// { "type": "int", "value": 3 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Primitive {
    /// Boolean flag
    Bool(bool),
    /// 32-bit signed integer
    Int(i32),
    /// 32-bit float
    Float(f32),
    /// UTF-8 string
    String(String),
    /// Unordered set of UTF-8 strings
    StringSet(BTreeSet<String>),
}

/// Discriminant of a [`Primitive`], used in diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    /// [`Primitive::Bool`]
    Bool,
    /// [`Primitive::Int`]
    Int,
    /// [`Primitive::Float`]
    Float,
    /// [`Primitive::String`]
    String,
    /// [`Primitive::StringSet`]
    StringSet,
}

impl Primitive {
    /// Kind of this value
    #[inline]
    #[must_use]
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            Self::Bool(_) => PrimitiveKind::Bool,
            Self::Int(_) => PrimitiveKind::Int,
            Self::Float(_) => PrimitiveKind::Float,
            Self::String(_) => PrimitiveKind::String,
            Self::StringSet(_) => PrimitiveKind::StringSet,
        }
    }

    /// Borrow as bool
    #[inline]
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Borrow as int
    #[inline]
    #[must_use]
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Borrow as float
    #[inline]
    #[must_use]
    pub fn as_float(&self) -> Option<f32> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Borrow as string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    /// Borrow as string set
    #[inline]
    #[must_use]
    pub fn as_string_set(&self) -> Option<&BTreeSet<String>> {
        match self {
            Self::StringSet(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::String => "string",
            Self::StringSet => "string_set",
        };
        f.write_str(name)
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(v) => f.write_str(v),
            Self::StringSet(v) => {
                let items: Vec<&str> = v.iter().map(String::as_str).collect();
                write!(f, "[{}]", items.join(", "))
            }
        }
    }
}

impl From<bool> for Primitive {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Primitive {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<f32> for Primitive {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<String> for Primitive {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Primitive {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<BTreeSet<String>> for Primitive {
    fn from(v: BTreeSet<String>) -> Self {
        Self::StringSet(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_kind_matches_variant() {
        assert_eq!(Primitive::Bool(true).kind(), PrimitiveKind::Bool);
        assert_eq!(Primitive::Int(-1).kind(), PrimitiveKind::Int);
        assert_eq!(Primitive::Float(0.5).kind(), PrimitiveKind::Float);
        assert_eq!(Primitive::from("x").kind(), PrimitiveKind::String);
        assert_eq!(
            Primitive::StringSet(BTreeSet::new()).kind(),
            PrimitiveKind::StringSet
        );
    }

    #[test]
    fn accessors_reject_other_kinds() {
        let value = Primitive::Int(7);
        assert_eq!(value.as_int(), Some(7));
        assert_eq!(value.as_bool(), None);
        assert_eq!(value.as_str(), None);
    }

    #[test]
    fn tagged_json_shape() {
        let json = serde_json::to_string(&Primitive::Int(3)).unwrap();
        assert_eq!(json, r#"{"type":"int","value":3}"#);

        let set: Primitive = serde_json::from_str(r#"{"type":"string_set","value":["b","a"]}"#).unwrap();
        let expected: BTreeSet<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
        assert_eq!(set, Primitive::StringSet(expected));
    }

    #[test]
    fn display_is_human_readable() {
        assert_eq!(Primitive::Bool(false).to_string(), "false");
        assert_eq!(PrimitiveKind::StringSet.to_string(), "string_set");
    }
}
