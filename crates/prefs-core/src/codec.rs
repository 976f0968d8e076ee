//! Value codecs
//!
//! Convert between the store's [`Primitive`] representation and domain
//! values. Scalar codecs implement [`ValueCodec`]; compound values (lists
//! and maps) are JSON containers of strings whose elements are flattened
//! by a caller-supplied [`Flatten`] implementation, so the container code
//! never needs to know the element structure.
//!
//! Decoding never surfaces an error to cell readers: [`decode_or_default`]
//! substitutes the declared default and logs the reason.

use crate::error::CodecError;
use prefs_backend::{Primitive, PrimitiveKind};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Display;
use std::hash::Hash;
use std::marker::PhantomData;
use std::str::FromStr;
use std::sync::Arc;

/// Conversion between a domain value and its stored primitive
pub trait ValueCodec<T>: Send + Sync {
    /// Encode `value`; `None` means "remove the key"
    fn encode(&self, value: &T) -> Option<Primitive>;

    /// Decode a stored primitive
    ///
    /// # Errors
    /// Returns `CodecError` if the primitive has the wrong kind or content.
    fn decode(&self, raw: &Primitive) -> Result<T, CodecError>;

    /// Value read when the key is absent
    ///
    /// Most codecs return the declared default unchanged; codecs whose
    /// default is declared in stored units convert it here.
    fn absent(&self, default: &T) -> T
    where
        T: Clone,
    {
        default.clone()
    }
}

/// Decode `raw`, falling back to `default` on absence or failure
pub fn decode_or_default<T: Clone>(
    codec: &dyn ValueCodec<T>,
    key: &str,
    raw: Option<&Primitive>,
    default: &T,
) -> T {
    match raw {
        None => codec.absent(default),
        Some(value) => codec.decode(value).unwrap_or_else(|err| {
            tracing::debug!(key, %err, "undecodable stored value, using default");
            codec.absent(default)
        }),
    }
}

fn mismatch(expected: PrimitiveKind, raw: &Primitive) -> CodecError {
    CodecError::type_mismatch(expected, raw.kind())
}

/// Plain bool
#[derive(Debug, Clone, Copy, Default)]
pub struct BoolCodec;

impl ValueCodec<bool> for BoolCodec {
    fn encode(&self, value: &bool) -> Option<Primitive> {
        Some(Primitive::Bool(*value))
    }

    fn decode(&self, raw: &Primitive) -> Result<bool, CodecError> {
        raw.as_bool().ok_or_else(|| mismatch(PrimitiveKind::Bool, raw))
    }
}

/// Plain int
#[derive(Debug, Clone, Copy, Default)]
pub struct IntCodec;

impl ValueCodec<i32> for IntCodec {
    fn encode(&self, value: &i32) -> Option<Primitive> {
        Some(Primitive::Int(*value))
    }

    fn decode(&self, raw: &Primitive) -> Result<i32, CodecError> {
        raw.as_int().ok_or_else(|| mismatch(PrimitiveKind::Int, raw))
    }
}

/// Plain float
#[derive(Debug, Clone, Copy, Default)]
pub struct FloatCodec;

impl ValueCodec<f32> for FloatCodec {
    fn encode(&self, value: &f32) -> Option<Primitive> {
        Some(Primitive::Float(*value))
    }

    fn decode(&self, raw: &Primitive) -> Result<f32, CodecError> {
        raw.as_float().ok_or_else(|| mismatch(PrimitiveKind::Float, raw))
    }
}

/// Plain string
#[derive(Debug, Clone, Copy, Default)]
pub struct StringCodec;

impl ValueCodec<String> for StringCodec {
    fn encode(&self, value: &String) -> Option<Primitive> {
        Some(Primitive::String(value.clone()))
    }

    fn decode(&self, raw: &Primitive) -> Result<String, CodecError> {
        raw.as_str()
            .map(str::to_string)
            .ok_or_else(|| mismatch(PrimitiveKind::String, raw))
    }
}

/// Optional string; writing `None` removes the key
#[derive(Debug, Clone, Copy, Default)]
pub struct NullableStringCodec;

impl ValueCodec<Option<String>> for NullableStringCodec {
    fn encode(&self, value: &Option<String>) -> Option<Primitive> {
        value.clone().map(Primitive::String)
    }

    fn decode(&self, raw: &Primitive) -> Result<Option<String>, CodecError> {
        raw.as_str()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| mismatch(PrimitiveKind::String, raw))
    }
}

/// Set of strings
#[derive(Debug, Clone, Copy, Default)]
pub struct StringSetCodec;

impl ValueCodec<BTreeSet<String>> for StringSetCodec {
    fn encode(&self, value: &BTreeSet<String>) -> Option<Primitive> {
        Some(Primitive::StringSet(value.clone()))
    }

    fn decode(&self, raw: &Primitive) -> Result<BTreeSet<String>, CodecError> {
        raw.as_string_set()
            .cloned()
            .ok_or_else(|| mismatch(PrimitiveKind::StringSet, raw))
    }
}

/// Int stored as a decimal string, so the value stays human-editable
#[derive(Debug, Clone, Copy, Default)]
pub struct StringIntCodec;

impl ValueCodec<i32> for StringIntCodec {
    fn encode(&self, value: &i32) -> Option<Primitive> {
        Some(Primitive::String(value.to_string()))
    }

    fn decode(&self, raw: &Primitive) -> Result<i32, CodecError> {
        let text = raw
            .as_str()
            .ok_or_else(|| mismatch(PrimitiveKind::String, raw))?;
        text.parse().map_err(|e| CodecError::parse(text, e))
    }
}

/// Alpha in 0..=255 stored as a 0.0..=1.0 fraction
#[derive(Debug, Clone, Copy, Default)]
pub struct AlphaCodec;

impl AlphaCodec {
    /// Fraction stored for `alpha`
    #[inline]
    #[must_use]
    pub fn to_fraction(alpha: i32) -> f32 {
        alpha as f32 / 255.0
    }

    /// Alpha read back from `fraction`
    #[inline]
    #[must_use]
    pub fn from_fraction(fraction: f32) -> i32 {
        (fraction * 255.0).round() as i32
    }
}

impl ValueCodec<i32> for AlphaCodec {
    fn encode(&self, value: &i32) -> Option<Primitive> {
        Some(Primitive::Float(Self::to_fraction(*value)))
    }

    fn decode(&self, raw: &Primitive) -> Result<i32, CodecError> {
        raw.as_float()
            .map(Self::from_fraction)
            .ok_or_else(|| mismatch(PrimitiveKind::Float, raw))
    }

    fn absent(&self, default: &i32) -> i32 {
        Self::from_fraction(Self::to_fraction(*default))
    }
}

/// Pixel dimension stored in density-independent units
///
/// The declared default is in stored (density-independent) units and is
/// scaled on read like a stored value.
#[derive(Debug, Clone, Copy)]
pub struct DimensionCodec {
    density: f32,
}

impl DimensionCodec {
    /// Create codec for `density` pixels per unit
    #[inline]
    #[must_use]
    pub fn new(density: f32) -> Self {
        Self { density }
    }

    /// Pixels per unit
    #[inline]
    #[must_use]
    pub fn density(&self) -> f32 {
        self.density
    }

    /// Density-independent units to pixels
    #[inline]
    #[must_use]
    pub fn to_px(&self, units: f32) -> f32 {
        units * self.density
    }

    /// Pixels to density-independent units
    #[inline]
    #[must_use]
    pub fn to_units(&self, px: f32) -> f32 {
        px / self.density
    }
}

impl ValueCodec<f32> for DimensionCodec {
    fn encode(&self, value: &f32) -> Option<Primitive> {
        Some(Primitive::Float(self.to_units(*value)))
    }

    fn decode(&self, raw: &Primitive) -> Result<f32, CodecError> {
        raw.as_float()
            .map(|units| self.to_px(units))
            .ok_or_else(|| mismatch(PrimitiveKind::Float, raw))
    }

    fn absent(&self, default: &f32) -> f32 {
        self.to_px(*default)
    }
}

type FromStringFn<T> = Arc<dyn Fn(&str) -> Result<T, CodecError> + Send + Sync>;
type ToStringFn<T> = Arc<dyn Fn(&T) -> String + Send + Sync>;

/// Arbitrary value stored through a string conversion pair
pub struct StringBasedCodec<T> {
    from_string: FromStringFn<T>,
    to_string: ToStringFn<T>,
}

impl<T> StringBasedCodec<T> {
    /// Create codec from a fallible parser and a formatter
    pub fn new<E, P, F>(from_string: P, to_string: F) -> Self
    where
        E: Display,
        P: Fn(&str) -> Result<T, E> + Send + Sync + 'static,
        F: Fn(&T) -> String + Send + Sync + 'static,
    {
        Self {
            from_string: Arc::new(move |raw| from_string(raw).map_err(|e| CodecError::parse(raw, e))),
            to_string: Arc::new(to_string),
        }
    }
}

impl<T> Clone for StringBasedCodec<T> {
    fn clone(&self) -> Self {
        Self {
            from_string: Arc::clone(&self.from_string),
            to_string: Arc::clone(&self.to_string),
        }
    }
}

impl<T: Clone> ValueCodec<T> for StringBasedCodec<T> {
    fn encode(&self, value: &T) -> Option<Primitive> {
        Some(Primitive::String((self.to_string)(value)))
    }

    fn decode(&self, raw: &Primitive) -> Result<T, CodecError> {
        let text = raw
            .as_str()
            .ok_or_else(|| mismatch(PrimitiveKind::String, raw))?;
        (self.from_string)(text)
    }
}

/// Element conversion for JSON containers
pub trait Flatten<T>: Send + Sync {
    /// Element to its string form
    fn flatten(&self, value: &T) -> String;

    /// Element from its string form
    ///
    /// # Errors
    /// Returns `CodecError` when `raw` is not a valid element.
    fn unflatten(&self, raw: &str) -> Result<T, CodecError>;
}

/// Identity flattening for string elements
#[derive(Debug, Clone, Copy, Default)]
pub struct StringFlattener;

impl Flatten<String> for StringFlattener {
    fn flatten(&self, value: &String) -> String {
        value.clone()
    }

    fn unflatten(&self, raw: &str) -> Result<String, CodecError> {
        Ok(raw.to_string())
    }
}

/// Flattening through `Display` / `FromStr`
pub struct ParseFlattener<T>(PhantomData<fn() -> T>);

impl<T> ParseFlattener<T> {
    /// Create flattener
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for ParseFlattener<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Flatten<T> for ParseFlattener<T>
where
    T: Display + FromStr,
    T::Err: Display,
{
    fn flatten(&self, value: &T) -> String {
        value.to_string()
    }

    fn unflatten(&self, raw: &str) -> Result<T, CodecError> {
        raw.parse().map_err(|e| CodecError::parse(raw, e))
    }
}

/// Flattening through a pair of closures
pub struct FnFlattener<T> {
    flatten: ToStringFn<T>,
    unflatten: FromStringFn<T>,
}

impl<T> FnFlattener<T> {
    /// Create from a formatter and a fallible parser
    pub fn new<E, F, P>(flatten: F, unflatten: P) -> Self
    where
        E: Display,
        F: Fn(&T) -> String + Send + Sync + 'static,
        P: Fn(&str) -> Result<T, E> + Send + Sync + 'static,
    {
        Self {
            flatten: Arc::new(flatten),
            unflatten: Arc::new(move |raw| unflatten(raw).map_err(|e| CodecError::parse(raw, e))),
        }
    }
}

impl<T> Flatten<T> for FnFlattener<T> {
    fn flatten(&self, value: &T) -> String {
        (self.flatten)(value)
    }

    fn unflatten(&self, raw: &str) -> Result<T, CodecError> {
        (self.unflatten)(raw)
    }
}

fn json_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Encode a list as a JSON array of flattened strings
pub fn encode_list<T>(items: &[T], flattener: &dyn Flatten<T>) -> String {
    let flat: Vec<String> = items.iter().map(|item| flattener.flatten(item)).collect();
    serde_json::Value::from(flat).to_string()
}

/// Decode a JSON array of flattened strings
///
/// Non-string elements are read through their JSON text. Elements that fail
/// to unflatten are skipped.
///
/// # Errors
/// Returns `CodecError::Json` if `json` is not an array.
pub fn decode_list<T>(json: &str, flattener: &dyn Flatten<T>) -> Result<Vec<T>, CodecError> {
    let raw: Vec<serde_json::Value> = serde_json::from_str(json)?;
    Ok(raw
        .into_iter()
        .map(json_text)
        .filter_map(|text| match flattener.unflatten(&text) {
            Ok(item) => Some(item),
            Err(err) => {
                tracing::debug!(%err, "skipping undecodable list element");
                None
            }
        })
        .collect())
}

/// Encode a map as a JSON object of flattened strings, keys sorted
pub fn encode_map<K, V>(
    entries: &HashMap<K, V>,
    keys: &dyn Flatten<K>,
    values: &dyn Flatten<V>,
) -> String {
    let flat: BTreeMap<String, String> = entries
        .iter()
        .map(|(k, v)| (keys.flatten(k), values.flatten(v)))
        .collect();
    serde_json::Value::from(serde_json::Map::from_iter(
        flat.into_iter().map(|(k, v)| (k, serde_json::Value::String(v))),
    ))
    .to_string()
}

/// Decode a JSON object of flattened strings
///
/// Entries whose key or value fails to unflatten are skipped.
///
/// # Errors
/// Returns `CodecError::Json` if `json` is not an object.
pub fn decode_map<K: Eq + Hash, V>(
    json: &str,
    keys: &dyn Flatten<K>,
    values: &dyn Flatten<V>,
) -> Result<HashMap<K, V>, CodecError> {
    let raw: serde_json::Map<String, serde_json::Value> = serde_json::from_str(json)?;
    Ok(raw
        .into_iter()
        .filter_map(|(k, v)| {
            let value_text = json_text(v);
            match (keys.unflatten(&k), values.unflatten(&value_text)) {
                (Ok(key), Ok(value)) => Some((key, value)),
                (Err(err), _) | (_, Err(err)) => {
                    tracing::debug!(key = %k, %err, "skipping undecodable map entry");
                    None
                }
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_int_rejects_garbage() {
        let err = StringIntCodec.decode(&Primitive::from("12a")).unwrap_err();
        assert!(matches!(err, CodecError::Parse { .. }));
        assert_eq!(StringIntCodec.decode(&Primitive::from("-7")), Ok(-7));
    }

    #[test]
    fn decode_or_default_substitutes_on_mismatch() {
        let value = decode_or_default(&IntCodec, "k", Some(&Primitive::from("x")), &9);
        assert_eq!(value, 9);
        assert_eq!(decode_or_default(&IntCodec, "k", None, &9), 9);
    }

    #[test]
    fn alpha_fraction_edges() {
        assert_eq!(AlphaCodec.encode(&0), Some(Primitive::Float(0.0)));
        assert_eq!(AlphaCodec.encode(&255), Some(Primitive::Float(1.0)));
        assert_eq!(AlphaCodec.decode(&Primitive::Float(0.5)), Ok(128));
        assert_eq!(AlphaCodec.absent(&-1), -1);
    }

    #[test]
    fn dimension_scales_default_and_stored_values() {
        let codec = DimensionCodec::new(2.0);
        assert_eq!(codec.encode(&10.0), Some(Primitive::Float(5.0)));
        assert_eq!(codec.decode(&Primitive::Float(5.0)), Ok(10.0));
        assert_eq!(codec.absent(&8.0), 16.0);
    }

    #[test]
    fn nullable_string_none_removes() {
        assert_eq!(NullableStringCodec.encode(&None), None);
        assert_eq!(
            NullableStringCodec.decode(&Primitive::from("a")),
            Ok(Some("a".to_string()))
        );
    }

    #[test]
    fn list_decode_skips_bad_elements_and_reads_numbers() {
        let flattener = ParseFlattener::<i32>::new();
        let items = decode_list(r#"["1", 2, "x", "-3"]"#, &flattener).unwrap();
        assert_eq!(items, vec![1, 2, -3]);
    }

    #[test]
    fn list_decode_rejects_non_array() {
        assert!(decode_list(r#"{"a":"b"}"#, &StringFlattener).is_err());
    }

    #[test]
    fn map_encoding_is_sorted() {
        let mut entries = HashMap::new();
        entries.insert("b".to_string(), "2".to_string());
        entries.insert("a".to_string(), "1".to_string());

        let json = encode_map(&entries, &StringFlattener, &StringFlattener);
        assert_eq!(json, r#"{"a":"1","b":"2"}"#);
    }

    #[test]
    fn string_based_codec_uses_conversion_pair() {
        let codec = StringBasedCodec::new(
            |raw: &str| raw.parse::<u8>(),
            |value: &u8| value.to_string(),
        );
        assert_eq!(codec.encode(&7), Some(Primitive::from("7")));
        assert!(codec.decode(&Primitive::from("300")).is_err());
    }
}
