//! Encode/decode round trips for every supported kind.

use proptest::prelude::*;
use prefs_backend::Primitive;
use prefs_core::{
    decode_list, decode_map, encode_list, encode_map, AlphaCodec, BoolCodec, DimensionCodec,
    FloatCodec, IntCodec, NullableStringCodec, ParseFlattener, StringCodec, StringFlattener,
    StringIntCodec, StringSetCodec, ValueCodec,
};
use std::collections::{BTreeSet, HashMap};

fn round_trip<T: Clone>(codec: &dyn ValueCodec<T>, value: &T) -> Option<T> {
    codec.encode(value).map(|raw| codec.decode(&raw).unwrap())
}

proptest! {
    #[test]
    fn int_kinds_round_trip(n in any::<i32>()) {
        prop_assert_eq!(round_trip(&IntCodec, &n), Some(n));
        prop_assert_eq!(round_trip(&StringIntCodec, &n), Some(n));
    }

    #[test]
    fn float_round_trips_exactly(f in any::<f32>().prop_filter("finite", |f| f.is_finite())) {
        prop_assert_eq!(round_trip(&FloatCodec, &f), Some(f));
    }

    #[test]
    fn string_kinds_round_trip(s in ".*", set in proptest::collection::btree_set(".*", 0..6)) {
        prop_assert_eq!(round_trip(&StringCodec, &s), Some(s.clone()));
        prop_assert_eq!(round_trip(&NullableStringCodec, &Some(s.clone())), Some(Some(s)));
        prop_assert_eq!(round_trip(&StringSetCodec, &set), Some(set));
    }

    #[test]
    fn alpha_round_trips_over_byte_range(alpha in 0..=255i32) {
        prop_assert_eq!(round_trip(&AlphaCodec, &alpha), Some(alpha));
    }

    #[test]
    fn dimension_round_trips_within_tolerance(units in 0.0f32..500.0, density in 0.5f32..4.0) {
        let codec = DimensionCodec::new(density);
        let px = codec.to_px(units);
        let back = round_trip(&codec, &px).unwrap();
        prop_assert!((back - px).abs() <= 1e-3 * px.abs().max(1.0));
    }

    #[test]
    fn string_lists_round_trip(items in proptest::collection::vec(".*", 0..8)) {
        let json = encode_list(&items, &StringFlattener);
        prop_assert_eq!(decode_list(&json, &StringFlattener).unwrap(), items);
    }

    #[test]
    fn numeric_lists_round_trip(items in proptest::collection::vec(any::<i64>(), 0..8)) {
        let flattener = ParseFlattener::<i64>::new();
        let json = encode_list(&items, &flattener);
        prop_assert_eq!(decode_list(&json, &flattener).unwrap(), items);
    }

    #[test]
    fn maps_round_trip(entries in proptest::collection::hash_map(".*", any::<i32>(), 0..8)) {
        let values = ParseFlattener::<i32>::new();
        let json = encode_map(&entries, &StringFlattener, &values);
        prop_assert_eq!(decode_map(&json, &StringFlattener, &values).unwrap(), entries);
    }
}

#[test]
fn boundary_values() {
    assert_eq!(BoolCodec.decode(&BoolCodec.encode(&false).unwrap()), Ok(false));
    assert_eq!(round_trip(&IntCodec, &i32::MIN), Some(i32::MIN));
    assert_eq!(round_trip(&StringIntCodec, &-1i32), Some(-1));

    assert_eq!(AlphaCodec.encode(&0), Some(Primitive::Float(0.0)));
    assert_eq!(AlphaCodec.encode(&255), Some(Primitive::Float(1.0)));
    assert_eq!(AlphaCodec.decode(&Primitive::Float(0.0)), Ok(0));
    assert_eq!(AlphaCodec.decode(&Primitive::Float(1.0)), Ok(255));

    let empty: Vec<String> = Vec::new();
    assert_eq!(encode_list(&empty, &StringFlattener), "[]");
    assert_eq!(decode_list("[]", &StringFlattener).unwrap(), empty);

    let empty_map: HashMap<String, String> = HashMap::new();
    assert_eq!(encode_map(&empty_map, &StringFlattener, &StringFlattener), "{}");
    assert_eq!(
        decode_map("{}", &StringFlattener, &StringFlattener).unwrap(),
        empty_map
    );

    assert_eq!(round_trip(&StringSetCodec, &BTreeSet::<String>::new()), Some(BTreeSet::new()));
    assert_eq!(round_trip(&NullableStringCodec, &None::<String>), None);
}
