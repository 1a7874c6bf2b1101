//! Property-based generators for JSON-shaped values.
//!
//! [`TestValue`] is an independent model of the collatable value space: it
//! carries its own semantic comparison ([`cmp_values`]) derived from the
//! documented order, so property tests can check that encoded byte order
//! agrees with it without consulting the codec under test.

use facetdb_collatable::{
    Collatable, CollatableBuilder, CollatableReader, CollatableResult, Tag,
};
use proptest::prelude::*;
use std::cmp::Ordering;

/// A JSON-shaped value with model semantics for order and round-trips.
#[derive(Debug, Clone, PartialEq)]
pub enum TestValue {
    /// JSON null.
    Null,
    /// JSON boolean.
    Bool(bool),
    /// A finite or infinite double.
    Number(f64),
    /// A NUL-free string.
    Text(String),
    /// An array of values.
    Array(Vec<TestValue>),
    /// A map of string keys to values, in insertion order.
    Map(Vec<(String, TestValue)>),
}

/// Model collation table, built from the documented order independently of
/// the codec under test: tab/newline/CR/space, punctuation, digits, ASCII
/// letters case-insensitively, then remaining bytes ascending.
fn model_priority(byte: u8) -> u16 {
    const SORT_ORDER: &[u8] =
        b"\t\n\r `^_-,;:!?.'\"()[]{}@*/\\&#%+<=>|~$0123456789aAbBcCdDeEfFgGhHiIjJkKlLmMnNoOpPqQrRsStTuUvVwWxXyYzZ";
    if let Some(pos) = SORT_ORDER.iter().position(|&c| c == byte) {
        return pos as u16 + 1;
    }
    let mut rank = SORT_ORDER.len() as u16 + 1;
    for b in 1..byte {
        if !SORT_ORDER.contains(&b) {
            rank += 1;
        }
    }
    rank
}

fn cmp_text(a: &str, b: &str) -> Ordering {
    let a_keys = a.bytes().map(model_priority);
    let b_keys = b.bytes().map(model_priority);
    a_keys.cmp(b_keys)
}

fn type_rank(value: &TestValue) -> u8 {
    match value {
        TestValue::Null => 0,
        TestValue::Bool(false) => 1,
        TestValue::Bool(true) => 2,
        TestValue::Number(_) => 3,
        TestValue::Text(_) => 4,
        TestValue::Array(_) => 5,
        TestValue::Map(_) => 6,
    }
}

/// The defined total order on JSON-shaped values: null, false, true,
/// numbers numerically, strings by collation, arrays element-wise (a
/// prefix before its extension), maps entry-wise.
pub fn cmp_values(a: &TestValue, b: &TestValue) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }
    match (a, b) {
        (TestValue::Number(x), TestValue::Number(y)) => {
            x.partial_cmp(y).unwrap_or(Ordering::Equal)
        }
        (TestValue::Text(x), TestValue::Text(y)) => cmp_text(x, y),
        (TestValue::Array(x), TestValue::Array(y)) => {
            for (ax, bx) in x.iter().zip(y.iter()) {
                let ord = cmp_values(ax, bx);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (TestValue::Map(x), TestValue::Map(y)) => {
            for ((ak, av), (bk, bv)) in x.iter().zip(y.iter()) {
                let key_ord = cmp_text(ak, bk);
                if key_ord != Ordering::Equal {
                    return key_ord;
                }
                let ord = cmp_values(av, bv);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => Ordering::Equal,
    }
}

/// Encodes a model value through the builder under test.
pub fn encode_value(value: &TestValue) -> CollatableResult<Collatable> {
    let mut builder = CollatableBuilder::new();
    encode_into(&mut builder, value)?;
    Ok(builder.build())
}

fn encode_into(builder: &mut CollatableBuilder, value: &TestValue) -> CollatableResult<()> {
    match value {
        TestValue::Null => {
            builder.add_null();
        }
        TestValue::Bool(b) => {
            builder.add_bool(*b);
        }
        TestValue::Number(n) => {
            builder.add_number(*n)?;
        }
        TestValue::Text(s) => {
            builder.add_string(s)?;
        }
        TestValue::Array(items) => {
            builder.begin_array();
            for item in items {
                encode_into(builder, item)?;
            }
            builder.end_array();
        }
        TestValue::Map(entries) => {
            builder.begin_map();
            for (key, item) in entries {
                builder.add_map_key(key)?;
                encode_into(builder, item)?;
            }
            builder.end_map();
        }
    }
    Ok(())
}

/// Decodes one value through the reader under test.
pub fn decode_value(reader: &mut CollatableReader<'_>) -> CollatableResult<TestValue> {
    match reader.peek_tag() {
        Tag::Null => {
            reader.read_null()?;
            Ok(TestValue::Null)
        }
        Tag::False | Tag::True => Ok(TestValue::Bool(reader.read_bool()?)),
        Tag::NegativeNumber | Tag::PositiveNumber => {
            Ok(TestValue::Number(reader.read_number()?))
        }
        Tag::String => Ok(TestValue::Text(reader.read_string()?)),
        Tag::Array => {
            reader.begin_array()?;
            let mut items = Vec::new();
            while reader.peek_tag() != Tag::EndSequence {
                items.push(decode_value(reader)?);
            }
            reader.end_array()?;
            Ok(TestValue::Array(items))
        }
        Tag::Map => {
            reader.begin_map()?;
            let mut entries = Vec::new();
            while reader.peek_tag() != Tag::EndSequence {
                let key = reader.read_string()?;
                entries.push((key, decode_value(reader)?));
            }
            reader.end_map()?;
            Ok(TestValue::Map(entries))
        }
        other => Err(facetdb_collatable::CollatableError::type_mismatch(
            "value", other.name(),
        )),
    }
}

/// Strategy over NUL-free strings with mixed case and punctuation.
pub fn text_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[ -~]{0,10}").expect("valid regex")
}

fn map_key_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9_]{0,6}").expect("valid regex")
}

/// Strategy over doubles, weighted toward boundary cases. Never NaN.
pub fn number_strategy() -> impl Strategy<Value = f64> {
    prop_oneof![
        4 => -1.0e12..1.0e12f64,
        2 => any::<i32>().prop_map(f64::from),
        1 => prop_oneof![
            Just(0.0),
            Just(-0.0),
            Just(f64::MIN_POSITIVE),
            Just(-f64::MIN_POSITIVE),
            Just(f64::MAX),
            Just(f64::MIN),
            Just(f64::INFINITY),
            Just(f64::NEG_INFINITY),
        ],
    ]
}

/// Strategy over arbitrary JSON-shaped values, nesting included.
pub fn value_strategy() -> impl Strategy<Value = TestValue> {
    let leaf = prop_oneof![
        1 => Just(TestValue::Null),
        1 => any::<bool>().prop_map(TestValue::Bool),
        3 => number_strategy().prop_map(TestValue::Number),
        3 => text_strategy().prop_map(TestValue::Text),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(TestValue::Array),
            prop::collection::vec((map_key_strategy(), inner), 0..4)
                .prop_map(TestValue::Map),
        ]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_order_matches_documented_examples() {
        let cases = [
            (TestValue::Null, TestValue::Bool(false)),
            (TestValue::Bool(false), TestValue::Bool(true)),
            (TestValue::Bool(true), TestValue::Number(-1e9)),
            (TestValue::Number(-1.5), TestValue::Number(2.0)),
            (TestValue::Number(1e300), TestValue::Text(String::new())),
            (
                TestValue::Text("apple".into()),
                TestValue::Text("Apple".into()),
            ),
            (
                TestValue::Text("Apple".into()),
                TestValue::Text("banana".into()),
            ),
            (TestValue::Text("z".into()), TestValue::Array(Vec::new())),
            (
                TestValue::Array(vec![TestValue::Number(1.0)]),
                TestValue::Array(vec![TestValue::Number(1.0), TestValue::Null]),
            ),
            (TestValue::Array(Vec::new()), TestValue::Map(Vec::new())),
        ];
        for (a, b) in cases {
            assert_eq!(cmp_values(&a, &b), Ordering::Less, "{a:?} < {b:?}");
        }
    }

    #[test]
    fn encode_decode_nested_sample() {
        let value = TestValue::Map(vec![
            ("city".into(), TestValue::Text("Berlin".into())),
            (
                "temps".into(),
                TestValue::Array(vec![TestValue::Number(-3.5), TestValue::Number(20.0)]),
            ),
        ]);
        let encoded = encode_value(&value).unwrap();
        let mut reader = encoded.reader();
        assert_eq!(decode_value(&mut reader).unwrap(), value);
        assert!(reader.at_end());
    }
}
