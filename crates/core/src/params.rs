//! Parameter bags and memoization hashing
//!
//! A parameter bag maps string keys to scalar or array-of-scalar values.
//! [`hash_params`] produces a stable, order-independent hash used as a
//! memoization key for facet and finder results.
//!
//! ## Contract
//!
//! These rules are FROZEN:
//! - Two bags with the same key/value set hash identically regardless of
//!   construction order
//! - Entries whose value is `Null` are OMITTED from the encoding: an absent
//!   key and an explicitly-null key hash identically
//! - Array element order IS significant
//! - Floats are encoded via their IEEE-754 bit pattern, dates via
//!   microseconds since epoch
//!
//! The hash is a memoization key, not a security digest.

use crate::value::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// Parameter bag: string keys to scalar or array-of-scalar values
///
/// Backed by a `BTreeMap`, so iteration is sorted by key and insertion
/// order can never influence the hash.
pub type Params = BTreeMap<String, Value>;

/// Parameter validation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParamError {
    /// A parameter value was not a scalar or array of scalars
    #[error("Unsupported parameter value for key '{key}': {type_name}")]
    UnsupportedValue {
        /// Offending bag key
        key: String,
        /// Type name of the offending value
        type_name: &'static str,
    },
}

// Variant tags for the canonical encoding. Part of the hash contract;
// MUST NOT change.
const TAG_BOOL: u8 = 0x01;
const TAG_INT: u8 = 0x02;
const TAG_FLOAT: u8 = 0x03;
const TAG_STRING: u8 = 0x04;
const TAG_DATE: u8 = 0x05;
const TAG_ARRAY: u8 = 0x06;

/// Hash a parameter bag into a stable memoization key
///
/// Deterministic across processes for structurally-equal bags regardless of
/// key insertion order. Null-valued entries are omitted, so an empty bag and
/// a bag of nulls hash identically.
///
/// # Errors
///
/// Returns [`ParamError::UnsupportedValue`] for object values or nested
/// arrays; bags hold scalars or arrays of scalars only.
///
/// # Examples
///
/// ```
/// use trellis_core::params::{hash_params, Params};
/// use trellis_core::value::Value;
///
/// let mut a = Params::new();
/// a.insert("name".to_string(), Value::from("x"));
/// a.insert("limit".to_string(), Value::Int(10));
///
/// let mut b = Params::new();
/// b.insert("limit".to_string(), Value::Int(10));
/// b.insert("name".to_string(), Value::from("x"));
///
/// assert_eq!(hash_params(&a).unwrap(), hash_params(&b).unwrap());
/// ```
pub fn hash_params(params: &Params) -> Result<String, ParamError> {
    let mut buf = Vec::with_capacity(64);
    for (key, value) in params {
        if value.is_null() {
            continue;
        }
        encode_str(&mut buf, key);
        encode_value(&mut buf, key, value, false)?;
    }
    Ok(format!("{:016x}", xxh3_64(&buf)))
}

fn encode_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u64).to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
}

fn encode_value(
    buf: &mut Vec<u8>,
    key: &str,
    value: &Value,
    in_array: bool,
) -> Result<(), ParamError> {
    match value {
        Value::Bool(b) => {
            buf.push(TAG_BOOL);
            buf.push(u8::from(*b));
        }
        Value::Int(i) => {
            buf.push(TAG_INT);
            buf.extend_from_slice(&i.to_le_bytes());
        }
        Value::Float(f) => {
            buf.push(TAG_FLOAT);
            buf.extend_from_slice(&f.to_bits().to_le_bytes());
        }
        Value::String(s) => {
            buf.push(TAG_STRING);
            encode_str(buf, s);
        }
        Value::Date(d) => {
            buf.push(TAG_DATE);
            buf.extend_from_slice(&d.timestamp_micros().to_le_bytes());
        }
        Value::Array(items) if !in_array => {
            buf.push(TAG_ARRAY);
            buf.extend_from_slice(&(items.len() as u64).to_le_bytes());
            for item in items {
                encode_value(buf, key, item, true)?;
            }
        }
        other => {
            return Err(ParamError::UnsupportedValue {
                key: key.to_string(),
                type_name: other.type_name(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    fn bag(entries: &[(&str, Value)]) -> Params {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    // === Order Independence ===

    #[test]
    fn test_insertion_order_irrelevant() {
        let mut a = Params::new();
        a.insert("x".to_string(), Value::Int(1));
        a.insert("y".to_string(), Value::from("two"));
        a.insert("z".to_string(), Value::Bool(true));

        let mut b = Params::new();
        b.insert("z".to_string(), Value::Bool(true));
        b.insert("x".to_string(), Value::Int(1));
        b.insert("y".to_string(), Value::from("two"));

        assert_eq!(hash_params(&a).unwrap(), hash_params(&b).unwrap());
    }

    #[test]
    fn test_array_order_significant() {
        let a = bag(&[(
            "tags",
            Value::Array(vec![Value::from("a"), Value::from("b")]),
        )]);
        let b = bag(&[(
            "tags",
            Value::Array(vec![Value::from("b"), Value::from("a")]),
        )]);
        assert_ne!(hash_params(&a).unwrap(), hash_params(&b).unwrap());
    }

    // === Null Omission ===

    #[test]
    fn test_null_entries_omitted() {
        let with_null = bag(&[("name", Value::from("x")), ("gone", Value::Null)]);
        let without = bag(&[("name", Value::from("x"))]);
        assert_eq!(
            hash_params(&with_null).unwrap(),
            hash_params(&without).unwrap()
        );
    }

    #[test]
    fn test_all_null_bag_equals_empty_bag() {
        let nulls = bag(&[("a", Value::Null), ("b", Value::Null)]);
        assert_eq!(
            hash_params(&nulls).unwrap(),
            hash_params(&Params::new()).unwrap()
        );
    }

    // === Distinctness ===

    #[test]
    fn test_distinct_values_distinct_hashes() {
        let a = bag(&[("name", Value::from("a"))]);
        let b = bag(&[("name", Value::from("b"))]);
        assert_ne!(hash_params(&a).unwrap(), hash_params(&b).unwrap());
    }

    #[test]
    fn test_int_and_float_hash_differently() {
        let a = bag(&[("n", Value::Int(1))]);
        let b = bag(&[("n", Value::Float(1.0))]);
        assert_ne!(hash_params(&a).unwrap(), hash_params(&b).unwrap());
    }

    #[test]
    fn test_key_value_boundary_not_ambiguous() {
        // ("ab", "c") must not collide with ("a", "bc")
        let a = bag(&[("ab", Value::from("c"))]);
        let b = bag(&[("a", Value::from("bc"))]);
        assert_ne!(hash_params(&a).unwrap(), hash_params(&b).unwrap());
    }

    #[test]
    fn test_date_values_hash_stably() {
        let d = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let a = bag(&[("since", Value::Date(d))]);
        let b = bag(&[("since", Value::Date(d))]);
        assert_eq!(hash_params(&a).unwrap(), hash_params(&b).unwrap());
    }

    // === Rejection ===

    #[test]
    fn test_object_value_rejected() {
        let a = bag(&[("bad", Value::object())]);
        assert!(matches!(
            hash_params(&a),
            Err(ParamError::UnsupportedValue { .. })
        ));
    }

    #[test]
    fn test_nested_array_rejected() {
        let a = bag(&[("bad", Value::Array(vec![Value::Array(vec![])]))]);
        assert!(matches!(
            hash_params(&a),
            Err(ParamError::UnsupportedValue { .. })
        ));
    }

    // === Shape ===

    #[test]
    fn test_hash_is_fixed_width_hex() {
        let h = hash_params(&bag(&[("k", Value::Int(5))])).unwrap();
        assert_eq!(h.len(), 16);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }

    // === Properties ===

    proptest! {
        #[test]
        fn prop_hash_order_independent(entries in proptest::collection::btree_map(
            "[a-z]{1,8}", -1000i64..1000, 0..8)
        ) {
            let forward: Params = entries
                .iter()
                .map(|(k, v)| (k.clone(), Value::Int(*v)))
                .collect();
            let mut reverse = Params::new();
            for (k, v) in entries.iter().rev() {
                reverse.insert(k.clone(), Value::Int(*v));
            }
            prop_assert_eq!(hash_params(&forward).unwrap(), hash_params(&reverse).unwrap());
        }

        #[test]
        fn prop_hash_deterministic(key in "[a-z]{1,12}", n in proptest::num::i64::ANY) {
            let a = bag(&[(key.as_str(), Value::Int(n))]);
            let b = bag(&[(key.as_str(), Value::Int(n))]);
            prop_assert_eq!(hash_params(&a).unwrap(), hash_params(&b).unwrap());
        }
    }
}
