//! Canonical JSON serialisation and SHA-256 helpers.
//!
//! Receipt hashing needs a stable serialisation: object keys sorted
//! lexicographically at every depth, arrays in order, scalars as their
//! normal JSON encoding, and absent values rendered as `null`.

use std::collections::BTreeMap;

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Predecessor hash of the first receipt in a chain.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Serialise a JSON value into its canonical form.
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    sort_json_value(value).to_string()
}

fn sort_json_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted = map
                .iter()
                .map(|(key, value)| (key.clone(), sort_json_value(value)))
                .collect::<BTreeMap<_, _>>();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(values) => Value::Array(values.iter().map(sort_json_value).collect()),
        _ => value.clone(),
    }
}

/// Lowercase hex SHA-256 of a UTF-8 string.
#[must_use]
pub fn sha256_hex(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(digest)
}

/// SHA-256 of a value's canonical JSON form.
#[must_use]
pub fn canonical_sha256(value: &Value) -> String {
    sha256_hex(&canonical_json(value))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{GENESIS_HASH, canonical_json, canonical_sha256, sha256_hex};

    #[test]
    fn object_keys_are_sorted_at_every_depth() {
        let value = json!({"b": 1, "a": {"d": [3, {"z": 0, "y": 1}], "c": 2}});
        assert_eq!(
            canonical_json(&value),
            r#"{"a":{"c":2,"d":[3,{"y":1,"z":0}]},"b":1}"#
        );
    }

    #[test]
    fn key_order_does_not_affect_hash() {
        let first = json!({"b": 1, "a": 2});
        let second = json!({"a": 2, "b": 1});
        assert_eq!(canonical_sha256(&first), canonical_sha256(&second));
    }

    #[test]
    fn null_serialises_as_the_null_literal() {
        assert_eq!(canonical_json(&serde_json::Value::Null), "null");
    }

    #[test]
    fn genesis_hash_is_sixty_four_zeros() {
        assert_eq!(GENESIS_HASH.len(), 64);
        assert!(GENESIS_HASH.chars().all(|c| c == '0'));
    }

    #[test]
    fn sha256_hex_matches_known_vector() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
