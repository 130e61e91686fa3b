//! Canonical binary encoding used to make JSON/YAML checksums independent of
//! key order and incidental whitespace (§4.1 "Canonical encoder").

use serde_json::Value;

const TAG_NULL: u8 = 0;
const TAG_FALSE: u8 = 1;
const TAG_TRUE: u8 = 2;
const TAG_NUMBER: u8 = 3;
const TAG_STRING: u8 = 4;
const TAG_ARRAY: u8 = 5;
const TAG_OBJECT: u8 = 6;

/// Encode a JSON value into a canonical byte form: maps become ordered
/// `(key, value)` sequences sorted on the key's own canonical bytes, arrays
/// become ordered sequences sorted on each item's canonical bytes, and
/// strings are trimmed of surrounding whitespace before encoding.
#[must_use]
pub fn encode(value: &Value) -> Vec<u8> {
    match value {
        Value::Null => vec![TAG_NULL],
        Value::Bool(false) => vec![TAG_FALSE],
        Value::Bool(true) => vec![TAG_TRUE],
        Value::Number(n) => {
            let mut out = vec![TAG_NUMBER];
            let repr = n.to_string();
            out.extend(len_prefixed(repr.trim().as_bytes()));
            out
        }
        Value::String(s) => {
            let mut out = vec![TAG_STRING];
            out.extend(len_prefixed(s.trim().as_bytes()));
            out
        }
        Value::Array(items) => {
            let mut encoded: Vec<Vec<u8>> = items.iter().map(encode).collect();
            encoded.sort();
            let mut out = vec![TAG_ARRAY];
            out.extend((encoded.len() as u64).to_be_bytes());
            for item in encoded {
                out.extend(len_prefixed(&item));
            }
            out
        }
        Value::Object(map) => {
            let mut pairs: Vec<(Vec<u8>, Vec<u8>)> = map
                .iter()
                .map(|(k, v)| (encode(&Value::String(k.clone())), encode(v)))
                .collect();
            pairs.sort_by(|a, b| a.0.cmp(&b.0));
            let mut out = vec![TAG_OBJECT];
            out.extend((pairs.len() as u64).to_be_bytes());
            for (k, v) in pairs {
                out.extend(len_prefixed(&k));
                out.extend(len_prefixed(&v));
            }
            out
        }
    }
}

fn len_prefixed(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + bytes.len());
    out.extend((bytes.len() as u64).to_be_bytes());
    out.extend_from_slice(bytes);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_key_order_is_irrelevant() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(encode(&a), encode(&b));
    }

    #[test]
    fn array_order_is_irrelevant_when_items_are_unordered_sets() {
        // The encoder sorts canonical bytes, so lists of otherwise-equal
        // scalars normalize identically regardless of input order.
        let a = json!([3, 1, 2]);
        let b = json!([1, 2, 3]);
        assert_eq!(encode(&a), encode(&b));
    }

    #[test]
    fn distinguishes_different_values() {
        let a = json!({"a": 1});
        let b = json!({"a": 2});
        assert_ne!(encode(&a), encode(&b));
    }

    #[test]
    fn strings_are_trimmed() {
        let a = json!("  hello  ");
        let b = json!("hello");
        assert_eq!(encode(&a), encode(&b));
    }
}
