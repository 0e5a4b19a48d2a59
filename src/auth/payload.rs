//! Deterministic Signing Payloads
//!
//! Signer and verifier must produce byte-identical payloads without a
//! shared schema: the nonce is merged into the argument map, null-valued
//! keys are dropped, and the remaining keys are serialized in lexicographic
//! order.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::Result;

/// Key under which the nonce is merged into the arguments. A caller-supplied
/// value of the same name is overridden.
const NONCE_KEY: &str = "nonce";

/// Build the canonical byte payload for a set of call arguments and a nonce.
///
/// The same logical arguments produce the same bytes regardless of the
/// insertion order of the source map.
pub fn canonical_signing_payload(args: &Map<String, Value>, nonce: i64) -> Result<Vec<u8>> {
    let nonce_value = Value::from(nonce);

    let mut ordered: BTreeMap<&str, &Value> = BTreeMap::new();
    for (key, value) in args {
        if value.is_null() {
            continue;
        }
        ordered.insert(key.as_str(), value);
    }
    ordered.insert(NONCE_KEY, &nonce_value);

    Ok(serde_json::to_vec(&ordered)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_is_order_independent() {
        let mut forward = Map::new();
        forward.insert("alpha".to_string(), json!("a"));
        forward.insert("beta".to_string(), json!(2));

        let mut backward = Map::new();
        backward.insert("beta".to_string(), json!(2));
        backward.insert("alpha".to_string(), json!("a"));

        assert_eq!(
            canonical_signing_payload(&forward, 42).unwrap(),
            canonical_signing_payload(&backward, 42).unwrap()
        );
    }

    #[test]
    fn test_null_values_are_dropped() {
        let mut with_null = Map::new();
        with_null.insert("message".to_string(), json!("hi"));
        with_null.insert("channel".to_string(), Value::Null);

        let mut without = Map::new();
        without.insert("message".to_string(), json!("hi"));

        assert_eq!(
            canonical_signing_payload(&with_null, 7).unwrap(),
            canonical_signing_payload(&without, 7).unwrap()
        );
    }

    #[test]
    fn test_nonce_changes_payload() {
        let mut args = Map::new();
        args.insert("message".to_string(), json!("hi"));
        assert_ne!(
            canonical_signing_payload(&args, 1).unwrap(),
            canonical_signing_payload(&args, 2).unwrap()
        );
    }

    #[test]
    fn test_nonce_key_in_args_is_overridden() {
        let mut args = Map::new();
        args.insert("nonce".to_string(), json!(999));

        let payload = canonical_signing_payload(&args, 1).unwrap();
        let text = String::from_utf8(payload).unwrap();
        assert!(text.contains("\"nonce\":1"));
        assert!(!text.contains("999"));
    }
}
