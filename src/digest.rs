//! Entry-identity derivation: a stable 32-char hex identifier for a feed entry.

use std::collections::BTreeMap;

use md5::{Digest, Md5};
use serde_json::Value;

/// Derive the canonical identity string for an entry: if `id` is present and
/// non-empty, use it verbatim; otherwise sort the entry's `key: value` pairs
/// (Rust `Debug`-style quoting for values) and join them with `, `.
pub fn canonical_form(entry: &Value) -> String {
    if let Some(id) = entry.get("id").and_then(Value::as_str) {
        if !id.is_empty() {
            return id.to_string();
        }
    }

    let map = match entry.as_object() {
        Some(m) => m,
        None => return String::new(),
    };
    let sorted: BTreeMap<&String, &Value> = map.iter().collect();
    sorted
        .into_iter()
        .map(|(k, v)| format!("{:?}: {:?}", k, v.to_string()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Hex-encoded, lowercase MD5 of the canonical form. MD5 is a stability choice,
/// not a cryptographic one: bit-identical entries must always produce the same
/// digest so article identity survives across runs.
pub fn message_digest(entry: &Value) -> String {
    let canonical = canonical_form(entry);
    let mut hasher = Md5::new();
    hasher.update(canonical.as_bytes());
    let result = hasher.finalize();
    result.iter().map(|b| format!("{b:02x}")).collect()
}

/// True if two entries are equal once `feed_updated_parsed` is removed from both,
/// matching the Poller's "unchanged since last ingest" test.
pub fn same_entry(existing: &Value, incoming: &Value) -> bool {
    fn without_feed_updated_parsed(v: &Value) -> Value {
        match v {
            Value::Object(map) => {
                let mut cleaned = map.clone();
                cleaned.remove("feed_updated_parsed");
                Value::Object(cleaned)
            }
            other => other.clone(),
        }
    }
    without_feed_updated_parsed(existing) == without_feed_updated_parsed(incoming)
}
