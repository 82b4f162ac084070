//! Content fingerprints used as dedup keys.
//!
//! A fingerprint is the hex SHA-256 of the canonical JSON form of the frame's
//! semantic fields (`event` and `data`). Object keys are sorted at every
//! depth so the hash does not depend on the sender's key order; transport
//! envelope fields (anything else at the top level) are ignored.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Top-level fields that carry meaning. Everything else is envelope.
pub const SEMANTIC_FIELDS: [&str; 2] = ["event", "data"];

/// Fingerprint a parsed frame.
pub fn fingerprint_value(frame: &Value) -> String {
    let canonical = match frame {
        Value::Object(map) => {
            let mut semantic = serde_json::Map::new();
            for field in SEMANTIC_FIELDS {
                if let Some(value) = map.get(field) {
                    semantic.insert(field.to_owned(), value.clone());
                }
            }
            canonical_json(&Value::Object(semantic))
        }
        other => canonical_json(other),
    };
    digest(canonical.as_bytes())
}

/// Fingerprint a frame that could not be parsed.
pub fn fingerprint_raw(raw: &str) -> String {
    let mut bytes = Vec::with_capacity(raw.len() + 4);
    bytes.extend_from_slice(b"raw:");
    bytes.extend_from_slice(raw.as_bytes());
    digest(&bytes)
}

/// Compact JSON with object keys sorted at every depth.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                if let Some(v) = map.get(key) {
                    write_canonical(v, out);
                }
            }
            out.push('}');
        }
        leaf => out.push_str(&leaf.to_string()),
    }
}

fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
