//! Stable cache keys.
//!
//! Keys must not depend on map insertion order, float formatting noise or
//! process state, so they survive restarts and match across replicas.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Decimal places kept when canonicalizing floats.
const FLOAT_PRECISION: i32 = 10;

/// SHA-256 (hex) of the canonical JSON form of `value`.
///
/// Canonical form: object keys sorted, floats rounded to 10 decimal
/// places, arrays made only of objects sorted by their own hash, compact
/// separators.
pub fn stable_hash(value: &Value) -> String {
    let canonical = canonicalize(value);
    let text = serde_json::to_string(&canonical).unwrap_or_default();
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Cache key for one LLM call: `"{component}:{hash}"`, so a component's
/// entries can be dropped together with `delete_by_prefix`.
pub fn cache_key(component: &str, model: &str, temperature: f32, prompt: &str) -> String {
    let payload = serde_json::json!({
        "component": component,
        "model": model,
        "temperature": f64::from(temperature),
        "prompt": prompt,
    });
    format!("{component}:{}", stable_hash(&payload))
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::new();
            for k in keys {
                out.insert(k.clone(), canonicalize(&map[k]));
            }
            Value::Object(out)
        }
        Value::Array(items) => {
            let mut items: Vec<Value> = items.iter().map(canonicalize).collect();
            if !items.is_empty() && items.iter().all(Value::is_object) {
                items.sort_by_cached_key(stable_hash);
            }
            Value::Array(items)
        }
        Value::Number(n) if n.is_f64() => {
            let f = n.as_f64().unwrap_or_default();
            let scale = 10f64.powi(FLOAT_PRECISION);
            serde_json::Number::from_f64((f * scale).round() / scale)
                .map(Value::Number)
                .unwrap_or(Value::Null)
        }
        other => other.clone(),
    }
}
