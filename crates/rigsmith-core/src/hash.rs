//! Canonical hashing of rig inputs.
//!
//! Build reports record `hex(BLAKE3(canonical_json))` so two reports can be
//! compared for "same input" without diffing the documents. The canonical
//! form is compact serde_json output with object keys in sorted order and
//! whole-valued radii written as integers, so `20` and `20.0` hash alike.

use serde_json::{Map, Number, Value};

use crate::config::{ConfigError, RigConfig};

/// Canonical BLAKE3 hash of a rig configuration, 64 lowercase hex digits.
pub fn config_hash(config: &RigConfig) -> Result<String, ConfigError> {
    let value = serde_json::to_value(config)?;
    Ok(canonical_value_hash(&value)?)
}

/// Canonical BLAKE3 hash of a JSON value.
pub fn canonical_value_hash(value: &Value) -> serde_json::Result<String> {
    let bytes = serde_json::to_vec(&canonical_value(value))?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

/// Compact canonical JSON text of a value.
pub fn canonicalize_json(value: &Value) -> serde_json::Result<String> {
    serde_json::to_string(&canonical_value(value))
}

fn canonical_value(value: &Value) -> Value {
    match value {
        Value::Number(n) => Value::Number(canonical_number(n)),
        Value::Array(items) => Value::Array(items.iter().map(canonical_value).collect()),
        Value::Object(obj) => {
            let mut keys: Vec<&String> = obj.keys().collect();
            keys.sort();
            let mut sorted = Map::with_capacity(obj.len());
            for key in keys {
                sorted.insert(key.clone(), canonical_value(&obj[key.as_str()]));
            }
            Value::Object(sorted)
        }
        other => other.clone(),
    }
}

// Integral floats are written without a fraction.
fn canonical_number(n: &Number) -> Number {
    match n.as_f64() {
        Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e15 => Number::from(f as i64),
        _ => n.clone(),
    }
}
