//! Canonical JSON and SHA-256 digests for persisted battle outcomes.
//!
//! Object keys are sorted recursively so the digest does not depend on
//! field order; arrays keep their order.

use sha2::{Digest, Sha256};

use crate::domain::error::{ArenaError, Result};

fn sort_keys(value: &serde_json::Value) -> Result<serde_json::Value> {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = serde_json::Map::new();
            for key in keys {
                sorted.insert(key.clone(), sort_keys(&map[key])?);
            }
            Ok(serde_json::Value::Object(sorted))
        }
        serde_json::Value::Array(items) => Ok(serde_json::Value::Array(
            items.iter().map(sort_keys).collect::<Result<Vec<_>>>()?,
        )),
        serde_json::Value::Number(n) => match n.as_f64() {
            Some(f) if !f.is_finite() => Err(ArenaError::InvalidBattle(
                "non-finite number in battle outcome".to_string(),
            )),
            _ => Ok(value.clone()),
        },
        other => Ok(other.clone()),
    }
}

/// Compact JSON with recursively sorted keys.
pub fn canonical_json(value: &serde_json::Value) -> Result<String> {
    Ok(serde_json::to_string(&sort_keys(value)?)?)
}

/// SHA-256 hex digest of [`canonical_json`].
pub fn compute_digest(value: &serde_json::Value) -> Result<String> {
    let canonical = canonical_json(value)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}
