//! Shallow-merge patches.

use crate::error::{Result, StoreError};
use crate::types::Record;
use serde_json::{Map, Value};

/// Partial record: top-level fields replace the record's fields of the same name.
pub type Patch = Map<String, Value>;

/// Turn a JSON object into a patch.
pub fn into_patch(value: Value) -> Result<Patch> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::InvalidRecord(format!(
            "patch must be a JSON object, got {}",
            other
        ))),
    }
}

/// Merge `patch` over the JSON form of `record`, skipping `protected` keys.
pub(crate) fn apply_patch<R: Record>(record: &R, patch: &Patch, protected: &[&str]) -> Result<R> {
    let mut fields = match serde_json::to_value(record)? {
        Value::Object(map) => map,
        other => {
            return Err(StoreError::InvalidRecord(format!(
                "record is not a JSON object: {}",
                other
            )))
        }
    };

    for (key, value) in patch {
        if protected.contains(&key.as_str()) {
            continue;
        }
        fields.insert(key.clone(), value.clone());
    }

    serde_json::from_value(Value::Object(fields)).map_err(|e| StoreError::InvalidRecord(e.to_string()))
}
