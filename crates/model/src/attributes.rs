use std::collections::BTreeMap;

use serde_json::Value;

/// An entity's attribute state: attribute name to value.
///
/// A missing key means the attribute is absent. A key mapped to
/// `Value::Null` means the attribute is present with a null value.
pub type AttributeMap = BTreeMap<String, Value>;

/// Errors from encoding or decoding a stored snapshot.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// The payload is not valid JSON.
    #[error("snapshot is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The payload is valid JSON but not an object.
    #[error("snapshot must be a JSON object, found {found}")]
    NotAnObject { found: &'static str },
}

/// Encode an attribute map into its durable text form.
pub fn encode_snapshot(attributes: &AttributeMap) -> Result<String, SnapshotError> {
    Ok(serde_json::to_string(attributes)?)
}

/// Decode a stored snapshot payload.
///
/// An absent, empty, or whitespace-only payload yields an empty map.
pub fn decode_snapshot(payload: Option<&str>) -> Result<AttributeMap, SnapshotError> {
    let text = match payload {
        Some(text) if !text.trim().is_empty() => text,
        _ => return Ok(AttributeMap::new()),
    };

    match serde_json::from_str::<Value>(text)? {
        Value::Object(map) => Ok(map.into_iter().collect()),
        other => Err(SnapshotError::NotAnObject {
            found: json_kind(&other),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
