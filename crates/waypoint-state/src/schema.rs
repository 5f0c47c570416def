use serde_json::Value;

use crate::error::StateError;

const TOP_LEVEL_KEYS: &[&str] = &[
    "meta",
    "idea",
    "constraints",
    "inputs",
    "evidence",
    "decisions",
    "pillars",
    "graph",
    "risks",
    "execution",
    "telemetry",
    "candidates",
];

/// Rejects unknown top-level keys before the expensive typed-deserialize
/// round trip, so end-to-end scenario 5 ("schema rejection") can name the
/// offending key precisely rather than surfacing serde's generic error.
pub fn reject_unknown_top_level_keys(value: &Value) -> Result<(), StateError> {
    let Value::Object(map) = value else {
        return Err(StateError::SchemaViolation(
            "canonical state must be a JSON object".to_string(),
        ));
    };
    for key in map.keys() {
        if !TOP_LEVEL_KEYS.contains(&key.as_str()) {
            return Err(StateError::UnknownTopLevelKey(key.clone()));
        }
    }
    Ok(())
}
