use serde_json::Value;
use waypoint_types::CanonicalState;
use waypoint_wire::{Patch, PatchOp};

use crate::error::StateError;
use crate::{pointer, schema};

/// Serializes the typed state to its wire `Value`, the shape JSON
/// Pointers in patches are resolved against.
pub fn to_value(state: &CanonicalState) -> Value {
    serde_json::to_value(state).expect("CanonicalState always serializes")
}

/// Re-hydrates a typed state from a wire `Value`, enforcing the schema
/// invariants from spec.md §3 (`additionalProperties: false` at every
/// top-level key) before the full typed deserialize.
pub fn from_value(value: Value) -> Result<CanonicalState, StateError> {
    schema::reject_unknown_top_level_keys(&value)?;
    serde_json::from_value(value).map_err(|err| StateError::SchemaViolation(err.to_string()))
}

/// Deep-copies a state the way agents receive their input snapshot
/// (spec.md §4.3 step 2: "agents cannot mutate state directly").
pub fn deep_copy(state: &CanonicalState) -> CanonicalState {
    state.clone()
}

/// Applies a single wire `Patch` to a `Value` tree (the mutable half of
/// the state model's patch-application responsibility; the merge engine
/// calls this once per patch inside its section-precedence loop).
pub fn apply_patch_value(root: &mut Value, patch: &Patch) -> Result<(), StateError> {
    match patch.op {
        PatchOp::Add => pointer::apply_add(root, &patch.path, patch.value.clone()),
        PatchOp::Replace => pointer::apply_replace(root, &patch.path, patch.value.clone()),
        PatchOp::Remove => pointer::apply_remove(root, &patch.path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypoint_types::{ProjectId, RunId, ScenarioId};
    use waypoint_wire::PatchMeta;
    use waypoint_types::SourceType;

    fn fresh_state() -> CanonicalState {
        CanonicalState::new(RunId::new(), ScenarioId::new(), ProjectId::new())
    }

    #[test]
    fn round_trips_through_value() {
        let state = fresh_state();
        let value = to_value(&state);
        let restored = from_value(value).unwrap();
        assert_eq!(restored.meta.run_id, state.meta.run_id);
    }

    #[test]
    fn rejects_unknown_top_level_key_on_restore() {
        let mut value = to_value(&fresh_state());
        value
            .as_object_mut()
            .unwrap()
            .insert("bogus_section".to_string(), serde_json::json!({}));
        let err = from_value(value).unwrap_err();
        assert!(matches!(err, StateError::UnknownTopLevelKey(ref k) if k == "bogus_section"));
    }

    #[test]
    fn applies_replace_patch_to_idea_name() {
        let state = fresh_state();
        let mut value = to_value(&state);
        let patch = Patch {
            op: PatchOp::Replace,
            path: "/idea/name".to_string(),
            value: serde_json::json!("AI call assistant"),
            meta: PatchMeta {
                source_type: SourceType::Inference,
                confidence: 0.8,
                sources: Vec::new(),
            },
        };
        apply_patch_value(&mut value, &patch).unwrap();
        let restored = from_value(value).unwrap();
        assert_eq!(restored.idea.name, "AI call assistant");
    }
}
