use serde_json::json;
use waypoint_merge::MergeEvent;
use waypoint_types::{EventEnvelope, RunEventKind, RunId, ScenarioId};

pub fn lifecycle(
    run_id: &RunId,
    scenario_id: &ScenarioId,
    kind: RunEventKind,
    data: serde_json::Value,
) -> EventEnvelope {
    EventEnvelope::new(run_id.clone(), scenario_id.clone(), kind, data)
}

/// Translates the merge engine's own event vocabulary (spec.md §4.1)
/// into wire `EventEnvelope`s for the bus/checkpoint tail.
pub fn from_merge_event(run_id: &RunId, scenario_id: &ScenarioId, event: MergeEvent) -> EventEnvelope {
    match event {
        MergeEvent::StateCheckpointed => {
            lifecycle(run_id, scenario_id, RunEventKind::StateCheckpointed, json!({}))
        }
        MergeEvent::NodeCreated { node_id } => lifecycle(
            run_id,
            scenario_id,
            RunEventKind::NodeCreated,
            json!({ "node_id": node_id }),
        ),
        MergeEvent::NodeUpdated { node_id } => lifecycle(
            run_id,
            scenario_id,
            RunEventKind::NodeUpdated,
            json!({ "node_id": node_id }),
        ),
        MergeEvent::ValidatorWarning { contradiction } => lifecycle(
            run_id,
            scenario_id,
            RunEventKind::ValidatorWarning,
            serde_json::to_value(contradiction).unwrap_or(serde_json::Value::Null),
        ),
        MergeEvent::AgentProgress { message } => lifecycle(
            run_id,
            scenario_id,
            RunEventKind::AgentProgress,
            json!({ "message": message }),
        ),
    }
}
