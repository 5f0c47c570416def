use serde::{Deserialize, Serialize};
use waypoint_types::{CanonicalState, EventEnvelope, RunId};

/// One durable `(run_id, index, state, event_tail)` record (spec.md §4.4).
/// `index` is strictly monotonic per run, starting at `0` for the first
/// checkpoint written after a run starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointEntry {
    pub run_id: RunId,
    pub index: u64,
    pub state: CanonicalState,
    /// Events produced since the previous checkpoint, replayed to late
    /// subscribers alongside this snapshot (spec.md §4.5).
    #[serde(default)]
    pub event_tail: Vec<EventEnvelope>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl CheckpointEntry {
    pub fn new(
        run_id: RunId,
        index: u64,
        state: CanonicalState,
        event_tail: Vec<EventEnvelope>,
    ) -> Self {
        Self {
            run_id,
            index,
            state,
            event_tail,
            created_at: chrono::Utc::now(),
        }
    }
}
