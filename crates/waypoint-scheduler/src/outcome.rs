use serde::{Deserialize, Serialize};
use waypoint_types::{CanonicalState, Contradiction};

/// Terminal or suspended state of a run, returned from `Scheduler::execute`
/// and mirrored by `GET /runs/{id}` (spec.md §4.6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    /// Reconciliation's round cap was hit, or contradictions stabilized,
    /// while critical/high contradictions remain — awaiting user input,
    /// not a failure (spec.md §4.3, §7 `ValidatorBlock`).
    Blocked,
    Failed,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub state: CanonicalState,
    pub checkpoint_index: u64,
    pub contradictions: Vec<Contradiction>,
}
