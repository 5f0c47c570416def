use serde::{Deserialize, Serialize};
use waypoint_types::{Contradiction, DecisionKey, ConstraintsSection, IdeaSection, IntakeAnswer};

/// Not one of spec.md's six endpoints, but a scenario has to exist
/// before a run can be started against it; this is the ambient
/// creation step the distilled endpoint list assumes already happened.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateScenarioRequest {
    pub idea: IdeaSection,
    #[serde(default)]
    pub constraints: ConstraintsSection,
    #[serde(default)]
    pub intake_answers: Vec<IntakeAnswer>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateScenarioResponse {
    pub scenario_id: String,
    pub run_id: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CreateRunRequest {
    #[serde(default)]
    pub changed_decision: Option<DecisionKey>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateRunResponse {
    pub run_id: String,
    pub stream_url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Blocked,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunStatusResponse {
    pub status: RunStatus,
    pub checkpoint_index: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectDecisionRequest {
    pub selected_option_id: String,
    #[serde(default)]
    pub is_custom: bool,
    #[serde(default)]
    pub justification: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SelectDecisionResponse {
    pub run_id: Option<String>,
    pub rerun_triggered: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionBlockedResponse {
    pub error: String,
    pub unresolved_contradictions: Vec<Contradiction>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offending_key: Option<String>,
}
