use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{RunId, ScenarioId};

/// The fourteen event kinds from spec.md §4.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunEventKind {
    RunStarted,
    AgentStarted,
    AgentProgress,
    AgentCompleted,
    AgentFailed,
    AgentSkipped,
    StateCheckpointed,
    NodeCreated,
    NodeUpdated,
    ValidatorWarning,
    RunBlocked,
    RunCompleted,
    RunFailed,
    RunResumed,
}

impl RunEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunEventKind::RunStarted => "run_started",
            RunEventKind::AgentStarted => "agent_started",
            RunEventKind::AgentProgress => "agent_progress",
            RunEventKind::AgentCompleted => "agent_completed",
            RunEventKind::AgentFailed => "agent_failed",
            RunEventKind::AgentSkipped => "agent_skipped",
            RunEventKind::StateCheckpointed => "state_checkpointed",
            RunEventKind::NodeCreated => "node_created",
            RunEventKind::NodeUpdated => "node_updated",
            RunEventKind::ValidatorWarning => "validator_warning",
            RunEventKind::RunBlocked => "run_blocked",
            RunEventKind::RunCompleted => "run_completed",
            RunEventKind::RunFailed => "run_failed",
            RunEventKind::RunResumed => "run_resumed",
        }
    }
}

/// One entry in a run's ordered, at-most-once event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: String,
    pub run_id: RunId,
    pub scenario_id: ScenarioId,
    pub ts: chrono::DateTime<chrono::Utc>,
    #[serde(rename = "type")]
    pub kind: RunEventKind,
    pub data: Value,
}

impl EventEnvelope {
    pub fn new(run_id: RunId, scenario_id: ScenarioId, kind: RunEventKind, data: Value) -> Self {
        Self {
            event_id: format!("evt_{}", uuid::Uuid::new_v4().simple()),
            run_id,
            scenario_id,
            ts: chrono::Utc::now(),
            kind,
            data,
        }
    }
}
