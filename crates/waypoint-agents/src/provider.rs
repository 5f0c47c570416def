use async_trait::async_trait;
use waypoint_types::CanonicalState;
use waypoint_wire::AgentOutput;

use crate::error::AgentError;

/// The external collaborator spec.md §1 carves out of scope: "the
/// LLM/search providers (agents call them)". Anything that turns a
/// state snapshot into a structured output implements this — a real
/// provider-backed completion call, a test double, or a fixture replay.
#[async_trait]
pub trait AgentProvider: Send + Sync {
    async fn complete(&self, agent: &str, state: &CanonicalState) -> Result<AgentOutput, AgentError>;
}
