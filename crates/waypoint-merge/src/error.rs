use thiserror::Error;

/// A malformed `AgentOutput` aborts in full — no partial application
/// (spec.md §4.1 "Failure model"). The scheduler marks the producing
/// agent failed for this pass and decides whether to continue the run.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("patch at {path} did not resolve: {source}")]
    PatchApplication {
        path: String,
        #[source]
        source: waypoint_state::StateError,
    },
    #[error("agent attempted to write runtime-owned path {path}")]
    OwnershipViolation { path: String },
    #[error("node update referenced unknown node_id {node_id} with action update")]
    UnknownNode { node_id: String },
    #[error("state round-trip failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
