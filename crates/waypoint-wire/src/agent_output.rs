use serde::{Deserialize, Serialize};
use serde_json::Value;
use waypoint_types::{NodeType, Pillar, RunId};

use crate::patch::{Patch, PatchMeta};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeUpdateAction {
    Create,
    Update,
    Finalize,
}

/// One graph-node write (merge rule 6). `create` and `update` are
/// equivalent when the node already exists; `finalize` additionally
/// freezes the node against further non-override writes this run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeUpdate {
    pub node_id: String,
    pub action: NodeUpdateAction,
    pub node_type: NodeType,
    pub pillar: Pillar,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub evidence_refs: Vec<String>,
    pub meta: PatchMeta,
}

/// A decision option an agent is contributing. Becomes an entry in
/// `decisions.<key>.options[]`; the agent's own `recommended_option_id`
/// is only advisory — only the runtime may write `selected_option_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionProposal {
    pub decision_key: String,
    pub option_id: String,
    pub summary: String,
    #[serde(default)]
    pub payload: Value,
    pub meta: PatchMeta,
    #[serde(default)]
    pub recommended: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RequiredInput {
    pub question_id: String,
    pub prompt: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFlagKind {
    MissingProof,
    HighRisk,
}

/// An agent-proposed informational risk signal. Distinct from a
/// `Contradiction`: agents may flag missing proof or elevated risk, but
/// only the validator may write `risks.contradictions` (spec.md §3
/// Ownership).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskFlag {
    pub kind: RiskFlagKind,
    #[serde(default)]
    pub path: Option<String>,
    pub message: String,
}

/// The structured diff one agent invocation produces (spec.md §4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentOutput {
    pub agent: String,
    pub run_id: RunId,
    pub produced_at: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub patches: Vec<Patch>,
    /// Patches an agent categorizes as grounded facts. Carries the same
    /// shape as `patches`; kept as a separate wire field (per spec.md
    /// §4.1) purely so an agent's intent ("this is a fact") survives
    /// onto the wire, even though the merge engine folds it into the
    /// same section-precedence pipeline as `patches`.
    #[serde(default)]
    pub facts: Vec<Patch>,
    /// Patches an agent categorizes as assumptions. See `facts` above.
    #[serde(default)]
    pub assumptions: Vec<Patch>,
    #[serde(default)]
    pub proposals: Vec<DecisionProposal>,
    #[serde(default)]
    pub risks: Vec<RiskFlag>,
    #[serde(default)]
    pub node_updates: Vec<NodeUpdate>,
    #[serde(default)]
    pub required_inputs: Vec<RequiredInput>,
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
}

impl AgentOutput {
    pub fn empty(agent: impl Into<String>, run_id: RunId) -> Self {
        Self {
            agent: agent.into(),
            run_id,
            produced_at: chrono::Utc::now(),
            patches: Vec::new(),
            facts: Vec::new(),
            assumptions: Vec::new(),
            proposals: Vec::new(),
            risks: Vec::new(),
            node_updates: Vec::new(),
            required_inputs: Vec::new(),
            prompt_tokens: 0,
            completion_tokens: 0,
        }
    }

    /// All patch-shaped writes regardless of the wire field an agent put
    /// them in (`patches`, `facts`, or `assumptions`) — the merge
    /// engine's rule 1 partitions this combined stream by section.
    pub fn all_patches(&self) -> impl Iterator<Item = &Patch> {
        self.patches.iter().chain(self.facts.iter()).chain(self.assumptions.iter())
    }
}
