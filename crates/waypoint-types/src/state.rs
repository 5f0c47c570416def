use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{ProjectId, RunId, ScenarioId};
use crate::meta_ref::{CandidateValue, MetaRef};

// ---------------------------------------------------------------------
// meta
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaSection {
    pub run_id: RunId,
    pub scenario_id: ScenarioId,
    pub project_id: ProjectId,
    pub schema_version: u32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    /// Bumped on every accepted write so callers can cheaply detect churn
    /// without deep-equality on the whole document.
    pub revision: u64,
}

impl MetaSection {
    pub fn new(run_id: RunId, scenario_id: ScenarioId, project_id: ProjectId) -> Self {
        let now = chrono::Utc::now();
        Self {
            run_id,
            scenario_id,
            project_id,
            schema_version: 1,
            created_at: now,
            updated_at: now,
            revision: 0,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now();
        self.revision = self.revision.saturating_add(1);
    }
}

// ---------------------------------------------------------------------
// idea / constraints / inputs
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IdeaSection {
    pub name: String,
    pub one_liner: String,
    pub problem: String,
    pub region: String,
    pub category: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceLevel {
    None,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintsSection {
    pub team_size: u32,
    pub timeline_weeks: u32,
    pub budget: f64,
    pub compliance_level: ComplianceLevel,
}

impl Default for ConstraintsSection {
    fn default() -> Self {
        Self {
            team_size: 0,
            timeline_weeks: 0,
            budget: 0.0,
            compliance_level: ComplianceLevel::None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeAnswer {
    pub question_id: String,
    pub answer: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct InputsSection {
    #[serde(default)]
    pub intake_answers: Vec<IntakeAnswer>,
    #[serde(default)]
    pub open_questions: Vec<String>,
}

impl InputsSection {
    pub fn is_complete(&self) -> bool {
        !self.intake_answers.is_empty() && self.open_questions.is_empty()
    }
}

// ---------------------------------------------------------------------
// evidence
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceSource {
    pub url: String,
    pub canonical_url: String,
    #[serde(default)]
    pub snippets: Vec<String>,
    pub quality_score: f64,
    pub meta: MetaRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Competitor {
    pub name: String,
    #[serde(default)]
    pub notes: String,
    pub meta: MetaRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingAnchor {
    pub competitor_or_source: String,
    pub price: f64,
    pub metric: String,
    pub meta: MetaRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingPattern {
    pub pattern: String,
    pub meta: MetaRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSignal {
    pub channel: String,
    pub strength: f64,
    pub meta: MetaRef,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EvidenceSection {
    #[serde(default)]
    pub sources: Vec<EvidenceSource>,
    #[serde(default)]
    pub competitors: Vec<Competitor>,
    #[serde(default)]
    pub pricing_anchors: Vec<PricingAnchor>,
    #[serde(default)]
    pub messaging_patterns: Vec<MessagingPattern>,
    #[serde(default)]
    pub channel_signals: Vec<ChannelSignal>,
}

// ---------------------------------------------------------------------
// decisions
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKey {
    Icp,
    Positioning,
    Pricing,
    Channels,
    SalesMotion,
}

impl DecisionKey {
    pub const ALL: [DecisionKey; 5] = [
        DecisionKey::Icp,
        DecisionKey::Positioning,
        DecisionKey::Pricing,
        DecisionKey::Channels,
        DecisionKey::SalesMotion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionKey::Icp => "icp",
            DecisionKey::Positioning => "positioning",
            DecisionKey::Pricing => "pricing",
            DecisionKey::Channels => "channels",
            DecisionKey::SalesMotion => "sales_motion",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionOption {
    pub option_id: String,
    pub summary: String,
    #[serde(default)]
    pub payload: Value,
    pub meta: MetaRef,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DecisionOverride {
    pub is_custom: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub justification: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionSlot {
    #[serde(default)]
    pub options: Vec<DecisionOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended_option_id: Option<String>,
    /// Runtime-owned: only the scheduler writes this field (spec.md §3
    /// Ownership). Agents may only contribute `options[]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_option_id: Option<String>,
    #[serde(default)]
    pub r#override: DecisionOverride,
    #[serde(default)]
    pub meta: Option<MetaRef>,
}

impl Default for DecisionSlot {
    fn default() -> Self {
        Self {
            options: Vec::new(),
            recommended_option_id: None,
            selected_option_id: None,
            r#override: DecisionOverride::default(),
            meta: None,
        }
    }
}

impl DecisionSlot {
    pub fn is_finalized(&self) -> bool {
        self.selected_option_id.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionsSection {
    pub icp: DecisionSlot,
    pub positioning: DecisionSlot,
    pub pricing: DecisionSlot,
    pub channels: DecisionSlot,
    pub sales_motion: DecisionSlot,
    /// Pricing-specific field referenced directly by validator rules.
    #[serde(default)]
    pub pricing_metric: Option<String>,
    #[serde(default)]
    pub pricing_tiers: Vec<PricingTier>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingTier {
    pub name: String,
    pub price: f64,
    pub meta: MetaRef,
}

impl Default for DecisionsSection {
    fn default() -> Self {
        Self {
            icp: DecisionSlot::default(),
            positioning: DecisionSlot::default(),
            pricing: DecisionSlot::default(),
            channels: DecisionSlot::default(),
            sales_motion: DecisionSlot::default(),
            pricing_metric: None,
            pricing_tiers: Vec::new(),
        }
    }
}

impl DecisionsSection {
    pub fn slot(&self, key: DecisionKey) -> &DecisionSlot {
        match key {
            DecisionKey::Icp => &self.icp,
            DecisionKey::Positioning => &self.positioning,
            DecisionKey::Pricing => &self.pricing,
            DecisionKey::Channels => &self.channels,
            DecisionKey::SalesMotion => &self.sales_motion,
        }
    }

    pub fn slot_mut(&mut self, key: DecisionKey) -> &mut DecisionSlot {
        match key {
            DecisionKey::Icp => &mut self.icp,
            DecisionKey::Positioning => &mut self.positioning,
            DecisionKey::Pricing => &mut self.pricing,
            DecisionKey::Channels => &mut self.channels,
            DecisionKey::SalesMotion => &mut self.sales_motion,
        }
    }
}

// ---------------------------------------------------------------------
// pillars
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pillar {
    MarketIntelligence,
    Customer,
    PositioningPricing,
    GoToMarket,
    ProductTech,
    Execution,
}

impl Pillar {
    pub const ALL: [Pillar; 6] = [
        Pillar::MarketIntelligence,
        Pillar::Customer,
        Pillar::PositioningPricing,
        Pillar::GoToMarket,
        Pillar::ProductTech,
        Pillar::Execution,
    ];
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PillarSummary {
    pub pillar: Pillar,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub key_outputs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PillarsSection {
    #[serde(default)]
    pub pillars: Vec<PillarSummary>,
}

// ---------------------------------------------------------------------
// graph
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Draft,
    Final,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Summary,
    Competitor,
    Pricing,
    Channel,
    Risk,
    Plan,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    /// Dotted semantic path, e.g. `market.icp.summary`. Stable across
    /// reruns: upserted by ID, never duplicated.
    pub id: String,
    pub node_type: NodeType,
    pub pillar: Pillar,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub evidence_refs: Vec<String>,
    pub status: NodeStatus,
    pub meta: MetaRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphGroup {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub node_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GraphSection {
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
    #[serde(default)]
    pub groups: Vec<GraphGroup>,
}

impl GraphSection {
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut GraphNode> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }
}

// ---------------------------------------------------------------------
// risks
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contradiction {
    pub rule_id: String,
    pub severity: Severity,
    pub message: String,
    pub paths: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended_fix: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissingProof {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RisksSection {
    /// Written only by the validator (spec.md §3 Ownership).
    #[serde(default)]
    pub contradictions: Vec<Contradiction>,
    #[serde(default)]
    pub missing_proof: Vec<MissingProof>,
    #[serde(default)]
    pub high_risk_flags: Vec<String>,
}

impl RisksSection {
    pub fn has_unresolved_critical(&self) -> bool {
        self.contradictions
            .iter()
            .any(|c| c.severity == Severity::Critical)
    }
}

// ---------------------------------------------------------------------
// execution
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextAction {
    pub title: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub due_week: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    pub name: String,
    pub hypothesis: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExecutionSection {
    #[serde(default)]
    pub chosen_track: Option<String>,
    #[serde(default)]
    pub next_actions: Vec<NextAction>,
    #[serde(default)]
    pub experiments: Vec<Experiment>,
    #[serde(default)]
    pub assets: Vec<String>,
}

// ---------------------------------------------------------------------
// telemetry
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTiming {
    pub agent: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub duration_ms: u64,
    pub pass: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TokenSpend {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentError {
    pub agent: String,
    pub message: String,
    pub occurred_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TelemetrySection {
    /// Written only by the runtime (spec.md §3 Ownership).
    #[serde(default)]
    pub agent_timings: Vec<AgentTiming>,
    #[serde(default)]
    pub token_spend: HashMap<String, TokenSpend>,
    #[serde(default)]
    pub errors: Vec<AgentError>,
}

impl TelemetrySection {
    pub fn total_tokens(&self) -> u64 {
        self.token_spend
            .values()
            .map(|t| t.prompt_tokens + t.completion_tokens)
            .sum()
    }
}

// ---------------------------------------------------------------------
// candidates
// ---------------------------------------------------------------------

/// Sibling storage for merge rule 5's conflicting-write outcomes, keyed
/// by the JSON Pointer path of the leaf in conflict. `candidates` holds
/// unresolved evidence-vs-evidence conflicts (`V-EVID-CONFLICT`);
/// `candidates_archive` holds losing inference/assumption values kept
/// for audit once a winner is chosen.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CandidatesSection {
    #[serde(default)]
    pub candidates: HashMap<String, Vec<CandidateValue>>,
    #[serde(default)]
    pub candidates_archive: HashMap<String, Vec<CandidateValue>>,
}

// ---------------------------------------------------------------------
// CanonicalState
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CanonicalState {
    pub meta: MetaSection,
    #[serde(default)]
    pub idea: IdeaSection,
    #[serde(default)]
    pub constraints: ConstraintsSection,
    #[serde(default)]
    pub inputs: InputsSection,
    #[serde(default)]
    pub evidence: EvidenceSection,
    #[serde(default)]
    pub decisions: DecisionsSection,
    #[serde(default)]
    pub pillars: PillarsSection,
    #[serde(default)]
    pub graph: GraphSection,
    #[serde(default)]
    pub risks: RisksSection,
    #[serde(default)]
    pub execution: ExecutionSection,
    #[serde(default)]
    pub telemetry: TelemetrySection,
    #[serde(default)]
    pub candidates: CandidatesSection,
}

impl CanonicalState {
    pub fn new(run_id: RunId, scenario_id: ScenarioId, project_id: ProjectId) -> Self {
        Self {
            meta: MetaSection::new(run_id, scenario_id, project_id),
            idea: IdeaSection::default(),
            constraints: ConstraintsSection::default(),
            inputs: InputsSection::default(),
            evidence: EvidenceSection::default(),
            decisions: DecisionsSection::default(),
            pillars: PillarsSection::default(),
            graph: GraphSection::default(),
            risks: RisksSection::default(),
            execution: ExecutionSection::default(),
            telemetry: TelemetrySection::default(),
            candidates: CandidatesSection::default(),
        }
    }

    /// Deep copy handed to agents — agents never see a live reference
    /// into the scheduler's state (spec.md §4.3 step 2).
    pub fn snapshot(&self) -> Self {
        self.clone()
    }
}
