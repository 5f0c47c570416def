use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Evidence,
    Inference,
    Assumption,
}

/// Provenance carried by every leaf claim in the canonical state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaRef {
    pub source_type: SourceType,
    pub confidence: f64,
    #[serde(default)]
    pub sources: Vec<String>,
    pub updated_by: String,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl MetaRef {
    pub fn new(source_type: SourceType, confidence: f64, updated_by: impl Into<String>) -> Self {
        Self {
            source_type,
            confidence: confidence.clamp(0.0, 1.0),
            sources: Vec::new(),
            updated_by: updated_by.into(),
            updated_at: chrono::Utc::now(),
        }
    }

    /// Applies the invariant from spec.md §3: an `evidence` claim with no
    /// sources is downgraded to `assumption` with confidence capped at 0.6.
    pub fn downgrade_if_sourceless(mut self) -> Self {
        if self.source_type == SourceType::Evidence && self.sources.is_empty() {
            self.source_type = SourceType::Assumption;
            self.confidence = self.confidence.min(0.6);
        }
        self
    }
}

/// A losing value retained for audit when two non-evidence writes to the
/// same path conflict (merge rule 5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateValue {
    pub value: serde_json::Value,
    pub meta: MetaRef,
}
