use serde::{Deserialize, Serialize};
use serde_json::Value;
use waypoint_types::{MetaRef, SourceType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchOp {
    Add,
    Replace,
    Remove,
}

/// Wire-format meta carried on a patch; narrower than `MetaRef` since a
/// patch author never knows `updated_by`/`updated_at` in advance — the
/// merge engine stamps those.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchMeta {
    pub source_type: SourceType,
    pub confidence: f64,
    #[serde(default)]
    pub sources: Vec<String>,
}

impl PatchMeta {
    pub fn into_meta_ref(self, updated_by: impl Into<String>) -> MetaRef {
        MetaRef {
            source_type: self.source_type,
            confidence: self.confidence.clamp(0.0, 1.0),
            sources: self.sources,
            updated_by: updated_by.into(),
            updated_at: chrono::Utc::now(),
        }
        .downgrade_if_sourceless()
    }
}

/// One write from an agent into the canonical state. `path` is a JSON
/// Pointer (RFC 6901) resolved against `CanonicalState` serialized as
/// JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patch {
    pub op: PatchOp,
    pub path: String,
    #[serde(default)]
    pub value: Value,
    pub meta: PatchMeta,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_meta_downgrades_sourceless_evidence() {
        let meta = PatchMeta {
            source_type: SourceType::Evidence,
            confidence: 0.95,
            sources: Vec::new(),
        }
        .into_meta_ref("pricing_agent");
        assert_eq!(meta.source_type, SourceType::Assumption);
        assert!(meta.confidence <= 0.6);
    }
}
