use serde_json::{json, Value};
use waypoint_state::{apply_patch_value, from_value, to_value};
use waypoint_types::{
    CandidateValue, CanonicalState, Contradiction, DecisionOption, MetaRef, Severity, SourceType,
};
use waypoint_wire::{AgentOutput, DecisionProposal, NodeUpdate, NodeUpdateAction, Patch, PatchOp, RiskFlag, RiskFlagKind};

use crate::canonical_url::canonicalize;
use crate::error::MergeError;

/// Section precedence from spec.md §4.1 rule 1: later sections consume
/// earlier ones, so earlier sections must land first within one merge.
const SECTION_PRECEDENCE: &[&str] = &["evidence", "decisions", "pillars", "graph", "execution", "telemetry"];

/// Side effects the scheduler turns into `EventEnvelope`s. The merge
/// engine itself has no `run_id`/`scenario_id` to stamp them with.
#[derive(Debug, Clone)]
pub enum MergeEvent {
    StateCheckpointed,
    NodeCreated { node_id: String },
    NodeUpdated { node_id: String },
    ValidatorWarning { contradiction: Contradiction },
    AgentProgress { message: String },
}

#[derive(Debug, Clone)]
pub struct MergeResult {
    pub state: CanonicalState,
    pub events: Vec<MergeEvent>,
}

/// Paths the runtime exclusively owns (spec.md §3 Ownership). An agent
/// patch targeting one of these is rejected outright rather than silently
/// dropped, so a misbehaving agent is surfaced as a merge failure.
fn is_runtime_owned(path: &str) -> bool {
    path == "/meta/updated_at"
        || path == "/risks/contradictions"
        || path.starts_with("/risks/contradictions/")
        || path.starts_with("/telemetry")
        || (path.starts_with("/decisions/") && path.ends_with("/selected_option_id"))
}

/// Top-level section a JSON Pointer path writes into, e.g.
/// `/evidence/sources/-` -> `"evidence"`.
fn section_of(path: &str) -> &str {
    path.trim_start_matches('/').split('/').next().unwrap_or("")
}

/// Applies a single `AgentOutput` onto `state` under the six merge rules
/// (spec.md §4.1). Pure: never mutates `state`, matching the teacher's
/// `DefaultMissionReducer::reduce(&state, event) -> (MissionState, Vec<MissionCommand>)`
/// shape — state in, state-and-events out, by value. A malformed patch
/// aborts the whole output with no partial application.
pub fn merge(state: &CanonicalState, output: AgentOutput) -> Result<MergeResult, MergeError> {
    let mut root = to_value(state);
    let mut events = Vec::new();
    let agent = output.agent.as_str();

    let mut patches: Vec<&Patch> = output.all_patches().collect();
    patches.sort_by_key(|p| {
        SECTION_PRECEDENCE
            .iter()
            .position(|s| *s == section_of(&p.path))
            .unwrap_or(SECTION_PRECEDENCE.len())
    });

    for patch in patches {
        apply_patch(&mut root, patch, agent, &mut events)?;
    }

    for proposal in &output.proposals {
        apply_proposal(&mut root, proposal, agent)?;
    }

    for node_update in &output.node_updates {
        apply_node_update(&mut root, node_update, agent, &mut events)?;
    }

    apply_risk_flags(&mut root, &output.risks)?;

    let mut next = from_value(root).map_err(|err| MergeError::PatchApplication {
        path: "/".to_string(),
        source: err,
    })?;
    next.meta.touch();

    events.push(MergeEvent::AgentProgress {
        message: format!("{agent} merged {} patch(es)", output.patches.len()),
    });
    events.push(MergeEvent::StateCheckpointed);

    Ok(MergeResult { state: next, events })
}

fn apply_patch(root: &mut Value, patch: &Patch, agent: &str, events: &mut Vec<MergeEvent>) -> Result<(), MergeError> {
    if is_runtime_owned(&patch.path) {
        return Err(MergeError::OwnershipViolation { path: patch.path.clone() });
    }

    // Rule 4 (source-less evidence downgrade) happens inside `into_meta_ref`.
    let effective_meta = patch.meta.clone().into_meta_ref(agent);
    let mut value = patch.value.clone();
    if let Value::Object(map) = &mut value {
        map.entry("meta").or_insert_with(|| serde_json::to_value(&effective_meta).unwrap());
    }

    // Rule 2: evidence-source dedup on append.
    if patch.path == "/evidence/sources/-" && matches!(patch.op, PatchOp::Add) {
        return dedup_evidence_source(root, value);
    }

    // Rule 5: confidence aggregation against whatever already lives at this path.
    if matches!(patch.op, PatchOp::Add | PatchOp::Replace) {
        if let Some(existing) = root.pointer(&patch.path).cloned() {
            if existing != Value::Null && existing != value {
                return resolve_conflict(root, &patch.path, existing, value, &effective_meta, events);
            }
        }
    }

    let mut patch_with_meta = patch.clone();
    patch_with_meta.value = value;
    apply_patch_value(root, &patch_with_meta).map_err(|source| MergeError::PatchApplication {
        path: patch.path.clone(),
        source,
    })
}

fn dedup_evidence_source(root: &mut Value, mut value: Value) -> Result<(), MergeError> {
    let url = value.get("url").and_then(Value::as_str).unwrap_or_default().to_string();
    let canon = canonicalize(&url);

    let sources = root
        .pointer_mut("/evidence/sources")
        .and_then(Value::as_array_mut)
        .ok_or_else(|| MergeError::PatchApplication {
            path: "/evidence/sources".to_string(),
            source: waypoint_state::StateError::PathNotFound("/evidence/sources".to_string()),
        })?;

    if let Some(existing) = sources
        .iter_mut()
        .find(|s| s.get("canonical_url").and_then(Value::as_str) == Some(canon.as_str()))
    {
        let mut snippets: Vec<String> = existing
            .get("snippets")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        if let Some(new_snippets) = value.get("snippets").and_then(Value::as_array) {
            for s in new_snippets {
                if let Some(s) = s.as_str() {
                    if !snippets.iter().any(|existing| existing == s) {
                        snippets.push(s.to_string());
                    }
                }
            }
        }
        let existing_quality = existing.get("quality_score").and_then(Value::as_f64).unwrap_or(0.0);
        let new_quality = value.get("quality_score").and_then(Value::as_f64).unwrap_or(0.0);
        let max_quality = existing_quality.max(new_quality);

        if let Value::Object(map) = existing {
            map.insert("snippets".to_string(), json!(snippets));
            map.insert("quality_score".to_string(), json!(max_quality));
        }
        return Ok(());
    }

    if let Value::Object(map) = &mut value {
        map.insert("canonical_url".to_string(), json!(canon));
    }
    sources.push(value);
    Ok(())
}

fn source_type_of(value: &Value) -> Option<SourceType> {
    let raw = value.get("meta")?.get("source_type")?.as_str()?;
    serde_json::from_value(json!(raw)).ok()
}

fn confidence_of(value: &Value) -> f64 {
    value
        .get("meta")
        .and_then(|m| m.get("confidence"))
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
}

/// Rule 5's final clause: when neither side of a conflict has evidence,
/// the winner's effective provenance is still an assumption, confidence
/// capped at 0.6, regardless of what `source_type`/`confidence` it
/// carried in.
fn downgrade_to_assumption(value: &mut Value) {
    if let Some(meta) = value.get_mut("meta").and_then(Value::as_object_mut) {
        meta.insert("source_type".to_string(), json!("assumption"));
        let capped = meta.get("confidence").and_then(Value::as_f64).unwrap_or(0.0).min(0.6);
        meta.insert("confidence".to_string(), json!(capped));
    }
}

fn resolve_conflict(
    root: &mut Value,
    path: &str,
    existing: Value,
    incoming: Value,
    incoming_meta: &MetaRef,
    events: &mut Vec<MergeEvent>,
) -> Result<(), MergeError> {
    let existing_type = source_type_of(&existing);
    let incoming_type = Some(incoming_meta.source_type);

    match (existing_type, incoming_type) {
        (Some(SourceType::Evidence), Some(SourceType::Evidence)) => {
            let candidates = root
                .pointer_mut("/candidates/candidates")
                .and_then(Value::as_object_mut)
                .expect("CandidatesSection always present");
            let entry = candidates.entry(path.to_string()).or_insert_with(|| json!([]));
            if let Value::Array(arr) = entry {
                if arr.is_empty() {
                    arr.push(candidate_value_json(&existing));
                }
                arr.push(candidate_value_json(&incoming));
            }
            let contradiction = Contradiction {
                rule_id: "V-EVID-CONFLICT".to_string(),
                severity: Severity::High,
                message: format!("conflicting evidence-sourced writes at {path}"),
                paths: vec![path.to_string()],
                recommended_fix: None,
            };
            events.push(MergeEvent::ValidatorWarning { contradiction });
            Ok(())
        }
        (Some(SourceType::Evidence), _) => {
            // existing evidence outranks a non-evidence write; drop the incoming value.
            Ok(())
        }
        (_, Some(SourceType::Evidence)) => {
            set_pointer(root, path, incoming)
        }
        _ => {
            let existing_confidence = confidence_of(&existing);
            let (mut winner, loser) = if incoming_meta.confidence > existing_confidence {
                (incoming, existing)
            } else {
                (existing, incoming)
            };
            downgrade_to_assumption(&mut winner);
            let archive = root
                .pointer_mut("/candidates/candidates_archive")
                .and_then(Value::as_object_mut)
                .expect("CandidatesSection always present");
            archive
                .entry(path.to_string())
                .or_insert_with(|| json!([]))
                .as_array_mut()
                .expect("archive entries are arrays")
                .push(candidate_value_json(&loser));
            set_pointer(root, path, winner)
        }
    }
}

fn candidate_value_json(value: &Value) -> Value {
    let meta = value.get("meta").cloned().unwrap_or_else(|| {
        serde_json::to_value(MetaRef::new(SourceType::Assumption, 0.0, "merge_engine")).unwrap()
    });
    serde_json::to_value(CandidateValue {
        value: value.clone(),
        meta: serde_json::from_value(meta).unwrap_or_else(|_| MetaRef::new(SourceType::Assumption, 0.0, "merge_engine")),
    })
    .unwrap()
}

fn set_pointer(root: &mut Value, path: &str, value: Value) -> Result<(), MergeError> {
    let target = root.pointer_mut(path).ok_or_else(|| MergeError::PatchApplication {
        path: path.to_string(),
        source: waypoint_state::StateError::PathNotFound(path.to_string()),
    })?;
    *target = value;
    Ok(())
}

/// Rule 3: agents may only contribute `proposals[]`, which become
/// `options[]` on the addressed decision slot; `recommended_option_id`
/// tracks the most recently recommended proposal.
fn apply_proposal(root: &mut Value, proposal: &DecisionProposal, agent: &str) -> Result<(), MergeError> {
    let slot_path = format!("/decisions/{}", proposal.decision_key);
    let slot = root.pointer_mut(&slot_path).ok_or_else(|| MergeError::PatchApplication {
        path: slot_path.clone(),
        source: waypoint_state::StateError::PathNotFound(slot_path.clone()),
    })?;

    let meta = MetaRef::new(proposal.meta.source_type, proposal.meta.confidence, agent)
        .downgrade_if_sourceless();
    let option = DecisionOption {
        option_id: proposal.option_id.clone(),
        summary: proposal.summary.clone(),
        payload: proposal.payload.clone(),
        meta,
    };

    let Value::Object(slot_map) = slot else {
        return Err(MergeError::PatchApplication {
            path: slot_path,
            source: waypoint_state::StateError::NotAContainer(slot_path.clone()),
        });
    };

    let options = slot_map.entry("options").or_insert_with(|| json!([])).as_array_mut().expect("options is an array");
    if let Some(existing) = options
        .iter_mut()
        .find(|o| o.get("option_id").and_then(Value::as_str) == Some(proposal.option_id.as_str()))
    {
        *existing = serde_json::to_value(&option).unwrap();
    } else {
        options.push(serde_json::to_value(&option).unwrap());
    }

    if proposal.recommended {
        slot_map.insert("recommended_option_id".to_string(), json!(proposal.option_id));
    }
    Ok(())
}

/// Rule 6: resolves a graph node by `node_id`; `create` and `update` are
/// equivalent when the node exists. `finalize` freezes the node against
/// further non-override writes in the same run.
fn apply_node_update(root: &mut Value, update: &NodeUpdate, agent: &str, events: &mut Vec<MergeEvent>) -> Result<(), MergeError> {
    let meta = update.meta.clone().into_meta_ref(agent);
    let nodes = root
        .pointer_mut("/graph/nodes")
        .and_then(Value::as_array_mut)
        .expect("graph.nodes always present");

    let status = if matches!(update.action, NodeUpdateAction::Finalize) {
        "final"
    } else {
        "draft"
    };

    if let Some(existing) = nodes.iter_mut().find(|n| n.get("id").and_then(Value::as_str) == Some(update.node_id.as_str())) {
        let frozen = existing.get("status").and_then(Value::as_str) == Some("final");
        if frozen {
            // Finalized nodes only accept further writes via an explicit override,
            // which this merge engine has no channel for yet — silently ignore.
            return Ok(());
        }
        if let Value::Object(map) = existing {
            map.insert("label".to_string(), json!(update.label));
            map.insert("payload".to_string(), update.payload.clone());
            map.insert("evidence_refs".to_string(), json!(update.evidence_refs));
            map.insert("status".to_string(), json!(status));
            map.insert("meta".to_string(), serde_json::to_value(&meta).unwrap());
        }
        events.push(MergeEvent::NodeUpdated { node_id: update.node_id.clone() });
    } else {
        let node = json!({
            "id": update.node_id,
            "node_type": update.node_type,
            "pillar": update.pillar,
            "label": update.label,
            "payload": update.payload,
            "evidence_refs": update.evidence_refs,
            "status": status,
            "meta": meta,
        });
        nodes.push(node);
        events.push(MergeEvent::NodeCreated { node_id: update.node_id.clone() });
    }
    Ok(())
}

/// Agent-proposed risk signals are informational (spec.md §3 Ownership
/// reserves `risks.contradictions` for the validator); they land in
/// `risks.missing_proof` / `risks.high_risk_flags`, deduplicated so a
/// rerun doesn't pile up repeats of the same flag.
fn apply_risk_flags(root: &mut Value, flags: &[RiskFlag]) -> Result<(), MergeError> {
    if flags.is_empty() {
        return Ok(());
    }
    for flag in flags {
        match flag.kind {
            RiskFlagKind::MissingProof => {
                let entries = root
                    .pointer_mut("/risks/missing_proof")
                    .and_then(Value::as_array_mut)
                    .expect("risks.missing_proof always present");
                let path = flag.path.clone().unwrap_or_default();
                let already_present = entries
                    .iter()
                    .any(|e| e.get("path").and_then(Value::as_str) == Some(path.as_str()) && e.get("reason").and_then(Value::as_str) == Some(flag.message.as_str()));
                if !already_present {
                    entries.push(json!({ "path": path, "reason": flag.message }));
                }
            }
            RiskFlagKind::HighRisk => {
                let entries = root
                    .pointer_mut("/risks/high_risk_flags")
                    .and_then(Value::as_array_mut)
                    .expect("risks.high_risk_flags always present");
                if !entries.iter().any(|e| e.as_str() == Some(flag.message.as_str())) {
                    entries.push(json!(flag.message));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypoint_types::{ProjectId, RunId, ScenarioId};
    use waypoint_wire::PatchMeta;

    fn fresh_state() -> CanonicalState {
        CanonicalState::new(RunId::new(), ScenarioId::new(), ProjectId::new())
    }

    fn evidence_meta(source: &str) -> PatchMeta {
        PatchMeta {
            source_type: SourceType::Evidence,
            confidence: 0.9,
            sources: vec![source.to_string()],
        }
    }

    #[test]
    fn merge_bumps_revision_and_checkpoints() {
        let state = fresh_state();
        let mut output = AgentOutput::empty("idea_agent", state.meta.run_id.clone());
        output.patches.push(Patch {
            op: PatchOp::Replace,
            path: "/idea/name".to_string(),
            value: json!("Call triage copilot"),
            meta: evidence_meta("https://example.com"),
        });
        let result = merge(&state, output).unwrap();
        assert_eq!(result.state.idea.name, "Call triage copilot");
        assert_eq!(result.state.meta.revision, 1);
        assert!(result.events.iter().any(|e| matches!(e, MergeEvent::StateCheckpointed)));
    }

    #[test]
    fn rejects_patch_to_selected_option_id() {
        let state = fresh_state();
        let mut output = AgentOutput::empty("icp_agent", state.meta.run_id.clone());
        output.patches.push(Patch {
            op: PatchOp::Replace,
            path: "/decisions/icp/selected_option_id".to_string(),
            value: json!("opt-1"),
            meta: evidence_meta("https://example.com"),
        });
        let err = merge(&state, output).unwrap_err();
        assert!(matches!(err, MergeError::OwnershipViolation { .. }));
    }

    #[test]
    fn proposal_becomes_option_and_sets_recommendation() {
        let state = fresh_state();
        let mut output = AgentOutput::empty("icp_agent", state.meta.run_id.clone());
        output.proposals.push(DecisionProposal {
            decision_key: "icp".to_string(),
            option_id: "opt-1".to_string(),
            summary: "Series A SaaS ops teams".to_string(),
            payload: json!({}),
            meta: evidence_meta("https://example.com"),
            recommended: true,
        });
        let result = merge(&state, output).unwrap();
        assert_eq!(result.state.decisions.icp.options.len(), 1);
        assert_eq!(result.state.decisions.icp.recommended_option_id.as_deref(), Some("opt-1"));
        assert!(result.state.decisions.icp.selected_option_id.is_none());
    }

    #[test]
    fn sourceless_evidence_patch_downgrades_to_assumption() {
        let state = fresh_state();
        let mut output = AgentOutput::empty("market_agent", state.meta.run_id.clone());
        output.patches.push(Patch {
            op: PatchOp::Add,
            path: "/evidence/sources/-".to_string(),
            value: json!({"url": "https://a.com", "canonical_url": "", "snippets": [], "quality_score": 0.5}),
            meta: PatchMeta {
                source_type: SourceType::Evidence,
                confidence: 0.9,
                sources: Vec::new(),
            },
        });
        let result = merge(&state, output).unwrap();
        let source = &result.state.evidence.sources[0];
        assert_eq!(source.meta.source_type, SourceType::Assumption);
        assert!(source.meta.confidence <= 0.6);
    }

    #[test]
    fn duplicate_evidence_source_merges_snippets_and_max_quality() {
        let state = fresh_state();
        let mut first = AgentOutput::empty("market_agent", state.meta.run_id.clone());
        first.patches.push(Patch {
            op: PatchOp::Add,
            path: "/evidence/sources/-".to_string(),
            value: json!({"url": "https://Example.com/blog/", "snippets": ["a"], "quality_score": 0.4}),
            meta: evidence_meta("https://example.com/blog"),
        });
        let after_first = merge(&state, first).unwrap().state;

        let mut second = AgentOutput::empty("market_agent", state.meta.run_id.clone());
        second.patches.push(Patch {
            op: PatchOp::Add,
            path: "/evidence/sources/-".to_string(),
            value: json!({"url": "https://example.com/blog?utm_source=hn", "snippets": ["b"], "quality_score": 0.8}),
            meta: evidence_meta("https://example.com/blog"),
        });
        let after_second = merge(&after_first, second).unwrap().state;

        assert_eq!(after_second.evidence.sources.len(), 1);
        let merged = &after_second.evidence.sources[0];
        assert_eq!(merged.quality_score, 0.8);
        assert_eq!(merged.snippets.len(), 2);
    }

    #[test]
    fn conflicting_evidence_writes_go_to_candidates_with_contradiction() {
        let state = fresh_state();
        let mut first = AgentOutput::empty("market_agent", state.meta.run_id.clone());
        first.patches.push(Patch {
            op: PatchOp::Add,
            path: "/evidence/competitors/-".to_string(),
            value: json!({"name": "Acme Corp", "notes": "direct competitor"}),
            meta: evidence_meta("https://example.com/competitors"),
        });
        let after_first = merge(&state, first).unwrap().state;

        let mut second = AgentOutput::empty("market_agent", state.meta.run_id.clone());
        second.patches.push(Patch {
            op: PatchOp::Replace,
            path: "/evidence/competitors/0".to_string(),
            value: json!({"name": "Acme Corporation", "notes": "renamed by a second source"}),
            meta: evidence_meta("https://competitor.com/about"),
        });
        let result = merge(&after_first, second).unwrap();

        assert!(result
            .events
            .iter()
            .any(|e| matches!(e, MergeEvent::ValidatorWarning { contradiction } if contradiction.rule_id == "V-EVID-CONFLICT")));
        assert_eq!(
            result.state.candidates.candidates.get("/evidence/competitors/0").map(|v| v.len()),
            Some(2)
        );
        // rule 5: "pick no winner" - the original value is left untouched.
        assert_eq!(result.state.evidence.competitors[0].name, "Acme Corp");
    }

    #[test]
    fn higher_confidence_assumption_wins_and_loser_is_archived() {
        let state = fresh_state();
        let assumption_meta = |confidence: f64| PatchMeta {
            source_type: SourceType::Assumption,
            confidence,
            sources: Vec::new(),
        };

        let mut first = AgentOutput::empty("market_agent", state.meta.run_id.clone());
        first.patches.push(Patch {
            op: PatchOp::Add,
            path: "/evidence/competitors/-".to_string(),
            value: json!({"name": "Acme Corp", "notes": "initial guess"}),
            meta: assumption_meta(0.4),
        });
        let after_first = merge(&state, first).unwrap().state;

        let mut second = AgentOutput::empty("market_agent", state.meta.run_id.clone());
        second.patches.push(Patch {
            op: PatchOp::Replace,
            path: "/evidence/competitors/0".to_string(),
            value: json!({"name": "Acme Holdings", "notes": "more confident guess"}),
            meta: assumption_meta(0.7),
        });
        let result = merge(&after_first, second).unwrap();

        assert_eq!(result.state.evidence.competitors[0].name, "Acme Holdings");
        assert_eq!(
            result.state.candidates.candidates_archive.get("/evidence/competitors/0").map(|v| v.len()),
            Some(1)
        );
        assert_eq!(result.state.evidence.competitors[0].meta.source_type, SourceType::Assumption);
        assert_eq!(result.state.evidence.competitors[0].meta.confidence, 0.6);
    }

    #[test]
    fn two_inference_writes_force_winner_to_capped_assumption() {
        let state = fresh_state();
        let inference_meta = |confidence: f64| PatchMeta {
            source_type: SourceType::Inference,
            confidence,
            sources: Vec::new(),
        };

        let mut first = AgentOutput::empty("market_agent", state.meta.run_id.clone());
        first.patches.push(Patch {
            op: PatchOp::Add,
            path: "/evidence/competitors/-".to_string(),
            value: json!({"name": "Acme Corp", "notes": "inferred"}),
            meta: inference_meta(0.9),
        });
        let after_first = merge(&state, first).unwrap().state;

        let mut second = AgentOutput::empty("market_agent", state.meta.run_id.clone());
        second.patches.push(Patch {
            op: PatchOp::Replace,
            path: "/evidence/competitors/0".to_string(),
            value: json!({"name": "Acme Holdings", "notes": "also inferred"}),
            meta: inference_meta(0.95),
        });
        let result = merge(&after_first, second).unwrap();

        assert_eq!(result.state.evidence.competitors[0].name, "Acme Holdings");
        assert_eq!(result.state.evidence.competitors[0].meta.source_type, SourceType::Assumption);
        assert_eq!(result.state.evidence.competitors[0].meta.confidence, 0.6);
    }

    #[test]
    fn node_update_create_then_finalize_freezes_node() {
        let state = fresh_state();
        let mut first = AgentOutput::empty("product_strategy_agent", state.meta.run_id.clone());
        first.node_updates.push(NodeUpdate {
            node_id: "market.icp.summary".to_string(),
            action: NodeUpdateAction::Create,
            node_type: waypoint_types::NodeType::Summary,
            pillar: waypoint_types::Pillar::Customer,
            label: "ICP summary".to_string(),
            payload: json!({}),
            evidence_refs: Vec::new(),
            meta: evidence_meta("https://example.com"),
        });
        let after_create = merge(&state, first).unwrap();
        assert!(after_create.events.iter().any(|e| matches!(e, MergeEvent::NodeCreated { .. })));

        let mut finalize = AgentOutput::empty("product_strategy_agent", state.meta.run_id.clone());
        finalize.node_updates.push(NodeUpdate {
            node_id: "market.icp.summary".to_string(),
            action: NodeUpdateAction::Finalize,
            node_type: waypoint_types::NodeType::Summary,
            pillar: waypoint_types::Pillar::Customer,
            label: "ICP summary (final)".to_string(),
            payload: json!({}),
            evidence_refs: Vec::new(),
            meta: evidence_meta("https://example.com"),
        });
        let after_finalize = merge(&after_create.state, finalize).unwrap().state;
        assert_eq!(after_finalize.graph.nodes[0].status, waypoint_types::NodeStatus::Final);

        let mut attempted_overwrite = AgentOutput::empty("product_strategy_agent", state.meta.run_id.clone());
        attempted_overwrite.node_updates.push(NodeUpdate {
            node_id: "market.icp.summary".to_string(),
            action: NodeUpdateAction::Update,
            node_type: waypoint_types::NodeType::Summary,
            pillar: waypoint_types::Pillar::Customer,
            label: "should be ignored".to_string(),
            payload: json!({}),
            evidence_refs: Vec::new(),
            meta: evidence_meta("https://example.com"),
        });
        let unchanged = merge(&after_finalize, attempted_overwrite).unwrap().state;
        assert_eq!(unchanged.graph.nodes[0].label, "ICP summary (final)");
    }

    #[test]
    fn risk_flags_are_deduplicated_across_reruns() {
        let state = fresh_state();
        let flag = RiskFlag {
            kind: RiskFlagKind::MissingProof,
            path: Some("/evidence/pricing_anchors".to_string()),
            message: "no pricing anchors found".to_string(),
        };
        let mut first = AgentOutput::empty("pricing_agent", state.meta.run_id.clone());
        first.risks.push(flag.clone());
        let after_first = merge(&state, first).unwrap().state;
        assert_eq!(after_first.risks.missing_proof.len(), 1);

        let mut second = AgentOutput::empty("pricing_agent", state.meta.run_id.clone());
        second.risks.push(flag);
        let after_second = merge(&after_first, second).unwrap().state;
        assert_eq!(after_second.risks.missing_proof.len(), 1);
    }
}
