use serde_json::Value;
use waypoint_types::{CanonicalState, DecisionKey, Pillar, Severity};

/// What a single rule found when it ran against a state, if anything.
pub struct RuleFinding {
    pub message: String,
    pub paths: Vec<String>,
    pub recommended_fix: Option<String>,
}

impl RuleFinding {
    fn simple(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            paths: vec![path.into()],
            recommended_fix: None,
        }
    }
}

/// One entry in the fixed rule table (spec.md §4.2). `responsible_agent`
/// is consulted by the scheduler to decide which agent reruns when this
/// rule's contradiction is the reason a round is triggered — grounded on
/// `SpawnPolicy::evaluate`'s style of pairing each deny reason with a
/// structured, machine-readable code rather than a free-form string.
pub struct Rule {
    pub id: &'static str,
    pub severity: Severity,
    pub responsible_agent: &'static str,
    pub check: fn(&CanonicalState) -> Option<RuleFinding>,
}

fn payload_of<'a>(state: &'a CanonicalState, key: DecisionKey) -> Option<&'a Value> {
    let slot = state.decisions.slot(key);
    let option_id = slot.selected_option_id.as_deref().or(slot.recommended_option_id.as_deref())?;
    slot.options.iter().find(|o| o.option_id == option_id).map(|o| &o.payload)
}

fn v_icp_01(state: &CanonicalState) -> Option<RuleFinding> {
    if state.decisions.icp.selected_option_id.is_none() {
        Some(RuleFinding::simple(
            "ICP decision has not been finalized",
            "/decisions/icp/selected_option_id",
        ))
    } else {
        None
    }
}

fn v_icp_02(state: &CanonicalState) -> Option<RuleFinding> {
    let icp = &state.decisions.icp;
    if icp.is_finalized() && icp.options.len() < 2 {
        Some(RuleFinding::simple(
            "ICP was finalized with fewer than two proposed options",
            "/decisions/icp/options",
        ))
    } else {
        None
    }
}

fn v_price_01(state: &CanonicalState) -> Option<RuleFinding> {
    if !state.decisions.pricing_tiers.is_empty() && state.decisions.pricing_metric.is_none() {
        Some(RuleFinding::simple(
            "pricing tiers were proposed without a pricing metric",
            "/decisions/pricing_metric",
        ))
    } else {
        None
    }
}

fn v_price_02(state: &CanonicalState) -> Option<RuleFinding> {
    let first_tier = state.decisions.pricing_tiers.first()?;
    let max_anchor = state
        .evidence
        .pricing_anchors
        .iter()
        .map(|a| a.price)
        .fold(0.0_f64, f64::max);
    if max_anchor <= 0.0 || first_tier.price <= max_anchor * 1.5 {
        return None;
    }
    let has_pricing_experiment = state
        .execution
        .experiments
        .iter()
        .any(|e| e.name.to_ascii_lowercase().contains("pric") || e.hypothesis.to_ascii_lowercase().contains("pric"));
    if has_pricing_experiment {
        return None;
    }
    Some(RuleFinding {
        message: format!(
            "first price-to-test {:.2} is more than 50% above the highest observed anchor {:.2} with no validation experiment",
            first_tier.price, max_anchor
        ),
        paths: vec!["/decisions/pricing_tiers/0".to_string()],
        recommended_fix: Some("add a pricing validation experiment or lower the first tier".to_string()),
    })
}

fn v_price_03(state: &CanonicalState) -> Option<RuleFinding> {
    if state.decisions.pricing_tiers.is_empty() {
        return None;
    }
    let has_confident_tier = state.decisions.pricing_tiers.iter().any(|t| t.meta.confidence >= 0.5);
    if has_confident_tier {
        None
    } else {
        Some(RuleFinding::simple(
            "no pricing tier has confidence at or above 0.5",
            "/decisions/pricing_tiers",
        ))
    }
}

fn v_chan_01(state: &CanonicalState) -> Option<RuleFinding> {
    if !state.idea.category.to_ascii_lowercase().contains("b2b") {
        return None;
    }
    let payload = payload_of(state, DecisionKey::Channels)?;
    let channels = payload.get("channels")?.as_array()?;
    if channels.len() > 2 {
        Some(RuleFinding::simple(
            format!("{} primary channels proposed for a B2B category (max 2)", channels.len()),
            "/decisions/channels",
        ))
    } else {
        None
    }
}

fn v_chan_02(state: &CanonicalState) -> Option<RuleFinding> {
    if state.decisions.channels.options.is_empty() {
        Some(RuleFinding::simple("no channel options have been proposed", "/decisions/channels/options"))
    } else {
        None
    }
}

fn v_sales_01(state: &CanonicalState) -> Option<RuleFinding> {
    let sales_payload = payload_of(state, DecisionKey::SalesMotion)?;
    let motion = sales_payload.get("motion")?.as_str()?;
    if motion != "plg" {
        return None;
    }
    let icp_payload = payload_of(state, DecisionKey::Icp);
    let is_enterprise = icp_payload
        .and_then(|p| p.get("company_size"))
        .and_then(Value::as_str)
        .map(|s| s.eq_ignore_ascii_case("enterprise"))
        .unwrap_or(false);
    let procurement_owner = icp_payload
        .and_then(|p| p.get("budget_owner"))
        .and_then(Value::as_str)
        .map(|s| s.to_ascii_lowercase().contains("procurement"))
        .unwrap_or(false);
    if is_enterprise || procurement_owner {
        Some(RuleFinding::simple(
            "product-led-growth motion selected for an enterprise/procurement-gated ICP",
            "/decisions/sales_motion",
        ))
    } else {
        None
    }
}

fn v_tech_01(state: &CanonicalState) -> Option<RuleFinding> {
    use waypoint_types::ComplianceLevel;
    if state.constraints.compliance_level != ComplianceLevel::High {
        return None;
    }
    let has_security_node = state.graph.nodes.iter().any(|n| {
        matches!(n.node_type, waypoint_types::NodeType::Plan)
            && (n.label.to_ascii_lowercase().contains("secur")
                || n.label.to_ascii_lowercase().contains("compliance")
                || n.label.to_ascii_lowercase().contains("data"))
    });
    if has_security_node {
        None
    } else {
        Some(RuleFinding::simple(
            "compliance_level is high with no security/data plan node in the graph",
            "/graph/nodes",
        ))
    }
}

fn v_tech_02(state: &CanonicalState) -> Option<RuleFinding> {
    let summary = state.pillars.pillars.iter().find(|p| p.pillar == Pillar::ProductTech);
    let has_outputs = summary.map(|p| !p.key_outputs.is_empty()).unwrap_or(false);
    if has_outputs {
        None
    } else {
        Some(RuleFinding::simple(
            "product/tech pillar has no key outputs recorded",
            "/pillars/pillars",
        ))
    }
}

fn v_evid_01(state: &CanonicalState) -> Option<RuleFinding> {
    let is_novel = state.idea.category.trim().is_empty() || state.idea.category.to_ascii_lowercase().contains("novel");
    if is_novel || !state.evidence.competitors.is_empty() {
        return None;
    }
    Some(RuleFinding::simple(
        "no competitors recorded for a non-novel category",
        "/evidence/competitors",
    ))
}

fn v_evid_02(state: &CanonicalState) -> Option<RuleFinding> {
    if state.decisions.pricing.is_finalized() && state.evidence.pricing_anchors.is_empty() {
        Some(RuleFinding::simple(
            "pricing was decided with no recorded pricing anchors",
            "/evidence/pricing_anchors",
        ))
    } else {
        None
    }
}

/// Surfaced, not computed, by the validator: the merge engine is the
/// only place that can observe a conflicting pair of evidence-sourced
/// writes as it happens (spec.md §4.1 rule 5), so it stamps the
/// contradiction directly into `risks.contradictions` at merge time. This
/// rule re-derives the same finding at read time from
/// `candidates.candidates`, so a state rehydrated from a checkpoint still
/// reports it.
fn v_evid_conflict(state: &CanonicalState) -> Option<RuleFinding> {
    let conflicted: Vec<&String> = state.candidates.candidates.keys().collect();
    if conflicted.is_empty() {
        return None;
    }
    Some(RuleFinding {
        message: format!("{} path(s) have unresolved conflicting evidence writes", conflicted.len()),
        paths: conflicted.into_iter().cloned().collect(),
        recommended_fix: Some("resolve the conflicting sources manually".to_string()),
    })
}

fn v_cont_01(state: &CanonicalState) -> Option<RuleFinding> {
    for key in DecisionKey::ALL {
        let slot = state.decisions.slot(key);
        if slot.r#override.is_custom {
            let len = slot.r#override.justification.as_deref().map(str::len).unwrap_or(0);
            if len < 20 {
                return Some(RuleFinding::simple(
                    format!("override on {} has a justification shorter than 20 characters", key.as_str()),
                    format!("/decisions/{}/override", key.as_str()),
                ));
            }
        }
    }
    None
}

/// The fourteen-rule table (spec.md §4.2). Severities and responsible
/// agents are data, not `if` chains scattered through the scheduler.
pub const RULES: &[Rule] = &[
    Rule { id: "V-ICP-01", severity: Severity::Critical, responsible_agent: "icp", check: v_icp_01 },
    Rule { id: "V-ICP-02", severity: Severity::High, responsible_agent: "icp", check: v_icp_02 },
    Rule { id: "V-PRICE-01", severity: Severity::Critical, responsible_agent: "pricing", check: v_price_01 },
    Rule { id: "V-PRICE-02", severity: Severity::High, responsible_agent: "pricing", check: v_price_02 },
    Rule { id: "V-PRICE-03", severity: Severity::Medium, responsible_agent: "pricing", check: v_price_03 },
    Rule { id: "V-CHAN-01", severity: Severity::High, responsible_agent: "channels", check: v_chan_01 },
    Rule { id: "V-CHAN-02", severity: Severity::Medium, responsible_agent: "channels", check: v_chan_02 },
    Rule { id: "V-SALES-01", severity: Severity::High, responsible_agent: "sales_motion", check: v_sales_01 },
    Rule { id: "V-TECH-01", severity: Severity::Critical, responsible_agent: "product_strategy", check: v_tech_01 },
    Rule { id: "V-TECH-02", severity: Severity::Medium, responsible_agent: "product_strategy", check: v_tech_02 },
    Rule { id: "V-EVID-01", severity: Severity::High, responsible_agent: "evidence_collector", check: v_evid_01 },
    Rule { id: "V-EVID-02", severity: Severity::High, responsible_agent: "pricing", check: v_evid_02 },
    Rule { id: "V-EVID-CONFLICT", severity: Severity::High, responsible_agent: "evidence_collector", check: v_evid_conflict },
    Rule { id: "V-CONT-01", severity: Severity::High, responsible_agent: "_intake", check: v_cont_01 },
];
