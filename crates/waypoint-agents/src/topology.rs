/// Static, topologically-sorted agent sequence (spec.md §4.3). The
/// scheduler walks this in order for pass 1; `validator` is the last
/// step but is invoked directly against `waypoint-validator::validate`
/// rather than through the `Agent` trait, since it writes
/// `risks.contradictions`, a runtime-owned path no agent may touch.
pub const AGENT_SEQUENCE: &[&str] = &[
    "evidence_collector",
    "competitive_teardown",
    "icp",
    "positioning",
    "pricing",
    "channels",
    "sales_motion",
    "product_strategy",
    "tech_feasibility",
    "people_cash",
    "execution",
    "graph_builder",
    "validator",
];

/// Agents that always rerun in a reconciliation or override cascade,
/// regardless of which decisions changed (spec.md §4.3).
pub const ALWAYS_RERUN: &[&str] = &["graph_builder", "validator"];

/// `DECISION_DEPENDENCY_GRAPH`: which decisions a changed decision
/// cascades to (spec.md §4.3, override path).
pub fn decision_cascade(decision: &str) -> &'static [&'static str] {
    match decision {
        "icp" => &["pricing", "channels", "sales_motion", "positioning"],
        "positioning" => &["pricing", "channels"],
        "pricing" => &["sales_motion"],
        "channels" => &["sales_motion"],
        _ => &[],
    }
}

/// Maps a decision slot to the agent that owns its proposals, so an
/// override cascade can translate `decision_cascade`'s output into the
/// agent set the scheduler actually re-executes.
pub fn agent_for_decision(decision: &str) -> Option<&'static str> {
    match decision {
        "icp" => Some("icp"),
        "positioning" => Some("positioning"),
        "pricing" => Some("pricing"),
        "channels" => Some("channels"),
        "sales_motion" => Some("sales_motion"),
        _ => None,
    }
}

/// Transitive closure of `decision_cascade` starting from `changed`,
/// translated to agent names, unioned with `ALWAYS_RERUN`, and ordered
/// to match `AGENT_SEQUENCE` (spec.md §4.3: "re-execute... in the
/// original topological order").
pub fn cascade_agents(changed: &str) -> Vec<&'static str> {
    let mut affected = std::collections::BTreeSet::new();
    let mut stack = vec![changed];
    while let Some(decision) = stack.pop() {
        for next in decision_cascade(decision) {
            if affected.insert(*next) {
                stack.push(next);
            }
        }
    }

    let mut agents: std::collections::BTreeSet<&'static str> = affected
        .into_iter()
        .filter_map(agent_for_decision)
        .collect();
    agents.extend(ALWAYS_RERUN);

    AGENT_SEQUENCE
        .iter()
        .copied()
        .filter(|name| agents.contains(name))
        .collect()
}
