pub mod rules;

use waypoint_types::{CanonicalState, Contradiction};

pub use rules::{Rule, RuleFinding, RULES};

/// Runs the fixed rule table against `state` and returns every
/// contradiction currently in force. Pure: `state -> []Contradiction`
/// (spec.md §4.2), no I/O, safe to call on every checkpoint.
pub fn validate(state: &CanonicalState) -> Vec<Contradiction> {
    RULES
        .iter()
        .filter_map(|rule| {
            (rule.check)(state).map(|finding| Contradiction {
                rule_id: rule.id.to_string(),
                severity: rule.severity,
                message: finding.message,
                paths: finding.paths,
                recommended_fix: finding.recommended_fix,
            })
        })
        .collect()
}

/// Looks up the agent responsible for a given rule ID, used by the
/// scheduler to build the set of agents to rerun after a reconciliation
/// round (spec.md §4.3).
pub fn responsible_agent(rule_id: &str) -> Option<&'static str> {
    RULES.iter().find(|r| r.id == rule_id).map(|r| r.responsible_agent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypoint_types::{ProjectId, RunId, ScenarioId};

    #[test]
    fn fresh_state_has_critical_and_medium_contradictions() {
        let state = CanonicalState::new(RunId::new(), ScenarioId::new(), ProjectId::new());
        let contradictions = validate(&state);
        assert!(contradictions.iter().any(|c| c.rule_id == "V-ICP-01"));
        assert!(contradictions.iter().any(|c| c.rule_id == "V-CHAN-02"));
    }

    #[test]
    fn responsible_agent_resolves_known_rule() {
        assert_eq!(responsible_agent("V-PRICE-01"), Some("pricing"));
        assert_eq!(responsible_agent("unknown-rule"), None);
    }
}
