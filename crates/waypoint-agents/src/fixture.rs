use std::path::PathBuf;

use tokio::fs;
use waypoint_types::CanonicalState;
use waypoint_wire::AgentOutput;

use crate::error::AgentError;
use crate::fingerprint::fingerprint;

/// Loads canned `AgentOutput`s from `{root}/{agent}/{fingerprint}.json`
/// (spec.md §6: "provider responses are loaded from a local directory
/// keyed by `(agent_name, fingerprint(idea+constraints+intake))`").
/// Used both by deterministic fixture agents and, in fixture mode, as a
/// stand-in `AgentProvider` for what would otherwise be a real call.
#[derive(Clone)]
pub struct FixtureStore {
    root: PathBuf,
}

impl FixtureStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub async fn load(&self, agent: &str, state: &CanonicalState) -> Result<AgentOutput, AgentError> {
        let key = fingerprint(state);
        let path = self.root.join(agent).join(format!("{key}.json"));
        let raw = fs::read(&path)
            .await
            .map_err(|source| match source.kind() {
                std::io::ErrorKind::NotFound => AgentError::FixtureMissing {
                    agent: agent.to_string(),
                    fingerprint: key.clone(),
                },
                _ => AgentError::FixtureIo {
                    agent: agent.to_string(),
                    source,
                },
            })?;
        serde_json::from_slice(&raw).map_err(|err| AgentError::BadOutput {
            agent: agent.to_string(),
            message: err.to_string(),
        })
    }
}
