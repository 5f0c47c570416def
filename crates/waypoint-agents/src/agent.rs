use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;
use waypoint_types::CanonicalState;
use waypoint_wire::AgentOutput;

use crate::error::AgentError;
use crate::fixture::FixtureStore;
use crate::provider::AgentProvider;

/// Shared contract every step of the static sequence implements (spec.md
/// §9: "a single interface with two implementations... no deep
/// inheritance"). `run` never mutates `state`; the scheduler hands each
/// agent a deep copy (spec.md §4.3 step 2).
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;
    async fn run(&self, state: &CanonicalState) -> Result<AgentOutput, AgentError>;
}

/// Real-provider-backed agent (spec.md §5: exponential backoff, up to 3
/// attempts, then marked failed).
pub struct ProviderAgent {
    name: String,
    provider: Arc<dyn AgentProvider>,
}

const MAX_ATTEMPTS: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_millis(100);

impl ProviderAgent {
    pub fn new(name: impl Into<String>, provider: Arc<dyn AgentProvider>) -> Self {
        Self {
            name: name.into(),
            provider,
        }
    }
}

#[async_trait]
impl Agent for ProviderAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, state: &CanonicalState) -> Result<AgentOutput, AgentError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.provider.complete(&self.name, state).await {
                Ok(output) => return Ok(output),
                Err(err) if attempt < MAX_ATTEMPTS => {
                    let backoff = BASE_BACKOFF * 2u32.pow(attempt - 1);
                    warn!(agent = %self.name, attempt, ?backoff, error = %err, "provider call failed, retrying");
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Deterministic-fixture agent. Never retries: a missing or malformed
/// fixture is a test-setup bug, not a transient fault (spec.md §5:
/// "Deterministic-fixture agents never retry").
pub struct FixtureAgent {
    name: String,
    store: FixtureStore,
}

impl FixtureAgent {
    pub fn new(name: impl Into<String>, store: FixtureStore) -> Self {
        Self {
            name: name.into(),
            store,
        }
    }
}

#[async_trait]
impl Agent for FixtureAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, state: &CanonicalState) -> Result<AgentOutput, AgentError> {
        self.store.load(&self.name, state).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use waypoint_types::{ProjectId, RunId, ScenarioId};

    struct FlakyProvider {
        fails_before_success: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl AgentProvider for FlakyProvider {
        async fn complete(&self, agent: &str, state: &CanonicalState) -> Result<AgentOutput, AgentError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fails_before_success {
                return Err(AgentError::Provider {
                    agent: agent.to_string(),
                    message: "simulated transient failure".to_string(),
                });
            }
            Ok(AgentOutput::empty(agent, state.meta.run_id.clone()))
        }
    }

    #[tokio::test]
    async fn provider_agent_retries_until_success() {
        let provider = Arc::new(FlakyProvider {
            fails_before_success: 2,
            calls: AtomicU32::new(0),
        });
        let agent = ProviderAgent::new("icp", provider.clone());
        let state = CanonicalState::new(RunId::new(), ScenarioId::new(), ProjectId::new());
        let output = agent.run(&state).await.unwrap();
        assert_eq!(output.agent, "icp");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn provider_agent_fails_after_max_attempts() {
        let provider = Arc::new(FlakyProvider {
            fails_before_success: 10,
            calls: AtomicU32::new(0),
        });
        let agent = ProviderAgent::new("icp", provider.clone());
        let state = CanonicalState::new(RunId::new(), ScenarioId::new(), ProjectId::new());
        let err = agent.run(&state).await.unwrap_err();
        assert!(matches!(err, AgentError::Provider { .. }));
        assert_eq!(provider.calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }
}
