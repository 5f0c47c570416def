pub mod agent;
pub mod error;
pub mod fingerprint;
pub mod fixture;
pub mod provider;
pub mod registry;
pub mod topology;

pub use agent::{Agent, FixtureAgent, ProviderAgent};
pub use error::AgentError;
pub use fingerprint::fingerprint;
pub use fixture::FixtureStore;
pub use provider::AgentProvider;
pub use registry::AgentRegistry;
pub use topology::{agent_for_decision, cascade_agents, decision_cascade, AGENT_SEQUENCE, ALWAYS_RERUN};
