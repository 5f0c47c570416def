/// Errors an `Agent::run` can return (spec.md §7's `ProviderError`/a bad
/// output shape). The scheduler maps these to `agent_failed`; it never
/// sees a panic.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("agent {agent} timed out after {elapsed_ms}ms")]
    Timeout { agent: String, elapsed_ms: u64 },

    #[error("provider call failed for {agent}: {message}")]
    Provider { agent: String, message: String },

    #[error("agent {agent} returned an output that failed validation: {message}")]
    BadOutput { agent: String, message: String },

    #[error("no fixture recorded for {agent} with fingerprint {fingerprint}")]
    FixtureMissing { agent: String, fingerprint: String },

    #[error("io error loading fixture for {agent}: {source}")]
    FixtureIo {
        agent: String,
        #[source]
        source: std::io::Error,
    },
}
