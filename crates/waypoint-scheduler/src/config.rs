use std::time::Duration;

/// Explicit handle threaded through the scheduler instead of leaning on
/// process-wide environment flags (spec.md §9: "pass an explicit
/// `RuntimeConfig` handle... initialize once at boot, never at call
/// sites").
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub per_agent_timeout: Duration,
    pub run_deadline: Duration,
    pub reconciliation_cap: u32,
    /// `None` makes budget enforcement a no-op (spec.md §9 open
    /// question: "make its absence non-fatal").
    pub token_budget: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            per_agent_timeout: Duration::from_secs(45),
            run_deadline: Duration::from_secs(10 * 60),
            reconciliation_cap: 3,
            token_budget: None,
        }
    }
}
