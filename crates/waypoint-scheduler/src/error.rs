/// Run-level failures (spec.md §7). Agent-level failures (`MergeError`,
/// provider exhaustion) are recovered locally by the scheduler and
/// recorded as `agent_failed` + a `telemetry.errors` entry; they never
/// reach this type.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("scenario has unresolved required inputs: {0:?}")]
    RequiredInputs(Vec<String>),

    #[error("checkpoint store error: {0}")]
    Store(#[from] waypoint_store::StoreError),

    #[error("run {0} exceeded its deadline")]
    Deadline(String),

    #[error("run {0} exceeded its token budget")]
    Budget(String),

    #[error("run {0} was cancelled")]
    Cancelled(String),

    #[error("no such run {0}")]
    UnknownRun(String),
}
