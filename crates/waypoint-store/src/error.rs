use waypoint_types::RunId;

/// Errors from the checkpoint store. Per spec.md §6, any `StoreError` is
/// fatal to the run: the caller emits `run_failed` with cause `store` and
/// stops — no event past the last durable checkpoint may be published.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("checkpoint append failed for run {run_id}: {source}")]
    Append {
        run_id: RunId,
        #[source]
        source: std::io::Error,
    },

    #[error("no checkpoint found for run {0}")]
    NotFound(RunId),

    #[error("checkpoint index {index} not found for run {run_id}")]
    IndexNotFound { run_id: RunId, index: u64 },

    #[error("corrupt checkpoint record in run {run_id} at byte offset {offset}: {source}")]
    Corrupt {
        run_id: RunId,
        offset: u64,
        #[source]
        source: serde_json::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
