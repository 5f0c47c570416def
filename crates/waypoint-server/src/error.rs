use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use waypoint_wire::{CompletionBlockedResponse, ErrorResponse};

/// Every way a handler can fail, mapped to a status code at the edge
/// rather than scattered `match`es per handler — same flattening
/// `tandem-server::http` does for its own `StatusCode`-returning
/// handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("scenario {0} not found")]
    ScenarioNotFound(String),

    #[error("run {0} not found")]
    RunNotFound(String),

    #[error("unknown decision key {0}")]
    UnknownDecisionKey(String),

    #[error("scenario has unresolved required inputs: {0:?}")]
    RequiredInputs(Vec<String>),

    #[error("canonical state has an unrecognized top-level key: {0}")]
    SchemaRejected(String),

    #[error("run is blocked on unresolved contradictions")]
    Blocked,

    #[error("scenario has unresolved critical contradictions")]
    CompletionBlocked(CompletionBlockedResponse),

    #[error("checkpoint store error: {0}")]
    Store(#[from] waypoint_store::StoreError),

    #[error("scheduler error: {0}")]
    Scheduler(#[from] waypoint_scheduler::SchedulerError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::ScenarioNotFound(_) | ApiError::RunNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::UnknownDecisionKey(_) => StatusCode::NOT_FOUND,
            ApiError::RequiredInputs(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::SchemaRejected(_) => StatusCode::BAD_REQUEST,
            ApiError::Blocked | ApiError::CompletionBlocked(_) => StatusCode::CONFLICT,
            ApiError::Store(waypoint_store::StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Scheduler(waypoint_scheduler::SchedulerError::RequiredInputs(_)) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::Scheduler(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let offending_key = match &self {
            ApiError::UnknownDecisionKey(key) | ApiError::SchemaRejected(key) => Some(key.clone()),
            _ => None,
        };

        match self {
            ApiError::CompletionBlocked(body) => (status, Json(body)).into_response(),
            other => {
                let body = ErrorResponse {
                    error: other.to_string(),
                    offending_key,
                };
                (status, Json(body)).into_response()
            }
        }
    }
}
