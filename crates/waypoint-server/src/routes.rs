use axum::extract::{Path, State};
use axum::response::sse::Sse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use waypoint_types::{CanonicalState, DecisionKey, ProjectId, RunId, ScenarioId};
use waypoint_wire::{
    CompletionBlockedResponse, CreateRunRequest, CreateRunResponse, CreateScenarioRequest,
    CreateScenarioResponse, RunStatus, RunStatusResponse, SelectDecisionRequest, SelectDecisionResponse,
};

use crate::error::ApiError;
use crate::sse::{keep_alive, run_event_stream, RunStream};
use crate::state::AppState;

pub fn app_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/scenarios", post(create_scenario))
        .route("/scenarios/{id}/runs", post(create_run))
        .route("/scenarios/{id}/decisions/{key}/select", post(select_decision))
        .route("/scenarios/{id}/complete", post(complete_scenario))
        .route("/runs/{id}", get(get_run))
        .route("/runs/{id}/resume", post(resume_run))
        .route("/runs/{id}/stream", get(stream_run))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn stream_url(run_id: &RunId) -> String {
    format!("/runs/{}/stream", run_id.as_str())
}

/// Not one of spec.md's six endpoints (see `CreateScenarioRequest`);
/// establishes the `idea`/`constraints`/`intake_answers` a scenario
/// needs before any run can start against it.
async fn create_scenario(
    State(state): State<AppState>,
    Json(req): Json<CreateScenarioRequest>,
) -> Result<Json<CreateScenarioResponse>, ApiError> {
    let mut canonical = CanonicalState::new(RunId::new(), ScenarioId::new(), ProjectId::new());
    canonical.idea = req.idea;
    canonical.constraints = req.constraints;
    canonical.inputs.intake_answers = req.intake_answers;

    if let Some(key) = req.idempotency_key.as_deref() {
        if let Some(existing_run_id) = state.check_idempotency(key, &canonical.meta.run_id).await {
            let scenario_id = state
                .owning_scenario(&existing_run_id)
                .await
                .unwrap_or_else(|| canonical.meta.scenario_id.clone());
            return Ok(Json(CreateScenarioResponse {
                scenario_id: scenario_id.as_str().to_string(),
                run_id: existing_run_id.as_str().to_string(),
            }));
        }
    }

    state.put_scenario(canonical.clone()).await;
    info!(scenario_id = %canonical.meta.scenario_id, "scenario created");

    Ok(Json(CreateScenarioResponse {
        scenario_id: canonical.meta.scenario_id.as_str().to_string(),
        run_id: canonical.meta.run_id.as_str().to_string(),
    }))
}

async fn create_run(
    State(state): State<AppState>,
    Path(scenario_id): Path<String>,
    Json(req): Json<CreateRunRequest>,
) -> Result<Json<CreateRunResponse>, ApiError> {
    let scenario_id = ScenarioId::from_opaque(scenario_id);
    let scenario_state = state
        .scenario(&scenario_id)
        .await
        .ok_or_else(|| ApiError::ScenarioNotFound(scenario_id.as_str().to_string()))?;

    waypoint_state::from_value(waypoint_state::to_value(&scenario_state))
        .map_err(|err| match err {
            waypoint_state::StateError::UnknownTopLevelKey(key) => ApiError::SchemaRejected(key),
            other => ApiError::SchemaRejected(other.to_string()),
        })?;

    let run_id = scenario_state.meta.run_id.clone();
    if let Some(key) = req.idempotency_key.as_deref() {
        if let Some(existing) = state.check_idempotency(key, &run_id).await {
            return Ok(Json(CreateRunResponse {
                run_id: existing.as_str().to_string(),
                stream_url: stream_url(&existing),
            }));
        }
    }

    if let Some(decision) = req.changed_decision {
        spawn_override(state.clone(), scenario_id, scenario_state, decision);
    } else {
        spawn_execute(state.clone(), scenario_id, scenario_state);
    }

    Ok(Json(CreateRunResponse {
        run_id: run_id.as_str().to_string(),
        stream_url: stream_url(&run_id),
    }))
}

async fn resume_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<CreateRunResponse>, ApiError> {
    let run_id = RunId::from_opaque(run_id);
    let scenario_id = state
        .owning_scenario(&run_id)
        .await
        .ok_or_else(|| ApiError::RunNotFound(run_id.as_str().to_string()))?;

    state.set_run_status(run_id.clone(), RunStatus::Running).await;
    let scheduler = state.scheduler.clone();
    let state_for_task = state.clone();
    let scenario_id_for_task = scenario_id.clone();
    let run_id_for_task = run_id.clone();
    tokio::spawn(async move {
        match scheduler.resume(scenario_id_for_task, run_id_for_task.clone()).await {
            Ok(outcome) => {
                state_for_task.update_scenario(outcome.state).await;
                state_for_task.set_run_status(run_id_for_task, to_wire_status(outcome.status)).await;
            }
            Err(err) => {
                warn!(run_id = %run_id_for_task, error = %err, "resume failed");
                state_for_task.set_run_status(run_id_for_task, RunStatus::Failed).await;
            }
        }
    });

    Ok(Json(CreateRunResponse {
        run_id: run_id.as_str().to_string(),
        stream_url: stream_url(&run_id),
    }))
}

async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<RunStatusResponse>, ApiError> {
    let run_id = RunId::from_opaque(run_id);
    let status = state
        .run_status(&run_id)
        .await
        .ok_or_else(|| ApiError::RunNotFound(run_id.as_str().to_string()))?;
    let checkpoint_index = match state.store.latest(&run_id).await {
        Ok(entry) => entry.index,
        Err(_) => 0,
    };
    Ok(Json(RunStatusResponse { status, checkpoint_index }))
}

async fn stream_run(State(state): State<AppState>, Path(run_id): Path<String>) -> RunStream {
    let run_id = RunId::from_opaque(run_id);
    let stream = run_event_stream(state, run_id).await;
    Sse::new(Box::pin(stream)).keep_alive(keep_alive())
}

async fn select_decision(
    State(state): State<AppState>,
    Path((scenario_id, key)): Path<(String, String)>,
    Json(req): Json<SelectDecisionRequest>,
) -> Result<Json<SelectDecisionResponse>, ApiError> {
    let scenario_id = ScenarioId::from_opaque(scenario_id);
    if waypoint_agents::agent_for_decision(&key).is_none() {
        return Err(ApiError::UnknownDecisionKey(key));
    }
    let scenario_state = state
        .scenario(&scenario_id)
        .await
        .ok_or_else(|| ApiError::ScenarioNotFound(scenario_id.as_str().to_string()))?;
    let run_id = scenario_state.meta.run_id.clone();

    spawn_override_with_selection(state.clone(), scenario_id, scenario_state, key, req);

    Ok(Json(SelectDecisionResponse {
        run_id: Some(run_id.as_str().to_string()),
        rerun_triggered: true,
    }))
}

async fn complete_scenario(
    State(state): State<AppState>,
    Path(scenario_id): Path<String>,
) -> Result<Json<RunStatusResponse>, ApiError> {
    let scenario_id = ScenarioId::from_opaque(scenario_id);
    let scenario_state = state
        .scenario(&scenario_id)
        .await
        .ok_or_else(|| ApiError::ScenarioNotFound(scenario_id.as_str().to_string()))?;

    if scenario_state.risks.has_unresolved_critical() {
        let unresolved: Vec<_> = scenario_state
            .risks
            .contradictions
            .iter()
            .filter(|c| c.severity == waypoint_types::Severity::Critical)
            .cloned()
            .collect();
        return Err(ApiError::CompletionBlocked(CompletionBlockedResponse {
            error: "scenario has unresolved critical contradictions".to_string(),
            unresolved_contradictions: unresolved,
        }));
    }

    let checkpoint_index = state
        .store
        .latest(&scenario_state.meta.run_id)
        .await
        .map(|entry| entry.index)
        .unwrap_or(0);
    Ok(Json(RunStatusResponse {
        status: RunStatus::Completed,
        checkpoint_index,
    }))
}

fn to_wire_status(status: waypoint_scheduler::RunStatus) -> RunStatus {
    match status {
        waypoint_scheduler::RunStatus::Completed => RunStatus::Completed,
        waypoint_scheduler::RunStatus::Blocked => RunStatus::Blocked,
        waypoint_scheduler::RunStatus::Failed => RunStatus::Failed,
    }
}

fn spawn_execute(state: AppState, scenario_id: ScenarioId, scenario_state: CanonicalState) {
    let run_id = scenario_state.meta.run_id.clone();
    let scheduler = state.scheduler.clone();
    tokio::spawn(async move {
        state.set_run_status(run_id.clone(), RunStatus::Running).await;
        match scheduler.execute(scenario_id, scenario_state).await {
            Ok(outcome) => {
                let status = to_wire_status(outcome.status.clone());
                state.update_scenario(outcome.state).await;
                state.set_run_status(run_id, status).await;
            }
            Err(err) => {
                warn!(run_id = %run_id, error = %err, "run failed");
                state.set_run_status(run_id, RunStatus::Failed).await;
            }
        }
    });
}

fn spawn_override(state: AppState, scenario_id: ScenarioId, scenario_state: CanonicalState, decision: DecisionKey) {
    let run_id = scenario_state.meta.run_id.clone();
    let decision_key = decision.as_str().to_string();
    let selected = scenario_state
        .decisions
        .slot(decision)
        .recommended_option_id
        .clone()
        .unwrap_or_default();
    let scheduler = state.scheduler.clone();
    tokio::spawn(async move {
        state.set_run_status(run_id.clone(), RunStatus::Running).await;
        match scheduler
            .override_decision(scenario_id, scenario_state, &decision_key, selected, false, None)
            .await
        {
            Ok(outcome) => {
                let status = to_wire_status(outcome.status.clone());
                state.update_scenario(outcome.state).await;
                state.set_run_status(run_id, status).await;
            }
            Err(err) => {
                warn!(run_id = %run_id, error = %err, "override run failed");
                state.set_run_status(run_id, RunStatus::Failed).await;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use waypoint_agents::{AgentRegistry, FixtureAgent, FixtureStore, AGENT_SEQUENCE};
    use waypoint_events::EventBus;
    use waypoint_scheduler::RuntimeConfig;
    use waypoint_store::CheckpointStore;

    async fn test_state() -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(dir.path().join("checkpoints")).await.unwrap();
        let mut agents = AgentRegistry::new();
        for name in AGENT_SEQUENCE.iter().filter(|name| **name != "validator") {
            agents.register(std::sync::Arc::new(FixtureAgent::new(
                *name,
                FixtureStore::new(dir.path().join("fixtures")),
            )));
        }
        let events = EventBus::new();
        let state = AppState::new(agents, store, events, RuntimeConfig::default());
        (state, dir)
    }

    async fn body_json(resp: axum::response::Response) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn create_scenario_then_get_run_reports_unknown_until_a_run_starts() {
        let (state, _dir) = test_state().await;
        let app = app_router(state);

        let req = Request::builder()
            .method("POST")
            .uri("/scenarios")
            .header("content-type", "application/json")
            .body(Body::from(
                json!({
                    "idea": {
                        "name": "Waypoint",
                        "one_liner": "Plans GTM for agent fleets",
                        "problem": "Teams can't sequence launches",
                        "region": "na",
                        "category": "b2b_saas",
                    }
                })
                .to_string(),
            ))
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let payload = body_json(resp).await;
        let run_id = payload.get("run_id").and_then(Value::as_str).unwrap().to_string();

        let req = Request::builder()
            .method("GET")
            .uri(format!("/runs/{run_id}"))
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn create_run_on_unknown_scenario_is_not_found() {
        let (state, _dir) = test_state().await;
        let app = app_router(state);

        let req = Request::builder()
            .method("POST")
            .uri("/scenarios/does-not-exist/runs")
            .header("content-type", "application/json")
            .body(Body::from(json!({}).to_string()))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn select_decision_with_unknown_key_is_not_found() {
        let (state, _dir) = test_state().await;
        let app = app_router(state);

        let req = Request::builder()
            .method("POST")
            .uri("/scenarios/does-not-exist/decisions/not_a_decision/select")
            .header("content-type", "application/json")
            .body(Body::from(
                json!({"selected_option_id": "opt-1"}).to_string(),
            ))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let payload = body_json(resp).await;
        assert_eq!(
            payload.get("offending_key").and_then(Value::as_str),
            Some("not_a_decision")
        );
    }

    #[tokio::test]
    async fn complete_scenario_on_unknown_scenario_is_not_found() {
        let (state, _dir) = test_state().await;
        let app = app_router(state);

        let req = Request::builder()
            .method("POST")
            .uri("/scenarios/does-not-exist/complete")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn complete_scenario_blocks_on_unresolved_critical_contradiction() {
        let (state, _dir) = test_state().await;
        let mut canonical =
            CanonicalState::new(RunId::new(), ScenarioId::new(), ProjectId::new());
        canonical.risks.contradictions.push(waypoint_types::Contradiction {
            rule_id: "icp_vs_pricing".to_string(),
            severity: waypoint_types::Severity::Critical,
            message: "ICP and pricing disagree on segment".to_string(),
            paths: vec!["/decisions/icp".to_string()],
            recommended_fix: None,
        });
        let scenario_id = canonical.meta.scenario_id.clone();
        state.put_scenario(canonical).await;

        let app = app_router(state);
        let req = Request::builder()
            .method("POST")
            .uri(format!("/scenarios/{}/complete", scenario_id.as_str()))
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let payload = body_json(resp).await;
        assert_eq!(
            payload
                .get("unresolved_contradictions")
                .and_then(Value::as_array)
                .map(|v| v.len()),
            Some(1)
        );
    }
}

fn spawn_override_with_selection(
    state: AppState,
    scenario_id: ScenarioId,
    scenario_state: CanonicalState,
    decision_key: String,
    req: SelectDecisionRequest,
) {
    let run_id = scenario_state.meta.run_id.clone();
    let scheduler = state.scheduler.clone();
    tokio::spawn(async move {
        state.set_run_status(run_id.clone(), RunStatus::Running).await;
        match scheduler
            .override_decision(
                scenario_id,
                scenario_state,
                &decision_key,
                req.selected_option_id,
                req.is_custom,
                req.justification,
            )
            .await
        {
            Ok(outcome) => {
                let status = to_wire_status(outcome.status.clone());
                state.update_scenario(outcome.state).await;
                state.set_run_status(run_id, status).await;
            }
            Err(err) => {
                warn!(run_id = %run_id, error = %err, "override run failed");
                state.set_run_status(run_id, RunStatus::Failed).await;
            }
        }
    });
}
