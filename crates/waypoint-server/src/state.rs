use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use waypoint_agents::AgentRegistry;
use waypoint_events::EventBus;
use waypoint_scheduler::{RuntimeConfig, Scheduler};
use waypoint_store::CheckpointStore;
use waypoint_types::{CanonicalState, RunId, ScenarioId};
use waypoint_wire::RunStatus;

/// Shared application state handed to every handler via axum's `State`
/// extractor. Same "one struct, every field an `Arc`" shape as
/// `tandem-server::AppState`, scaled down to what this surface actually
/// needs: a scheduler, the durable store it commits to, the bus it
/// publishes on, and the bookkeeping maps a full scenario/run registry
/// would otherwise need a database for.
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    pub store: Arc<CheckpointStore>,
    pub events: EventBus,
    scenarios: Arc<RwLock<HashMap<ScenarioId, CanonicalState>>>,
    run_owner: Arc<RwLock<HashMap<RunId, ScenarioId>>>,
    run_status: Arc<RwLock<HashMap<RunId, RunStatus>>>,
    idempotency: Arc<RwLock<HashMap<String, RunId>>>,
}

impl AppState {
    pub fn new(agents: AgentRegistry, store: Arc<CheckpointStore>, events: EventBus, config: RuntimeConfig) -> Self {
        let scheduler = Arc::new(Scheduler::new(agents, store.clone(), events.clone(), config));
        Self {
            scheduler,
            store,
            events,
            scenarios: Arc::new(RwLock::new(HashMap::new())),
            run_owner: Arc::new(RwLock::new(HashMap::new())),
            run_status: Arc::new(RwLock::new(HashMap::new())),
            idempotency: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn put_scenario(&self, state: CanonicalState) {
        let scenario_id = state.meta.scenario_id.clone();
        let run_id = state.meta.run_id.clone();
        self.run_owner.write().await.insert(run_id, scenario_id.clone());
        self.scenarios.write().await.insert(scenario_id, state);
    }

    pub async fn scenario(&self, scenario_id: &ScenarioId) -> Option<CanonicalState> {
        self.scenarios.read().await.get(scenario_id).cloned()
    }

    pub async fn update_scenario(&self, state: CanonicalState) {
        self.run_owner
            .write()
            .await
            .insert(state.meta.run_id.clone(), state.meta.scenario_id.clone());
        self.scenarios
            .write()
            .await
            .insert(state.meta.scenario_id.clone(), state);
    }

    pub async fn owning_scenario(&self, run_id: &RunId) -> Option<ScenarioId> {
        self.run_owner.read().await.get(run_id).cloned()
    }

    pub async fn set_run_status(&self, run_id: RunId, status: RunStatus) {
        self.run_status.write().await.insert(run_id, status);
    }

    pub async fn run_status(&self, run_id: &RunId) -> Option<RunStatus> {
        self.run_status.read().await.get(run_id).cloned()
    }

    /// Returns `Some(existing_run_id)` without side effects on replay;
    /// registers `run_id` against a fresh key otherwise (spec.md §6
    /// "Idempotency").
    pub async fn check_idempotency(&self, key: &str, run_id: &RunId) -> Option<RunId> {
        let mut map = self.idempotency.write().await;
        if let Some(existing) = map.get(key) {
            return Some(existing.clone());
        }
        map.insert(key.to_string(), run_id.clone());
        None
    }
}
