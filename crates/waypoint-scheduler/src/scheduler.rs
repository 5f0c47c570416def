use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use waypoint_agents::{cascade_agents, AgentRegistry, AGENT_SEQUENCE, ALWAYS_RERUN};
use waypoint_events::EventBus;
use waypoint_store::CheckpointStore;
use waypoint_types::{
    self as types, AgentTiming, CanonicalState, DecisionOverride, EventEnvelope, RunEventKind,
    RunId, ScenarioId, Severity, TokenSpend,
};
use waypoint_wire::AgentOutput;

use crate::cancellation::CancellationRegistry;
use crate::config::RuntimeConfig;
use crate::error::SchedulerError;
use crate::events::{from_merge_event, lifecycle};
use crate::outcome::{RunOutcome, RunStatus};

/// Drives the two-pass pipeline from spec.md §4.3: one logical worker
/// per run, agents executed sequentially, state mutated only at the
/// scheduler's single merge step (spec.md §5).
pub struct Scheduler {
    agents: AgentRegistry,
    store: Arc<CheckpointStore>,
    events: EventBus,
    config: RuntimeConfig,
    cancellations: CancellationRegistry,
}

impl Scheduler {
    pub fn new(
        agents: AgentRegistry,
        store: Arc<CheckpointStore>,
        events: EventBus,
        config: RuntimeConfig,
    ) -> Self {
        Self {
            agents,
            store,
            events,
            config,
            cancellations: CancellationRegistry::new(),
        }
    }

    pub fn cancellations(&self) -> &CancellationRegistry {
        &self.cancellations
    }

    /// Starts a fresh run (pass 1, then reconciliation). Returns
    /// `RequiredInputs` without creating a run or checkpoint if intake
    /// is incomplete (spec.md §8 boundary behavior).
    pub async fn execute(
        &self,
        scenario_id: ScenarioId,
        state: CanonicalState,
    ) -> Result<RunOutcome, SchedulerError> {
        if !state.inputs.is_complete() {
            return Err(SchedulerError::RequiredInputs(
                state.inputs.open_questions.clone(),
            ));
        }

        let run_id = state.meta.run_id.clone();
        let token = self.cancellations.register(run_id.clone()).await;
        let deadline = Instant::now() + self.config.run_deadline;

        self.commit(
            &run_id,
            &state,
            vec![lifecycle(&run_id, &scenario_id, RunEventKind::RunStarted, json!({}))],
        )
        .await?;

        let mut state = state;
        self.run_pass(&mut state, &run_id, &scenario_id, AGENT_SEQUENCE, 1, &token, deadline)
            .await?;

        self.reconcile(&mut state, &run_id, &scenario_id, &token, deadline).await
    }

    /// Resumes a failed/interrupted run from its latest checkpoint
    /// (spec.md §4.3 "Resume"): the agent index continues from the
    /// first non-completed agent in the most recent pass.
    pub async fn resume(
        &self,
        scenario_id: ScenarioId,
        run_id: RunId,
    ) -> Result<RunOutcome, SchedulerError> {
        let latest = self.store.latest(&run_id).await?;
        let mut state = latest.state;
        let token = self.cancellations.register(run_id.clone()).await;
        let deadline = Instant::now() + self.config.run_deadline;

        self.events.publish(lifecycle(
            &run_id,
            &scenario_id,
            RunEventKind::RunResumed,
            json!({ "checkpoint_index": latest.index }),
        ));

        let current_pass = state
            .telemetry
            .agent_timings
            .iter()
            .map(|t| t.pass)
            .max()
            .unwrap_or(0)
            .max(1);
        let done: BTreeSet<&str> = state
            .telemetry
            .agent_timings
            .iter()
            .filter(|t| t.pass == current_pass)
            .map(|t| t.agent.as_str())
            .collect();
        let remaining: Vec<&str> = AGENT_SEQUENCE
            .iter()
            .copied()
            .filter(|name| !done.contains(name))
            .collect();

        self.run_pass(
            &mut state,
            &run_id,
            &scenario_id,
            &remaining,
            current_pass,
            &token,
            deadline,
        )
        .await?;

        self.reconcile(&mut state, &run_id, &scenario_id, &token, deadline).await
    }

    /// Override path (spec.md §4.3 "Partial rerun"): sets
    /// `selected_option_id` (a runtime-owned write) and re-executes only
    /// the cascade the changed decision implies.
    pub async fn override_decision(
        &self,
        scenario_id: ScenarioId,
        mut state: CanonicalState,
        decision_key: &str,
        selected_option_id: String,
        is_custom: bool,
        justification: Option<String>,
    ) -> Result<RunOutcome, SchedulerError> {
        let run_id = state.meta.run_id.clone();
        let token = self.cancellations.register(run_id.clone()).await;
        let deadline = Instant::now() + self.config.run_deadline;

        {
            let slot = decision_slot_mut(&mut state, decision_key);
            if let Some(slot) = slot {
                slot.selected_option_id = Some(selected_option_id);
                slot.r#override = DecisionOverride {
                    is_custom,
                    justification,
                };
            }
        }
        state.meta.touch();
        self.commit(&run_id, &state, Vec::new()).await?;

        let next_pass = state
            .telemetry
            .agent_timings
            .iter()
            .map(|t| t.pass)
            .max()
            .unwrap_or(0)
            + 1;
        let affected = cascade_agents(decision_key);
        self.run_pass(&mut state, &run_id, &scenario_id, &affected, next_pass, &token, deadline)
            .await?;

        self.reconcile(&mut state, &run_id, &scenario_id, &token, deadline).await
    }

    pub async fn cancel(&self, run_id: &RunId) -> bool {
        self.cancellations.cancel(run_id).await
    }

    // -------------------------------------------------------------
    // internals
    // -------------------------------------------------------------

    async fn commit(
        &self,
        run_id: &RunId,
        state: &CanonicalState,
        tail: Vec<EventEnvelope>,
    ) -> Result<u64, SchedulerError> {
        let index = self
            .store
            .append(run_id.clone(), state.clone(), tail.clone())
            .await?;
        for event in tail {
            self.events.publish(event);
        }
        Ok(index)
    }

    async fn guard(
        &self,
        state: &mut CanonicalState,
        run_id: &RunId,
        scenario_id: &ScenarioId,
        token: &CancellationToken,
        deadline: Instant,
    ) -> Result<(), SchedulerError> {
        if token.is_cancelled() {
            self.events.publish(lifecycle(
                run_id,
                scenario_id,
                RunEventKind::RunFailed,
                json!({ "cause": "cancelled" }),
            ));
            return Err(SchedulerError::Cancelled(run_id.to_string()));
        }
        if Instant::now() >= deadline {
            self.events.publish(lifecycle(
                run_id,
                scenario_id,
                RunEventKind::RunFailed,
                json!({ "cause": "deadline" }),
            ));
            return Err(SchedulerError::Deadline(run_id.to_string()));
        }
        if let Some(cap) = self.config.token_budget {
            if state.telemetry.total_tokens() > cap {
                self.events.publish(lifecycle(
                    run_id,
                    scenario_id,
                    RunEventKind::RunFailed,
                    json!({ "cause": "budget" }),
                ));
                return Err(SchedulerError::Budget(run_id.to_string()));
            }
        }
        Ok(())
    }

    async fn run_pass(
        &self,
        state: &mut CanonicalState,
        run_id: &RunId,
        scenario_id: &ScenarioId,
        agent_names: &[&str],
        pass: u32,
        token: &CancellationToken,
        deadline: Instant,
    ) -> Result<(), SchedulerError> {
        for name in agent_names {
            self.guard(state, run_id, scenario_id, token, deadline).await?;
            if *name == "validator" {
                self.run_validator_step(state, run_id, scenario_id, pass).await?;
            } else {
                self.run_agent_step(state, run_id, scenario_id, name, pass).await?;
            }
            self.guard(state, run_id, scenario_id, token, deadline).await?;
        }
        Ok(())
    }

    async fn run_validator_step(
        &self,
        state: &mut CanonicalState,
        run_id: &RunId,
        scenario_id: &ScenarioId,
        pass: u32,
    ) -> Result<(), SchedulerError> {
        self.events.publish(lifecycle(
            run_id,
            scenario_id,
            RunEventKind::AgentStarted,
            json!({ "agent": "validator" }),
        ));

        let started_at = chrono::Utc::now();
        let clock = Instant::now();
        let contradictions = waypoint_validator::validate(state);
        state.risks.contradictions = contradictions.clone();
        state.telemetry.agent_timings.push(AgentTiming {
            agent: "validator".to_string(),
            started_at,
            duration_ms: clock.elapsed().as_millis() as u64,
            pass,
        });

        let mut tail: Vec<EventEnvelope> = contradictions
            .iter()
            .map(|c| {
                lifecycle(
                    run_id,
                    scenario_id,
                    RunEventKind::ValidatorWarning,
                    serde_json::to_value(c).unwrap_or(json!({})),
                )
            })
            .collect();
        tail.push(lifecycle(
            run_id,
            scenario_id,
            RunEventKind::AgentCompleted,
            json!({ "agent": "validator", "contradictions": contradictions.len() }),
        ));

        self.commit(run_id, state, tail).await?;
        Ok(())
    }

    async fn run_agent_step(
        &self,
        state: &mut CanonicalState,
        run_id: &RunId,
        scenario_id: &ScenarioId,
        name: &str,
        pass: u32,
    ) -> Result<(), SchedulerError> {
        self.events.publish(lifecycle(
            run_id,
            scenario_id,
            RunEventKind::AgentStarted,
            json!({ "agent": name }),
        ));

        let Some(agent) = self.agents.get(name) else {
            self.commit(
                run_id,
                state,
                vec![lifecycle(
                    run_id,
                    scenario_id,
                    RunEventKind::AgentSkipped,
                    json!({ "agent": name, "reason": "not registered" }),
                )],
            )
            .await?;
            return Ok(());
        };

        let snapshot = state.snapshot();
        let started_at = chrono::Utc::now();
        let clock = Instant::now();
        let outcome = tokio::time::timeout(self.config.per_agent_timeout, agent.run(&snapshot)).await;

        let output: AgentOutput = match outcome {
            Err(_elapsed) => {
                warn!(agent = name, "agent timed out");
                record_failure(state, name, "timeout");
                self.commit(
                    run_id,
                    state,
                    vec![lifecycle(
                        run_id,
                        scenario_id,
                        RunEventKind::AgentFailed,
                        json!({ "agent": name, "cause": "timeout" }),
                    )],
                )
                .await?;
                return Ok(());
            }
            Ok(Err(err)) => {
                warn!(agent = name, error = %err, "agent provider call failed");
                record_failure(state, name, &err.to_string());
                self.commit(
                    run_id,
                    state,
                    vec![lifecycle(
                        run_id,
                        scenario_id,
                        RunEventKind::AgentFailed,
                        json!({ "agent": name, "cause": "provider", "message": err.to_string() }),
                    )],
                )
                .await?;
                return Ok(());
            }
            Ok(Ok(output)) => output,
        };

        let patch_count = output.patches.len() + output.facts.len() + output.assumptions.len();
        let (prompt_tokens, completion_tokens) = (output.prompt_tokens, output.completion_tokens);

        match waypoint_merge::merge(state, output) {
            Err(err) => {
                warn!(agent = name, error = %err, "merge rejected agent output");
                record_failure(state, name, &err.to_string());
                self.commit(
                    run_id,
                    state,
                    vec![lifecycle(
                        run_id,
                        scenario_id,
                        RunEventKind::AgentFailed,
                        json!({ "agent": name, "cause": "merge", "message": err.to_string() }),
                    )],
                )
                .await?;
                Ok(())
            }
            Ok(result) => {
                let mut next = result.state;
                auto_select(&mut next, name);

                let duration_ms = clock.elapsed().as_millis() as u64;
                next.telemetry.agent_timings.push(AgentTiming {
                    agent: name.to_string(),
                    started_at,
                    duration_ms,
                    pass,
                });
                let spend = next
                    .telemetry
                    .token_spend
                    .entry(name.to_string())
                    .or_insert_with(TokenSpend::default);
                spend.prompt_tokens += prompt_tokens;
                spend.completion_tokens += completion_tokens;

                *state = next;

                let mut tail: Vec<EventEnvelope> = result
                    .events
                    .into_iter()
                    .map(|e| from_merge_event(run_id, scenario_id, e))
                    .collect();
                tail.push(lifecycle(
                    run_id,
                    scenario_id,
                    RunEventKind::AgentCompleted,
                    json!({ "agent": name, "patches": patch_count }),
                ));

                self.commit(run_id, state, tail).await?;
                info!(agent = name, duration_ms, "agent completed");
                Ok(())
            }
        }
    }

    async fn reconcile(
        &self,
        state: &mut CanonicalState,
        run_id: &RunId,
        scenario_id: &ScenarioId,
        token: &CancellationToken,
        deadline: Instant,
    ) -> Result<RunOutcome, SchedulerError> {
        let mut previous_rule_ids: Option<BTreeSet<String>> = None;

        for _round in 0..self.config.reconciliation_cap {
            let severe: Vec<_> = state
                .risks
                .contradictions
                .iter()
                .filter(|c| c.severity >= Severity::High)
                .cloned()
                .collect();

            if severe.is_empty() {
                self.events.publish(lifecycle(
                    run_id,
                    scenario_id,
                    RunEventKind::RunCompleted,
                    json!({}),
                ));
                let index = self.store.latest(run_id).await?.index;
                return Ok(RunOutcome {
                    status: RunStatus::Completed,
                    state: state.clone(),
                    checkpoint_index: index,
                    contradictions: state.risks.contradictions.clone(),
                });
            }

            let rule_ids: BTreeSet<String> = severe.iter().map(|c| c.rule_id.clone()).collect();
            if previous_rule_ids.as_ref() == Some(&rule_ids) {
                break;
            }
            previous_rule_ids = Some(rule_ids.clone());

            let mut affected: BTreeSet<&'static str> = rule_ids
                .iter()
                .filter_map(|rule_id| waypoint_validator::responsible_agent(rule_id))
                .collect();
            affected.extend(ALWAYS_RERUN);
            let ordered: Vec<&str> = AGENT_SEQUENCE
                .iter()
                .copied()
                .filter(|name| affected.contains(name))
                .collect();

            let next_pass = state
                .telemetry
                .agent_timings
                .iter()
                .map(|t| t.pass)
                .max()
                .unwrap_or(0)
                + 1;
            self.run_pass(state, run_id, scenario_id, &ordered, next_pass, token, deadline)
                .await?;
        }

        self.events.publish(lifecycle(
            run_id,
            scenario_id,
            RunEventKind::RunBlocked,
            json!({ "contradictions": state.risks.contradictions }),
        ));
        let index = self.store.latest(run_id).await?.index;
        Ok(RunOutcome {
            status: RunStatus::Blocked,
            state: state.clone(),
            checkpoint_index: index,
            contradictions: state.risks.contradictions.clone(),
        })
    }
}

fn record_failure(state: &mut CanonicalState, agent: &str, message: &str) {
    state.telemetry.errors.push(types::AgentError {
        agent: agent.to_string(),
        message: message.to_string(),
        occurred_at: chrono::Utc::now(),
    });
}

fn auto_select(state: &mut CanonicalState, agent: &str) {
    let slot = decision_slot_mut(state, agent);
    if let Some(slot) = slot {
        if slot.selected_option_id.is_none() {
            slot.selected_option_id = slot.recommended_option_id.clone();
        }
    }
}

fn decision_slot_mut<'a>(
    state: &'a mut CanonicalState,
    decision_key: &str,
) -> Option<&'a mut types::DecisionSlot> {
    match decision_key {
        "icp" => Some(&mut state.decisions.icp),
        "positioning" => Some(&mut state.decisions.positioning),
        "pricing" => Some(&mut state.decisions.pricing),
        "channels" => Some(&mut state.decisions.channels),
        "sales_motion" => Some(&mut state.decisions.sales_motion),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use waypoint_agents::{Agent, AgentRegistry};
    use waypoint_types::{IntakeAnswer, ProjectId};

    struct StubAgent {
        name: String,
        calls: Arc<Mutex<Vec<String>>>,
        tokens: u64,
    }

    #[async_trait]
    impl Agent for StubAgent {
        fn name(&self) -> &str {
            &self.name
        }

        async fn run(&self, state: &CanonicalState) -> Result<AgentOutput, waypoint_agents::AgentError> {
            self.calls.lock().unwrap().push(self.name.clone());
            let mut output = AgentOutput::empty(self.name.clone(), state.meta.run_id.clone());
            output.prompt_tokens = self.tokens;
            Ok(output)
        }
    }

    fn registry_of(
        names: &[&str],
        calls: Arc<Mutex<Vec<String>>>,
        tokens: u64,
    ) -> AgentRegistry {
        let mut registry = AgentRegistry::new();
        for name in names {
            registry.register(Arc::new(StubAgent {
                name: name.to_string(),
                calls: calls.clone(),
                tokens,
            }));
        }
        registry
    }

    fn complete_state() -> CanonicalState {
        let mut state = CanonicalState::new(RunId::new(), ScenarioId::new(), ProjectId::new());
        state.inputs.intake_answers.push(IntakeAnswer {
            question_id: "q1".to_string(),
            answer: json!("answer"),
        });
        state
    }

    async fn store_in_tempdir() -> Arc<CheckpointStore> {
        let dir = tempfile::tempdir().unwrap();
        CheckpointStore::open(dir.keep()).await.unwrap()
    }

    const ALL_NON_VALIDATOR: &[&str] = &[
        "evidence_collector",
        "competitive_teardown",
        "icp",
        "positioning",
        "pricing",
        "channels",
        "sales_motion",
        "product_strategy",
        "tech_feasibility",
        "people_cash",
        "execution",
        "graph_builder",
    ];

    #[tokio::test]
    async fn clean_run_blocks_when_decisions_are_never_finalized() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let agents = registry_of(ALL_NON_VALIDATOR, calls, 0);
        let store = store_in_tempdir().await;
        let events = EventBus::new();
        let scheduler = Scheduler::new(agents, store, events, RuntimeConfig::default());

        let outcome = scheduler
            .execute(ScenarioId::new(), complete_state())
            .await
            .unwrap();

        assert_eq!(outcome.status, RunStatus::Blocked);
        assert!(outcome
            .contradictions
            .iter()
            .any(|c| c.rule_id == "V-ICP-01"));
    }

    #[tokio::test]
    async fn validator_step_records_its_own_agent_timing() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let agents = registry_of(ALL_NON_VALIDATOR, calls, 0);
        let store = store_in_tempdir().await;
        let events = EventBus::new();
        let scheduler = Scheduler::new(agents, store, events, RuntimeConfig::default());

        let outcome = scheduler
            .execute(ScenarioId::new(), complete_state())
            .await
            .unwrap();

        assert!(outcome
            .state
            .telemetry
            .agent_timings
            .iter()
            .any(|t| t.agent == "validator"));

        let last_pass = outcome
            .state
            .telemetry
            .agent_timings
            .iter()
            .map(|t| t.pass)
            .max()
            .unwrap();
        let agents_in_last_pass: BTreeSet<&str> = outcome
            .state
            .telemetry
            .agent_timings
            .iter()
            .filter(|t| t.pass == last_pass)
            .map(|t| t.agent.as_str())
            .collect();
        assert!(agents_in_last_pass.contains("validator"));
    }

    #[tokio::test]
    async fn execute_rejects_incomplete_inputs_without_creating_a_run() {
        let agents = registry_of(ALL_NON_VALIDATOR, Arc::new(Mutex::new(Vec::new())), 0);
        let store = store_in_tempdir().await;
        let events = EventBus::new();
        let scheduler = Scheduler::new(agents, store, events, RuntimeConfig::default());

        let state = CanonicalState::new(RunId::new(), ScenarioId::new(), ProjectId::new());
        let err = scheduler.execute(ScenarioId::new(), state).await.unwrap_err();
        assert!(matches!(err, SchedulerError::RequiredInputs(_)));
    }

    #[tokio::test]
    async fn override_decision_reruns_only_the_cascade_for_pricing() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let agents = registry_of(ALL_NON_VALIDATOR, calls.clone(), 0);
        let store = store_in_tempdir().await;
        let events = EventBus::new();
        let scheduler = Scheduler::new(agents, store, events, RuntimeConfig::default());

        let mut state = complete_state();
        state.decisions.pricing.options.push(waypoint_types::DecisionOption {
            option_id: "opt-a".to_string(),
            summary: "tiered".to_string(),
            payload: json!({}),
            meta: waypoint_types::MetaRef::new(waypoint_types::SourceType::Inference, 0.5, "pricing"),
        });

        calls.lock().unwrap().clear();
        let outcome = scheduler
            .override_decision(
                ScenarioId::new(),
                state,
                "pricing",
                "opt-a".to_string(),
                false,
                None,
            )
            .await
            .unwrap();

        let pass = outcome
            .state
            .telemetry
            .agent_timings
            .iter()
            .map(|t| t.pass)
            .max()
            .unwrap();
        let this_pass: BTreeSet<&str> = outcome
            .state
            .telemetry
            .agent_timings
            .iter()
            .filter(|t| t.pass == pass)
            .map(|t| t.agent.as_str())
            .collect();
        assert_eq!(
            this_pass,
            BTreeSet::from(["sales_motion", "graph_builder"])
        );
        assert_eq!(
            outcome.state.decisions.pricing.selected_option_id.as_deref(),
            Some("opt-a")
        );
    }

    #[tokio::test]
    async fn resume_only_runs_agents_missing_from_the_current_pass() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let agents = registry_of(ALL_NON_VALIDATOR, calls.clone(), 0);
        let store = store_in_tempdir().await;
        let events = EventBus::new();
        let scheduler = Scheduler::new(agents, store.clone(), events, RuntimeConfig::default());

        let mut state = complete_state();
        state.telemetry.agent_timings.push(AgentTiming {
            agent: "evidence_collector".to_string(),
            started_at: chrono::Utc::now(),
            duration_ms: 1,
            pass: 1,
        });
        state.telemetry.agent_timings.push(AgentTiming {
            agent: "competitive_teardown".to_string(),
            started_at: chrono::Utc::now(),
            duration_ms: 1,
            pass: 1,
        });
        let run_id = state.meta.run_id.clone();
        store.append(run_id.clone(), state.clone(), Vec::new()).await.unwrap();

        calls.lock().unwrap().clear();
        scheduler.resume(ScenarioId::new(), run_id).await.unwrap();

        let called = calls.lock().unwrap().clone();
        assert!(!called.contains(&"evidence_collector".to_string()));
        assert!(!called.contains(&"competitive_teardown".to_string()));
        assert!(called.contains(&"icp".to_string()));
    }

    #[tokio::test]
    async fn run_deadline_of_zero_fails_the_run_immediately() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let agents = registry_of(ALL_NON_VALIDATOR, calls, 0);
        let store = store_in_tempdir().await;
        let events = EventBus::new();
        let mut config = RuntimeConfig::default();
        config.run_deadline = std::time::Duration::from_secs(0);
        let scheduler = Scheduler::new(agents, store, events, config);

        let err = scheduler
            .execute(ScenarioId::new(), complete_state())
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Deadline(_)));
    }

    #[tokio::test]
    async fn token_budget_of_zero_fails_once_an_agent_spends_tokens() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let agents = registry_of(ALL_NON_VALIDATOR, calls, 5);
        let store = store_in_tempdir().await;
        let events = EventBus::new();
        let mut config = RuntimeConfig::default();
        config.token_budget = Some(0);
        let scheduler = Scheduler::new(agents, store, events, config);

        let err = scheduler
            .execute(ScenarioId::new(), complete_state())
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Budget(_)));
    }
}
