//! Scenario Executor — the core component. Drives a `StateMachine`,
//! dispatches each step to its `Handler`, manages pause/resume, and owns
//! the two engine-special step types (`execute_sub_scenario`,
//! `schedule_scenario_run`) that need more than the `Handler` trait
//! exposes.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::scenarioflow::builtins::set_path;
use crate::scenarioflow::config::EngineConfig;
use crate::scenarioflow::error::{HandlerError, ResumeError};
use crate::scenarioflow::model::{
    make_instance_id, reserved_keys, strip_reserved, ActionType, Agent, ContextExt,
    PausedScenarioRecord, Scenario, Step, TriggerType, WaitingRecord, WaitingStatus,
};
use crate::scenarioflow::plugins::Dependencies;
use crate::scenarioflow::registry::{HandlerRegistry, HandlerOutcome};
use crate::scenarioflow::resolver::resolve;
use crate::scenarioflow::state_machine::StateMachine;

/// The result mapping built at the end of a scenario run (spec.md §4D.1
/// step 4): `scenario_id`, `agent_id`, `success`, `message`, and either
/// `error` or the pruned context.
#[derive(Debug, Clone)]
pub struct ResultEnvelope {
    pub scenario_id: String,
    pub agent_id: String,
    pub success: bool,
    pub message: String,
    pub error: Option<String>,
    pub context: Option<Value>,
}

/// Replaces implicit pause/resume state transitions with an explicit sum
/// type (`SPEC_FULL.md` §9, REDESIGN FLAGS).
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    Completed(ResultEnvelope),
    Paused {
        instance_id: String,
        waiting: WaitingRecord,
    },
    Failed(ResultEnvelope),
}

pub struct ScenarioExecutor {
    registry: HandlerRegistry,
    deps: Dependencies,
    config: EngineConfig,
    waiting: Mutex<std::collections::HashMap<String, WaitingRecord>>,
    paused: Mutex<std::collections::HashMap<String, PausedScenarioRecord>>,
}

impl ScenarioExecutor {
    pub fn new(registry: HandlerRegistry, deps: Dependencies, config: EngineConfig) -> Self {
        ScenarioExecutor {
            registry,
            deps,
            config,
            waiting: Mutex::new(std::collections::HashMap::new()),
            paused: Mutex::new(std::collections::HashMap::new()),
        }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// §4D.1 top-level invocation.
    pub async fn execute_scenario(
        &self,
        scenario: Scenario,
        caller_context: Value,
        agent_id: &str,
    ) -> ExecutionOutcome {
        let agent = match &self.deps.agent_repository {
            Some(repo) => repo.get_agent_by_id(agent_id).await,
            None => None,
        };
        let context = self.compose_context(&scenario, agent.as_ref(), &caller_context, agent_id);
        let sm = StateMachine::new(
            scenario.name.clone().unwrap_or_else(|| scenario.scenario_id.clone()),
            scenario.steps.clone(),
            context,
        );
        self.run_loop(scenario, sm, false).await
    }

    /// Boxes the recursive call `execute_sub_scenario` makes back into
    /// `execute_scenario`, breaking the otherwise infinitely-sized async
    /// future that a direct recursive call would produce.
    fn execute_scenario_boxed<'a>(
        &'a self,
        scenario: Scenario,
        caller_context: Value,
        agent_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = ExecutionOutcome> + Send + 'a>> {
        Box::pin(self.execute_scenario(scenario, caller_context, agent_id))
    }

    fn compose_context(
        &self,
        scenario: &Scenario,
        agent: Option<&Agent>,
        caller_context: &Value,
        agent_id: &str,
    ) -> Value {
        let mut context = scenario.initial_context.clone();
        if let Some(agent) = agent {
            context.merge_in_place(&agent.initial_context);
        }
        context.merge_in_place(caller_context);

        set_path(
            &mut context,
            reserved_keys::CURRENT_SCENARIO_ID,
            Value::String(scenario.scenario_id.clone()),
        );
        set_path(
            &mut context,
            reserved_keys::CURRENT_AGENT_ID,
            Value::String(agent_id.to_string()),
        );

        if context.get("telegram_chat_id").is_none() {
            if let Some(chat_id) = agent.and_then(Agent::default_telegram_chat_id) {
                set_path(&mut context, "telegram_chat_id", Value::String(chat_id.to_string()));
                if context.get("user_id").is_none() {
                    set_path(&mut context, "user_id", Value::String(chat_id.to_string()));
                }
            }
        }

        if context.get(reserved_keys::SCENARIO_INSTANCE_ID).is_none() {
            let user_id = context.get("user_id").and_then(Value::as_str).unwrap_or("anonymous");
            let chat_id = context
                .get("chat_id")
                .and_then(Value::as_str)
                .or_else(|| context.get("telegram_chat_id").and_then(Value::as_str))
                .unwrap_or("none");
            let instance_id = make_instance_id(&scenario.scenario_id, user_id, chat_id, Utc::now().timestamp());
            set_path(
                &mut context,
                reserved_keys::SCENARIO_INSTANCE_ID,
                Value::String(instance_id),
            );
        }

        context
    }

    /// §4D.1 step 3, and §4D.2 step 3 (resume re-enters here).
    /// `first_iteration_is_resume` flags the fatal "pause immediately
    /// after resume" condition.
    async fn run_loop(
        &self,
        scenario: Scenario,
        mut sm: StateMachine,
        first_iteration_is_resume: bool,
    ) -> ExecutionOutcome {
        let agent_id = sm
            .context()
            .get(reserved_keys::CURRENT_AGENT_ID)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let mut is_resume_iteration = first_iteration_is_resume;

        while let Some(step) = sm.current_step().cloned() {
            let step_value = serde_json::to_value(&step).unwrap_or(Value::Null);
            let resolved = resolve(&step_value, sm.context());

            log::debug!(
                "step executed: scenario_id={} step_id={} step_type={}",
                scenario.scenario_id,
                step.id,
                step.type_tag
            );

            let outcome = match step.type_tag.as_str() {
                "execute_sub_scenario" => self.handle_execute_sub_scenario(&resolved, &mut sm).await,
                "schedule_scenario_run" => self.handle_schedule_scenario_run(&resolved, &mut sm).await,
                _ => match self.registry.get(&step.type_tag) {
                    Some(handler) => handler.invoke(&step, &resolved, &mut sm, &self.deps).await,
                    None => HandlerOutcome::Error(
                        HandlerError::NoHandler {
                            step_type: step.type_tag.clone(),
                        }
                        .to_string(),
                    ),
                },
            };

            match outcome {
                HandlerOutcome::Ok => {}
                HandlerOutcome::Error(message) => {
                    set_path(sm.context_mut(), reserved_keys::STEP_ERROR, Value::String(message));
                }
                HandlerOutcome::Bind(value) => {
                    if let Some(output_var) = resolved
                        .get("params")
                        .and_then(|p| p.get("output_var"))
                        .and_then(Value::as_str)
                    {
                        set_path(sm.context_mut(), output_var, value);
                    }
                }
                HandlerOutcome::Pause(marker) => {
                    if is_resume_iteration {
                        set_path(
                            sm.context_mut(),
                            reserved_keys::STEP_ERROR,
                            Value::String("Logic error: pause immediately after resume".to_string()),
                        );
                    } else {
                        return self.pause(scenario, sm, &step, &resolved, marker).await;
                    }
                }
            }

            if sm.context().get(reserved_keys::STEP_ERROR).is_some() {
                return Self::build_failed(&scenario.scenario_id, &agent_id, sm.context());
            }

            is_resume_iteration = false;
            sm.next_step(None);
        }

        Self::build_completed(&scenario.scenario_id, &agent_id, sm.context())
    }

    async fn pause(
        &self,
        scenario: Scenario,
        sm: StateMachine,
        step: &Step,
        resolved: &Value,
        marker: String,
    ) -> ExecutionOutcome {
        let context = sm.context().clone();
        let instance_id = context
            .get(reserved_keys::SCENARIO_INSTANCE_ID)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let params = resolved.get("params").cloned().unwrap_or(Value::Null);
        let waiting = WaitingRecord {
            message_id: context
                .get("message_id_with_buttons")
                .and_then(Value::as_str)
                .map(str::to_string),
            output_var: params
                .get("output_var")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            expected_pattern: params
                .get("expected_callback_data_pattern")
                .and_then(Value::as_str)
                .map(str::to_string),
            scenario_id: scenario.scenario_id.clone(),
            step_id: step.id.clone(),
            chat_id: context.get("chat_id").and_then(Value::as_str).map(str::to_string),
            user_id: context.get("user_id").and_then(Value::as_str).map(str::to_string),
            status: WaitingStatus::Pending,
            timestamp: Utc::now(),
        };

        let agent_id = context
            .get(reserved_keys::CURRENT_AGENT_ID)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let record = PausedScenarioRecord {
            scenario,
            agent_id,
            state: sm.serialize(),
            last_step_id: step.id.clone(),
            timestamp: Utc::now(),
        };

        log::debug!("pause marker '{}' for instance {}", marker, instance_id);
        self.paused.lock().await.insert(instance_id.clone(), record);
        self.waiting.lock().await.insert(instance_id.clone(), waiting.clone());

        ExecutionOutcome::Paused { instance_id, waiting }
    }

    /// §4D.2 resume path. A waiting record is marked `Resolved` in place
    /// (not removed) once its resume succeeds, so a duplicate resume
    /// event on an already-settled wait is detected and rejected as
    /// `AlreadyResolved` rather than misread as "instance never existed"
    /// (spec.md §4D.4). Resolved waiting records are reclaimed later by
    /// `sweep_expired_pauses`.
    pub async fn resume_scenario(
        &self,
        instance_id: &str,
        received_input: Value,
    ) -> Result<ExecutionOutcome, ResumeError> {
        {
            let mut waiting = self.waiting.lock().await;
            match waiting.get_mut(instance_id) {
                None => {
                    return Err(ResumeError::NoWaitingRecord {
                        instance_id: instance_id.to_string(),
                    })
                }
                Some(record) if record.status == WaitingStatus::Resolved => {
                    return Err(ResumeError::AlreadyResolved {
                        instance_id: instance_id.to_string(),
                    })
                }
                Some(record) => record.status = WaitingStatus::Resolved,
            }
        }

        let output_var = self
            .waiting
            .lock()
            .await
            .get(instance_id)
            .map(|r| r.output_var.clone())
            .unwrap_or_default();

        let paused = self.paused.lock().await.remove(instance_id).ok_or_else(|| ResumeError::NoPausedRecord {
            instance_id: instance_id.to_string(),
        })?;

        let mut sm = StateMachine::from_snapshot(paused.scenario.steps.clone(), paused.state.clone());
        if let Some(map) = sm.context_mut().as_object_mut_checked() {
            map.insert(output_var, received_input);
        }

        Ok(self.run_loop(paused.scenario, sm, true).await)
    }

    /// Removes paused records whose age exceeds `EngineConfig::paused_scenario_ttl`,
    /// and any `Resolved` waiting records left behind by `resume_scenario`
    /// once they're past the same TTL. The source never expires paused
    /// scenarios at all (`SPEC_FULL.md` §9.2).
    pub async fn sweep_expired_pauses(&self) -> usize {
        let ttl = chrono::Duration::from_std(self.config.paused_scenario_ttl)
            .unwrap_or_else(|_| chrono::Duration::seconds(0));
        let now = Utc::now();
        let mut paused = self.paused.lock().await;
        let expired: Vec<String> = paused
            .iter()
            .filter(|(_, record)| now - record.timestamp > ttl)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            paused.remove(id);
            log::warn!("paused scenario instance {} expired and was swept", id);
        }
        drop(paused);

        let mut waiting = self.waiting.lock().await;
        for id in &expired {
            waiting.remove(id);
        }
        let resolved_expired: Vec<String> = waiting
            .iter()
            .filter(|(_, record)| {
                record.status == WaitingStatus::Resolved && now - record.timestamp > ttl
            })
            .map(|(id, _)| id.clone())
            .collect();
        for id in &resolved_expired {
            waiting.remove(id);
        }

        expired.len() + resolved_expired.len()
    }

    async fn handle_execute_sub_scenario(&self, resolved: &Value, sm: &mut StateMachine) -> HandlerOutcome {
        let params = resolved.get("params").cloned().unwrap_or(Value::Null);
        let sub_scenario_id = match params.get("sub_scenario_id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => return HandlerOutcome::Error("execute_sub_scenario is missing params.sub_scenario_id".to_string()),
        };
        let repo = match &self.deps.scenario_repository {
            Some(repo) => repo,
            None => return HandlerOutcome::Error("no scenario repository configured".to_string()),
        };
        let sub_scenario = match repo.get_scenario_by_id(&sub_scenario_id).await {
            Some(s) => s,
            None => return HandlerOutcome::Error(format!("sub-scenario '{}' not found", sub_scenario_id)),
        };

        let input_mapping = params
            .get("input_mapping")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let mut sub_caller_context = serde_json::Map::new();
        for (target_key, template) in &input_mapping {
            sub_caller_context.insert(target_key.clone(), resolve(template, sm.context()));
        }

        let parent_agent_id = sm
            .context()
            .get(reserved_keys::CURRENT_AGENT_ID)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let outcome = self
            .execute_scenario_boxed(sub_scenario, Value::Object(sub_caller_context), &parent_agent_id)
            .await;

        match outcome {
            ExecutionOutcome::Completed(envelope) => {
                let output_mapping = params
                    .get("output_mapping")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                let sub_context = envelope.context.unwrap_or(Value::Null);
                for (parent_key, template) in &output_mapping {
                    let resolved_value = resolve(template, &sub_context);
                    set_path(sm.context_mut(), parent_key, resolved_value);
                }
                HandlerOutcome::Ok
            }
            ExecutionOutcome::Failed(envelope) => {
                HandlerOutcome::Error(envelope.error.unwrap_or_else(|| "sub-scenario failed".to_string()))
            }
            ExecutionOutcome::Paused { .. } => {
                HandlerOutcome::Error("sub-scenario paused mid-execution is not supported".to_string())
            }
        }
    }

    async fn handle_schedule_scenario_run(&self, resolved: &Value, sm: &mut StateMachine) -> HandlerOutcome {
        let params = resolved.get("params").cloned().unwrap_or(Value::Null);
        let scheduling = match &self.deps.scheduling {
            Some(plugin) => plugin,
            None => return HandlerOutcome::Error("no scheduling plugin configured".to_string()),
        };
        let initiator_user_id = match sm.context().get("initiator_user_id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                return HandlerOutcome::Error(
                    "schedule_scenario_run requires 'initiator_user_id' in context".to_string(),
                )
            }
        };
        let run_in_seconds = params.get("run_in_seconds").and_then(Value::as_i64).unwrap_or(0);
        let target = Utc::now() + chrono::Duration::seconds(run_in_seconds);
        let context_to_pass = params.get("context_to_pass").cloned().unwrap_or(Value::Null);

        let task = crate::scenarioflow::model::ScheduledTask {
            id: Uuid::new_v4(),
            user_id: initiator_user_id,
            enabled: true,
            created_at: Utc::now(),
            trigger_type: TriggerType::Once,
            trigger_config: serde_json::json!({
                "datetime": target.to_rfc3339(),
                "margin_seconds": 300,
            }),
            action_type: ActionType::RunAgent,
            action_config: serde_json::json!({
                "initial_payload": {"context": context_to_pass},
            }),
            last_executed_at: None,
            last_error: None,
        };

        match scheduling.add_task(task).await {
            Ok(task_id) => {
                if let Some(output_var) = params.get("task_id_output_var").and_then(Value::as_str) {
                    set_path(sm.context_mut(), output_var, Value::String(task_id.to_string()));
                }
                HandlerOutcome::Ok
            }
            Err(e) => HandlerOutcome::Error(e.to_string()),
        }
    }

    fn build_completed(scenario_id: &str, agent_id: &str, context: &Value) -> ExecutionOutcome {
        ExecutionOutcome::Completed(ResultEnvelope {
            scenario_id: scenario_id.to_string(),
            agent_id: agent_id.to_string(),
            success: true,
            message: "scenario completed".to_string(),
            error: None,
            context: Some(strip_reserved(context)),
        })
    }

    fn build_failed(scenario_id: &str, agent_id: &str, context: &Value) -> ExecutionOutcome {
        let error = context
            .get(reserved_keys::STEP_ERROR)
            .and_then(Value::as_str)
            .map(str::to_string);
        ExecutionOutcome::Failed(ResultEnvelope {
            scenario_id: scenario_id.to_string(),
            agent_id: agent_id.to_string(),
            success: false,
            message: "scenario failed".to_string(),
            error,
            context: Some(strip_reserved(context)),
        })
    }
}

/// Builds a `HandlerRegistry` pre-populated with the engine's own
/// built-in handlers (spec.md §4C): everything except
/// `execute_sub_scenario` / `schedule_scenario_run`, which the Executor
/// special-cases directly (see module docs).
pub fn builtin_registry() -> HandlerRegistry {
    use crate::scenarioflow::builtins::*;
    let mut registry = HandlerRegistry::new();
    registry.register("start", Arc::new(LifecycleHandler));
    registry.register("end", Arc::new(LifecycleHandler));
    registry.register("branch", Arc::new(BranchHandler));
    registry.register("action/update_context", Arc::new(UpdateContextHandler));
    registry.register("action/execute_code", Arc::new(ExecuteCodeHandler));
    registry.register("log_message", Arc::new(LogMessageHandler));
    registry.register("input/callback_query", Arc::new(CallbackQueryHandler));
    registry.register("telegram_send_message", Arc::new(TelegramSendMessageHandler));
    registry.register("telegram_edit_message", Arc::new(TelegramEditMessageHandler));
    registry.register("llm_query", Arc::new(LlmQueryHandler));
    registry.register("rag_search", Arc::new(RagSearchHandler));
    registry.register("mongo_insert_one", Arc::new(MongoHandler(MongoOp::InsertOne)));
    registry.register("mongo_find_one", Arc::new(MongoHandler(MongoOp::FindOne)));
    registry.register("mongo_update_one", Arc::new(MongoHandler(MongoOp::UpdateOne)));
    registry.register("mongo_delete_one", Arc::new(MongoHandler(MongoOp::DeleteOne)));
    registry
}
