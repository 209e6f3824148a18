//! End-to-end scenario execution tests (S1-S6 from spec.md §8), run
//! through the crate's public API rather than internal unit tests.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use scenarioflow::{
    builtin_registry, Agent, Branch, BranchSpec, Dependencies, EngineConfig, ExecutionOutcome,
    NextStep, Scenario, ScenarioExecutor, SchedulerService, ScheduledTask, Step,
};
use scenarioflow::scenarioflow::plugins::{AgentRepository, MessagingPlugin};

fn step(id: &str, type_tag: &str, params: Value) -> Step {
    Step {
        id: id.to_string(),
        type_tag: type_tag.to_string(),
        params,
        next_step: None,
        branches: None,
        condition: None,
    }
}

fn scenario(id: &str, steps: Vec<Step>) -> Scenario {
    Scenario {
        scenario_id: id.to_string(),
        name: Some(id.to_string()),
        version: None,
        description: None,
        initial_context: json!({}),
        steps,
        required_plugins: vec![],
    }
}

struct FixedAgentRepository(Agent);

#[async_trait]
impl AgentRepository for FixedAgentRepository {
    async fn get_agent_by_id(&self, id: &str) -> Option<Agent> {
        if id == self.0.id {
            Some(self.0.clone())
        } else {
            None
        }
    }
}

struct RecordingMessagingPlugin {
    sent: StdMutex<Vec<(String, String)>>,
}

#[async_trait]
impl MessagingPlugin for RecordingMessagingPlugin {
    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        _inline_keyboard: Option<Value>,
    ) -> Result<scenarioflow::scenarioflow::plugins::messaging::SendMessageResult, scenarioflow::HandlerError> {
        self.sent.lock().unwrap().push((chat_id.to_string(), text.to_string()));
        Ok(scenarioflow::scenarioflow::plugins::messaging::SendMessageResult {
            message_id: "m1".to_string(),
        })
    }

    async fn edit_message(
        &self,
        _chat_id: &str,
        _message_id: &str,
        _text: &str,
        _inline_keyboard: Option<Value>,
    ) -> Result<(), scenarioflow::HandlerError> {
        Ok(())
    }
}

#[tokio::test]
async fn s1_linear_scenario_runs_to_completion_with_agent_context_seeded() {
    let agent = Agent {
        id: "agent1".to_string(),
        scenario_id: Some("linear".to_string()),
        plugins: vec![],
        settings: json!({}),
        initial_context: json!({"greeting": "hello"}),
        description: None,
    };
    let deps = Dependencies::new().with_agent_repository(Arc::new(FixedAgentRepository(agent)));
    let executor = ScenarioExecutor::new(builtin_registry(), deps, EngineConfig::default());

    let steps = vec![
        step("start", "start", json!({})),
        step(
            "greet",
            "action/update_context",
            json!({"updates": {"final_message": "{greeting}, world"}}),
        ),
        step("end", "end", json!({})),
    ];

    let outcome = executor
        .execute_scenario(scenario("linear", steps), json!({}), "agent1")
        .await;

    match outcome {
        ExecutionOutcome::Completed(envelope) => {
            assert!(envelope.success);
            assert_eq!(
                envelope.context.unwrap()["final_message"],
                json!("hello, world")
            );
        }
        other => panic!("expected Completed, got {:?}", other),
    }
}

#[tokio::test]
async fn s4_pause_resume_round_trip_uses_messaging_plugin() {
    let messaging = Arc::new(RecordingMessagingPlugin {
        sent: StdMutex::new(vec![]),
    });
    let deps = Dependencies::new().with_messaging(messaging.clone());
    let executor = ScenarioExecutor::new(builtin_registry(), deps, EngineConfig::default());

    let mut send = step(
        "send",
        "telegram_send_message",
        json!({"chat_id": "{chat_id}", "text": "pick one"}),
    );
    send.next_step = Some(NextStep::Id("wait".to_string()));
    let mut wait = step("wait", "input/callback_query", json!({"output_var": "choice"}));
    wait.next_step = Some(NextStep::Id("end".to_string()));
    let steps = vec![step("start", "start", json!({})), send, wait, step("end", "end", json!({}))];

    let outcome = executor
        .execute_scenario(
            scenario("wizard", steps),
            json!({"chat_id": "c1", "user_id": "u1"}),
            "agent1",
        )
        .await;

    let instance_id = match outcome {
        ExecutionOutcome::Paused { instance_id, .. } => instance_id,
        other => panic!("expected Paused, got {:?}", other),
    };
    assert_eq!(messaging.sent.lock().unwrap().len(), 1);

    let resumed = executor.resume_scenario(&instance_id, json!("option_b")).await.unwrap();
    match resumed {
        ExecutionOutcome::Completed(envelope) => {
            assert_eq!(envelope.context.unwrap()["choice"], json!("option_b"));
        }
        other => panic!("expected Completed after resume, got {:?}", other),
    }
}

#[tokio::test]
async fn s6_scheduler_once_task_dispatches_exactly_once() {
    let scheduler = SchedulerService::new(EngineConfig::default());
    let now = chrono::Utc::now();
    let target = now - chrono::Duration::seconds(10);
    let task = ScheduledTask {
        id: uuid::Uuid::new_v4(),
        user_id: "u1".to_string(),
        enabled: true,
        created_at: now,
        trigger_type: scenarioflow::scenarioflow::model::TriggerType::Once,
        trigger_config: json!({"datetime": target.to_rfc3339(), "margin_seconds": 300}),
        action_type: scenarioflow::scenarioflow::model::ActionType::ApiCall,
        action_config: json!({"url": "https://example.invalid/ping"}),
        last_executed_at: None,
        last_error: None,
    };
    let task_id = scheduler.add_task(task).await.unwrap();

    let executor = ScenarioExecutor::new(builtin_registry(), Dependencies::new(), EngineConfig::default());
    let dispatched_first_tick = scheduler.tick(&executor).await;
    assert_eq!(dispatched_first_tick, 1);

    let stored = scheduler.get_task(task_id).await.unwrap();
    assert!(!stored.enabled);

    let dispatched_second_tick = scheduler.tick(&executor).await;
    assert_eq!(dispatched_second_tick, 0);
}
