//! The scheduler's 60-second tick loop: owns the task table, evaluates
//! triggers each tick, and dispatches due actions (§4E).
//!
//! Mirrors `ScenarioExecutor`'s concurrency choice (`tokio::sync::Mutex`
//! over a `HashMap`, confirmed against `agent.rs`'s `Arc<RwLock<_>>`
//! fields as this crate's idiom for shared async-mutable state) rather
//! than a single-threaded event loop with manual polling, since the rest
//! of this crate is already built on `tokio`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::scenarioflow::config::EngineConfig;
use crate::scenarioflow::error::{SchedulerDispatchError, ValidationError};
use crate::scenarioflow::executor::ScenarioExecutor;
use crate::scenarioflow::model::{ActionType, ScheduledTask};
use crate::scenarioflow::plugins::scheduling::validate_task;
use crate::scenarioflow::scheduler::trigger::{is_due, passes_reexecution_guard};

/// Durable Task Scheduler (spec.md §4E, §2 component E). Holds the
/// in-memory task table; persistence of task mutations is the caller's
/// responsibility (this crate models the in-process predicate evaluation
/// and dispatch, not a specific storage backend).
pub struct SchedulerService {
    tasks: Mutex<HashMap<Uuid, ScheduledTask>>,
    config: EngineConfig,
    http: reqwest::Client,
}

impl SchedulerService {
    pub fn new(config: EngineConfig) -> Self {
        SchedulerService {
            tasks: Mutex::new(HashMap::new()),
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Loads an initial task set (e.g. the enabled tasks read from
    /// persistent storage at startup) and applies the one-time
    /// `datetime == "now"` fix-up (spec.md §4E).
    pub async fn load(&self, tasks: Vec<ScheduledTask>) {
        let now = Utc::now();
        let mut table = self.tasks.lock().await;
        for mut task in tasks {
            if task.trigger_config.get("datetime").and_then(Value::as_str) == Some("now") {
                if let Some(map) = task.trigger_config.as_object_mut() {
                    map.insert("datetime".to_string(), Value::String(now.to_rfc3339()));
                }
            }
            table.insert(task.id, task);
        }
    }

    pub async fn add_task(&self, task: ScheduledTask) -> Result<Uuid, ValidationError> {
        validate_task(&task)?;
        let id = task.id;
        self.tasks.lock().await.insert(id, task);
        Ok(id)
    }

    pub async fn remove_task(&self, id: Uuid) -> Option<ScheduledTask> {
        self.tasks.lock().await.remove(&id)
    }

    pub async fn get_task(&self, id: Uuid) -> Option<ScheduledTask> {
        self.tasks.lock().await.get(&id).cloned()
    }

    pub async fn list_tasks(&self) -> Vec<ScheduledTask> {
        self.tasks.lock().await.values().cloned().collect()
    }

    /// Supplemented query (`SPEC_FULL.md` §2): tasks whose trigger would
    /// fire at any point between `now` and `now + within`, useful for an
    /// operator-facing "what's coming up" view. Not in the source, which
    /// has no forward-looking query at all.
    pub async fn tasks_due_within(&self, within: chrono::Duration) -> Vec<ScheduledTask> {
        let now = Utc::now();
        let horizon = now + within;
        self.tasks
            .lock()
            .await
            .values()
            .filter(|t| t.enabled && (is_due(t, now) || is_due(t, horizon)))
            .cloned()
            .collect()
    }

    /// Runs one tick: evaluates every enabled task's trigger against the
    /// current time and dispatches the due ones. Returns the number of
    /// tasks dispatched.
    pub async fn tick(&self, executor: &ScenarioExecutor) -> usize {
        let now = Utc::now();
        let due: Vec<ScheduledTask> = {
            let table = self.tasks.lock().await;
            table
                .values()
                .filter(|t| t.enabled && is_due(t, now) && passes_reexecution_guard(t, now))
                .cloned()
                .collect()
        };

        for task in &due {
            let result = self.dispatch(task, executor).await;
            let mut table = self.tasks.lock().await;
            if let Some(stored) = table.get_mut(&task.id) {
                stored.last_executed_at = Some(now);
                match result {
                    Ok(()) => stored.last_error = None,
                    Err(e) => {
                        log::error!("{}", e);
                        stored.last_error = Some(e.reason.clone());
                    }
                }
                if task.trigger_type == crate::scenarioflow::model::TriggerType::Once {
                    stored.enabled = false;
                }
            }
        }

        due.len()
    }

    /// Runs the tick loop forever at `config.scheduler_tick_period`.
    /// Intended to be spawned as its own long-lived task (spec.md §5:
    /// "one dedicated long-lived task with a 60-second tick").
    pub async fn run(self: Arc<Self>, executor: Arc<ScenarioExecutor>) {
        let mut interval = tokio::time::interval(self.config.scheduler_tick_period);
        loop {
            interval.tick().await;
            let dispatched = self.tick(&executor).await;
            if dispatched > 0 {
                log::debug!("scheduler tick dispatched {} task(s)", dispatched);
            }
        }
    }

    async fn dispatch(&self, task: &ScheduledTask, executor: &ScenarioExecutor) -> Result<(), SchedulerDispatchError> {
        match task.action_type {
            ActionType::RunAgent => self.dispatch_run_agent(task, executor).await,
            ActionType::SendNotification => self.dispatch_send_notification(task).await,
            ActionType::ApiCall => self.dispatch_api_call(task).await,
        }
    }

    async fn dispatch_run_agent(
        &self,
        task: &ScheduledTask,
        _executor: &ScenarioExecutor,
    ) -> Result<(), SchedulerDispatchError> {
        let agent_id = task
            .action_config
            .get("agent_id")
            .and_then(Value::as_str)
            .ok_or_else(|| SchedulerDispatchError {
                task_id: task.id.to_string(),
                reason: "action_config is missing agent_id".to_string(),
            })?;

        let mut context = task
            .action_config
            .get("initial_payload")
            .and_then(|p| p.get("context"))
            .cloned()
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
        if let Some(map) = context.as_object_mut() {
            map.insert("user_id".to_string(), Value::String(task.user_id.clone()));
            match task.action_config.get("chat_id") {
                Some(chat_id) => {
                    map.insert("chat_id".to_string(), chat_id.clone());
                }
                None => {
                    map.insert("chat_id".to_string(), Value::String(task.user_id.clone()));
                }
            }
        }

        let url = format!("{}/agent-actions/{}/execute", self.config.api_base_url, agent_id);
        self.http
            .post(&url)
            .json(&serde_json::json!({"context": context}))
            .send()
            .await
            .map_err(|e| SchedulerDispatchError {
                task_id: task.id.to_string(),
                reason: e.to_string(),
            })?
            .error_for_status()
            .map_err(|e| SchedulerDispatchError {
                task_id: task.id.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn dispatch_send_notification(&self, task: &ScheduledTask) -> Result<(), SchedulerDispatchError> {
        let url = task
            .action_config
            .get("endpoint")
            .and_then(Value::as_str)
            .ok_or_else(|| SchedulerDispatchError {
                task_id: task.id.to_string(),
                reason: "action_config is missing endpoint".to_string(),
            })?;
        self.http
            .post(url)
            .json(&task.action_config)
            .send()
            .await
            .map_err(|e| SchedulerDispatchError {
                task_id: task.id.to_string(),
                reason: e.to_string(),
            })?
            .error_for_status()
            .map_err(|e| SchedulerDispatchError {
                task_id: task.id.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn dispatch_api_call(&self, task: &ScheduledTask) -> Result<(), SchedulerDispatchError> {
        let url = task
            .action_config
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| SchedulerDispatchError {
                task_id: task.id.to_string(),
                reason: "action_config is missing url".to_string(),
            })?;
        let method = task
            .action_config
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("POST")
            .to_uppercase();
        let body = task.action_config.get("body").cloned();

        let mut request = match method.as_str() {
            "GET" => self.http.get(url),
            "PUT" => self.http.put(url),
            "DELETE" => self.http.delete(url),
            _ => self.http.post(url),
        };
        if let Some(body) = body {
            request = request.json(&body);
        }
        request
            .send()
            .await
            .map_err(|e| SchedulerDispatchError {
                task_id: task.id.to_string(),
                reason: e.to_string(),
            })?
            .error_for_status()
            .map_err(|e| SchedulerDispatchError {
                task_id: task.id.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }
}
