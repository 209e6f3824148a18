//! Handlers the engine owns directly, as opposed to ones registered by
//! capability plugins: `start`, `end`, `action/update_context`,
//! `action/execute_code`, `branch` (a control-flow noop at the handler
//! level — `StateMachine` already drove the transition), `input/callback_query`,
//! `log_message`, the `telegram_*` messaging steps, `llm_query`,
//! `rag_search`, and the `mongo_*` storage steps.
//!
//! `execute_sub_scenario` and `schedule_scenario_run` are NOT here: the
//! spec calls them out as owned by the Executor itself (they need
//! recursive invocation and instance-id generation the Handler trait
//! doesn't expose), so `ScenarioExecutor` special-cases those two step
//! types before consulting the registry. See `executor.rs`.

use async_trait::async_trait;
use serde_json::Value;

use crate::scenarioflow::expr;
use crate::scenarioflow::model::Step;
use crate::scenarioflow::plugins::llm::LlmQueryRequest;
use crate::scenarioflow::plugins::Dependencies;
use crate::scenarioflow::registry::{Handler, HandlerOutcome};
use crate::scenarioflow::state_machine::StateMachine;

/// `start` / `end` — lifecycle markers, no-ops.
pub struct LifecycleHandler;

#[async_trait]
impl Handler for LifecycleHandler {
    async fn invoke(
        &self,
        _step: &Step,
        _resolved: &Value,
        _sm: &mut StateMachine,
        _deps: &Dependencies,
    ) -> HandlerOutcome {
        HandlerOutcome::Ok
    }
}

/// `branch` — control flow is entirely handled by `StateMachine::next_step`;
/// the handler itself does nothing (spec.md §4D.3).
pub struct BranchHandler;

#[async_trait]
impl Handler for BranchHandler {
    async fn invoke(
        &self,
        _step: &Step,
        _resolved: &Value,
        _sm: &mut StateMachine,
        _deps: &Dependencies,
    ) -> HandlerOutcome {
        HandlerOutcome::Ok
    }
}

/// `action/update_context` — writes a mapping of dotted-path → (already
/// resolved) template value into the live context.
pub struct UpdateContextHandler;

#[async_trait]
impl Handler for UpdateContextHandler {
    async fn invoke(
        &self,
        _step: &Step,
        resolved: &Value,
        sm: &mut StateMachine,
        _deps: &Dependencies,
    ) -> HandlerOutcome {
        let updates = match resolved.get("params").and_then(|p| p.get("updates")) {
            Some(Value::Object(map)) => map.clone(),
            _ => return HandlerOutcome::Ok,
        };
        for (path, value) in updates {
            set_path(sm.context_mut(), &path, value);
        }
        HandlerOutcome::Ok
    }
}

/// Writes `value` into `context` at the dotted `path`, creating
/// intermediate objects as needed. Each key's navigation is
/// left-to-right; order across distinct top-level keys is unspecified,
/// matching spec.md §4D.3.
pub fn set_path(context: &mut Value, path: &str, value: Value) {
    if !context.is_object() {
        *context = Value::Object(serde_json::Map::new());
    }
    let segments: Vec<&str> = path.split('.').collect();
    let mut current = context;
    for (i, segment) in segments.iter().enumerate() {
        let is_last = i == segments.len() - 1;
        let map = match current.as_object_mut() {
            Some(m) => m,
            None => return,
        };
        if is_last {
            map.insert(segment.to_string(), value);
            return;
        }
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        if !current.is_object() {
            *current = Value::Object(serde_json::Map::new());
        }
    }
}

/// `action/execute_code` — evaluates a restricted expression over the
/// context (see `expr.rs`) and binds the result to `output_var` if set.
pub struct ExecuteCodeHandler;

#[async_trait]
impl Handler for ExecuteCodeHandler {
    async fn invoke(
        &self,
        _step: &Step,
        resolved: &Value,
        sm: &mut StateMachine,
        _deps: &Dependencies,
    ) -> HandlerOutcome {
        let code = match resolved.get("params").and_then(|p| p.get("code")).and_then(Value::as_str) {
            Some(c) => c,
            None => return HandlerOutcome::Error("execute_code step is missing params.code".to_string()),
        };
        match expr::eval_to_json(code, sm.context()) {
            Ok(value) => HandlerOutcome::Bind(value),
            Err(e) => HandlerOutcome::Error(e.to_string()),
        }
    }
}

/// `log_message` — resolves `message` and emits it at `params.level`
/// (default INFO). No context mutation.
pub struct LogMessageHandler;

#[async_trait]
impl Handler for LogMessageHandler {
    async fn invoke(
        &self,
        _step: &Step,
        resolved: &Value,
        _sm: &mut StateMachine,
        _deps: &Dependencies,
    ) -> HandlerOutcome {
        let params = resolved.get("params").cloned().unwrap_or(Value::Null);
        let message = params
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let level = params.get("level").and_then(Value::as_str).unwrap_or("INFO");
        match level.to_uppercase().as_str() {
            "DEBUG" => log::debug!("{}", message),
            "WARN" | "WARNING" => log::warn!("{}", message),
            "ERROR" => log::error!("{}", message),
            _ => log::info!("{}", message),
        }
        HandlerOutcome::Ok
    }
}

/// `input/callback_query` — pauses pending an external callback event,
/// unless the awaited value is already present in context (the resume
/// path having already bound it).
pub struct CallbackQueryHandler;

pub const PAUSE_MARKER_CALLBACK: &str = "PAUSED_WAITING_FOR_CALLBACK";

#[async_trait]
impl Handler for CallbackQueryHandler {
    async fn invoke(
        &self,
        _step: &Step,
        resolved: &Value,
        sm: &mut StateMachine,
        _deps: &Dependencies,
    ) -> HandlerOutcome {
        let output_var = match resolved.get("params").and_then(|p| p.get("output_var")).and_then(Value::as_str) {
            Some(v) => v.to_string(),
            None => return HandlerOutcome::Error("input/callback_query is missing params.output_var".to_string()),
        };
        if sm.context().get(&output_var).is_some() {
            return HandlerOutcome::Ok;
        }
        for required in ["chat_id", "user_id", "__current_scenario_id__"] {
            if sm.context().get(required).is_none() {
                return HandlerOutcome::Error(format!(
                    "input/callback_query requires '{}' in context",
                    required
                ));
            }
        }
        HandlerOutcome::Pause(PAUSE_MARKER_CALLBACK.to_string())
    }
}

/// `telegram_send_message` — dispatches through the `MessagingPlugin`.
pub struct TelegramSendMessageHandler;

#[async_trait]
impl Handler for TelegramSendMessageHandler {
    async fn invoke(
        &self,
        _step: &Step,
        resolved: &Value,
        sm: &mut StateMachine,
        deps: &Dependencies,
    ) -> HandlerOutcome {
        let plugin = match &deps.messaging {
            Some(p) => p,
            None => return HandlerOutcome::Error("no messaging plugin configured".to_string()),
        };
        let params = resolved.get("params").cloned().unwrap_or(Value::Null);
        let chat_id = match params.get("chat_id").and_then(Value::as_str) {
            Some(c) => c.to_string(),
            None => return HandlerOutcome::Error("telegram_send_message is missing params.chat_id".to_string()),
        };
        let text = params.get("text").and_then(Value::as_str).unwrap_or_default().to_string();
        let keyboard = params.get("inline_keyboard").cloned();
        match plugin.send_message(&chat_id, &text, keyboard).await {
            Ok(result) => {
                set_path(sm.context_mut(), "message_id_with_buttons", Value::String(result.message_id.clone()));
                set_path(sm.context_mut(), "__last_message_id", Value::String(result.message_id));
                HandlerOutcome::Ok
            }
            Err(e) => HandlerOutcome::Error(e.to_string()),
        }
    }
}

/// `telegram_edit_message` — analogous to send, targeting
/// `params.message_id` or `{message_id_with_buttons}`.
pub struct TelegramEditMessageHandler;

#[async_trait]
impl Handler for TelegramEditMessageHandler {
    async fn invoke(
        &self,
        _step: &Step,
        resolved: &Value,
        sm: &mut StateMachine,
        deps: &Dependencies,
    ) -> HandlerOutcome {
        let plugin = match &deps.messaging {
            Some(p) => p,
            None => return HandlerOutcome::Error("no messaging plugin configured".to_string()),
        };
        let params = resolved.get("params").cloned().unwrap_or(Value::Null);
        let chat_id = match params.get("chat_id").and_then(Value::as_str) {
            Some(c) => c.to_string(),
            None => return HandlerOutcome::Error("telegram_edit_message is missing params.chat_id".to_string()),
        };
        let message_id = params
            .get("message_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| {
                sm.context()
                    .get("message_id_with_buttons")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            });
        let message_id = match message_id {
            Some(m) => m,
            None => return HandlerOutcome::Error("telegram_edit_message has no target message id".to_string()),
        };
        let text = params.get("text").and_then(Value::as_str).unwrap_or_default().to_string();
        let keyboard = params.get("inline_keyboard").cloned();
        match plugin.edit_message(&chat_id, &message_id, &text, keyboard).await {
            Ok(()) => HandlerOutcome::Ok,
            Err(e) => HandlerOutcome::Error(e.to_string()),
        }
    }
}

/// `llm_query` — builds a message list from `params.messages` or
/// `params.system_prompt` + `params.prompt`, invokes the LLM plugin, and
/// binds the full response to `output_var`.
pub struct LlmQueryHandler;

#[async_trait]
impl Handler for LlmQueryHandler {
    async fn invoke(
        &self,
        _step: &Step,
        resolved: &Value,
        _sm: &mut StateMachine,
        deps: &Dependencies,
    ) -> HandlerOutcome {
        let plugin = match &deps.llm {
            Some(p) => p,
            None => return HandlerOutcome::Error("no LLM plugin configured".to_string()),
        };
        let params = resolved.get("params").cloned().unwrap_or(Value::Null);
        let messages = if let Some(messages) = params.get("messages") {
            messages.clone()
        } else {
            let system_prompt = params.get("system_prompt").and_then(Value::as_str).unwrap_or_default();
            let prompt = params.get("prompt").and_then(Value::as_str).unwrap_or_default();
            Value::Array(vec![
                serde_json::json!({"role": "system", "content": system_prompt}),
                serde_json::json!({"role": "user", "content": prompt}),
            ])
        };
        let request = LlmQueryRequest {
            model: params.get("model").and_then(Value::as_str).map(str::to_string),
            messages,
            temperature: params.get("temperature").and_then(Value::as_f64),
            max_tokens: params.get("max_tokens").and_then(Value::as_u64).map(|v| v as u32),
        };
        match plugin.query(request).await {
            Ok(response) => HandlerOutcome::Bind(serde_json::json!({
                "status": response.status,
                "response": response.response,
            })),
            Err(e) => HandlerOutcome::Error(e.to_string()),
        }
    }
}

/// `rag_search` — invokes the RAG plugin and binds the full response to
/// `output_var`.
pub struct RagSearchHandler;

#[async_trait]
impl Handler for RagSearchHandler {
    async fn invoke(
        &self,
        _step: &Step,
        resolved: &Value,
        _sm: &mut StateMachine,
        deps: &Dependencies,
    ) -> HandlerOutcome {
        let plugin = match &deps.rag {
            Some(p) => p,
            None => return HandlerOutcome::Error("no RAG plugin configured".to_string()),
        };
        let params = resolved.get("params").cloned().unwrap_or(Value::Null);
        let query = params.get("query").and_then(Value::as_str).unwrap_or_default();
        let top_k = params.get("top_k").and_then(Value::as_u64).unwrap_or(5) as u32;
        let collection = params.get("collection").and_then(Value::as_str);
        match plugin.search(query, top_k, collection).await {
            Ok(results) => HandlerOutcome::Bind(results),
            Err(e) => HandlerOutcome::Error(e.to_string()),
        }
    }
}

/// Shared shape for the four `mongo_*` storage step tags.
pub enum MongoOp {
    InsertOne,
    FindOne,
    UpdateOne,
    DeleteOne,
}

pub struct MongoHandler(pub MongoOp);

#[async_trait]
impl Handler for MongoHandler {
    async fn invoke(
        &self,
        _step: &Step,
        resolved: &Value,
        _sm: &mut StateMachine,
        deps: &Dependencies,
    ) -> HandlerOutcome {
        let plugin = match &deps.storage {
            Some(p) => p,
            None => return HandlerOutcome::Error("no storage plugin configured".to_string()),
        };
        let params = resolved.get("params").cloned().unwrap_or(Value::Null);
        let collection = params.get("collection").and_then(Value::as_str).unwrap_or_default();
        let filter = params.get("filter").cloned().unwrap_or(Value::Null);
        let result = match &self.0 {
            MongoOp::InsertOne => {
                let document = params.get("document").cloned().unwrap_or(Value::Null);
                plugin.insert_one(collection, document).await
            }
            MongoOp::FindOne => plugin.find_one(collection, filter).await,
            MongoOp::UpdateOne => {
                let update = params.get("update").cloned().unwrap_or(Value::Null);
                plugin.update_one(collection, filter, update).await
            }
            MongoOp::DeleteOne => plugin.delete_one(collection, filter).await,
        };
        match result {
            Ok(value) => HandlerOutcome::Bind(value),
            Err(e) => HandlerOutcome::Error(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenarioflow::resolver::resolve;
    use serde_json::json;

    fn noop_step() -> Step {
        Step {
            id: "s".to_string(),
            type_tag: "action".to_string(),
            params: json!({}),
            next_step: None,
            branches: None,
            condition: None,
        }
    }

    #[tokio::test]
    async fn update_context_writes_nested_path() {
        let step = noop_step();
        let context = json!({});
        let mut sm = StateMachine::new("s", vec![step.clone()], context);
        let resolved = json!({"params": {"updates": {"a.b": "value"}}});
        let deps = Dependencies::new();
        let outcome = UpdateContextHandler.invoke(&step, &resolved, &mut sm, &deps).await;
        assert!(matches!(outcome, HandlerOutcome::Ok));
        assert_eq!(sm.context(), &json!({"a": {"b": "value"}}));
    }

    #[tokio::test]
    async fn update_context_with_empty_updates_leaves_context_unchanged() {
        let step = noop_step();
        let context = json!({"existing": 1});
        let mut sm = StateMachine::new("s", vec![step.clone()], context.clone());
        let resolved = json!({"params": {"updates": {}}});
        let deps = Dependencies::new();
        UpdateContextHandler.invoke(&step, &resolved, &mut sm, &deps).await;
        assert_eq!(sm.context(), &context);
    }

    #[tokio::test]
    async fn callback_query_pauses_when_output_var_unset() {
        let step = noop_step();
        let context = json!({"chat_id": "1", "user_id": "2", "__current_scenario_id__": "s"});
        let mut sm = StateMachine::new("s", vec![step.clone()], context.clone());
        let resolved = resolve(
            &json!({"params": {"output_var": "choice"}}),
            &context,
        );
        let deps = Dependencies::new();
        let outcome = CallbackQueryHandler.invoke(&step, &resolved, &mut sm, &deps).await;
        assert!(matches!(outcome, HandlerOutcome::Pause(_)));
    }

    #[tokio::test]
    async fn callback_query_succeeds_when_output_var_already_bound() {
        let step = noop_step();
        let context = json!({"choice": "button_a"});
        let mut sm = StateMachine::new("s", vec![step.clone()], context.clone());
        let resolved = json!({"params": {"output_var": "choice"}});
        let deps = Dependencies::new();
        let outcome = CallbackQueryHandler.invoke(&step, &resolved, &mut sm, &deps).await;
        assert!(matches!(outcome, HandlerOutcome::Ok));
    }

    #[tokio::test]
    async fn execute_code_binds_computed_value() {
        let step = noop_step();
        let context = json!({"a": 2, "b": 3});
        let mut sm = StateMachine::new("s", vec![step.clone()], context.clone());
        let resolved = json!({"params": {"code": "a * b"}});
        let deps = Dependencies::new();
        let outcome = ExecuteCodeHandler.invoke(&step, &resolved, &mut sm, &deps).await;
        match outcome {
            HandlerOutcome::Bind(value) => assert_eq!(value, json!(6)),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
