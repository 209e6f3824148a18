//! Data model shared by the Context Resolver, State Machine, Executor, and
//! Scheduler: `Scenario`, `Step`, `Agent`, `ScheduledTask`, and the
//! engine-local `WaitingRecord` / `PausedScenarioRecord`.
//!
//! The context/parameter value type is `serde_json::Value` rather than a
//! hand-rolled recursive enum — it already is the tagged recursive value
//! (`Null | Bool | Number | String | Array | Object`) this model needs,
//! and it's what the rest of this crate's JSON-shaped payloads
//! (`ToolResult::output`, `ToolParameter::default`) already use.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// A full scenario document. Immutable during execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub scenario_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_object")]
    pub initial_context: Value,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub required_plugins: Vec<String>,
}

fn default_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Explicit `next_step`: either a step id or an integer index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum NextStep {
    Id(String),
    Index(usize),
}

/// One entry of the new-format `branch` step: `(condition_expr, next_step_id)`.
/// `condition` of `"default"` is an unconditional fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    pub condition: String,
    pub next_step: String,
    #[serde(default)]
    pub label: Option<String>,
}

/// The legacy `condition` + `branches: {"true": idx, "false": idx}` shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyBranches {
    #[serde(rename = "true")]
    pub on_true: Option<usize>,
    #[serde(rename = "false")]
    pub on_false: Option<usize>,
}

/// A `branch` step's branch table may be expressed in either the new
/// ordered-list format or the legacy true/false index format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BranchSpec {
    List(Vec<Branch>),
    Legacy(LegacyBranches),
}

/// One step within a scenario. `type_tag` selects the handler; `params`
/// carries handler-specific, template-resolvable configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    #[serde(rename = "type")]
    pub type_tag: String,
    #[serde(default = "default_object")]
    pub params: Value,
    #[serde(default)]
    pub next_step: Option<NextStep>,
    #[serde(default)]
    pub branches: Option<BranchSpec>,
    #[serde(default)]
    pub condition: Option<String>,
}

impl Step {
    pub fn params_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }
}

/// Agent configuration: default scenario, plugin set, and context seed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    #[serde(default)]
    pub scenario_id: Option<String>,
    #[serde(default)]
    pub plugins: Vec<String>,
    #[serde(default = "default_object")]
    pub settings: Value,
    #[serde(default = "default_object")]
    pub initial_context: Value,
    #[serde(default)]
    pub description: Option<String>,
}

impl Agent {
    pub fn default_telegram_chat_id(&self) -> Option<&str> {
        self.settings.get("default_telegram_chat_id")?.as_str()
    }
}

/// Who is waiting on what external event, keyed by instance id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitingRecord {
    pub message_id: Option<String>,
    pub output_var: String,
    pub expected_pattern: Option<String>,
    pub scenario_id: String,
    pub step_id: String,
    pub chat_id: Option<String>,
    pub user_id: Option<String>,
    pub status: WaitingStatus,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitingStatus {
    Pending,
    Resolved,
}

/// A snapshot of a paused execution, keyed by instance id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PausedScenarioRecord {
    pub scenario: Scenario,
    pub agent_id: String,
    pub state: crate::scenarioflow::state_machine::StateMachineSnapshot,
    pub last_step_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Once,
    Daily,
    Weekly,
    Monthly,
    Interval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    RunAgent,
    SendNotification,
    ApiCall,
}

/// A persisted scheduled task: trigger predicate + dispatch action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: Uuid,
    pub user_id: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub trigger_type: TriggerType,
    pub trigger_config: Value,
    pub action_type: ActionType,
    pub action_config: Value,
    #[serde(default)]
    pub last_executed_at: Option<DateTime<Utc>>,
    /// Last dispatch failure, kept for operator visibility. Not named in
    /// spec.md's data model; present in the original scheduler's task
    /// records (`app/utils/scheduler.py`) and cheap to carry forward.
    #[serde(default)]
    pub last_error: Option<String>,
}

/// Builds the `{scenario_id}_{user_id}_{chat_id}_{timestamp}` instance id.
pub fn make_instance_id(scenario_id: &str, user_id: &str, chat_id: &str, timestamp_secs: i64) -> String {
    format!("{}_{}_{}_{}", scenario_id, user_id, chat_id, timestamp_secs)
}

/// Reserved context keys the Executor itself writes and strips.
pub mod reserved_keys {
    pub const CURRENT_SCENARIO_ID: &str = "__current_scenario_id__";
    pub const CURRENT_AGENT_ID: &str = "__current_agent_id__";
    pub const SCENARIO_INSTANCE_ID: &str = "__scenario_instance_id__";
    pub const STEP_ERROR: &str = "__step_error__";
    pub const LAST_MESSAGE_ID: &str = "__last_message_id";
}

/// Convenience helpers over a `serde_json::Value` acting as a Context.
pub trait ContextExt {
    fn as_object_mut_checked(&mut self) -> Option<&mut serde_json::Map<String, Value>>;
    fn merge_in_place(&mut self, other: &Value);
}

impl ContextExt for Value {
    fn as_object_mut_checked(&mut self) -> Option<&mut serde_json::Map<String, Value>> {
        self.as_object_mut()
    }

    /// Shallow top-level merge: keys in `other` overwrite keys in `self`.
    fn merge_in_place(&mut self, other: &Value) {
        if let (Value::Object(base), Value::Object(incoming)) = (self, other) {
            for (k, v) in incoming {
                base.insert(k.clone(), v.clone());
            }
        }
    }
}

/// Converts a flat or nested `Value` into a display string the way the
/// template substitution step needs (`str(value)` in the source).
pub fn value_to_display_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "None".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Strips reserved `__`-prefixed keys from a context before it's returned
/// to callers in a result envelope (spec.md §7, "Internal keys ... are
/// stripped").
pub fn strip_reserved(context: &Value) -> Value {
    match context {
        Value::Object(map) => {
            let cleaned: HashMap<String, Value> = map
                .iter()
                .filter(|(k, _)| !k.starts_with("__"))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            serde_json::to_value(cleaned).unwrap_or_else(|_| default_object())
        }
        other => other.clone(),
    }
}
