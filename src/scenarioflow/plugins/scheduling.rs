//! Scheduling capability contract. Invoked from `schedule_scenario_run`
//! steps to enqueue a delayed re-invocation of the Executor, and by the
//! external HTTP API's `add_task` endpoint (out of scope here, modeled
//! only as the contract).

use async_trait::async_trait;
use uuid::Uuid;

use crate::scenarioflow::error::{HandlerError, ValidationError};
use crate::scenarioflow::model::{ScheduledTask, TriggerType};
use crate::scenarioflow::scheduler::trigger::{parse_datetime, parse_hhmm};

#[async_trait]
pub trait SchedulingPlugin: Send + Sync {
    async fn add_task(&self, task: ScheduledTask) -> Result<Uuid, HandlerError>;
}

/// Validates a scheduled task before it's handed to a `SchedulingPlugin`
/// or the in-process `SchedulerService`, per `spec.md` §4E's Validation
/// rules.
pub fn validate_task(task: &ScheduledTask) -> Result<(), ValidationError> {
    if task.user_id.trim().is_empty() {
        return Err(ValidationError::MissingField("user_id".to_string()));
    }
    if let Some(obj) = task.trigger_config.as_object() {
        if obj.is_empty() {
            return Err(ValidationError::MissingField("trigger_config".to_string()));
        }
    } else {
        return Err(ValidationError::InvalidValue {
            field: "trigger_config".to_string(),
            reason: "must be an object".to_string(),
        });
    }
    if task.action_config.as_object().is_none() {
        return Err(ValidationError::InvalidValue {
            field: "action_config".to_string(),
            reason: "must be an object".to_string(),
        });
    }
    if let Some(interval) = task.trigger_config.get("interval_minutes") {
        match interval.as_f64() {
            Some(n) if n > 0.0 => {}
            _ => {
                return Err(ValidationError::InvalidValue {
                    field: "interval_minutes".to_string(),
                    reason: "must be positive".to_string(),
                })
            }
        }
    }

    match task.trigger_type {
        TriggerType::Once => {
            if parse_datetime(task.trigger_config.get("datetime")).is_none() {
                return Err(ValidationError::InvalidValue {
                    field: "datetime".to_string(),
                    reason: "must be a parsable RFC3339 or naive ISO 8601 datetime".to_string(),
                });
            }
        }
        TriggerType::Daily | TriggerType::Weekly | TriggerType::Monthly => {
            let time_parses = task
                .trigger_config
                .get("time")
                .and_then(|v| v.as_str())
                .and_then(parse_hhmm)
                .is_some();
            if !time_parses {
                return Err(ValidationError::InvalidValue {
                    field: "time".to_string(),
                    reason: "must be a parsable HH:MM time".to_string(),
                });
            }
        }
        TriggerType::Interval => {
            if task.trigger_config.get("start_time").is_some()
                && parse_datetime(task.trigger_config.get("start_time")).is_none()
            {
                return Err(ValidationError::InvalidValue {
                    field: "start_time".to_string(),
                    reason: "must be a parsable RFC3339 or naive ISO 8601 datetime".to_string(),
                });
            }
        }
    }

    Ok(())
}
