//! Error kinds for the scenario engine, the scheduler, and the plugin
//! contracts. Each kind is a small enum implementing `Display` and
//! `std::error::Error` directly, following the same pattern as
//! `OrchestrationError` and `ToolError` elsewhere in this crate — no
//! `thiserror` dependency is introduced.

use std::fmt;

/// Raised synchronously by scenario loading, `add_task`, and other
/// schema-shaped input validation. Recovered at the API boundary as 4xx.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    MissingField(String),
    InvalidValue { field: String, reason: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::MissingField(field) => {
                write!(f, "missing required field: {}", field)
            }
            ValidationError::InvalidValue { field, reason } => {
                write!(f, "invalid value for field '{}': {}", field, reason)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// A handler-level failure. Handlers never panic or propagate exceptions;
/// they record this as `__step_error__` in the execution context instead.
/// `MissingHandlerError` is represented as the `NoHandler` variant, per
/// spec.md §7 ("treated as HandlerError with a specific message").
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerError {
    NoHandler { step_type: String },
    Plugin(String),
    Failed(String),
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerError::NoHandler { step_type } => {
                write!(f, "no handler registered for step type '{}'", step_type)
            }
            HandlerError::Plugin(reason) => write!(f, "plugin error: {}", reason),
            HandlerError::Failed(reason) => write!(f, "{}", reason),
        }
    }
}

impl std::error::Error for HandlerError {}

/// A dispatch failure from the Task Scheduler. Logged; the owning task
/// remains enabled (unless its trigger is `once`) and is retried on the
/// next matching tick window.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerDispatchError {
    pub task_id: String,
    pub reason: String,
}

impl fmt::Display for SchedulerDispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dispatch failed for task {}: {}",
            self.task_id, self.reason
        )
    }
}

impl std::error::Error for SchedulerDispatchError {}

/// Returned as a failure result from `resume_scenario`, never raised: a
/// missing paused record or waiting record for the given instance id.
#[derive(Debug, Clone, PartialEq)]
pub enum ResumeError {
    NoPausedRecord { instance_id: String },
    NoWaitingRecord { instance_id: String },
    AlreadyResolved { instance_id: String },
}

impl fmt::Display for ResumeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResumeError::NoPausedRecord { instance_id } => {
                write!(f, "no paused scenario for instance {}", instance_id)
            }
            ResumeError::NoWaitingRecord { instance_id } => {
                write!(f, "no waiting record for instance {}", instance_id)
            }
            ResumeError::AlreadyResolved { instance_id } => write!(
                f,
                "instance {} has already been resumed; ignoring duplicate event",
                instance_id
            ),
        }
    }
}

impl std::error::Error for ResumeError {}
