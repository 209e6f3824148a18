//! Pluggable Step-Handler Registry: a map from step-type tag to handler,
//! populated by the engine's built-in handlers and by capability plugins.
//!
//! Per `SPEC_FULL.md` §9 (REDESIGN FLAGS), handler signatures are unified
//! behind a single `Handler` trait returning a `HandlerOutcome` sum type,
//! replacing the source's overloaded `None` / pause-string / bound-value
//! return convention.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::scenarioflow::model::Step;
use crate::scenarioflow::plugins::Dependencies;
use crate::scenarioflow::state_machine::StateMachine;

/// The result of dispatching one step to its handler.
#[derive(Debug, Clone)]
pub enum HandlerOutcome {
    /// Success; the handler has already mutated the live context in place
    /// (if it needed to).
    Ok,
    /// The scenario must suspend pending an external event. Carries the
    /// pause marker string (e.g. `"PAUSED_WAITING_FOR_CALLBACK"`).
    Pause(String),
    /// Success, with a value to be bound to `step.params.output_var`.
    Bind(Value),
    /// Failure. The Executor records this under `__step_error__` and
    /// terminates the loop.
    Error(String),
}

/// A step-type handler. Given the resolved step view (template
/// placeholders already substituted against the live context) and the
/// live state machine, produces a `HandlerOutcome`.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn invoke(
        &self,
        step: &Step,
        resolved_params: &Value,
        state_machine: &mut StateMachine,
        deps: &Dependencies,
    ) -> HandlerOutcome;
}

/// Maps step-type tags to their handler. Populated at startup; read-only
/// thereafter, consistent with the concurrency model in `SPEC_FULL.md`
/// §5 (no lock needed once construction is complete).
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        HandlerRegistry {
            handlers: HashMap::new(),
        }
    }

    /// Registers `handler` under `tag`. A duplicate registration replaces
    /// the previous entry and logs a warning.
    pub fn register(&mut self, tag: impl Into<String>, handler: Arc<dyn Handler>) {
        let tag = tag.into();
        if self.handlers.insert(tag.clone(), handler).is_some() {
            log::warn!("handler for step type '{}' replaced by a later registration", tag);
        }
    }

    pub fn get(&self, tag: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(tag).cloned()
    }

    pub fn is_registered(&self, tag: &str) -> bool {
        self.handlers.contains_key(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopHandler;

    #[async_trait]
    impl Handler for NoopHandler {
        async fn invoke(
            &self,
            _step: &Step,
            _resolved_params: &Value,
            _state_machine: &mut StateMachine,
            _deps: &Dependencies,
        ) -> HandlerOutcome {
            HandlerOutcome::Ok
        }
    }

    #[test]
    fn duplicate_registration_replaces_previous_entry() {
        let mut registry = HandlerRegistry::new();
        registry.register("log_message", Arc::new(NoopHandler));
        assert!(registry.is_registered("log_message"));
        registry.register("log_message", Arc::new(NoopHandler));
        assert!(registry.is_registered("log_message"));
    }

    #[test]
    fn unregistered_tag_returns_none() {
        let registry = HandlerRegistry::new();
        assert!(registry.get("unknown").is_none());
    }
}
