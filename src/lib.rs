// src/lib.rs

pub mod scenarioflow;

pub use scenarioflow::{
    builtin_registry, resolve, Agent, Branch, BranchSpec, Dependencies, EngineConfig,
    ExecutionOutcome, Handler, HandlerError, HandlerOutcome, HandlerRegistry, LegacyBranches,
    NextStep, PausedScenarioRecord, ResultEnvelope, ResumeError, Scenario, ScenarioExecutor,
    ScheduledTask, SchedulerDispatchError, SchedulerService, Step, StateMachine,
    StateMachineSnapshot, ValidationError, WaitingRecord, WaitingStatus,
};
