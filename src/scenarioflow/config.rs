//! Ambient engine configuration.
//!
//! This struct is intentionally minimal, following the same philosophy as
//! `CloudLLMConfig`: users construct it however they want (literals, env
//! vars, their own config crate upstream) and hand it to
//! [`crate::scenarioflow::executor::ScenarioExecutor`]. No TOML, YAML, or
//! other config-file parsing dependency is introduced here.

use std::time::Duration;

/// Tunables that are genuinely open questions in the source behavior
/// (see `SPEC_FULL.md` §9) rather than fixed by the spec.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long a paused scenario may sit in memory before
    /// [`crate::scenarioflow::executor::ScenarioExecutor::sweep_expired_pauses`]
    /// considers it abandoned. The source has no TTL at all; this crate
    /// adds one rather than leaking paused state forever.
    pub paused_scenario_ttl: Duration,
    /// Period of the scheduler's tick loop. Fixed at 60s by the spec, but
    /// exposed for tests that don't want to wait a full minute.
    pub scheduler_tick_period: Duration,
    /// Base URL used to build the `run_agent` dispatch endpoint
    /// (`{base_url}/agent-actions/{agent_id}/execute`).
    pub api_base_url: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            paused_scenario_ttl: Duration::from_secs(24 * 60 * 60),
            scheduler_tick_period: Duration::from_secs(60),
            api_base_url: std::env::var("SCENARIOFLOW_API_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),
        }
    }
}
