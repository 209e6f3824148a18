//! Plugin contracts consumed by the Scenario Executor: messaging, LLM,
//! RAG, storage, and scheduling capabilities, plus the two repository
//! contracts. Concrete adapters (a real Telegram bot, a real MongoDB
//! client, a real LLM vendor SDK) are out of scope for this crate per
//! `spec.md` §1 — only the trait contracts and in-memory test doubles
//! live here, following the `ClientWrapper` / `ToolProtocol` pattern of
//! putting the contract in a leaf module with no back-edges into the
//! executor.

pub mod llm;
pub mod messaging;
pub mod rag;
pub mod repository;
pub mod scheduling;
pub mod storage;

pub use llm::LlmPlugin;
pub use messaging::MessagingPlugin;
pub use rag::RagPlugin;
pub use repository::{AgentRepository, ScenarioRepository};
pub use scheduling::SchedulingPlugin;
pub use storage::StoragePlugin;

use std::sync::Arc;

/// Replaces the source's module-level plugin singletons with an explicit
/// struct threaded into the Executor's constructor (`SPEC_FULL.md` §9,
/// REDESIGN FLAGS). Each capability is optional: a scenario that never
/// uses `llm_query` steps doesn't need an `LlmPlugin`.
#[derive(Clone, Default)]
pub struct Dependencies {
    pub messaging: Option<Arc<dyn MessagingPlugin>>,
    pub llm: Option<Arc<dyn LlmPlugin>>,
    pub rag: Option<Arc<dyn RagPlugin>>,
    pub storage: Option<Arc<dyn StoragePlugin>>,
    pub scheduling: Option<Arc<dyn SchedulingPlugin>>,
    pub scenario_repository: Option<Arc<dyn ScenarioRepository>>,
    pub agent_repository: Option<Arc<dyn AgentRepository>>,
}

impl Dependencies {
    pub fn new() -> Self {
        Dependencies::default()
    }

    pub fn with_messaging(mut self, plugin: Arc<dyn MessagingPlugin>) -> Self {
        self.messaging = Some(plugin);
        self
    }

    pub fn with_llm(mut self, plugin: Arc<dyn LlmPlugin>) -> Self {
        self.llm = Some(plugin);
        self
    }

    pub fn with_rag(mut self, plugin: Arc<dyn RagPlugin>) -> Self {
        self.rag = Some(plugin);
        self
    }

    pub fn with_storage(mut self, plugin: Arc<dyn StoragePlugin>) -> Self {
        self.storage = Some(plugin);
        self
    }

    pub fn with_scheduling(mut self, plugin: Arc<dyn SchedulingPlugin>) -> Self {
        self.scheduling = Some(plugin);
        self
    }

    pub fn with_scenario_repository(mut self, repo: Arc<dyn ScenarioRepository>) -> Self {
        self.scenario_repository = Some(repo);
        self
    }

    pub fn with_agent_repository(mut self, repo: Arc<dyn AgentRepository>) -> Self {
        self.agent_repository = Some(repo);
        self
    }
}
