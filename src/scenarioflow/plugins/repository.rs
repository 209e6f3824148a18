//! Repository contracts: lookups the Executor needs for `execute_sub_scenario`
//! and top-level invocation, but does not implement itself.

use async_trait::async_trait;

use crate::scenarioflow::model::{Agent, Scenario};

#[async_trait]
pub trait ScenarioRepository: Send + Sync {
    async fn get_scenario_by_id(&self, id: &str) -> Option<Scenario>;
}

#[async_trait]
pub trait AgentRepository: Send + Sync {
    async fn get_agent_by_id(&self, id: &str) -> Option<Agent>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    struct InMemoryScenarioRepository {
        scenarios: HashMap<String, Scenario>,
    }

    #[async_trait]
    impl ScenarioRepository for InMemoryScenarioRepository {
        async fn get_scenario_by_id(&self, id: &str) -> Option<Scenario> {
            self.scenarios.get(id).cloned()
        }
    }

    #[tokio::test]
    async fn lookup_returns_stored_scenario() {
        let scenario = Scenario {
            scenario_id: "s1".to_string(),
            name: None,
            version: None,
            description: None,
            initial_context: json!({}),
            steps: vec![],
            required_plugins: vec![],
        };
        let mut scenarios = HashMap::new();
        scenarios.insert("s1".to_string(), scenario);
        let repo = InMemoryScenarioRepository { scenarios };
        assert!(repo.get_scenario_by_id("s1").await.is_some());
        assert!(repo.get_scenario_by_id("missing").await.is_none());
    }
}
