//! Retrieval-augmented-generation capability contract (`rag_search`).

use async_trait::async_trait;
use serde_json::Value;

use crate::scenarioflow::error::HandlerError;

#[async_trait]
pub trait RagPlugin: Send + Sync {
    async fn search(
        &self,
        query: &str,
        top_k: u32,
        collection: Option<&str>,
    ) -> Result<Value, HandlerError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EmptyRagPlugin;

    #[async_trait]
    impl RagPlugin for EmptyRagPlugin {
        async fn search(
            &self,
            _query: &str,
            _top_k: u32,
            _collection: Option<&str>,
        ) -> Result<Value, HandlerError> {
            Ok(json!([]))
        }
    }

    #[tokio::test]
    async fn search_returns_a_document_list() {
        let plugin = EmptyRagPlugin;
        let result = plugin.search("hello", 3, None).await.unwrap();
        assert!(result.is_array());
    }
}
