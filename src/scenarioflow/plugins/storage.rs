//! Storage capability contract (`mongo_insert_one`, `mongo_find_one`,
//! `mongo_update_one`, `mongo_delete_one`). Named after the source's
//! Mongo-flavored step tags, but the contract itself is storage-agnostic:
//! collection name, filter, and document are all opaque JSON.

use async_trait::async_trait;
use serde_json::Value;

use crate::scenarioflow::error::HandlerError;

#[async_trait]
pub trait StoragePlugin: Send + Sync {
    async fn insert_one(&self, collection: &str, document: Value) -> Result<Value, HandlerError>;
    async fn find_one(&self, collection: &str, filter: Value) -> Result<Value, HandlerError>;
    async fn update_one(
        &self,
        collection: &str,
        filter: Value,
        update: Value,
    ) -> Result<Value, HandlerError>;
    async fn delete_one(&self, collection: &str, filter: Value) -> Result<Value, HandlerError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct InMemoryStoragePlugin {
        docs: Mutex<Vec<Value>>,
    }

    #[async_trait]
    impl StoragePlugin for InMemoryStoragePlugin {
        async fn insert_one(&self, _collection: &str, document: Value) -> Result<Value, HandlerError> {
            self.docs.lock().unwrap().push(document);
            Ok(json!({"inserted_id": self.docs.lock().unwrap().len() - 1}))
        }

        async fn find_one(&self, _collection: &str, _filter: Value) -> Result<Value, HandlerError> {
            Ok(self.docs.lock().unwrap().first().cloned().unwrap_or(Value::Null))
        }

        async fn update_one(
            &self,
            _collection: &str,
            _filter: Value,
            _update: Value,
        ) -> Result<Value, HandlerError> {
            Ok(json!({"modified_count": 1}))
        }

        async fn delete_one(&self, _collection: &str, _filter: Value) -> Result<Value, HandlerError> {
            Ok(json!({"deleted_count": 1}))
        }
    }

    #[tokio::test]
    async fn insert_then_find_round_trips() {
        let plugin = InMemoryStoragePlugin::default();
        plugin
            .insert_one("users", json!({"name": "kitty"}))
            .await
            .unwrap();
        let found = plugin.find_one("users", json!({})).await.unwrap();
        assert_eq!(found, json!({"name": "kitty"}));
    }
}
