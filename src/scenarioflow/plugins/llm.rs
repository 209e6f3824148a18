//! LLM capability contract (`llm_query`).

use async_trait::async_trait;
use serde_json::Value;

use crate::scenarioflow::error::HandlerError;

#[derive(Debug, Clone, Default)]
pub struct LlmQueryRequest {
    pub model: Option<String>,
    pub messages: Value,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct LlmQueryResponse {
    pub status: String,
    pub response: Value,
}

#[async_trait]
pub trait LlmPlugin: Send + Sync {
    async fn query(&self, request: LlmQueryRequest) -> Result<LlmQueryResponse, HandlerError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoLlmPlugin;

    #[async_trait]
    impl LlmPlugin for EchoLlmPlugin {
        async fn query(&self, request: LlmQueryRequest) -> Result<LlmQueryResponse, HandlerError> {
            Ok(LlmQueryResponse {
                status: "ok".to_string(),
                response: json!({"echo": request.messages}),
            })
        }
    }

    #[tokio::test]
    async fn query_returns_a_status_and_response() {
        let plugin = EchoLlmPlugin;
        let result = plugin
            .query(LlmQueryRequest {
                messages: json!([{"role": "user", "content": "hi"}]),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(result.status, "ok");
    }
}
