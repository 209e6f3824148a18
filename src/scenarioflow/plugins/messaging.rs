//! Messaging capability contract (`telegram_send_message`,
//! `telegram_edit_message`). A single plugin instance is shared across
//! all concurrent scenario instances and must be safe for concurrent use
//! (`SPEC_FULL.md` §5).

use async_trait::async_trait;
use serde_json::Value;

use crate::scenarioflow::error::HandlerError;

#[derive(Debug, Clone)]
pub struct SendMessageResult {
    pub message_id: String,
}

#[async_trait]
pub trait MessagingPlugin: Send + Sync {
    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        inline_keyboard: Option<Value>,
    ) -> Result<SendMessageResult, HandlerError>;

    async fn edit_message(
        &self,
        chat_id: &str,
        message_id: &str,
        text: &str,
        inline_keyboard: Option<Value>,
    ) -> Result<(), HandlerError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockMessagingPlugin {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl MessagingPlugin for MockMessagingPlugin {
        async fn send_message(
            &self,
            chat_id: &str,
            text: &str,
            _inline_keyboard: Option<Value>,
        ) -> Result<SendMessageResult, HandlerError> {
            self.sent
                .lock()
                .unwrap()
                .push((chat_id.to_string(), text.to_string()));
            Ok(SendMessageResult {
                message_id: "1".to_string(),
            })
        }

        async fn edit_message(
            &self,
            _chat_id: &str,
            _message_id: &str,
            _text: &str,
            _inline_keyboard: Option<Value>,
        ) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn send_message_returns_a_message_id() {
        let plugin = MockMessagingPlugin::default();
        let result = plugin.send_message("123", "hi", None).await.unwrap();
        assert_eq!(result.message_id, "1");
        assert_eq!(plugin.sent.lock().unwrap().len(), 1);
    }
}
