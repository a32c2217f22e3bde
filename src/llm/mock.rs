//! Mock LLM 客户端（用于测试与无 API Key 的本地运行）
//!
//! 取最后一条 User 消息，回显为 MessageOnly 动作，保证整条语音链路可以离线跑通。

use async_trait::async_trait;

use crate::llm::LlmClient;
use crate::memory::{Message, Role};

#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");

        Ok(serde_json::json!({
            "message": format!("你说的是：{last_user}"),
            "action": "MessageOnly",
        })
        .to_string())
    }
}
