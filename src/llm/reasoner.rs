//! 推理协作方：把一句话（用户语音或本地系统消息）变成一个 Action
//!
//! LlmReasoner 维护 system prompt（基础说明 + 各模块能力描述）与有界对话历史，
//! 任何 LLM 错误或回复解析失败都转成 MessageOnly，调用方永远拿到一个可执行的动作。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::Action;
use crate::llm::LlmClient;
use crate::memory::{ConversationMemory, Message, Role};

pub const DEFAULT_HISTORY_MESSAGES: usize = 10;

const SYSTEM_NOTE_PREFIX: &str = "[本地系统] ";

const BASE_PROMPT: &str = "You are a home assistant living in this house.\n\
Messages come either from the human user's voice or from the local agent system (prefixed with [本地系统]).\n\
Always answer with one raw, single-line JSON object:\n\
{\"message\": \"what to say to the user, empty when answering the local system\", \"action\": \"an action name from below\", \"action_params\": {}}\n\
The user speaks Chinese and your message must be Chinese as well.\n\
The user's words come from speech recognition and may contain mistakes, guess the intent as best you can.\n\
Available actions:\n\n\
Action: MessageOnly\n\
description: the message is played to the user and nothing else happens. If you do not understand, say so. Never return an empty message with MessageOnly.\n\
parameters:\n\
- is_question: true if you asked the user something and expect an answer right away (optional)\n";

/// 消息来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    User,
    /// 本地合成的动作回写进历史，让 LLM 知道发生过什么
    AssistantEcho,
    System,
}

#[async_trait]
pub trait Reasoner: Send + Sync {
    /// 用最新的能力描述重建 system prompt
    fn generate_capabilities(&mut self, capabilities: &str);

    async fn converse(&mut self, text: &str, origin: Origin) -> Action;

    /// 只记入历史，不调用 LLM
    fn remember(&mut self, text: &str, origin: Origin);

    fn history(&self) -> Vec<Message>;
}

pub struct LlmReasoner {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
    history: ConversationMemory,
    request_timeout: Duration,
}

impl LlmReasoner {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            system_prompt: BASE_PROMPT.to_string(),
            history: ConversationMemory::new(DEFAULT_HISTORY_MESSAGES),
            request_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_history_messages(mut self, max_messages: usize) -> Self {
        self.history = ConversationMemory::new(max_messages);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn to_message(text: &str, origin: Origin) -> Message {
        match origin {
            Origin::User => Message::user(text),
            Origin::AssistantEcho => Message::assistant(text),
            Origin::System => Message::user(format!("{SYSTEM_NOTE_PREFIX}{text}")),
        }
    }

    async fn ask(&self) -> Result<String, String> {
        let mut messages = Vec::with_capacity(self.history.len() + 1);
        messages.push(Message::system(self.system_prompt.clone()));
        messages.extend_from_slice(self.history.messages());
        match tokio::time::timeout(self.request_timeout, self.llm.complete(&messages)).await {
            Ok(result) => result,
            Err(_) => Err(format!("request timed out after {:?}", self.request_timeout)),
        }
    }
}

#[async_trait]
impl Reasoner for LlmReasoner {
    fn generate_capabilities(&mut self, capabilities: &str) {
        self.system_prompt = format!("{BASE_PROMPT}{capabilities}");
        tracing::debug!(prompt = %self.system_prompt, "System prompt regenerated");
    }

    async fn converse(&mut self, text: &str, origin: Origin) -> Action {
        tracing::info!(origin = ?origin, text = %text, "Send to AI model");
        self.history.push(Self::to_message(text, origin));

        let reply = match self.ask().await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!("LLM request failed: {}", e);
                return Action::message_only("抱歉，我现在无法连接到智能服务。", false);
            }
        };
        tracing::info!(reply = %reply, "Response from AI model");
        self.history.push(Message::assistant(reply.clone()));
        let (prompt, completion, total) = self.llm.token_usage();
        tracing::debug!(prompt, completion, total, "Token usage");

        match Action::parse_reply(&reply) {
            Ok(action) => action,
            Err(e) => {
                tracing::error!("Failed to parse AI response: {}", e);
                Action::message_only(format!("Invalid response from AI model. {e}"), false)
            }
        }
    }

    fn remember(&mut self, text: &str, origin: Origin) {
        self.history.push(Self::to_message(text, origin));
    }

    fn history(&self) -> Vec<Message> {
        self.history.messages().to_vec()
    }
}
