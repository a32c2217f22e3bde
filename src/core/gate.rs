//! 会话门控：空闲时只放行唤醒词，唤醒后放行下一句话
//!
//! 门控运行在生产者一侧，只读订阅 ConversationState，不会修改它。

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::core::{ConversationState, Task, TaskSender};

#[derive(Debug, Clone)]
pub struct ConversationGate {
    agent_name: String,
    compact_name: String,
}

fn strip_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

impl ConversationGate {
    pub fn new(agent_name: impl Into<String>) -> Self {
        let agent_name = agent_name.into();
        let compact_name = strip_whitespace(&agent_name);
        Self {
            agent_name,
            compact_name,
        }
    }

    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    /// 名字原样出现，或去掉空白后出现（语音转写常在词间插空格）
    pub fn is_addressed_to_agent(&self, text: &str) -> bool {
        if self.compact_name.is_empty() {
            return false;
        }
        text.contains(&self.agent_name) || strip_whitespace(text).contains(&self.compact_name)
    }

    pub fn on_utterance(&self, state: ConversationState, text: &str) -> Option<Task> {
        let text = text.trim();
        tracing::info!(state = ?state, text = %text, "Heard utterance");
        if text.is_empty() {
            return None;
        }
        match state {
            ConversationState::Idle if self.is_addressed_to_agent(text) => Some(Task::WakeWordHeard {
                text: text.to_string(),
            }),
            ConversationState::Idle => None,
            ConversationState::AwaitingInstruction => Some(Task::Utterance {
                text: text.to_string(),
            }),
        }
    }
}

/// 转写泵：从语音输入通道取文本，经门控后入队，直到取消或输入结束
pub async fn run_speech_gate(
    gate: ConversationGate,
    mut transcripts: mpsc::Receiver<String>,
    state: watch::Receiver<ConversationState>,
    sender: TaskSender,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            next = transcripts.recv() => {
                let Some(text) = next else { break };
                let current = *state.borrow();
                if let Some(task) = gate.on_utterance(current, &text) {
                    if !sender.enqueue(task) {
                        break;
                    }
                }
            }
        }
    }
    tracing::info!("Speech gate stopped");
}
