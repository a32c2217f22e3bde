//! 记忆层：与 LLM 协作方的短期对话历史

pub mod conversation;

pub use conversation::{ConversationMemory, Message, Role};
