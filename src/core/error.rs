//! 错误类型
//!
//! 所有库内错误统一为 HearthError；编排循环只记录错误、从不向上传播，
//! 单个任务失败不影响后续任务。

use thiserror::Error;

/// 运行过程中可能出现的错误（设备传输、协作方响应、定时任务存储、桥接协议等）
#[derive(Error, Debug)]
pub enum HearthError {
    #[error("Device transport error ({alias}): {message}")]
    DeviceTransport { alias: String, message: String },

    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    /// 目标状态不在该设备类型支持的状态集合内
    #[error("Device {alias} does not support status '{status}'")]
    UnsupportedStatus { alias: String, status: String },

    /// 协作方返回的动作无法解析或违反约束（如 alias/status 长度不一致）
    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("Timer storage error: {0}")]
    Timer(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Speech error: {0}")]
    Speech(String),

    #[error("Bridge error: {0}")]
    Bridge(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, HearthError>;

impl HearthError {
    pub fn transport(alias: impl Into<String>, message: impl ToString) -> Self {
        Self::DeviceTransport {
            alias: alias.into(),
            message: message.to_string(),
        }
    }
}
