//! Hearth - 家居自动化编排器
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 任务队列、动作、对话状态、会话门控、主控循环、优雅关闭
//! - **devices**: 设备抽象、收敛式状态变更、设备注册表与 REST 中枢数据源
//! - **intent**: 本地意图过滤器（常见设备指令不经 LLM）
//! - **timer**: 持久化定时任务
//! - **llm**: LLM 客户端（OpenAI 兼容 / DeepSeek / Mock）与推理协作方
//! - **memory**: 对话历史
//! - **speech**: 语音输入开关与语音输出
//! - **bridge**: 远程命令桥与机器人桥（行分隔 JSON over TCP）
//! - **observability**: 日志初始化

pub mod bridge;
pub mod config;
pub mod core;
pub mod devices;
pub mod intent;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod speech;
pub mod timer;
