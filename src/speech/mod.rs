//! 语音协作方：输入（转写文本）与输出（TTS、音量）
//!
//! Orchestrator 只依赖 Speaker / Listener 两个 trait；具体实现可以是外部命令、
//! 管道中的转写文本，测试里则是记录调用的替身。

pub mod input;
pub mod output;

use async_trait::async_trait;

use crate::core::Result;

pub use input::{run_line_feed, LineListener, TRANSCRIPT_CHANNEL_CAPACITY};
pub use output::CommandSpeaker;

/// 语音输出：speak 阻塞到播报结束
#[async_trait]
pub trait Speaker: Send + Sync {
    async fn speak(&self, text: &str) -> Result<()>;

    /// 设置系统音量（0..=100，调用方已校验范围）
    async fn set_volume(&self, percent: u8) -> Result<()>;

    /// ChangeVolume 动作说明（写入 LLM system prompt）
    fn capabilities_text(&self) -> String {
        "\n\nAction: ChangeVolume\n\
         description: change the speaker volume\n\
         parameters:\n\
         - volume: the target volume, an integer from 0 to 100\n\n"
            .to_string()
    }

    /// 停止输出（关闭流程最后一步）
    async fn stop(&self) {}
}

/// 语音输入开关：播报期间暂停收音，避免听到自己的声音
pub trait Listener: Send + Sync {
    fn start_listening(&self);

    fn stop_listening(&self);
}
