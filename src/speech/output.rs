//! 基于外部命令的语音输出：espeak-ng 播报，amixer 调音量
//!
//! 命令通过 tokio::process 执行，带超时；stop 之后正在进行和后续的播报都会立即返回错误。

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::config::SpeechSection;
use crate::core::{HearthError, Result};
use crate::speech::Speaker;

pub struct CommandSpeaker {
    settings: SpeechSection,
    stopped: CancellationToken,
}

impl CommandSpeaker {
    pub fn new(settings: SpeechSection) -> Self {
        Self {
            settings,
            stopped: CancellationToken::new(),
        }
    }

    fn speak_args(&self, text: &str) -> Vec<String> {
        let mut args = vec!["-s".to_string(), self.settings.rate.to_string()];
        if let Some(voice) = &self.settings.voice {
            args.push("-v".to_string());
            args.push(voice.clone());
        }
        // 文本以 '-' 开头时不能被当成选项
        args.push("--".to_string());
        args.push(text.to_string());
        args
    }

    fn volume_args(&self, percent: u8) -> Vec<String> {
        vec![
            "sset".to_string(),
            self.settings.mixer_control.clone(),
            format!("{percent}%"),
        ]
    }

    async fn run(&self, program: &str, args: &[String]) -> Result<()> {
        let timeout = Duration::from_secs(self.settings.command_timeout_secs.max(1));
        let mut cmd = Command::new(program);
        cmd.args(args).kill_on_drop(true);

        let output = tokio::select! {
            biased;
            _ = self.stopped.cancelled() => {
                return Err(HearthError::Speech(format!("{program} interrupted, speaker stopped")));
            }
            result = tokio::time::timeout(timeout, cmd.output()) => result
                .map_err(|_| HearthError::Speech(format!("{program} timed out after {}s", timeout.as_secs())))?
                .map_err(|e| HearthError::Speech(format!("{program} failed to start: {e}")))?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(HearthError::Speech(format!(
                "{program} exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Speaker for CommandSpeaker {
    async fn speak(&self, text: &str) -> Result<()> {
        tracing::info!(text = %text, "Speaking");
        self.run(&self.settings.tts_command, &self.speak_args(text)).await
    }

    async fn set_volume(&self, percent: u8) -> Result<()> {
        tracing::info!(percent, "Setting volume");
        self.run(&self.settings.mixer_command, &self.volume_args(percent)).await
    }

    async fn stop(&self) {
        self.stopped.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_arguments() {
        let speaker = CommandSpeaker::new(SpeechSection::default());
        assert_eq!(speaker.speak_args("你好"), vec!["-s", "130", "--", "你好"]);
        assert_eq!(speaker.volume_args(40), vec!["sset", "Master", "40%"]);

        let voiced = CommandSpeaker::new(SpeechSection {
            voice: Some("cmn".to_string()),
            ..SpeechSection::default()
        });
        assert_eq!(voiced.speak_args("好"), vec!["-s", "130", "-v", "cmn", "--", "好"]);
        assert_eq!(speaker.speak_args("-5 度"), vec!["-s", "130", "--", "-5 度"]);
    }

    #[tokio::test]
    async fn test_missing_program_is_an_error() {
        let speaker = CommandSpeaker::new(SpeechSection {
            tts_command: "hearth-no-such-tts".to_string(),
            ..SpeechSection::default()
        });
        assert!(matches!(speaker.speak("hi").await, Err(HearthError::Speech(_))));
    }

    #[tokio::test]
    async fn test_stopped_speaker_refuses_to_speak() {
        let speaker = CommandSpeaker::new(SpeechSection {
            tts_command: "sleep".to_string(),
            rate: 5,
            ..SpeechSection::default()
        });
        speaker.stop().await;
        assert!(speaker.speak("1").await.is_err());
    }
}
