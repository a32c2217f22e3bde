//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再叠加 `--config` 指定的文件，最后用环境变量 `HEARTH__*` 覆盖
//! （双下划线表示嵌套，如 `HEARTH__LLM__PROVIDER=openai`、`HEARTH__BRIDGE__BIND=0.0.0.0:9001`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub agent: AgentSection,
    pub devices: DevicesSection,
    pub timers: TimersSection,
    pub bridge: BridgeSection,
    pub robot: RobotSection,
    pub llm: LlmSection,
    pub speech: SpeechSection,
    pub logging: LoggingSection,
}

/// [agent] 段：唤醒名与固定话术
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub name: String,
    /// 听到唤醒词后的应答
    pub wake_reply: String,
    /// LLM 提问后、等待用户回答前的提示
    pub reply_prompt: String,
    /// MessageOnly 没有消息时的兜底播报
    pub fallback_reply: String,
    /// notify 定时任务到期时的播报
    pub timer_notice: String,
    /// 是否启用本地意图过滤器
    pub local_filter: bool,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            name: "eighty six".to_string(),
            wake_reply: "yes master".to_string(),
            reply_prompt: "请回答".to_string(),
            fallback_reply: "我没有听懂。".to_string(),
            timer_notice: "定时任务时间到了".to_string(),
            local_filter: true,
        }
    }
}

/// [devices] 段：刷新周期、收敛轮数、设备中枢
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DevicesSection {
    pub refresh_interval_secs: u64,
    pub convergence_attempts: u32,
    pub hubs: Vec<HubConfig>,
}

impl Default for DevicesSection {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 300,
            convergence_attempts: crate::devices::DEFAULT_CONVERGENCE_ATTEMPTS,
            hubs: Vec::new(),
        }
    }
}

/// [[devices.hubs]]：一个 REST 设备中枢
#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    pub name: String,
    pub base_url: String,
    pub token: Option<String>,
    #[serde(default = "default_hub_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_hub_timeout_secs() -> u64 {
    10
}

/// [timers] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimersSection {
    pub dir: PathBuf,
}

impl Default for TimersSection {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("timers"),
        }
    }
}

/// [bridge] 段：远程命令桥监听地址
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeSection {
    pub enabled: bool,
    pub bind: String,
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "127.0.0.1:9001".to_string(),
        }
    }
}

/// [robot] 段：机器人桥监听地址
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RobotSection {
    pub enabled: bool,
    pub bind: String,
}

impl Default for RobotSection {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "0.0.0.0:9000".to_string(),
        }
    }
}

/// [llm] 段：后端选择、超时与历史长度
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：deepseek / openai / mock；实际选择还取决于 API Key 是否存在
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub deepseek: LlmModelSection,
    pub openai: LlmModelSection,
    pub timeouts: LlmTimeoutsSection,
    /// 对话历史保留条数（不含 system prompt）
    pub history_messages: usize,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "deepseek".to_string(),
            model: "deepseek-chat".to_string(),
            base_url: None,
            deepseek: LlmModelSection::default(),
            openai: LlmModelSection::default(),
            timeouts: LlmTimeoutsSection::default(),
            history_messages: crate::llm::DEFAULT_HISTORY_MESSAGES,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LlmModelSection {
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

/// [speech] 段：TTS 与音量控制命令
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechSection {
    pub tts_command: String,
    /// 语速（espeak-ng -s）
    pub rate: u32,
    pub voice: Option<String>,
    pub mixer_command: String,
    pub mixer_control: String,
    pub command_timeout_secs: u64,
}

impl Default for SpeechSection {
    fn default() -> Self {
        Self {
            tts_command: "espeak-ng".to_string(),
            rate: 130,
            voice: None,
            mixer_command: "amixer".to_string(),
            mixer_control: "Master".to_string(),
            command_timeout_secs: 30,
        }
    }
}

/// [logging] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub dir: PathBuf,
    pub file_prefix: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
            file_prefix: "hearth.log".to_string(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 HEARTH__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HEARTH__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        } else {
            tracing::warn!(path = %path.display(), "Config file not found, ignored");
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HEARTH")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.agent.name, "eighty six");
        assert_eq!(cfg.devices.refresh_interval_secs, 300);
        assert_eq!(cfg.devices.convergence_attempts, 5);
        assert_eq!(cfg.llm.history_messages, 10);
        assert_eq!(cfg.speech.rate, 130);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("home.toml");
        std::fs::write(
            &path,
            r#"
[agent]
name = "小八"

[devices]
refresh_interval_secs = 60

[[devices.hubs]]
name = "living-room"
base_url = "http://192.168.1.20:8123/api"
token = "secret"

[timers]
dir = "/var/lib/hearth/timers"
"#,
        )
        .unwrap();

        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.agent.name, "小八");
        assert_eq!(cfg.agent.wake_reply, "yes master");
        assert_eq!(cfg.devices.refresh_interval_secs, 60);
        assert_eq!(cfg.devices.hubs.len(), 1);
        assert_eq!(cfg.devices.hubs[0].timeout_secs, 10);
        assert_eq!(cfg.timers.dir, PathBuf::from("/var/lib/hearth/timers"));
    }
}
