//! 动作（Action）：LLM 或本地过滤器给出的结构化效果
//!
//! 协作方的原始格式为 `{"message": "...", "action": "<Kind>", "action_params": {...}}`，
//! 在边界处解析为封闭的 ActionKind，内部分发因此是穷尽且静态检查的。
//! 定时任务文件也以同一格式持久化动作。

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{HearthError, Result};
use crate::devices::DeviceStatus;

/// 一个待执行的动作：可选播报语 + 动作本体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ActionWire", into = "ActionWire")]
pub struct Action {
    /// 要播报给用户的话；空串表示不播报
    pub message: String,
    pub kind: ActionKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    /// aliases 与 statuses 等长、一一对应
    ControlDevice {
        aliases: Vec<String>,
        statuses: Vec<DeviceStatus>,
    },
    MessageOnly {
        is_question: bool,
    },
    /// percent 保留原始值，范围校验在执行时进行
    ChangeVolume {
        percent: i64,
    },
    /// delay_secs 秒后执行 actions
    SetTimer {
        delay_secs: i64,
        actions: Vec<Action>,
        notify: bool,
    },
}

impl ActionKind {
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::ControlDevice { .. } => "ControlDevice",
            ActionKind::MessageOnly { .. } => "MessageOnly",
            ActionKind::ChangeVolume { .. } => "ChangeVolume",
            ActionKind::SetTimer { .. } => "SetTimer",
        }
    }
}

/// 协作方线格式
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionWire {
    #[serde(default)]
    pub message: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub action_params: Value,
}

#[derive(Serialize, Deserialize)]
struct ControlParams {
    alias: Vec<String>,
    status: Vec<DeviceStatus>,
}

#[derive(Default, Serialize, Deserialize)]
struct MessageParams {
    #[serde(default)]
    is_question: bool,
}

#[derive(Serialize, Deserialize)]
struct VolumeParams {
    volume: i64,
}

#[derive(Serialize, Deserialize)]
struct TimerParams {
    /// 相对当前时间的秒数
    timestamp: i64,
    #[serde(default)]
    actions: Vec<Action>,
    #[serde(default)]
    notify: bool,
}

fn params<T: DeserializeOwned>(kind: &str, value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| HearthError::InvalidAction(format!("bad action_params for {kind}: {e}")))
}

impl TryFrom<ActionWire> for Action {
    type Error = HearthError;

    fn try_from(wire: ActionWire) -> Result<Self> {
        let kind = match wire.action.as_str() {
            "ControlDevice" => {
                let p: ControlParams = params(&wire.action, wire.action_params)?;
                if p.alias.len() != p.status.len() {
                    return Err(HearthError::InvalidAction(format!(
                        "ControlDevice has {} aliases but {} statuses",
                        p.alias.len(),
                        p.status.len()
                    )));
                }
                ActionKind::ControlDevice {
                    aliases: p.alias,
                    statuses: p.status,
                }
            }
            "MessageOnly" => {
                let p: MessageParams = if wire.action_params.is_null() {
                    MessageParams::default()
                } else {
                    params(&wire.action, wire.action_params)?
                };
                ActionKind::MessageOnly {
                    is_question: p.is_question,
                }
            }
            "ChangeVolume" => {
                let p: VolumeParams = params(&wire.action, wire.action_params)?;
                ActionKind::ChangeVolume { percent: p.volume }
            }
            "SetTimer" => {
                let p: TimerParams = params(&wire.action, wire.action_params)?;
                ActionKind::SetTimer {
                    delay_secs: p.timestamp,
                    actions: p.actions,
                    notify: p.notify,
                }
            }
            other => {
                return Err(HearthError::InvalidAction(format!("unknown action '{other}'")));
            }
        };
        Ok(Action {
            message: wire.message,
            kind,
        })
    }
}

impl From<Action> for ActionWire {
    fn from(action: Action) -> Self {
        let name = action.kind.name().to_string();
        let action_params = match action.kind {
            ActionKind::ControlDevice { aliases, statuses } => serde_json::json!({
                "alias": aliases,
                "status": statuses,
            }),
            ActionKind::MessageOnly { is_question } => {
                if is_question {
                    serde_json::json!({ "is_question": true })
                } else {
                    Value::Null
                }
            }
            ActionKind::ChangeVolume { percent } => serde_json::json!({ "volume": percent }),
            ActionKind::SetTimer {
                delay_secs,
                actions,
                notify,
            } => serde_json::json!({
                "timestamp": delay_secs,
                "actions": actions,
                "notify": notify,
            }),
        };
        ActionWire {
            message: action.message,
            action: name,
            action_params,
        }
    }
}

impl Action {
    pub fn control(aliases: Vec<String>, statuses: Vec<DeviceStatus>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: ActionKind::ControlDevice { aliases, statuses },
        }
    }

    pub fn message_only(message: impl Into<String>, is_question: bool) -> Self {
        Self {
            message: message.into(),
            kind: ActionKind::MessageOnly { is_question },
        }
    }

    /// 解析协作方回复：去掉 Markdown 代码块包裹，提取 JSON 对象并校验
    pub fn parse_reply(reply: &str) -> Result<Self> {
        let json = extract_json(reply);
        let wire: ActionWire = serde_json::from_str(json)
            .map_err(|e| HearthError::InvalidAction(format!("{e}: {json}")))?;
        Action::try_from(wire)
    }

    /// 紧凑 JSON（写入对话历史）
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.message.clone())
    }
}

fn extract_json(reply: &str) -> &str {
    let trimmed = reply.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim());
    }
    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.strip_suffix("```").unwrap_or(rest);
        return rest.trim();
    }
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_control_device() {
        let action = Action::parse_reply(
            r#"{"message": "好的，已打开灯", "action": "ControlDevice", "action_params": {"alias": ["灯"], "status": ["on"]}}"#,
        )
        .unwrap();
        assert_eq!(action.message, "好的，已打开灯");
        assert_eq!(
            action.kind,
            ActionKind::ControlDevice {
                aliases: vec!["灯".to_string()],
                statuses: vec![DeviceStatus::On],
            }
        );
    }

    #[test]
    fn test_parse_strips_code_fence() {
        let reply = "```json\n{\"message\": \"你好\", \"action\": \"MessageOnly\"}\n```";
        let action = Action::parse_reply(reply).unwrap();
        assert_eq!(action.kind, ActionKind::MessageOnly { is_question: false });
    }

    #[test]
    fn test_parallel_arrays_must_match() {
        let result = Action::parse_reply(
            r#"{"action": "ControlDevice", "action_params": {"alias": ["灯", "台灯"], "status": ["on"]}}"#,
        );
        assert!(matches!(result, Err(HearthError::InvalidAction(_))));
    }

    #[test]
    fn test_unknown_action_and_status_rejected() {
        assert!(Action::parse_reply(r#"{"action": "Dance"}"#).is_err());
        assert!(Action::parse_reply(
            r#"{"action": "ControlDevice", "action_params": {"alias": ["灯"], "status": ["bright"]}}"#
        )
        .is_err());
        assert!(Action::parse_reply("我听不懂").is_err());
    }

    #[test]
    fn test_volume_keeps_out_of_range_value() {
        let action =
            Action::parse_reply(r#"{"action": "ChangeVolume", "action_params": {"volume": 150}}"#).unwrap();
        assert_eq!(action.kind, ActionKind::ChangeVolume { percent: 150 });
    }

    #[test]
    fn test_set_timer_with_nested_actions() {
        let reply = r#"{"message": "30 秒后关灯", "action": "SetTimer", "action_params": {
            "timestamp": 30,
            "notify": true,
            "actions": [{"message": "", "action": "ControlDevice", "action_params": {"alias": ["灯"], "status": ["off"]}}]
        }}"#;
        let action = Action::parse_reply(reply).unwrap();
        match &action.kind {
            ActionKind::SetTimer { delay_secs, actions, notify } => {
                assert_eq!(*delay_secs, 30);
                assert!(*notify);
                assert_eq!(actions.len(), 1);
                assert_eq!(actions[0].kind.name(), "ControlDevice");
            }
            other => panic!("Expected SetTimer, got {other:?}"),
        }
        let back: Action = serde_json::from_str(&action.to_json()).unwrap();
        assert_eq!(back, action);
    }
}
