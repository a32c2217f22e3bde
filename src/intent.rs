//! 本地意图过滤器
//!
//! 在调用 LLM 之前，用确定性的短语匹配处理最常见的设备指令（「打开灯」「关上台灯」）。
//! 只有当整句话几乎都能被已知短语解释时才短路，剩余未解释字符 ≥ 3 时放弃匹配，
//! 交给 LLM 处理复合请求。

use crate::core::Action;
use crate::devices::DeviceStatus;

/// 触发动词 → (目标状态, 播报用的动词)
const TRIGGERS: [(&str, DeviceStatus, &str); 4] = [
    ("打开", DeviceStatus::On, "打开"),
    ("关闭", DeviceStatus::Off, "关闭"),
    ("关上", DeviceStatus::Off, "关闭"),
    ("清洁", DeviceStatus::Cleaning, "清洁"),
];

/// 未被短语覆盖的字符数达到该值即放弃本地匹配
pub const MAX_UNMATCHED_CHARS: usize = 3;

#[derive(Debug, Clone)]
pub struct LocalIntentFilter {
    enabled: bool,
}

impl Default for LocalIntentFilter {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl LocalIntentFilter {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// 尝试本地匹配；命中返回 ControlDevice 动作（附带确认语），否则 None
    pub fn try_match(&self, text: &str, aliases: &[String]) -> Option<Action> {
        if !self.enabled {
            return None;
        }

        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        let mut matched_aliases = Vec::new();
        let mut statuses = Vec::new();
        let mut message = String::from("好，");
        let mut matched_chars = 0usize;

        for alias in aliases {
            for (verb, status, spoken) in TRIGGERS {
                let phrase = format!("{verb}{alias}");
                if compact.contains(&phrase) {
                    tracing::info!(phrase = %phrase, "Local filter matched");
                    matched_chars += phrase.chars().count();
                    matched_aliases.push(alias.clone());
                    statuses.push(status);
                    message.push_str(&format!("{spoken} {alias}，"));
                }
            }
        }

        let unmatched = compact.chars().count().saturating_sub(matched_chars);
        if unmatched >= MAX_UNMATCHED_CHARS || matched_aliases.is_empty() {
            return None;
        }

        Some(Action::control(matched_aliases, statuses, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ActionKind;

    fn aliases(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_simple_command_matches() {
        let filter = LocalIntentFilter::default();
        let action = filter.try_match("打开灯", &aliases(&["灯"])).unwrap();
        match action.kind {
            ActionKind::ControlDevice { aliases, statuses } => {
                assert_eq!(aliases, vec!["灯".to_string()]);
                assert_eq!(statuses, vec![DeviceStatus::On]);
            }
            other => panic!("Expected ControlDevice, got {other:?}"),
        }
        assert_eq!(action.message, "好，打开 灯，");
    }

    #[test]
    fn test_compound_request_falls_through() {
        let filter = LocalIntentFilter::default();
        assert!(filter
            .try_match("打开灯并且请帮我查一下天气", &aliases(&["灯"]))
            .is_none());
    }

    #[test]
    fn test_whitespace_from_transcription_is_ignored() {
        let filter = LocalIntentFilter::default();
        let action = filter.try_match("关 上 台灯", &aliases(&["台灯", "灯"])).unwrap();
        assert!(matches!(
            action.kind,
            ActionKind::ControlDevice { ref statuses, .. } if statuses == &vec![DeviceStatus::Off]
        ));
    }

    #[test]
    fn test_multiple_devices_in_one_sentence() {
        let filter = LocalIntentFilter::default();
        let action = filter
            .try_match("打开灯清洁扫地机", &aliases(&["扫地机", "灯"]))
            .unwrap();
        match action.kind {
            ActionKind::ControlDevice { aliases, statuses } => {
                assert_eq!(aliases, vec!["扫地机".to_string(), "灯".to_string()]);
                assert_eq!(statuses, vec![DeviceStatus::Cleaning, DeviceStatus::On]);
            }
            other => panic!("Expected ControlDevice, got {other:?}"),
        }
    }

    #[test]
    fn test_short_filler_is_tolerated() {
        let filter = LocalIntentFilter::default();
        assert!(filter.try_match("请打开灯吧", &aliases(&["灯"])).is_some());
        assert!(filter.try_match("请你打开灯吧", &aliases(&["灯"])).is_none());
    }

    #[test]
    fn test_no_alias_hit_or_disabled() {
        assert!(LocalIntentFilter::default().try_match("你好", &aliases(&["灯"])).is_none());
        assert!(LocalIntentFilter::new(false).try_match("打开灯", &aliases(&["灯"])).is_none());
    }
}
