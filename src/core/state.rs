//! 状态定义：对话状态机与 HomeSnapshot 投影
//!
//! ConversationState 只由 Orchestrator 写入；生产者（语音门控）通过 watch 只读订阅。
//! HomeSnapshot 是对外的轻量投影（远程桥 server_status 据此组装响应），
//! 内部完整状态（设备表、定时器、对话历史）仍归 Orchestrator 所有。

use serde::Serialize;
use serde_json::Value;

use crate::devices::DeviceInfo;
use crate::memory::Message;

/// 对话状态：空闲时只响应唤醒词，唤醒后下一句话被当作指令
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    #[default]
    Idle,
    AwaitingInstruction,
}

/// 机器人连接与最近一次上报
#[derive(Clone, Debug, Default, Serialize)]
pub struct RobotSnapshot {
    pub connected: bool,
    pub status: Value,
}

/// 外部可见的投影状态
#[derive(Clone, Debug, Default, Serialize)]
pub struct HomeSnapshot {
    pub conversation: ConversationState,
    pub devices: Vec<DeviceInfo>,
    pub messages: Vec<Message>,
    pub robot: RobotSnapshot,
    pub pending_timers: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::DeviceStatus;

    #[test]
    fn test_snapshot_serializes_for_status_queries() {
        let snapshot = HomeSnapshot {
            conversation: ConversationState::AwaitingInstruction,
            devices: vec![DeviceInfo {
                alias: "灯".to_string(),
                status: DeviceStatus::On,
                description: "Status could be on or off".to_string(),
            }],
            messages: vec![Message::user("打开灯")],
            robot: RobotSnapshot {
                connected: true,
                status: serde_json::json!([{"key": "battery", "value": 80}]),
            },
            pending_timers: 2,
        };
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["conversation"], "awaiting_instruction");
        assert_eq!(value["devices"][0]["status"], "on");
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["robot"]["connected"], true);
        assert_eq!(value["pending_timers"], 2);
    }
}
