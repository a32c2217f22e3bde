//! 远程命令桥协议
//!
//! 请求：
//! - `{"action": "server_task", "data": {"type": "chat_message", "text": "打开灯"}}`
//! - `{"action": "server_status"}`
//!
//! server_task 的 data 支持 chat_message / client_device / robot_move / robot_car；
//! 任何无法处理的请求都返回 `{"error": "..."}`，连接保持不断。
//!
//! server_status 的响应：
//! `{"statuses": {"conversation", "devices", "messages": [{"message": {role, content}}], "robot": {connected, status}, "pending_timers"}}`

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::watch;

use crate::core::{ConversationState, HomeSnapshot, RobotSnapshot, Task, TaskSender};
use crate::devices::{DeviceInfo, DeviceStatus};
use crate::memory::Message;

/// 远程客户端提交的任务
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RemoteTask {
    ChatMessage {
        text: String,
    },
    ClientDevice {
        target: String,
        #[serde(rename = "targetStatus")]
        target_status: DeviceStatus,
    },
    RobotMove {
        command: String,
    },
    RobotCar {
        command: String,
    },
}

impl From<RemoteTask> for Task {
    fn from(task: RemoteTask) -> Self {
        match task {
            RemoteTask::ChatMessage { text } => Task::Utterance { text },
            RemoteTask::ClientDevice {
                target,
                target_status,
            } => Task::DeviceSetRequest {
                alias: target,
                status: target_status,
            },
            RemoteTask::RobotMove { command } => Task::RobotMoveCommand { cmd: command },
            RemoteTask::RobotCar { command } => Task::RobotCarCommand { cmd: command },
        }
    }
}

#[derive(Serialize)]
struct StatusReply<'a> {
    statuses: Statuses<'a>,
}

#[derive(Serialize)]
struct Statuses<'a> {
    conversation: ConversationState,
    devices: &'a [DeviceInfo],
    messages: Vec<MessageEntry<'a>>,
    robot: &'a RobotSnapshot,
    pending_timers: usize,
}

/// 前端按 `messages[i].message` 读取每条消息
#[derive(Serialize)]
struct MessageEntry<'a> {
    message: &'a Message,
}

fn status_reply(snapshot: &HomeSnapshot) -> Value {
    let reply = StatusReply {
        statuses: Statuses {
            conversation: snapshot.conversation,
            devices: &snapshot.devices,
            messages: snapshot
                .messages
                .iter()
                .map(|message| MessageEntry { message })
                .collect(),
            robot: &snapshot.robot,
            pending_timers: snapshot.pending_timers,
        },
    };
    serde_json::to_value(&reply).unwrap_or_else(|e| error(e.to_string()))
}

fn error(message: impl Into<String>) -> Value {
    json!({ "error": message.into() })
}

/// 处理一行请求，返回要写回的一行响应
pub fn handle_line(line: &str, sender: &TaskSender, snapshots: &watch::Receiver<HomeSnapshot>) -> Value {
    let request: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(line = %line, "Malformed bridge request: {}", e);
            return error(format!("invalid json: {e}"));
        }
    };

    match request.get("action").and_then(Value::as_str) {
        Some("server_task") => {
            let data = request.get("data").cloned().unwrap_or(Value::Null);
            match serde_json::from_value::<RemoteTask>(data) {
                Ok(remote) => {
                    let task = Task::from(remote);
                    let kind = task.kind();
                    if sender.enqueue(task) {
                        json!({ "status": "ok", "task": kind })
                    } else {
                        error("agent is shutting down")
                    }
                }
                Err(e) => error(format!("invalid task: {e}")),
            }
        }
        Some("server_status") => status_reply(&snapshots.borrow()),
        Some(other) => error(format!("unknown action: {other}")),
        None => error("missing action"),
    }
}
