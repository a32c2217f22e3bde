//! 任务队列：多生产者、单消费者的无界 FIFO
//!
//! 生产者（语音门控、远程桥、机器人桥）只持有 TaskSender 的克隆，
//! 所有会修改共享状态的工作都由 Orchestrator 逐个消费。

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::devices::DeviceStatus;

/// 一个待处理的工作单元，入队即转移所有权，只被消费一次
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Task {
    /// 空闲状态下听到唤醒词
    WakeWordHeard { text: String },
    /// 等待指令状态下的一句话
    Utterance { text: String },
    /// 本地系统消息（如音量越界），交给 LLM 解释后播报
    SystemNote { text: String },
    /// 机器人上报的最新状态
    RobotStatus { payload: Value },
    RobotMoveCommand { cmd: String },
    RobotCarCommand { cmd: String },
    /// 远程客户端直接设置设备状态（不播报）
    DeviceSetRequest { alias: String, status: DeviceStatus },
}

impl Task {
    pub fn kind(&self) -> &'static str {
        match self {
            Task::WakeWordHeard { .. } => "wake_word_heard",
            Task::Utterance { .. } => "utterance",
            Task::SystemNote { .. } => "system_note",
            Task::RobotStatus { .. } => "robot_status",
            Task::RobotMoveCommand { .. } => "robot_move_command",
            Task::RobotCarCommand { .. } => "robot_car_command",
            Task::DeviceSetRequest { .. } => "device_set_request",
        }
    }
}

/// 生产者句柄，可任意克隆
#[derive(Debug, Clone)]
pub struct TaskSender {
    tx: mpsc::UnboundedSender<Task>,
}

impl TaskSender {
    /// 入队；消费者已退出时返回 false
    pub fn enqueue(&self, task: Task) -> bool {
        let kind = task.kind();
        match self.tx.send(task) {
            Ok(()) => {
                tracing::debug!(task = kind, "Task enqueued");
                true
            }
            Err(_) => {
                tracing::warn!(task = kind, "Task queue closed, task dropped");
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// 消费端，只归 Orchestrator 所有
#[derive(Debug)]
pub struct TaskQueue {
    rx: mpsc::UnboundedReceiver<Task>,
}

impl TaskQueue {
    pub async fn recv(&mut self) -> Option<Task> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Task> {
        self.rx.try_recv().ok()
    }

    /// 关闭接收端：之后的 enqueue 失败，已入队的任务仍可取出
    pub fn close(&mut self) {
        self.rx.close();
    }
}

pub fn channel() -> (TaskSender, TaskQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (TaskSender { tx }, TaskQueue { rx })
}
