//! 核心编排层：错误、任务队列、动作、对话状态、会话门控、主控循环与优雅关闭

pub mod action;
pub mod error;
pub mod gate;
pub mod orchestrator;
pub mod shutdown;
pub mod state;
pub mod task;

pub use action::{Action, ActionKind, ActionWire};
pub use error::{HearthError, Result};
pub use gate::{run_speech_gate, ConversationGate};
pub use orchestrator::{Collaborators, Orchestrator, OrchestratorSettings};
pub use shutdown::{ShutdownCoordinator, ShutdownManager, ShutdownReason};
pub use state::{ConversationState, HomeSnapshot, RobotSnapshot};
pub use task::{Task, TaskQueue, TaskSender};
