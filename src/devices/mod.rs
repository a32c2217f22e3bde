//! 设备抽象层
//!
//! 每类设备实现 Device trait（别名、缓存状态、能力描述、刷新、请求变更）；
//! 具体品牌协议藏在 DeviceLink 之后，设备类型只负责「原始状态 ↔ DeviceStatus」与命令映射。
//! 编排器只依赖 trait，通过 DeviceRegistry 做发现与收敛。

pub mod hub;
pub mod litter;
pub mod lock;
pub mod plug;
pub mod registry;
pub mod vacuum;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::{HearthError, Result};

pub use hub::{HubLink, HubSource};
pub use litter::LitterRobot;
pub use lock::SmartLock;
pub use plug::SmartPlug;
pub use registry::{ConvergenceOutcome, DeviceRegistry, DeviceSource, DEFAULT_CONVERGENCE_ATTEMPTS};
pub use vacuum::VacuumRobot;

/// 品牌命令的传输层重试次数（单次 request / refresh 内部）
pub const TRANSPORT_RETRIES: u32 = 3;

/// 设备状态：各设备类型只使用其中的一个小子集
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    On,
    Off,
    Locked,
    Unlocked,
    Docked,
    Cleaning,
    Stopped,
    Unknown,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::On => "on",
            DeviceStatus::Off => "off",
            DeviceStatus::Locked => "locked",
            DeviceStatus::Unlocked => "unlocked",
            DeviceStatus::Docked => "docked",
            DeviceStatus::Cleaning => "cleaning",
            DeviceStatus::Stopped => "stopped",
            DeviceStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceStatus {
    type Err = HearthError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "on" => Ok(DeviceStatus::On),
            "off" => Ok(DeviceStatus::Off),
            "locked" => Ok(DeviceStatus::Locked),
            "unlocked" => Ok(DeviceStatus::Unlocked),
            "docked" => Ok(DeviceStatus::Docked),
            "cleaning" => Ok(DeviceStatus::Cleaning),
            "stopped" => Ok(DeviceStatus::Stopped),
            "unknown" => Ok(DeviceStatus::Unknown),
            other => Err(HearthError::InvalidAction(format!(
                "unknown device status '{other}'"
            ))),
        }
    }
}

/// 设备类型（发现阶段由数据源给出）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    #[serde(alias = "plug")]
    SmartPlug,
    #[serde(alias = "lock")]
    SmartLock,
    #[serde(alias = "vacuum")]
    VacuumRobot,
    #[serde(alias = "litter")]
    LitterRobot,
}

/// 设备对外展示信息（供 LLM 能力描述与状态快照使用）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub alias: String,
    pub status: DeviceStatus,
    pub description: String,
}

/// 设备能力接口
#[async_trait]
pub trait Device: Send + Sync {
    /// 唯一、稳定的显示名
    fn alias(&self) -> &str;

    /// 缓存状态（不触发网络请求）
    fn status(&self) -> DeviceStatus;

    /// 静态能力描述（供 LLM 理解可设置的状态）
    fn description(&self) -> &str;

    /// 查询真实状态并更新缓存；传输失败只记录日志，保留旧缓存
    async fn refresh_status(&mut self);

    /// 下发品牌命令；内部可重试传输错误，并在命令后等待设备动作完成
    async fn request_status_change(&mut self, target: DeviceStatus) -> Result<()>;

    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            alias: self.alias().to_string(),
            status: self.status(),
            description: self.description().to_string(),
        }
    }
}

/// 品牌传输层：读取原始状态字、发送原始命令
#[async_trait]
pub trait DeviceLink: Send + Sync {
    async fn read_state(&self) -> Result<String>;

    async fn send_command(&self, command: &str) -> Result<()>;
}

/// 按设备类型构造具体设备
pub fn build_device(kind: DeviceKind, alias: String, link: Arc<dyn DeviceLink>) -> Box<dyn Device> {
    match kind {
        DeviceKind::SmartPlug => Box::new(SmartPlug::new(alias, link)),
        DeviceKind::SmartLock => Box::new(SmartLock::new(alias, link)),
        DeviceKind::VacuumRobot => Box::new(VacuumRobot::new(alias, link)),
        DeviceKind::LitterRobot => Box::new(LitterRobot::new(alias, link)),
    }
}

/// 读取原始状态，传输错误重试 TRANSPORT_RETRIES 次；全部失败返回 None
pub(crate) async fn read_state_with_retry(link: &dyn DeviceLink, alias: &str) -> Option<String> {
    for attempt in 1..=TRANSPORT_RETRIES {
        match link.read_state().await {
            Ok(raw) => return Some(raw),
            Err(e) => {
                tracing::error!(device = %alias, attempt, "Error updating device status: {}", e);
            }
        }
    }
    None
}

/// 发送命令，传输错误重试 TRANSPORT_RETRIES 次；成功后等待 settle 让物理动作完成
pub(crate) async fn send_with_retry(
    link: &dyn DeviceLink,
    alias: &str,
    command: &str,
    settle: Duration,
) -> Result<()> {
    let mut last_err = None;
    for attempt in 1..=TRANSPORT_RETRIES {
        match link.send_command(command).await {
            Ok(()) => {
                last_err = None;
                break;
            }
            Err(e) => {
                tracing::error!(device = %alias, attempt, command, "Error controlling device: {}", e);
                last_err = Some(e);
            }
        }
    }
    if let Some(e) = last_err {
        return Err(e);
    }
    if !settle.is_zero() {
        tokio::time::sleep(settle).await;
    }
    Ok(())
}
