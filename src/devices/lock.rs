//! 智能门锁：状态 locked / unlocked，命令后需等待锁舌动作完成

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::{HearthError, Result};
use crate::devices::{read_state_with_retry, send_with_retry, Device, DeviceLink, DeviceStatus};

const DEFAULT_SETTLE: Duration = Duration::from_secs(10);

pub struct SmartLock {
    alias: String,
    link: Arc<dyn DeviceLink>,
    status: DeviceStatus,
    settle: Duration,
}

impl SmartLock {
    pub fn new(alias: impl Into<String>, link: Arc<dyn DeviceLink>) -> Self {
        Self {
            alias: alias.into(),
            link,
            status: DeviceStatus::Unknown,
            settle: DEFAULT_SETTLE,
        }
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }
}

fn parse_lock_state(raw: &str) -> DeviceStatus {
    match raw.trim().to_lowercase().as_str() {
        "locked" | "lock" => DeviceStatus::Locked,
        "unlocked" | "unlock" => DeviceStatus::Unlocked,
        _ => DeviceStatus::Unknown,
    }
}

#[async_trait]
impl Device for SmartLock {
    fn alias(&self) -> &str {
        &self.alias
    }

    fn status(&self) -> DeviceStatus {
        self.status
    }

    fn description(&self) -> &str {
        "Status can be locked or unlocked"
    }

    async fn refresh_status(&mut self) {
        if let Some(raw) = read_state_with_retry(self.link.as_ref(), &self.alias).await {
            self.status = parse_lock_state(&raw);
        }
    }

    async fn request_status_change(&mut self, target: DeviceStatus) -> Result<()> {
        let command = match target {
            DeviceStatus::Locked => "lock",
            DeviceStatus::Unlocked => "unlock",
            other => {
                return Err(HearthError::UnsupportedStatus {
                    alias: self.alias.clone(),
                    status: other.to_string(),
                })
            }
        };
        send_with_retry(self.link.as_ref(), &self.alias, command, self.settle).await
    }
}
