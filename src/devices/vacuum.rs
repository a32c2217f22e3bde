//! 扫地机器人：状态 docked / cleaning / stopped / unknown
//!
//! 设备上报数值状态码，映射规则：
//! - 3、10 → stopped
//! - 5 → cleaning
//! - 6、8、12、15、100、101、103 → docked（回充中 / 充电中 / 已满电等）
//! - 其余 → unknown

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::{HearthError, Result};
use crate::devices::{read_state_with_retry, send_with_retry, Device, DeviceLink, DeviceStatus};

const DEFAULT_SETTLE: Duration = Duration::from_secs(5);

pub struct VacuumRobot {
    alias: String,
    link: Arc<dyn DeviceLink>,
    status: DeviceStatus,
    settle: Duration,
}

impl VacuumRobot {
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

pub(crate) fn status_from_code(code: u32) -> DeviceStatus {
    match code {
        3 | 10 => DeviceStatus::Stopped,
        5 => DeviceStatus::Cleaning,
        6 | 8 | 12 | 15 | 100 | 101 | 103 => DeviceStatus::Docked,
        _ => DeviceStatus::Unknown,
    }
}

#[async_trait]
impl Device for VacuumRobot {
    fn alias(&self) -> &str {
        &self.alias
    }

    fn status(&self) -> DeviceStatus {
        self.status
    }

    fn description(&self) -> &str {
        "Status could be docked, cleaning, stopped or unknown. Changing the status to docked means returning it to dock."
    }

    async fn refresh_status(&mut self) {
        let Some(raw) = read_state_with_retry(self.link.as_ref(), &self.alias).await else {
            return;
        };
        self.status = match raw.trim().parse::<u32>() {
            Ok(code) => status_from_code(code),
            Err(_) => {
                tracing::warn!(device = %self.alias, raw = %raw, "Unexpected vacuum state code");
                DeviceStatus::Unknown
            }
        };
    }

    async fn request_status_change(&mut self, target: DeviceStatus) -> Result<()> {
        let command = match target {
            DeviceStatus::Cleaning => "app_start",
            DeviceStatus::Stopped => "app_pause",
            DeviceStatus::Docked => "app_charge",
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::testing::ScriptedLink;

    #[test]
    fn test_status_codes() {
        assert_eq!(status_from_code(5), DeviceStatus::Cleaning);
        assert_eq!(status_from_code(10), DeviceStatus::Stopped);
        for code in [6, 8, 12, 15, 100, 101, 103] {
            assert_eq!(status_from_code(code), DeviceStatus::Docked);
        }
        assert_eq!(status_from_code(42), DeviceStatus::Unknown);
    }

    #[tokio::test]
    async fn test_docking_command() {
        let link = ScriptedLink::with_states(&["5", "8"]);
        let mut vacuum = VacuumRobot::new("扫地机", link.clone()).with_settle(Duration::ZERO);
        vacuum.refresh_status().await;
        assert_eq!(vacuum.status(), DeviceStatus::Cleaning);
        vacuum.request_status_change(DeviceStatus::Docked).await.unwrap();
        vacuum.refresh_status().await;
        assert_eq!(vacuum.status(), DeviceStatus::Docked);
        assert_eq!(link.commands(), vec!["app_charge".to_string()]);
    }

    #[tokio::test]
    async fn test_garbage_code_is_unknown() {
        let link = ScriptedLink::with_states(&["charging"]);
        let mut vacuum = VacuumRobot::new("扫地机", link);
        vacuum.refresh_status().await;
        assert_eq!(vacuum.status(), DeviceStatus::Unknown);
    }
}
