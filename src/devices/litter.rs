//! 智能猫砂盆：状态 on / off / cleaning / unknown
//!
//! 设备状态字：RDY（待命）→ on，OFF → off，CCP（清理周期进行中）→ cleaning。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::{HearthError, Result};
use crate::devices::{read_state_with_retry, send_with_retry, Device, DeviceLink, DeviceStatus};

pub struct LitterRobot {
    alias: String,
    link: Arc<dyn DeviceLink>,
    status: DeviceStatus,
    settle: Duration,
}

impl LitterRobot {
    pub fn new(alias: impl Into<String>, link: Arc<dyn DeviceLink>) -> Self {
        Self {
            alias: alias.into(),
            link,
            status: DeviceStatus::Unknown,
            settle: Duration::ZERO,
        }
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }
}

fn parse_litter_state(raw: &str) -> DeviceStatus {
    match raw.trim().to_uppercase().as_str() {
        "RDY" => DeviceStatus::On,
        "OFF" => DeviceStatus::Off,
        "CCP" => DeviceStatus::Cleaning,
        _ => DeviceStatus::Unknown,
    }
}

#[async_trait]
impl Device for LitterRobot {
    fn alias(&self) -> &str {
        &self.alias
    }

    fn status(&self) -> DeviceStatus {
        self.status
    }

    fn description(&self) -> &str {
        "Status could be on, off, cleaning or unknown."
    }

    async fn refresh_status(&mut self) {
        if let Some(raw) = read_state_with_retry(self.link.as_ref(), &self.alias).await {
            self.status = parse_litter_state(&raw);
        }
    }

    async fn request_status_change(&mut self, target: DeviceStatus) -> Result<()> {
        let command = match target {
            DeviceStatus::On => "power_on",
            DeviceStatus::Off => "power_off",
            DeviceStatus::Cleaning => "start_cleaning",
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
    fn test_state_words() {
        assert_eq!(parse_litter_state("rdy"), DeviceStatus::On);
        assert_eq!(parse_litter_state("CCP"), DeviceStatus::Cleaning);
        assert_eq!(parse_litter_state("DFS"), DeviceStatus::Unknown);
    }

    #[tokio::test]
    async fn test_clean_command() {
        let link = ScriptedLink::with_states(&["RDY"]);
        let mut litter = LitterRobot::new("猫砂盆", link.clone());
        litter.request_status_change(DeviceStatus::Cleaning).await.unwrap();
        assert_eq!(link.commands(), vec!["start_cleaning".to_string()]);
        assert!(litter.request_status_change(DeviceStatus::Locked).await.is_err());
    }
}
