//! 智能插座 / 开关类设备：状态 on / off

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::{HearthError, Result};
use crate::devices::{read_state_with_retry, send_with_retry, Device, DeviceLink, DeviceStatus};

pub struct SmartPlug {
    alias: String,
    link: Arc<dyn DeviceLink>,
    status: DeviceStatus,
    settle: Duration,
}

impl SmartPlug {
    pub fn new(alias: impl Into<String>, link: Arc<dyn DeviceLink>) -> Self {
        Self {
            alias: alias.into(),
            link,
            status: DeviceStatus::Unknown,
            settle: Duration::ZERO,
        }
    }

    /// 机械按键类开关需要较长的动作时间
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }
}

fn parse_power(raw: &str) -> DeviceStatus {
    match raw.trim().to_lowercase().as_str() {
        "on" | "true" | "1" => DeviceStatus::On,
        "off" | "false" | "0" => DeviceStatus::Off,
        _ => DeviceStatus::Unknown,
    }
}

#[async_trait]
impl Device for SmartPlug {
    fn alias(&self) -> &str {
        &self.alias
    }

    fn status(&self) -> DeviceStatus {
        self.status
    }

    fn description(&self) -> &str {
        "Status could be on or off"
    }

    async fn refresh_status(&mut self) {
        if let Some(raw) = read_state_with_retry(self.link.as_ref(), &self.alias).await {
            self.status = parse_power(&raw);
        }
    }

    async fn request_status_change(&mut self, target: DeviceStatus) -> Result<()> {
        let command = match target {
            DeviceStatus::On => "turnOn",
            DeviceStatus::Off => "turnOff",
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

    #[tokio::test]
    async fn test_refresh_maps_power_state() {
        let link = ScriptedLink::with_states(&["ON"]);
        let mut plug = SmartPlug::new("灯", link);
        assert_eq!(plug.status(), DeviceStatus::Unknown);
        plug.refresh_status().await;
        assert_eq!(plug.status(), DeviceStatus::On);
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_cache() {
        let link = ScriptedLink::with_states(&["off"]);
        let mut plug = SmartPlug::new("灯", link.clone());
        plug.refresh_status().await;
        link.states
            .lock()
            .unwrap()
            .extend((0..3).map(|_| Err(HearthError::transport("灯", "timeout"))));
        *link.last_state.lock().unwrap() = None;
        plug.refresh_status().await;
        assert_eq!(plug.status(), DeviceStatus::Off);
    }

    #[tokio::test]
    async fn test_request_sends_brand_command() {
        let link = ScriptedLink::with_states(&["off"]);
        let mut plug = SmartPlug::new("灯", link.clone());
        plug.request_status_change(DeviceStatus::On).await.unwrap();
        assert_eq!(link.commands(), vec!["turnOn".to_string()]);
    }

    #[tokio::test]
    async fn test_rejects_unsupported_status() {
        let link = ScriptedLink::with_states(&["off"]);
        let mut plug = SmartPlug::new("灯", link.clone());
        let err = plug.request_status_change(DeviceStatus::Docked).await;
        assert!(matches!(err, Err(HearthError::UnsupportedStatus { .. })));
        assert!(link.commands().is_empty());
    }
}
