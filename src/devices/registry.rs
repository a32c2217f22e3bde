//! 设备注册表：发现（整表重建）与收敛式状态变更
//!
//! - refresh_all：遍历全部数据源重建 alias → Device 映射，单个数据源失败不影响其他数据源
//! - change_device_status：逐对 (alias, target) 执行「刷新 → 比较 → 下发 → 刷新 → 比较」，
//!   最多 max_attempts 轮；传输错误立即放弃当前这一对，继续下一对

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::Result;
use crate::devices::{Device, DeviceInfo, DeviceStatus};

/// 每对 (alias, target) 的最大尝试轮数
pub const DEFAULT_CONVERGENCE_ATTEMPTS: u32 = 5;

/// 设备数据源（一个品牌 / 一个中枢），负责发现设备
#[async_trait]
pub trait DeviceSource: Send + Sync {
    fn name(&self) -> &str;

    async fn discover(&self) -> Result<Vec<Box<dyn Device>>>;
}

/// 单对 (alias, target) 的收敛结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvergenceOutcome {
    /// 已达到目标状态；attempts 为实际下发命令的次数（0 表示本来就是目标状态）
    Converged { attempts: u32 },
    /// 重试耗尽仍未达到目标状态
    Exhausted,
    /// 传输错误 / 不支持的状态 / 未知设备，提前放弃
    Aborted(String),
}

impl ConvergenceOutcome {
    pub fn is_converged(&self) -> bool {
        matches!(self, ConvergenceOutcome::Converged { .. })
    }
}

pub struct DeviceRegistry {
    sources: Vec<Arc<dyn DeviceSource>>,
    devices: BTreeMap<String, Box<dyn Device>>,
    max_attempts: u32,
}

impl DeviceRegistry {
    pub fn new(sources: Vec<Arc<dyn DeviceSource>>) -> Self {
        Self {
            sources,
            devices: BTreeMap::new(),
            max_attempts: DEFAULT_CONVERGENCE_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// 重建整张设备表：旧别名全部丢弃，新发现的设备刷新状态后加入
    pub async fn refresh_all(&mut self) -> usize {
        let mut devices: BTreeMap<String, Box<dyn Device>> = BTreeMap::new();
        for source in &self.sources {
            match source.discover().await {
                Ok(found) => {
                    tracing::info!(source = source.name(), count = found.len(), "Devices discovered");
                    for mut device in found {
                        device.refresh_status().await;
                        let alias = device.alias().to_string();
                        if devices.insert(alias.clone(), device).is_some() {
                            tracing::warn!(source = source.name(), alias = %alias, "Duplicate device alias, keeping the latest");
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(source = source.name(), "Error discovering devices: {}", e);
                }
            }
        }
        self.devices = devices;
        self.devices.len()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn aliases(&self) -> Vec<String> {
        self.devices.keys().cloned().collect()
    }

    pub fn get(&self, alias: &str) -> Option<&dyn Device> {
        self.devices.get(alias).map(|d| d.as_ref())
    }

    pub fn infos(&self) -> Vec<DeviceInfo> {
        self.devices.values().map(|d| d.info()).collect()
    }

    /// ControlDevice 动作说明 + 当前设备列表（写入 LLM system prompt）
    pub fn capabilities_text(&self) -> String {
        let devices = serde_json::to_string_pretty(&self.infos()).unwrap_or_else(|_| "[]".to_string());
        format!(
            "\n\nAction: ControlDevice\n\
             description: there are smart devices in the home, you can change their status\n\
             parameters:\n\
             - alias: a list of the aliases of the devices\n\
             - status: a list of target status that you want to change the device to\n\
             The list of available devices:\n{devices}\n\n"
        )
    }

    /// 对每一对 (alias, target) 依次执行收敛，互不影响
    pub async fn change_device_status(
        &mut self,
        aliases: &[String],
        targets: &[DeviceStatus],
    ) -> Vec<ConvergenceOutcome> {
        if aliases.len() != targets.len() {
            tracing::warn!(
                aliases = aliases.len(),
                targets = targets.len(),
                "Alias/status length mismatch, extra entries ignored"
            );
        }
        let mut outcomes = Vec::with_capacity(aliases.len().min(targets.len()));
        for (alias, target) in aliases.iter().zip(targets.iter().copied()) {
            let outcome = match self.devices.get_mut(alias) {
                Some(device) => converge(device.as_mut(), target, self.max_attempts).await,
                None => {
                    tracing::error!(alias = %alias, "Error controlling device: unknown alias");
                    ConvergenceOutcome::Aborted(format!("unknown device {alias}"))
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }
}

async fn converge(device: &mut dyn Device, target: DeviceStatus, max_attempts: u32) -> ConvergenceOutcome {
    let alias = device.alias().to_string();
    let mut retries = max_attempts;
    let mut attempts = 0;
    while retries > 0 {
        tracing::info!(device = %alias, target = %target, "Try change device status");
        device.refresh_status().await;
        if device.status() == target {
            return ConvergenceOutcome::Converged { attempts };
        }
        attempts += 1;
        if let Err(e) = device.request_status_change(target).await {
            tracing::error!(device = %alias, "Error controlling device: {}", e);
            return ConvergenceOutcome::Aborted(e.to_string());
        }
        device.refresh_status().await;
        if device.status() == target {
            return ConvergenceOutcome::Converged { attempts };
        }
        retries -= 1;
    }
    tracing::error!(device = %alias, target = %target, attempts, "Failed to change device status");
    ConvergenceOutcome::Exhausted
}

#[cfg(test)]
pub(crate) mod testing {
    //! 注册表测试替身：内存中的设备与数据源

    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::core::HearthError;

    /// 可控的假设备：可设为「永不收敛」或在下发命令时报错
    pub struct FakeDevice {
        pub alias: String,
        pub status: DeviceStatus,
        pub converges: bool,
        pub fail_requests: bool,
        pub requests: Arc<AtomicU32>,
        pub refreshes: Arc<AtomicU32>,
    }

    impl FakeDevice {
        pub fn new(alias: &str, status: DeviceStatus) -> Self {
            Self {
                alias: alias.to_string(),
                status,
                converges: true,
                fail_requests: false,
                requests: Arc::new(AtomicU32::new(0)),
                refreshes: Arc::new(AtomicU32::new(0)),
            }
        }
    }

    #[async_trait]
    impl Device for FakeDevice {
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
            self.refreshes.fetch_add(1, Ordering::SeqCst);
        }

        async fn request_status_change(&mut self, target: DeviceStatus) -> Result<()> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            if self.fail_requests {
                return Err(HearthError::transport(&self.alias, "connection reset"));
            }
            if self.converges {
                self.status = target;
            }
            Ok(())
        }
    }

    /// 固定清单数据源；fail 为 true 时发现失败
    pub struct StaticSource {
        pub name: String,
        pub inventory: Vec<(String, DeviceStatus)>,
        pub fail: bool,
        pub calls: Mutex<u32>,
    }

    impl StaticSource {
        pub fn new(name: &str, inventory: &[(&str, DeviceStatus)]) -> Self {
            Self {
                name: name.to_string(),
                inventory: inventory.iter().map(|(a, s)| (a.to_string(), *s)).collect(),
                fail: false,
                calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl DeviceSource for StaticSource {
        fn name(&self) -> &str {
            &self.name
        }

        async fn discover(&self) -> Result<Vec<Box<dyn Device>>> {
            *self.calls.lock().unwrap() += 1;
            if self.fail {
                return Err(HearthError::transport(&self.name, "cloud login failed"));
            }
            Ok(self
                .inventory
                .iter()
                .map(|(alias, status)| Box::new(FakeDevice::new(alias, *status)) as Box<dyn Device>)
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::testing::{FakeDevice, StaticSource};
    use super::*;

    fn registry_with(device: FakeDevice) -> DeviceRegistry {
        let mut registry = DeviceRegistry::new(Vec::new());
        registry.devices.insert(device.alias.clone(), Box::new(device));
        registry
    }

    #[tokio::test]
    async fn test_never_converging_device_is_tried_exactly_five_times() {
        let mut device = FakeDevice::new("灯", DeviceStatus::Off);
        device.converges = false;
        let requests = device.requests.clone();
        let mut registry = registry_with(device);

        let outcomes = registry
            .change_device_status(&["灯".to_string()], &[DeviceStatus::On])
            .await;

        assert_eq!(outcomes, vec![ConvergenceOutcome::Exhausted]);
        assert_eq!(requests.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_already_at_target_sends_nothing() {
        let device = FakeDevice::new("灯", DeviceStatus::On);
        let requests = device.requests.clone();
        let mut registry = registry_with(device);

        let outcomes = registry
            .change_device_status(&["灯".to_string()], &[DeviceStatus::On])
            .await;

        assert_eq!(outcomes, vec![ConvergenceOutcome::Converged { attempts: 0 }]);
        assert_eq!(requests.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_transport_error_aborts_only_that_pair() {
        let mut broken = FakeDevice::new("门锁", DeviceStatus::Unlocked);
        broken.fail_requests = true;
        let broken_requests = broken.requests.clone();
        let mut registry = registry_with(broken);
        registry
            .devices
            .insert("灯".to_string(), Box::new(FakeDevice::new("灯", DeviceStatus::Off)));

        let outcomes = registry
            .change_device_status(
                &["门锁".to_string(), "灯".to_string()],
                &[DeviceStatus::Locked, DeviceStatus::On],
            )
            .await;

        assert!(matches!(outcomes[0], ConvergenceOutcome::Aborted(_)));
        assert_eq!(outcomes[1], ConvergenceOutcome::Converged { attempts: 1 });
        assert_eq!(broken_requests.load(Ordering::SeqCst), 1);
        assert_eq!(registry.get("灯").unwrap().status(), DeviceStatus::On);
    }

    #[tokio::test]
    async fn test_unknown_alias_is_skipped() {
        let mut registry = DeviceRegistry::new(Vec::new());
        let outcomes = registry
            .change_device_status(&["车库".to_string()], &[DeviceStatus::On])
            .await;
        assert!(matches!(outcomes[0], ConvergenceOutcome::Aborted(_)));
    }

    #[tokio::test]
    async fn test_refresh_isolates_failing_source() {
        let mut failing = StaticSource::new("cloud", &[("扫地机", DeviceStatus::Docked)]);
        failing.fail = true;
        let healthy = StaticSource::new("lan", &[("灯", DeviceStatus::Off), ("台灯", DeviceStatus::On)]);
        let mut registry = DeviceRegistry::new(vec![Arc::new(failing), Arc::new(healthy)]);

        let count = registry.refresh_all().await;

        assert_eq!(count, 2);
        assert_eq!(registry.aliases(), vec!["台灯".to_string(), "灯".to_string()]);
    }

    #[tokio::test]
    async fn test_refresh_is_idempotent_and_drops_stale_aliases() {
        let source = Arc::new(StaticSource::new("lan", &[("灯", DeviceStatus::Off)]));
        let mut registry = DeviceRegistry::new(vec![source.clone()]);
        registry
            .devices
            .insert("旧插座".to_string(), Box::new(FakeDevice::new("旧插座", DeviceStatus::On)));

        registry.refresh_all().await;
        let first = registry.infos();
        registry.refresh_all().await;
        let second = registry.infos();

        assert_eq!(first, second);
        assert!(registry.get("旧插座").is_none());
        assert_eq!(*source.calls.lock().unwrap(), 2);
    }

    #[test]
    fn test_capabilities_text_lists_devices() {
        let registry = registry_with(FakeDevice::new("灯", DeviceStatus::Off));
        let text = registry.capabilities_text();
        assert!(text.contains("Action: ControlDevice"));
        assert!(text.contains("\"alias\": \"灯\""));
        assert!(text.contains("\"status\": \"off\""));
    }
}
