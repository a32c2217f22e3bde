//! 优雅关闭
//!
//! 顺序固定：先停生产者（语音门控、远程桥、机器人桥），等它们退出并释放 TaskSender；
//! 再通知消费者（Orchestrator），它会执行完当前任务后停止收音与语音输出。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// 关闭信号管理器
#[derive(Clone)]
pub struct ShutdownManager {
    shutdown_token: CancellationToken,
    reason_tx: broadcast::Sender<ShutdownReason>,
}

/// 关闭原因
#[derive(Debug, Clone)]
pub enum ShutdownReason {
    /// Ctrl+C
    UserInitiated,
    /// SIGTERM
    Signal,
    FatalError(String),
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (reason_tx, _) = broadcast::channel(1);
        Self {
            shutdown_token: CancellationToken::new(),
            reason_tx,
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn shutdown(&self, reason: ShutdownReason) {
        tracing::info!(reason = ?reason, "Shutdown requested");
        let _ = self.reason_tx.send(reason);
        self.shutdown_token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownReason> {
        self.reason_tx.subscribe()
    }

    pub async fn wait_for_shutdown(&self) {
        self.shutdown_token.cancelled().await;
    }

    /// 安装系统信号处理器 (Ctrl+C, SIGTERM)
    pub fn install_signal_handlers(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
                manager.shutdown(ShutdownReason::UserInitiated);
            }
        });

        #[cfg(unix)]
        {
            let manager = Arc::clone(self);
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                    sigterm.recv().await;
                    tracing::info!("Received SIGTERM, initiating graceful shutdown...");
                    manager.shutdown(ShutdownReason::Signal);
                }
            });
        }
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

/// 关闭协调器：登记生产者与消费者任务，按顺序停止
pub struct ShutdownCoordinator {
    producer_token: CancellationToken,
    consumer_token: CancellationToken,
    producers: Vec<(&'static str, JoinHandle<()>)>,
    consumer: Option<JoinHandle<()>>,
    /// 等待单个任务退出的超时时间（秒）
    timeout_secs: u64,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            producer_token: CancellationToken::new(),
            consumer_token: CancellationToken::new(),
            producers: Vec::new(),
            consumer: None,
            timeout_secs: 5,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn producer_token(&self) -> CancellationToken {
        self.producer_token.clone()
    }

    pub fn consumer_token(&self) -> CancellationToken {
        self.consumer_token.clone()
    }

    pub fn register_producer(&mut self, name: &'static str, handle: JoinHandle<()>) {
        self.producers.push((name, handle));
    }

    pub fn set_consumer(&mut self, handle: JoinHandle<()>) {
        self.consumer = Some(handle);
    }

    async fn wait(name: &str, handle: JoinHandle<()>, timeout: Duration) {
        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(())) => tracing::info!("Task '{}' stopped", name),
            Ok(Err(e)) => tracing::warn!("Task '{}' failed: {}", name, e),
            Err(_) => tracing::warn!("Task '{}' did not stop within {}s", name, timeout.as_secs()),
        }
    }

    /// 先停生产者，再停消费者
    pub async fn run(self) {
        let timeout = Duration::from_secs(self.timeout_secs);
        tracing::info!("Stopping {} producers...", self.producers.len());
        self.producer_token.cancel();
        for (name, handle) in self.producers {
            Self::wait(name, handle, timeout).await;
        }

        self.consumer_token.cancel();
        if let Some(handle) = self.consumer {
            // 消费者可能正在等待设备收敛或 LLM 回复，给更长的时间
            Self::wait("orchestrator", handle, timeout * 6).await;
        }
        tracing::info!("Shutdown complete");
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_shutdown_manager_token() {
        let manager = ShutdownManager::new();
        let token = manager.token();
        assert!(!manager.is_shutdown());
        manager.shutdown(ShutdownReason::UserInitiated);
        assert!(token.is_cancelled());
        assert!(manager.is_shutdown());
    }

    #[tokio::test]
    async fn test_producers_stop_before_consumer() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut coordinator = ShutdownCoordinator::new();

        let producer_token = coordinator.producer_token();
        let producer_order = order.clone();
        coordinator.register_producer(
            "bridge",
            tokio::spawn(async move {
                producer_token.cancelled().await;
                producer_order.lock().unwrap().push("producer");
            }),
        );

        let consumer_token = coordinator.consumer_token();
        let consumer_order = order.clone();
        coordinator.set_consumer(tokio::spawn(async move {
            consumer_token.cancelled().await;
            consumer_order.lock().unwrap().push("consumer");
        }));

        coordinator.run().await;
        assert_eq!(*order.lock().unwrap(), vec!["producer", "consumer"]);
    }
}
