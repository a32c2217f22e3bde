//! 机器人桥
//!
//! 机器人主动连入，连续上报 JSON 状态；状态之间不一定有分隔符，
//! 按流式解析，每个完整的 JSON 值变成一个 RobotStatus 任务。
//! 控制命令以 `{"type": "move" | "car", "command": "..."}` 行写回同一连接。
//! 同一时间只服务一个机器人连接。

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncReadExt, BufWriter};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::bridge::write_line;
use crate::core::{HearthError, Result, Task, TaskSender};

const OUTBOUND_CAPACITY: usize = 16;

/// 未解析完的状态数据上限，超过则丢弃
pub const MAX_PENDING_STATUS_BYTES: usize = 64 * 1024;

const READ_CHUNK: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RobotCommandKind {
    Move,
    Car,
}

#[derive(Serialize)]
struct RobotCommand<'a> {
    #[serde(rename = "type")]
    kind: RobotCommandKind,
    command: &'a str,
}

/// Orchestrator 看到的机器人接口
#[async_trait]
pub trait RobotLink: Send + Sync {
    async fn send_command(&self, kind: RobotCommandKind, command: &str) -> Result<()>;

    fn is_connected(&self) -> bool;
}

/// 当前机器人连接的发送端
#[derive(Clone, Default)]
pub struct RobotBridge {
    outbound: Arc<Mutex<Option<mpsc::Sender<String>>>>,
    connected: Arc<AtomicBool>,
}

impl RobotBridge {
    pub fn new() -> Self {
        Self::default()
    }

    fn attach(&self, tx: mpsc::Sender<String>) {
        if let Ok(mut slot) = self.outbound.lock() {
            *slot = Some(tx);
        }
        self.connected.store(true, Ordering::SeqCst);
    }

    fn detach(&self) {
        if let Ok(mut slot) = self.outbound.lock() {
            *slot = None;
        }
        self.connected.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl RobotLink for RobotBridge {
    async fn send_command(&self, kind: RobotCommandKind, command: &str) -> Result<()> {
        let tx = self
            .outbound
            .lock()
            .map_err(|_| HearthError::Bridge("robot link poisoned".to_string()))?
            .clone()
            .ok_or_else(|| HearthError::Bridge("robot not connected".to_string()))?;
        let line = serde_json::to_string(&RobotCommand { kind, command })?;
        tx.send(line)
            .await
            .map_err(|_| HearthError::Bridge("robot connection closed".to_string()))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

pub struct RobotServer {
    listener: TcpListener,
    bridge: RobotBridge,
    sender: TaskSender,
}

impl RobotServer {
    pub async fn bind(addr: &str, bridge: RobotBridge, sender: TaskSender) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HearthError::Bridge(format!("failed to bind {addr}: {e}")))?;
        Ok(Self {
            listener,
            bridge,
            sender,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn run(self, token: CancellationToken) {
        tracing::info!(addr = ?self.listener.local_addr().ok(), "Waiting for robot connection");
        loop {
            let accepted = tokio::select! {
                _ = token.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, peer)) => {
                    tracing::info!(%peer, "Robot connected");
                    self.serve(stream, &token).await;
                    tracing::info!(%peer, "Robot disconnected");
                }
                Err(e) => tracing::error!("Error accepting robot connection: {}", e),
            }
        }
        self.bridge.detach();
        tracing::info!("Robot bridge stopped");
    }

    async fn serve(&self, stream: TcpStream, token: &CancellationToken) {
        let (mut read_half, write_half) = stream.into_split();
        let mut writer = BufWriter::new(write_half);
        let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_CAPACITY);
        self.bridge.attach(tx);

        let mut pending = Vec::new();
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                outgoing = rx.recv() => {
                    let Some(outgoing) = outgoing else { break };
                    if let Err(e) = write_line(&mut writer, &outgoing).await {
                        tracing::error!("Failed to send robot command: {}", e);
                        break;
                    }
                }
                read = read_half.read(&mut chunk) => match read {
                    Ok(0) => break,
                    Ok(n) => {
                        pending.extend_from_slice(&chunk[..n]);
                        for payload in drain_statuses(&mut pending) {
                            self.sender.enqueue(Task::RobotStatus { payload });
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Robot connection error: {}", e);
                        break;
                    }
                },
            }
        }
        self.bridge.detach();
    }
}

/// 从缓冲区取出所有完整的 JSON 值，未完成的尾部留在缓冲区里
fn drain_statuses(pending: &mut Vec<u8>) -> Vec<Value> {
    let mut statuses = Vec::new();
    let mut stream = serde_json::Deserializer::from_slice(pending).into_iter::<Value>();
    loop {
        match stream.next() {
            Some(Ok(value)) => statuses.push(value),
            Some(Err(e)) if e.is_eof() => break,
            Some(Err(e)) => {
                tracing::warn!("Error parsing robot status, dropping buffered data: {}", e);
                pending.clear();
                return statuses;
            }
            None => break,
        }
    }
    let consumed = stream.byte_offset();
    pending.drain(..consumed);

    if pending.len() > MAX_PENDING_STATUS_BYTES {
        tracing::warn!(bytes = pending.len(), "Robot status too large, dropping buffered data");
        pending.clear();
    }
    statuses
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    use super::*;
    use crate::core::task;

    #[tokio::test]
    async fn test_send_without_robot_fails() {
        let bridge = RobotBridge::new();
        assert!(!bridge.is_connected());
        assert!(bridge.send_command(RobotCommandKind::Move, "forward").await.is_err());
    }

    #[tokio::test]
    async fn test_status_in_and_commands_out() {
        let (sender, mut queue) = task::channel();
        let bridge = RobotBridge::new();
        let server = RobotServer::bind("127.0.0.1:0", bridge.clone(), sender).await.unwrap();
        let addr = server.local_addr().unwrap();
        let token = CancellationToken::new();
        let handle = tokio::spawn(server.run(token.clone()));

        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        write_half
            .write_all(b"[{\"key\": \"battery\", \"value\": 80}]\n")
            .await
            .unwrap();
        match queue.recv().await.unwrap() {
            Task::RobotStatus { payload } => assert_eq!(payload[0]["value"], 80),
            other => panic!("Expected RobotStatus, got {other:?}"),
        }
        assert!(bridge.is_connected());

        bridge.send_command(RobotCommandKind::Car, "left").await.unwrap();
        let line = lines.next_line().await.unwrap().unwrap();
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&line).unwrap(),
            serde_json::json!({"type": "car", "command": "left"})
        );

        token.cancel();
        handle.await.unwrap();
        assert!(!bridge.is_connected());
    }

    #[test]
    fn test_drain_statuses_splits_concatenated_values() {
        let mut pending = br#"[{"key":"battery","value":80}][{"key":"battery","value":79}][{"key":"bat"#.to_vec();
        let statuses = drain_statuses(&mut pending);
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[1][0]["value"], 79);
        assert_eq!(pending, br#"[{"key":"bat"#.to_vec());

        pending.extend_from_slice(br#"tery","value":78}]"#);
        let statuses = drain_statuses(&mut pending);
        assert_eq!(statuses, vec![serde_json::json!([{"key": "battery", "value": 78}])]);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_drain_statuses_drops_garbage_and_oversized_data() {
        let mut pending = b"[1] }{ [2]".to_vec();
        assert_eq!(drain_statuses(&mut pending), vec![serde_json::json!([1])]);
        assert!(pending.is_empty());

        let mut pending = b"[\"".to_vec();
        pending.extend(std::iter::repeat(b'x').take(MAX_PENDING_STATUS_BYTES));
        assert!(drain_statuses(&mut pending).is_empty());
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_statuses_without_separator() {
        let (sender, mut queue) = task::channel();
        let bridge = RobotBridge::new();
        let server = RobotServer::bind("127.0.0.1:0", bridge.clone(), sender).await.unwrap();
        let addr = server.local_addr().unwrap();
        let token = CancellationToken::new();
        let handle = tokio::spawn(server.run(token.clone()));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(br#"[{"key": "battery", "value": 80}]"#).await.unwrap();
        stream.write_all(br#"[{"key": "battery", "value": 79}]"#).await.unwrap();

        for expected in [80, 79] {
            let next = tokio::time::timeout(std::time::Duration::from_secs(2), queue.recv())
                .await
                .unwrap()
                .unwrap();
            match next {
                Task::RobotStatus { payload } => assert_eq!(payload[0]["value"], expected),
                other => panic!("Expected RobotStatus, got {other:?}"),
            }
        }

        token.cancel();
        handle.await.unwrap();
    }
}
