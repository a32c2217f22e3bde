//! 远程命令桥：TCP 监听，每个连接一个任务，逐行请求逐行响应

use std::net::SocketAddr;

use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader, BufWriter};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::bridge::{handle_line, write_line};
use crate::core::{HearthError, HomeSnapshot, Result, TaskSender};

/// 单行请求的最大字节数（不含换行）
pub const MAX_REQUEST_BYTES: usize = 64 * 1024;

pub struct RemoteBridge {
    listener: TcpListener,
    sender: TaskSender,
    snapshots: watch::Receiver<HomeSnapshot>,
}

impl RemoteBridge {
    pub async fn bind(
        addr: &str,
        sender: TaskSender,
        snapshots: watch::Receiver<HomeSnapshot>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HearthError::Bridge(format!("failed to bind {addr}: {e}")))?;
        Ok(Self {
            listener,
            sender,
            snapshots,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// 接受连接直到取消
    pub async fn run(self, token: CancellationToken) {
        tracing::info!(addr = ?self.listener.local_addr().ok(), "Remote bridge listening");
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tracing::info!(%peer, "Remote client connected");
                        tokio::spawn(serve_connection(
                            stream,
                            peer,
                            self.sender.clone(),
                            self.snapshots.clone(),
                            token.child_token(),
                        ));
                    }
                    Err(e) => tracing::error!("Error accepting remote client: {}", e),
                },
            }
        }
        tracing::info!("Remote bridge stopped");
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    sender: TaskSender,
    snapshots: watch::Receiver<HomeSnapshot>,
    token: CancellationToken,
) {
    let (read_half, write_half) = stream.into_split();
    // 多读一个字节，用来区分“恰好到上限”和“超过上限”
    let mut reader = BufReader::new(read_half).take(MAX_REQUEST_BYTES as u64 + 1);
    let mut writer = BufWriter::new(write_half);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        reader.set_limit(MAX_REQUEST_BYTES as u64 + 1);
        let read = tokio::select! {
            _ = token.cancelled() => break,
            read = reader.read_until(b'\n', &mut buf) => read,
        };
        let reply = match read {
            Ok(0) => break,
            Ok(_) if buf.last() != Some(&b'\n') && buf.len() > MAX_REQUEST_BYTES => {
                tracing::warn!(%peer, "Remote request exceeds {} bytes, closing", MAX_REQUEST_BYTES);
                let reply = json!({ "error": format!("request exceeds {MAX_REQUEST_BYTES} bytes") });
                let _ = write_line(&mut writer, &reply.to_string()).await;
                break;
            }
            Ok(_) => match std::str::from_utf8(&buf) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    handle_line(trimmed, &sender, &snapshots)
                }
                Err(e) => {
                    tracing::warn!(%peer, "Remote request is not valid UTF-8: {}", e);
                    json!({ "error": format!("invalid utf-8: {e}") })
                }
            },
            Err(e) => {
                tracing::warn!(%peer, "Error reading from remote client: {}", e);
                break;
            }
        };
        if let Err(e) = write_line(&mut writer, &reply.to_string()).await {
            tracing::warn!(%peer, "Failed to reply to remote client: {}", e);
            break;
        }
    }
    tracing::info!(%peer, "Remote client disconnected");
}
