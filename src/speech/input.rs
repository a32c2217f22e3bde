//! 转写文本输入
//!
//! 语音识别在进程外完成，识别结果按行写入 stdin（或任意管道）。
//! LineListener 是收音开关，run_line_feed 把行送进有界通道，关闭收音期间的行直接丢弃。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::speech::Listener;

pub const TRANSCRIPT_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone, Default)]
pub struct LineListener {
    listening: Arc<AtomicBool>,
}

impl LineListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }
}

impl Listener for LineListener {
    fn start_listening(&self) {
        tracing::info!("Starting voice collection");
        self.listening.store(true, Ordering::SeqCst);
    }

    fn stop_listening(&self) {
        tracing::info!("Stopping voice collection");
        self.listening.store(false, Ordering::SeqCst);
    }
}

/// 逐行读取转写文本，直到 EOF 或取消
pub async fn run_line_feed<R>(
    reader: R,
    listener: LineListener,
    tx: mpsc::Sender<String>,
    token: CancellationToken,
) where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        let line = tokio::select! {
            _ = token.cancelled() => break,
            line = lines.next_line() => line,
        };
        match line {
            Ok(Some(line)) => {
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }
                if !listener.is_listening() {
                    tracing::debug!(text = %line, "Not listening, transcript dropped");
                    continue;
                }
                if tx.send(line).await.is_err() {
                    break;
                }
            }
            Ok(None) => {
                tracing::info!("Transcript input closed");
                break;
            }
            Err(e) => {
                tracing::error!("Error reading transcript input: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lines_dropped_while_not_listening() {
        let listener = LineListener::new();
        let (tx, mut rx) = mpsc::channel(TRANSCRIPT_CHANNEL_CAPACITY);
        let input: &[u8] = "ignored\n".as_bytes();
        run_line_feed(input, listener.clone(), tx, CancellationToken::new()).await;
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_lines_forwarded_while_listening() {
        let listener = LineListener::new();
        listener.start_listening();
        let (tx, mut rx) = mpsc::channel(TRANSCRIPT_CHANNEL_CAPACITY);
        let input: &[u8] = "eighty six\n\n  打开灯 \n".as_bytes();
        run_line_feed(input, listener.clone(), tx, CancellationToken::new()).await;

        assert_eq!(rx.recv().await.as_deref(), Some("eighty six"));
        assert_eq!(rx.recv().await.as_deref(), Some("打开灯"));
        assert!(rx.recv().await.is_none());

        listener.stop_listening();
        assert!(!listener.is_listening());
    }
}
