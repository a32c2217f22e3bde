//! 网络前门：远程命令桥（Web 前端 / 手机）与机器人桥
//!
//! 两者都是按行分隔的 JSON over TCP；连接处理器只做解析和入队，
//! 真正的执行全部交给 Orchestrator 的任务队列。

pub mod protocol;
pub mod remote;
pub mod robot;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::core::{HearthError, Result};

pub use protocol::{handle_line, RemoteTask};
pub use remote::RemoteBridge;
pub use robot::{RobotBridge, RobotCommandKind, RobotLink, RobotServer};

/// 写一行 JSON 并 flush
pub(crate) async fn write_line<W>(writer: &mut W, json: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer
        .write_all(json.as_bytes())
        .await
        .map_err(|e| HearthError::Bridge(format!("failed to write line: {e}")))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| HearthError::Bridge(format!("failed to write newline: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| HearthError::Bridge(format!("failed to flush: {e}")))?;
    Ok(())
}
