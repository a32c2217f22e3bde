//! 可观测性：tracing 订阅器初始化
//!
//! 控制台输出 + 按天滚动的日志文件（默认 logs/hearth.log.YYYY-MM-DD）；
//! 级别默认 info，可通过 RUST_LOG 覆盖。

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 安装全局订阅器；返回的 guard 必须存活到进程退出，否则文件日志会丢失尾部
pub fn init(log_dir: &Path, file_prefix: &str) -> WorkerGuard {
    let file_appender = tracing_appender::rolling::daily(log_dir, file_prefix);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();

    guard
}
