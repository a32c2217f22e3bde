//! Hearth - 家居自动化编排器
//!
//! 入口：加载配置、初始化日志、组装设备/定时器/协作方，启动生产者与主控循环，
//! 收到 Ctrl+C / SIGTERM 后按「先生产者、后消费者」的顺序关闭。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::BufReader;
use tokio::sync::mpsc;

use hearth::bridge::{RemoteBridge, RobotBridge, RobotServer};
use hearth::config::load_config;
use hearth::core::{
    run_speech_gate, Collaborators, ConversationGate, Orchestrator, OrchestratorSettings,
    ShutdownCoordinator, ShutdownManager,
};
use hearth::devices::{DeviceRegistry, DeviceSource, HubSource};
use hearth::llm::create_reasoner_from_config;
use hearth::speech::{run_line_feed, CommandSpeaker, LineListener, TRANSCRIPT_CHANNEL_CAPACITY};
use hearth::timer::TimerScheduler;

/// 家居自动化编排器：语音 / 远程 / 机器人 / 定时任务 → 设备动作
#[derive(Parser, Debug)]
#[command(name = "hearth")]
#[command(version, about, long_about = None)]
struct Cli {
    /// 额外的配置文件（覆盖 config/default.toml）
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// 日志目录（默认取配置 [logging].dir）
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = load_config(cli.config.clone()).context("Failed to load config")?;

    let log_dir = cli.log_dir.unwrap_or_else(|| cfg.logging.dir.clone());
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log dir {}", log_dir.display()))?;
    let _log_guard = hearth::observability::init(&log_dir, &cfg.logging.file_prefix);
    tracing::info!(agent = %cfg.agent.name, "Hearth starting");

    let sources: Vec<Arc<dyn DeviceSource>> = cfg
        .devices
        .hubs
        .iter()
        .map(|hub| {
            Arc::new(HubSource::new(
                hub.name.clone(),
                &hub.base_url,
                hub.token.clone(),
                hub.timeout_secs,
            )) as Arc<dyn DeviceSource>
        })
        .collect();
    if sources.is_empty() {
        tracing::warn!("No device hubs configured, device control is unavailable");
    }
    let registry = DeviceRegistry::new(sources).with_max_attempts(cfg.devices.convergence_attempts);
    let timers = TimerScheduler::open(&cfg.timers.dir)
        .with_context(|| format!("Failed to open timer dir {}", cfg.timers.dir.display()))?;

    let listener = LineListener::new();
    let robot = RobotBridge::new();
    let mut orchestrator = Orchestrator::new(
        OrchestratorSettings::from_config(&cfg),
        registry,
        timers,
        Collaborators {
            reasoner: Box::new(create_reasoner_from_config(&cfg)),
            speaker: Arc::new(CommandSpeaker::new(cfg.speech.clone())),
            listener: Arc::new(listener.clone()),
            robot: Arc::new(robot.clone()),
        },
    );
    orchestrator.start().await;

    let manager = Arc::new(ShutdownManager::new());
    manager.install_signal_handlers();
    let mut coordinator = ShutdownCoordinator::new();

    // 语音：stdin 转写行 → 有界通道 → 会话门控 → 任务队列
    let (transcript_tx, transcript_rx) = mpsc::channel(TRANSCRIPT_CHANNEL_CAPACITY);
    coordinator.register_producer(
        "transcript-feed",
        tokio::spawn(run_line_feed(
            BufReader::new(tokio::io::stdin()),
            listener,
            transcript_tx,
            coordinator.producer_token(),
        )),
    );
    coordinator.register_producer(
        "speech-gate",
        tokio::spawn(run_speech_gate(
            ConversationGate::new(cfg.agent.name.clone()),
            transcript_rx,
            orchestrator.state(),
            orchestrator.sender(),
            coordinator.producer_token(),
        )),
    );

    if cfg.bridge.enabled {
        let bridge = RemoteBridge::bind(&cfg.bridge.bind, orchestrator.sender(), orchestrator.snapshots())
            .await
            .context("Failed to start remote bridge")?;
        coordinator.register_producer("remote-bridge", tokio::spawn(bridge.run(coordinator.producer_token())));
    }

    if cfg.robot.enabled {
        let server = RobotServer::bind(&cfg.robot.bind, robot, orchestrator.sender())
            .await
            .context("Failed to start robot bridge")?;
        coordinator.register_producer("robot-bridge", tokio::spawn(server.run(coordinator.producer_token())));
    }

    coordinator.set_consumer(tokio::spawn(orchestrator.run(coordinator.consumer_token())));

    manager.wait_for_shutdown().await;
    coordinator.run().await;
    Ok(())
}
