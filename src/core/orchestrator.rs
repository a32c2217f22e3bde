//! 家居编排器：单消费者主控循环
//!
//! 负责：持有设备表、定时器、对话状态与全部协作方；逐个消费任务队列，
//! 把任务解析成 Action 并执行；每轮之后做维护（周期刷新设备、触发到期定时器），
//! 最后把 HomeSnapshot 投影发布给远程桥等只读方。
//!
//! 所有会修改共享状态的操作只发生在这里，生产者只能入队。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::bridge::{RobotCommandKind, RobotLink};
use crate::config::AppConfig;
use crate::core::task::{self, TaskQueue};
use crate::core::{
    Action, ActionKind, ConversationState, HomeSnapshot, Result, RobotSnapshot, Task, TaskSender,
};
use crate::devices::DeviceRegistry;
use crate::intent::LocalIntentFilter;
use crate::llm::{Origin, Reasoner};
use crate::speech::{Listener, Speaker};
use crate::timer::TimerScheduler;

/// 维护节拍：没有任务时也按此间隔检查刷新与定时器
const MAINTENANCE_TICK: Duration = Duration::from_secs(1);

/// SetTimer 允许的最大延迟（十年）
const MAX_TIMER_DELAY_SECS: i64 = 10 * 366 * 24 * 3600;

/// 固定话术与周期参数
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub wake_reply: String,
    pub reply_prompt: String,
    pub fallback_reply: String,
    pub timer_notice: String,
    pub refresh_interval: Duration,
    pub local_filter: bool,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl OrchestratorSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            wake_reply: cfg.agent.wake_reply.clone(),
            reply_prompt: cfg.agent.reply_prompt.clone(),
            fallback_reply: cfg.agent.fallback_reply.clone(),
            timer_notice: cfg.agent.timer_notice.clone(),
            refresh_interval: Duration::from_secs(cfg.devices.refresh_interval_secs),
            local_filter: cfg.agent.local_filter,
        }
    }
}

/// 外部协作方
pub struct Collaborators {
    pub reasoner: Box<dyn Reasoner>,
    pub speaker: Arc<dyn Speaker>,
    pub listener: Arc<dyn Listener>,
    pub robot: Arc<dyn RobotLink>,
}

pub struct Orchestrator {
    settings: OrchestratorSettings,
    devices: DeviceRegistry,
    timers: TimerScheduler,
    filter: LocalIntentFilter,
    reasoner: Box<dyn Reasoner>,
    speaker: Arc<dyn Speaker>,
    listener: Arc<dyn Listener>,
    robot: Arc<dyn RobotLink>,
    sender: TaskSender,
    queue: TaskQueue,
    state_tx: watch::Sender<ConversationState>,
    snapshot_tx: watch::Sender<HomeSnapshot>,
    robot_status: Value,
    last_refresh: Instant,
}

impl Orchestrator {
    pub fn new(
        settings: OrchestratorSettings,
        devices: DeviceRegistry,
        timers: TimerScheduler,
        collaborators: Collaborators,
    ) -> Self {
        let (sender, queue) = task::channel();
        let (state_tx, _) = watch::channel(ConversationState::Idle);
        let (snapshot_tx, _) = watch::channel(HomeSnapshot::default());
        Self {
            filter: LocalIntentFilter::new(settings.local_filter),
            settings,
            devices,
            timers,
            reasoner: collaborators.reasoner,
            speaker: collaborators.speaker,
            listener: collaborators.listener,
            robot: collaborators.robot,
            sender,
            queue,
            state_tx,
            snapshot_tx,
            robot_status: Value::Null,
            last_refresh: Instant::now(),
        }
    }

    /// 生产者句柄
    pub fn sender(&self) -> TaskSender {
        self.sender.clone()
    }

    /// 对话状态的只读订阅（语音门控使用）
    pub fn state(&self) -> watch::Receiver<ConversationState> {
        self.state_tx.subscribe()
    }

    pub fn snapshots(&self) -> watch::Receiver<HomeSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn conversation_state(&self) -> ConversationState {
        *self.state_tx.borrow()
    }

    pub fn devices(&self) -> &DeviceRegistry {
        &self.devices
    }

    pub fn timers(&self) -> &TimerScheduler {
        &self.timers
    }

    /// 首次发现设备、生成能力描述、开始收音
    pub async fn start(&mut self) {
        let count = self.devices.refresh_all().await;
        self.last_refresh = Instant::now();
        tracing::info!(devices = count, timers = self.timers.len(), "Orchestrator starting");
        self.regenerate_capabilities();
        self.listener.start_listening();
        self.publish();
    }

    /// 主循环：直到 token 取消。取消只在两次任务之间生效，当前任务总会执行完
    pub async fn run(mut self, token: CancellationToken) {
        let mut tick = tokio::time::interval(MAINTENANCE_TICK);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                next = self.queue.recv() => match next {
                    Some(task) => self.dispatch(task).await,
                    None => break,
                },
                _ = tick.tick() => {}
            }
            self.maintain().await;
            self.publish();
        }

        self.shutdown().await;
    }

    /// 处理至多一个已入队的任务，然后维护一次；返回是否处理了任务
    pub async fn run_once(&mut self) -> bool {
        let handled = match self.queue.try_recv() {
            Some(task) => {
                self.dispatch(task).await;
                true
            }
            None => false,
        };
        self.maintain().await;
        self.publish();
        handled
    }

    /// 生产者此时已全部退出：关闭队列，把剩余任务处理完再停协作方
    async fn shutdown(&mut self) {
        self.queue.close();
        let mut drained = 0usize;
        while let Some(task) = self.queue.try_recv() {
            self.dispatch(task).await;
            drained += 1;
        }
        if drained > 0 {
            tracing::info!(drained, "Drained remaining tasks before stopping");
        }
        self.listener.stop_listening();
        self.speaker.stop().await;
        tracing::info!("Orchestrator stopped");
    }

    /// 执行一个任务；错误只记录，不向外传播
    pub async fn dispatch(&mut self, task: Task) {
        let kind = task.kind();
        tracing::info!(task = kind, "Processing task");
        if let Err(e) = self.handle(task).await {
            tracing::error!(task = kind, "Error processing task: {}", e);
        }
    }

    async fn handle(&mut self, task: Task) -> Result<()> {
        match task {
            Task::WakeWordHeard { .. } => {
                self.listener.stop_listening();
                self.set_state(ConversationState::AwaitingInstruction);
                let reply = self.settings.wake_reply.clone();
                self.say(&reply).await;
                self.listener.start_listening();
                Ok(())
            }
            Task::Utterance { text } => {
                self.set_state(ConversationState::Idle);
                self.listener.stop_listening();
                self.regenerate_capabilities();
                let action = match self.filter.try_match(&text, &self.devices.aliases()) {
                    Some(action) => {
                        self.reasoner.remember(&text, Origin::User);
                        self.reasoner.remember(&action.to_json(), Origin::AssistantEcho);
                        action
                    }
                    None => self.reasoner.converse(&text, Origin::User).await,
                };
                let result = self.apply_action(action, Origin::User, true).await;
                self.listener.start_listening();
                result
            }
            Task::SystemNote { text } => {
                let action = self.reasoner.converse(&text, Origin::System).await;
                self.apply_action(action, Origin::System, true).await
            }
            Task::RobotStatus { payload } => {
                tracing::debug!(payload = %payload, "Robot status received");
                self.robot_status = payload;
                Ok(())
            }
            Task::RobotMoveCommand { cmd } => self.robot.send_command(RobotCommandKind::Move, &cmd).await,
            Task::RobotCarCommand { cmd } => self.robot.send_command(RobotCommandKind::Car, &cmd).await,
            Task::DeviceSetRequest { alias, status } => {
                let action = Action::control(vec![alias], vec![status], "");
                self.apply_action(action, Origin::System, false).await
            }
        }
    }

    /// 执行一个动作；announce 为 false 时不播报 ControlDevice 的消息
    pub async fn apply_action(&mut self, action: Action, origin: Origin, announce: bool) -> Result<()> {
        tracing::info!(action = action.kind.name(), origin = ?origin, "Applying action");
        let Action { message, kind } = action;
        match kind {
            ActionKind::ControlDevice { aliases, statuses } => {
                if announce && !message.is_empty() {
                    self.say(&message).await;
                }
                let outcomes = self.devices.change_device_status(&aliases, &statuses).await;
                let failed = outcomes.iter().filter(|o| !o.is_converged()).count();
                if failed > 0 {
                    tracing::warn!(failed, total = outcomes.len(), "Some devices did not reach their target status");
                }
                self.regenerate_capabilities();
            }
            ActionKind::MessageOnly { is_question } => {
                if message.trim().is_empty() {
                    let fallback = self.settings.fallback_reply.clone();
                    self.say(&fallback).await;
                } else {
                    self.say(&message).await;
                }
                if is_question && origin != Origin::System {
                    let prompt = self.settings.reply_prompt.clone();
                    self.say(&prompt).await;
                    self.set_state(ConversationState::AwaitingInstruction);
                }
            }
            ActionKind::ChangeVolume { percent } => {
                if !(0..=100).contains(&percent) {
                    tracing::warn!(percent, "Invalid volume requested");
                    self.sender.enqueue(Task::SystemNote {
                        text: format!("Volume {percent} is invalid, it must be an integer between 0 and 100."),
                    });
                    return Ok(());
                }
                self.speaker.set_volume(percent as u8).await?;
                if !message.is_empty() {
                    self.say(&message).await;
                }
            }
            ActionKind::SetTimer {
                delay_secs,
                actions,
                notify,
            } => {
                if actions
                    .iter()
                    .any(|a| matches!(a.kind, ActionKind::SetTimer { .. }))
                {
                    tracing::warn!("Nested SetTimer rejected");
                    self.sender.enqueue(Task::SystemNote {
                        text: "SetTimer cannot contain another SetTimer, the timer was not created.".to_string(),
                    });
                    return Ok(());
                }
                let delay = delay_secs.max(0);
                let due = if delay <= MAX_TIMER_DELAY_SECS {
                    chrono::Utc::now().timestamp().checked_add(delay)
                } else {
                    None
                };
                let Some(due) = due else {
                    tracing::warn!(delay_secs, "Invalid timer delay");
                    self.sender.enqueue(Task::SystemNote {
                        text: format!(
                            "Timer delay {delay_secs} seconds is invalid, it must be at most {MAX_TIMER_DELAY_SECS} seconds. The timer was not created."
                        ),
                    });
                    return Ok(());
                };
                self.timers.add_timer(due, actions, notify)?;
                if !message.is_empty() {
                    self.say(&message).await;
                }
            }
        }
        Ok(())
    }

    /// 周期维护：到期刷新设备表，触发到期定时器
    pub async fn maintain(&mut self) {
        if self.last_refresh.elapsed() >= self.settings.refresh_interval {
            let count = self.devices.refresh_all().await;
            self.last_refresh = Instant::now();
            tracing::info!(devices = count, "Periodic device refresh");
            self.regenerate_capabilities();
        }

        let due = self.timers.poll_due(chrono::Utc::now().timestamp());
        for entry in due {
            if entry.notify_on_fire {
                let notice = self.settings.timer_notice.clone();
                self.say(&notice).await;
            }
            for action in entry.actions {
                if let Err(e) = self.apply_action(action, Origin::System, true).await {
                    tracing::error!(timestamp = entry.timestamp, "Error running timer action: {}", e);
                }
            }
        }
    }

    fn regenerate_capabilities(&mut self) {
        let mut text = self.devices.capabilities_text();
        text.push_str(&self.speaker.capabilities_text());
        text.push_str(&self.timers.capabilities_text());
        self.reasoner.generate_capabilities(&text);
    }

    fn set_state(&self, next: ConversationState) {
        let previous = self.state_tx.send_replace(next);
        if previous != next {
            tracing::info!(from = ?previous, to = ?next, "Conversation state changed");
        }
    }

    async fn say(&self, text: &str) {
        if let Err(e) = self.speaker.speak(text).await {
            tracing::error!("Error speaking: {}", e);
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(HomeSnapshot {
            conversation: self.conversation_state(),
            devices: self.devices.infos(),
            messages: self.reasoner.history(),
            robot: RobotSnapshot {
                connected: self.robot.is_connected(),
                status: self.robot_status.clone(),
            },
            pending_timers: self.timers.len(),
        });
    }
}
