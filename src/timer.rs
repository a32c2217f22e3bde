//! 持久化定时任务
//!
//! 每个条目对应目录下一个 `timer_<timestamp>.json` 文件，内容为 `{timestamp, actions, notify_on_fire}`。
//! 启动时全部读回；到期条目在 poll_due 中删除文件并交还给 Orchestrator 执行。
//! 相同时间戳的条目合并为一个，保持「一个时间戳一个文件」。

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::{Action, HearthError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerEntry {
    /// 到期时间（Unix 秒）
    pub timestamp: i64,
    pub actions: Vec<Action>,
    #[serde(default, alias = "notifyOnFire")]
    pub notify_on_fire: bool,
}

pub struct TimerScheduler {
    dir: PathBuf,
    entries: Vec<TimerEntry>,
}

impl TimerScheduler {
    /// 打开（必要时创建）定时任务目录并加载已有条目
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let mut scheduler = Self {
            dir,
            entries: Vec::new(),
        };
        scheduler.load_on_startup()?;
        Ok(scheduler)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_for(&self, timestamp: i64) -> PathBuf {
        self.dir.join(format!("timer_{timestamp}.json"))
    }

    /// 读取全部 `timer_*.json`；损坏的文件记录日志后跳过
    pub fn load_on_startup(&mut self) -> Result<usize> {
        let pattern = self.dir.join("timer_*.json");
        let pattern = pattern
            .to_str()
            .ok_or_else(|| HearthError::Timer(format!("non-utf8 timer dir {}", self.dir.display())))?;
        let paths = glob::glob(pattern).map_err(|e| HearthError::Timer(e.to_string()))?;

        self.entries.clear();
        for path in paths.flatten() {
            let parsed = std::fs::read_to_string(&path)
                .map_err(HearthError::from)
                .and_then(|text| serde_json::from_str::<TimerEntry>(&text).map_err(HearthError::from));
            match parsed {
                Ok(entry) => self.entries.push(entry),
                Err(e) => tracing::warn!(path = %path.display(), "Skipping unreadable timer file: {}", e),
            }
        }
        self.entries.sort_by_key(|e| e.timestamp);
        tracing::info!(count = self.entries.len(), dir = %self.dir.display(), "Timers loaded");
        Ok(self.entries.len())
    }

    /// 新增条目并立即落盘；与已有时间戳相同则合并
    pub fn add_timer(&mut self, timestamp: i64, actions: Vec<Action>, notify_on_fire: bool) -> Result<()> {
        let index = match self.entries.iter().position(|e| e.timestamp == timestamp) {
            Some(i) => {
                let existing = &mut self.entries[i];
                existing.actions.extend(actions);
                existing.notify_on_fire |= notify_on_fire;
                i
            }
            None => {
                let at = self.entries.partition_point(|e| e.timestamp <= timestamp);
                self.entries.insert(
                    at,
                    TimerEntry {
                        timestamp,
                        actions,
                        notify_on_fire,
                    },
                );
                at
            }
        };
        let entry = &self.entries[index];
        std::fs::write(self.file_for(timestamp), serde_json::to_string_pretty(entry)?)?;
        tracing::info!(timestamp, actions = entry.actions.len(), "Timer saved");
        Ok(())
    }

    /// 取出所有 timestamp <= now 的条目（按时间顺序），并删除对应文件
    pub fn poll_due(&mut self, now: i64) -> Vec<TimerEntry> {
        let split = self.entries.partition_point(|e| e.timestamp <= now);
        let due: Vec<TimerEntry> = self.entries.drain(..split).collect();
        for entry in &due {
            let path = self.file_for(entry.timestamp);
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), "Failed to remove fired timer file: {}", e);
            }
        }
        if !due.is_empty() {
            tracing::info!(count = due.len(), "Timers fired");
        }
        due
    }

    pub fn pending(&self) -> &[TimerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// SetTimer 动作说明（写入 LLM system prompt）
    pub fn capabilities_text(&self) -> String {
        "\n\nAction: SetTimer\n\
         description: run other actions later, e.g. turn off a device after some minutes\n\
         parameters:\n\
         - timestamp: seconds from now when the actions should run\n\
         - actions: a list of actions in the same JSON format (SetTimer itself is not allowed)\n\
         - notify: true if the user should be told when the timer fires\n\n"
            .to_string()
    }
}
