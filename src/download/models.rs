//! 下载相关的数据模型定义。
//!
//! 包含下载状态、下载记录、队列条目、单条结果、批次汇总、进度快照与队列事件。

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::base_system::item_id;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    #[default]
    Pending,
    InProgress,
    Success,
    Failed,
    SkippedDuplicate,
}

impl DownloadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DownloadStatus::Pending => "pending",
            DownloadStatus::InProgress => "in_progress",
            DownloadStatus::Success => "success",
            DownloadStatus::Failed => "failed",
            DownloadStatus::SkippedDuplicate => "skipped_duplicate",
        }
    }

    /// 界面上显示的短标签。
    pub fn label(self) -> &'static str {
        match self {
            DownloadStatus::Pending => "等待",
            DownloadStatus::InProgress => "下载中",
            DownloadStatus::Success => "完成",
            DownloadStatus::Failed => "失败",
            DownloadStatus::SkippedDuplicate => "已跳过",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DownloadStatus::Success | DownloadStatus::Failed | DownloadStatus::SkippedDuplicate
        )
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 记录文件中的一条：每个 item_id 至多一条。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadRecord {
    pub item_id: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub closet: String,
    #[serde(default)]
    pub seller: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub downloaded_at: String,
    #[serde(default)]
    pub destination: Option<PathBuf>,
    #[serde(default)]
    pub status: DownloadStatus,
    #[serde(default)]
    pub image_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DownloadRecord {
    pub fn pending(entry: &QueueEntry, closet: &str, at: String) -> Self {
        Self {
            item_id: entry.item_id.clone(),
            link: entry.link.clone(),
            closet: closet.to_string(),
            seller: String::new(),
            title: String::new(),
            downloaded_at: at,
            destination: None,
            status: DownloadStatus::Pending,
            image_count: 0,
            files: Vec::new(),
            error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub link: String,
    /// 去重键：数字 item_id，或 `url:<link>`。
    pub item_id: String,
}

impl QueueEntry {
    pub fn new(link: &str) -> Self {
        let link = link.trim().to_string();
        let item_id = item_id::tracking_key(&link);
        Self { link, item_id }
    }
}

#[derive(Debug, Clone)]
pub struct ItemOutcome {
    pub entry: QueueEntry,
    pub status: DownloadStatus,
    pub destination: Option<PathBuf>,
    pub files: usize,
    pub error: Option<String>,
    pub elapsed: Duration,
}

impl ItemOutcome {
    pub(crate) fn immediate(entry: QueueEntry, status: DownloadStatus) -> Self {
        Self {
            entry,
            status,
            destination: None,
            files: 0,
            error: None,
            elapsed: Duration::ZERO,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct BatchReport {
    pub outcomes: Vec<ItemOutcome>,
    pub success: u32,
    pub failed: u32,
    pub skipped: u32,
    pub canceled: u32,
}

impl BatchReport {
    pub(crate) fn push(&mut self, outcome: ItemOutcome) {
        match outcome.status {
            DownloadStatus::Success => self.success += 1,
            DownloadStatus::Failed => self.failed += 1,
            DownloadStatus::SkippedDuplicate => self.skipped += 1,
            DownloadStatus::Pending | DownloadStatus::InProgress => self.canceled += 1,
        }
        self.outcomes.push(outcome);
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    pub fn summary(&self) -> String {
        format!(
            "成功 {}，失败 {}，跳过 {}，取消 {}",
            self.success, self.failed, self.skipped, self.canceled
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub items_done: usize,
    pub items_total: usize,
    pub images_done: usize,
    pub images_total: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl ProgressSnapshot {
    pub fn item_ratio(&self) -> f64 {
        ratio(self.items_done, self.items_total)
    }

    pub fn image_ratio(&self) -> f64 {
        ratio(self.images_done, self.images_total)
    }
}

fn ratio(done: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        (done as f64 / total as f64).clamp(0.0, 1.0)
    }
}

/// 队列运行时推送给调用方（TUI / CLI）的事件。`index` 为条目在批次中的位置。
#[derive(Debug, Clone)]
pub enum QueueEvent {
    Started { index: usize, entry: QueueEntry },
    Output { index: usize, line: String },
    Progress(ProgressSnapshot),
    Finished { index: usize, outcome: ItemOutcome },
}
