//! 持久化的“下载列表”：开始下载前在界面上编辑的链接集合。

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::warn;

use super::models::DownloadStatus;
use super::tracker::write_atomic;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingItem {
    pub url: String,
    #[serde(default)]
    pub added_at: String,
    #[serde(default)]
    pub status: DownloadStatus,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PendingFile {
    #[serde(default)]
    queue: Vec<PendingItem>,
}

/// 保存失败只记日志，不影响使用。
pub struct PendingList {
    path: PathBuf,
    items: Vec<PendingItem>,
}

impl PendingList {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let items = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<PendingFile>(&raw) {
                Ok(file) => file.queue,
                Err(err) => {
                    warn!(target: "queue", "下载列表 {} 无法解析，已忽略: {err}", path.display());
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };
        Self { path, items }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 已存在相同 URL 时返回 false，不重复添加。
    pub fn add(&mut self, url: &str) -> bool {
        let url = url.trim();
        if url.is_empty() || self.items.iter().any(|i| i.url == url) {
            return false;
        }
        self.items.push(PendingItem {
            url: url.to_string(),
            added_at: now_local_text(),
            status: DownloadStatus::Pending,
        });
        self.save();
        true
    }

    pub fn remove(&mut self, url: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|i| i.url != url);
        let removed = self.items.len() < before;
        if removed {
            self.save();
        }
        removed
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.save();
    }

    /// 移除已完成（成功或跳过）的条目，返回移除数量。
    pub fn clear_finished(&mut self) -> usize {
        let before = self.items.len();
        self.items.retain(|i| {
            !matches!(
                i.status,
                DownloadStatus::Success | DownloadStatus::SkippedDuplicate
            )
        });
        let removed = before - self.items.len();
        if removed > 0 {
            self.save();
        }
        removed
    }

    pub fn update_status(&mut self, url: &str, status: DownloadStatus) -> bool {
        let Some(item) = self.items.iter_mut().find(|i| i.url == url) else {
            return false;
        };
        item.status = status;
        self.save();
        true
    }

    /// 中断后遗留的“下载中”状态重置为等待。
    pub fn reset_in_progress(&mut self) {
        let mut changed = false;
        for item in &mut self.items {
            if item.status == DownloadStatus::InProgress {
                item.status = DownloadStatus::Pending;
                changed = true;
            }
        }
        if changed {
            self.save();
        }
    }

    pub fn all(&self) -> &[PendingItem] {
        &self.items
    }

    pub fn pending(&self) -> Vec<&PendingItem> {
        self.items
            .iter()
            .filter(|i| i.status == DownloadStatus::Pending)
            .collect()
    }

    /// 下一次批量下载要处理的链接：等待中和失败的条目。
    pub fn runnable_urls(&self) -> Vec<String> {
        self.items
            .iter()
            .filter(|i| matches!(i.status, DownloadStatus::Pending | DownloadStatus::Failed))
            .map(|i| i.url.clone())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.items.len()
    }

    pub fn count_pending(&self) -> usize {
        self.pending().len()
    }

    fn save(&self) {
        let body = match serde_json::to_string_pretty(&PendingFile {
            queue: self.items.clone(),
        }) {
            Ok(b) => b,
            Err(err) => {
                warn!(target: "queue", "序列化下载列表失败: {err}");
                return;
            }
        };
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
            && let Err(err) = fs::create_dir_all(parent)
        {
            warn!(target: "queue", "创建目录失败 {}: {err}", parent.display());
            return;
        }
        if let Err(err) = write_atomic(&self.path, body.as_bytes()) {
            warn!(target: "queue", "保存下载列表失败 {}: {err}", self.path.display());
        }
    }
}

fn now_local_text() -> String {
    OffsetDateTime::now_utc()
        .format(format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second]"
        ))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const A: &str = "https://www.vinted.it/items/1-a";
    const B: &str = "https://www.vinted.it/items/2-b";

    #[test]
    fn add_remove_and_persist() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data").join("download_queue.json");

        let mut list = PendingList::open(&path);
        assert!(list.add(A));
        assert!(!list.add(A));
        assert!(list.add(B));
        assert_eq!(list.count(), 2);
        assert!(list.remove(A));
        assert!(!list.remove(A));

        let reopened = PendingList::open(&path);
        assert_eq!(reopened.count(), 1);
        assert_eq!(reopened.all()[0].url, B);
        assert_eq!(reopened.all()[0].status, DownloadStatus::Pending);
    }

    #[test]
    fn status_updates_drive_pending_counts() {
        let dir = TempDir::new().unwrap();
        let mut list = PendingList::open(dir.path().join("q.json"));
        list.add(A);
        list.add(B);
        list.add("https://www.vinted.it/items/3-c");

        assert!(list.update_status(A, DownloadStatus::Success));
        assert!(list.update_status(B, DownloadStatus::Failed));
        assert!(!list.update_status("nope", DownloadStatus::Failed));
        assert_eq!(list.count_pending(), 1);
        assert_eq!(list.runnable_urls().len(), 2);

        assert_eq!(list.clear_finished(), 1);
        assert_eq!(list.count(), 2);
        list.clear();
        assert_eq!(list.count(), 0);
    }

    #[test]
    fn unreadable_file_gives_empty_list() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("q.json");
        fs::write(&path, "[[[").unwrap();
        assert_eq!(PendingList::open(&path).count(), 0);
    }

    #[test]
    fn reads_original_layout() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("q.json");
        fs::write(
            &path,
            r#"{"queue":[{"url":"https://www.vinted.it/items/5","added_at":"2025-01-02 10:00:00","status":"pending"}]}"#,
        )
        .unwrap();
        let mut list = PendingList::open(&path);
        assert_eq!(list.count_pending(), 1);
        list.update_status("https://www.vinted.it/items/5", DownloadStatus::InProgress);
        list.reset_in_progress();
        assert_eq!(list.count_pending(), 1);
    }
}
