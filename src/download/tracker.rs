//! 已下载商品记录（去重）。
//!
//! 记录文件为 JSON：`{ "version": 1, "items": { "<item_id>": { ... } } }`。
//! 文件损坏时从空记录开始并给出警告，损坏的原文件在第一次保存前改名备份；
//! 单条损坏的记录会被跳过。旧版按卖家嵌套的格式会在读取时自动迁移。

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use tracing::{debug, info, warn};

use super::models::{DownloadRecord, DownloadStatus, QueueEntry};

const STORE_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("io error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("serialize tracking store failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerStats {
    pub sellers: usize,
    pub items: usize,
    pub images: usize,
}

#[derive(Serialize)]
struct StoreFile<'a> {
    version: u32,
    items: &'a BTreeMap<String, DownloadRecord>,
}

pub struct DuplicateTracker {
    path: PathBuf,
    records: BTreeMap<String, DownloadRecord>,
    /// 读取时发现原文件损坏，保存前需要先备份
    corrupt: bool,
    warnings: Vec<String>,
}

impl DuplicateTracker {
    /// 打开记录文件。读取失败不会报错，只会记录警告并从空记录开始。
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut tracker = Self {
            path,
            records: BTreeMap::new(),
            corrupt: false,
            warnings: Vec::new(),
        };
        tracker.load();
        tracker
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取过程中产生的警告（损坏文件、跳过的记录等）。
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, item_id: &str) -> Option<&DownloadRecord> {
        self.records.get(item_id)
    }

    /// 只有状态为 success 的记录才算“已下载”。
    pub fn is_downloaded(&self, item_id: &str) -> bool {
        self.records
            .get(item_id)
            .is_some_and(|r| r.status == DownloadStatus::Success)
    }

    /// 派发前登记：同一 item_id 的旧记录被替换，不会产生第二条。
    pub fn mark_pending(&mut self, entry: &QueueEntry, closet: &str) -> Result<(), TrackerError> {
        let record = DownloadRecord::pending(entry, closet, now_rfc3339());
        self.records.insert(entry.item_id.clone(), record);
        self.save()
    }

    pub fn record(&mut self, record: DownloadRecord) -> Result<(), TrackerError> {
        debug!(target: "tracker", "record {} -> {}", record.item_id, record.status);
        self.records.insert(record.item_id.clone(), record);
        self.save()
    }

    pub fn forget(&mut self, item_id: &str) -> Result<bool, TrackerError> {
        if self.records.remove(item_id).is_none() {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    pub fn stats(&self) -> TrackerStats {
        let mut sellers = BTreeSet::new();
        let mut stats = TrackerStats::default();
        for rec in self.successful() {
            sellers.insert(rec.seller.as_str());
            stats.items += 1;
            stats.images += rec.image_count;
        }
        stats.sellers = sellers.len();
        stats
    }

    pub fn seller_stats(&self, seller: &str) -> TrackerStats {
        let recs = self.records_for_seller(seller);
        TrackerStats {
            sellers: usize::from(!recs.is_empty()),
            items: recs.len(),
            images: recs.iter().map(|r| r.image_count).sum(),
        }
    }

    /// 某个卖家已成功下载的记录，按 item_id 排序。
    pub fn records_for_seller(&self, seller: &str) -> Vec<&DownloadRecord> {
        self.successful().filter(|r| r.seller == seller).collect()
    }

    pub fn save(&mut self) -> Result<(), TrackerError> {
        if self.corrupt {
            self.backup_corrupt_file();
            self.corrupt = false;
        }

        let body = serde_json::to_string_pretty(&StoreFile {
            version: STORE_VERSION,
            items: &self.records,
        })?;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| TrackerError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        write_atomic(&self.path, body.as_bytes()).map_err(|source| TrackerError::Io {
            path: self.path.clone(),
            source,
        })
    }

    fn successful(&self) -> impl Iterator<Item = &DownloadRecord> {
        self.records
            .values()
            .filter(|r| r.status == DownloadStatus::Success)
    }

    fn warn(&mut self, msg: String) {
        warn!(target: "tracker", "{msg}");
        self.warnings.push(msg);
    }

    fn load(&mut self) {
        if !self.path.exists() {
            return;
        }

        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) => {
                self.corrupt = true;
                self.warn(format!(
                    "无法读取下载记录 {}: {err}，将视为没有下载过任何商品",
                    self.path.display()
                ));
                return;
            }
        };
        if raw.trim().is_empty() {
            return;
        }

        let value: Value = match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(err) => {
                self.corrupt = true;
                self.warn(format!(
                    "下载记录 {} 不是有效的 JSON（{err}），将视为没有下载过任何商品",
                    self.path.display()
                ));
                return;
            }
        };

        let Value::Object(mut root) = value else {
            self.corrupt = true;
            self.warn(format!(
                "下载记录 {} 格式不正确，将视为没有下载过任何商品",
                self.path.display()
            ));
            return;
        };

        match root.remove("items") {
            Some(Value::Object(items)) => self.load_items(items),
            Some(_) => {
                self.corrupt = true;
                self.warn(format!(
                    "下载记录 {} 的 items 字段格式不正确，将视为没有下载过任何商品",
                    self.path.display()
                ));
            }
            None => self.migrate_legacy(root),
        }

        info!(target: "tracker", "已加载 {} 条下载记录", self.records.len());
    }

    fn load_items(&mut self, items: Map<String, Value>) {
        for (key, value) in items {
            match serde_json::from_value::<DownloadRecord>(value) {
                Ok(mut rec) => {
                    if rec.item_id.is_empty() {
                        rec.item_id = key.clone();
                    }
                    self.records.insert(key, rec);
                }
                Err(err) => {
                    // 保存前备份原文件，被跳过的条目不会就此丢失
                    self.corrupt = true;
                    self.warn(format!("跳过损坏的下载记录 {key}: {err}"));
                }
            }
        }
    }

    /// 旧格式：`{ seller: { "item_<id>": { url, title, img_count } } }`
    fn migrate_legacy(&mut self, root: Map<String, Value>) {
        let mut migrated = 0usize;
        for (seller, items) in root {
            let Value::Object(items) = items else {
                self.corrupt = true;
                self.warn(format!("跳过损坏的旧版记录（卖家 {seller}）"));
                continue;
            };
            for (key, value) in items {
                let id = key.strip_prefix("item_").unwrap_or(&key).to_string();
                let Value::Object(fields) = value else {
                    self.corrupt = true;
                    self.warn(format!("跳过损坏的旧版记录 {seller}/{key}"));
                    continue;
                };
                let text = |name: &str| {
                    fields
                        .get(name)
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string()
                };
                let record = DownloadRecord {
                    item_id: id.clone(),
                    link: text("url"),
                    closet: "closet".to_string(),
                    seller: seller.clone(),
                    title: text("title"),
                    downloaded_at: String::new(),
                    destination: None,
                    status: DownloadStatus::Success,
                    image_count: fields
                        .get("img_count")
                        .and_then(Value::as_u64)
                        .map(|n| n as usize)
                        .unwrap_or(0),
                    files: Vec::new(),
                    error: None,
                };
                self.records.insert(id, record);
                migrated += 1;
            }
        }
        if migrated > 0 {
            info!(target: "tracker", "已从旧版格式迁移 {migrated} 条下载记录");
        }
    }

    fn backup_corrupt_file(&mut self) {
        if !self.path.exists() {
            return;
        }
        let stamp = OffsetDateTime::now_utc()
            .format(format_description!(
                "[year][month][day]_[hour][minute][second]"
            ))
            .unwrap_or_else(|_| "backup".to_string());
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(format!(".corrupt-{stamp}"));
        let backup = self.path.with_file_name(name);
        match fs::rename(&self.path, &backup) {
            Ok(()) => warn!(target: "tracker", "损坏的下载记录已备份到 {}", backup.display()),
            Err(err) => warn!(target: "tracker", "备份损坏的下载记录失败: {err}"),
        }
    }
}

pub(crate) fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

/// 先写临时文件再改名，避免中途退出留下半个文件。
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension(format!(
        "{}part",
        path.extension().and_then(|s| s.to_str()).unwrap_or("")
    ));
    fs::write(&tmp, bytes)?;
    fs::rename(tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn success(id: &str, seller: &str, images: usize) -> DownloadRecord {
        let entry = QueueEntry::new(&format!("https://www.vinted.it/items/{id}-x"));
        let mut rec = DownloadRecord::pending(&entry, "closet", now_rfc3339());
        rec.seller = seller.to_string();
        rec.title = format!("title {id}");
        rec.image_count = images;
        rec.status = DownloadStatus::Success;
        rec
    }

    #[test]
    fn record_survives_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("downloaded_items.json");

        let mut tracker = DuplicateTracker::open(&path);
        assert!(tracker.is_empty());
        tracker.record(success("101", "alice", 3)).unwrap();

        let reloaded = DuplicateTracker::open(&path);
        assert!(reloaded.is_downloaded("101"));
        assert_eq!(reloaded.get("101").unwrap().status, DownloadStatus::Success);
        assert_eq!(reloaded.get("101").unwrap().image_count, 3);
        assert!(reloaded.warnings().is_empty());
    }

    #[test]
    fn pending_and_failed_are_not_downloaded() {
        let dir = TempDir::new().unwrap();
        let mut tracker = DuplicateTracker::open(dir.path().join("t.json"));
        let entry = QueueEntry::new("https://www.vinted.it/items/7-a");
        tracker.mark_pending(&entry, "closet").unwrap();
        assert!(!tracker.is_downloaded("7"));
        assert_eq!(tracker.get("7").unwrap().status, DownloadStatus::Pending);

        let mut rec = tracker.get("7").unwrap().clone();
        rec.status = DownloadStatus::Failed;
        tracker.record(rec).unwrap();
        assert!(!tracker.is_downloaded("7"));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn corrupt_file_starts_empty_and_is_backed_up_on_save() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("downloaded_items.json");
        fs::write(&path, "{ not json").unwrap();

        let mut tracker = DuplicateTracker::open(&path);
        assert!(tracker.is_empty());
        assert_eq!(tracker.warnings().len(), 1);
        // 只读取不会改动原文件
        assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");

        tracker.record(success("5", "bob", 1)).unwrap();
        let backups: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".corrupt-"))
            .collect();
        assert_eq!(backups.len(), 1);
        assert_eq!(
            fs::read_to_string(backups[0].path()).unwrap(),
            "{ not json"
        );
        assert!(DuplicateTracker::open(&path).is_downloaded("5"));
    }

    #[test]
    fn corrupt_entry_is_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.json");
        fs::write(
            &path,
            r#"{"version":1,"items":{
                "1":{"item_id":"1","status":"success","seller":"a","image_count":2},
                "2":{"item_id":"2","status":"exploded"},
                "3":"garbage"
            }}"#,
        )
        .unwrap();

        let raw = fs::read_to_string(&path).unwrap();

        let mut tracker = DuplicateTracker::open(&path);
        assert_eq!(tracker.len(), 1);
        assert!(tracker.is_downloaded("1"));
        assert_eq!(tracker.warnings().len(), 2);

        // 第一次保存前原文件被备份，跳过的条目仍可找回
        tracker.record(success("4", "a", 1)).unwrap();
        let backups: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".corrupt-"))
            .collect();
        assert_eq!(backups.len(), 1);
        assert_eq!(fs::read_to_string(backups[0].path()).unwrap(), raw);

        let reloaded = DuplicateTracker::open(&path);
        assert!(reloaded.is_downloaded("1"));
        assert!(reloaded.is_downloaded("4"));
        assert!(reloaded.warnings().is_empty());
    }

    #[test]
    fn legacy_nested_layout_is_migrated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.json");
        fs::write(
            &path,
            r#"{"alice":{"item_11":{"url":"https://www.vinted.it/items/11","title":"Gonna","img_count":4}},
                "bob":{"item_12":{"url":"https://www.vinted.it/items/12","title":"Borsa","img_count":2},
                       "item_13":{"url":"https://www.vinted.it/items/13","title":"Felpa","img_count":1}}}"#,
        )
        .unwrap();

        let tracker = DuplicateTracker::open(&path);
        assert!(tracker.is_downloaded("11"));
        assert_eq!(tracker.get("12").unwrap().seller, "bob");
        assert_eq!(
            tracker.stats(),
            TrackerStats {
                sellers: 2,
                items: 3,
                images: 7
            }
        );
        assert_eq!(tracker.seller_stats("bob").items, 2);
        assert_eq!(tracker.records_for_seller("bob").len(), 2);
        assert_eq!(tracker.seller_stats("nobody"), TrackerStats::default());
    }

    #[test]
    fn forget_removes_record() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.json");
        let mut tracker = DuplicateTracker::open(&path);
        tracker.record(success("9", "c", 1)).unwrap();
        assert!(tracker.forget("9").unwrap());
        assert!(!tracker.forget("9").unwrap());
        assert!(!DuplicateTracker::open(&path).is_downloaded("9"));
    }
}
