//! 队列管理：按顺序处理一批链接。
//!
//! 协调线程负责查重、派发、整理与写记录；工作线程只在各自的暂存目录里运行下载器。
//! 单条失败不影响其他条目；停止标志置位后不再派发新的条目，已在运行的条目正常收尾。

use std::collections::{HashMap, HashSet};
use std::fs;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel as channel;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use super::external::{ExternalDownloader, FetchError, FetchReport, ItemFetcher};
use super::models::{
    BatchReport, DownloadRecord, DownloadStatus, ItemOutcome, QueueEntry, QueueEvent,
};
use super::organizer::FileOrganizer;
use super::progress::{OutputEvent, ProgressReporter, make_reporter, parse_output_line};
use super::tracker::{DuplicateTracker, now_rfc3339};
use crate::base_system::context::{Config, normalize_name};

pub const MAX_WORKERS: usize = 4;

#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// false 时强制重新下载，旧记录被替换
    pub skip_duplicates: bool,
    pub auto_organize: bool,
    pub max_workers: usize,
    /// 下载器输出目录，暂存目录也建在这里
    pub output_dir: PathBuf,
    /// 无 UI 回调时在终端显示 indicatif 进度条
    pub cli_progress: bool,
}

impl QueueOptions {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            skip_duplicates: cfg.skip_duplicates,
            auto_organize: cfg.auto_organize,
            max_workers: cfg.worker_count(),
            output_dir: cfg.default_save_dir(),
            cli_progress: false,
        }
    }
}

// ── 下载器工作池 ──────────────────────────────────────────────────

struct FetchJob {
    index: usize,
    link: String,
    work_dir: PathBuf,
}

enum WorkerEvent {
    Line {
        index: usize,
        line: String,
    },
    Done {
        index: usize,
        result: Result<FetchReport, FetchError>,
        elapsed: Duration,
    },
}

struct FetchPool {
    tx: Option<channel::Sender<FetchJob>>,
    rx_evt: channel::Receiver<WorkerEvent>,
    handles: Vec<JoinHandle<()>>,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl FetchPool {
    fn new(fetcher: Arc<dyn ItemFetcher>, workers: usize) -> Self {
        let (tx, rx) = channel::unbounded::<FetchJob>();
        let (tx_evt, rx_evt) = channel::unbounded::<WorkerEvent>();

        let mut handles = Vec::with_capacity(workers);
        for n in 0..workers {
            let rx = rx.clone();
            let tx_evt = tx_evt.clone();
            let fetcher = Arc::clone(&fetcher);
            let spawned = std::thread::Builder::new()
                .name(format!("fetch-{n}"))
                .spawn(move || {
                    for job in rx.iter() {
                        let started = Instant::now();
                        let index = job.index;
                        // 下载器 panic 也要回报 Done，否则协调线程会一直等下去
                        let result = panic::catch_unwind(AssertUnwindSafe(|| {
                            fetcher.fetch(&job.link, &job.work_dir, &mut |line| {
                                let _ = tx_evt.send(WorkerEvent::Line {
                                    index,
                                    line: line.to_string(),
                                });
                            })
                        }))
                        .unwrap_or_else(|payload| {
                            Err(FetchError::Panicked(panic_message(payload.as_ref())))
                        });
                        let _ = tx_evt.send(WorkerEvent::Done {
                            index,
                            result,
                            elapsed: started.elapsed(),
                        });
                    }
                });
            match spawned {
                Ok(h) => handles.push(h),
                Err(err) => warn!(target: "queue", "启动下载线程失败: {err}"),
            }
        }

        Self {
            tx: Some(tx),
            rx_evt,
            handles,
        }
    }

    fn capacity(&self) -> usize {
        self.handles.len()
    }

    fn submit(&self, job: FetchJob) -> bool {
        self.tx.as_ref().is_some_and(|tx| tx.send(job).is_ok())
    }

    fn shutdown(&mut self) {
        self.tx.take();
        for h in self.handles.drain(..) {
            let _ = h.join();
        }
    }
}

// ── 队列 ──────────────────────────────────────────────────

struct InFlight {
    entry: QueueEntry,
    staging: Option<TempDir>,
    work_dir: PathBuf,
    images: usize,
}

pub struct QueueManager {
    fetcher: Arc<dyn ItemFetcher>,
    tracker: DuplicateTracker,
    organizer: FileOrganizer,
    options: QueueOptions,
}

impl QueueManager {
    pub fn new(
        fetcher: Arc<dyn ItemFetcher>,
        tracker: DuplicateTracker,
        organizer: FileOrganizer,
        options: QueueOptions,
    ) -> Self {
        Self {
            fetcher,
            tracker,
            organizer,
            options,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(
            Arc::new(ExternalDownloader::from_config(cfg)),
            DuplicateTracker::open(cfg.tracking_file_path()),
            FileOrganizer::from_config(cfg),
            QueueOptions::from_config(cfg),
        )
    }

    pub fn tracker(&self) -> &DuplicateTracker {
        &self.tracker
    }

    pub fn options_mut(&mut self) -> &mut QueueOptions {
        &mut self.options
    }

    /// 处理一批链接，返回与输入顺序一致的逐条结果。
    pub fn run(
        &mut self,
        links: &[String],
        cancel: &AtomicBool,
        on_event: &mut dyn FnMut(QueueEvent),
    ) -> BatchReport {
        let entries: Vec<QueueEntry> = links
            .iter()
            .map(|l| QueueEntry::new(l))
            .filter(|e| !e.link.is_empty())
            .collect();

        let mut reporter = make_reporter(entries.len(), self.options.cli_progress);
        on_event(QueueEvent::Progress(reporter.snapshot));

        let workers = self.options.max_workers.clamp(1, MAX_WORKERS);
        let mut pool = FetchPool::new(Arc::clone(&self.fetcher), workers);
        let capacity = pool.capacity();
        info!(
            target: "queue",
            "开始下载 {} 个链接（并发 {}）",
            entries.len(),
            capacity
        );

        let mut outcomes: Vec<Option<ItemOutcome>> = vec![None; entries.len()];
        let mut seen: HashSet<String> = HashSet::new();
        let mut in_flight: HashMap<usize, InFlight> = HashMap::new();
        let mut next = 0usize;

        loop {
            while in_flight.len() < capacity && next < entries.len() {
                if cancel.load(Ordering::Relaxed) {
                    break;
                }
                let index = next;
                next += 1;
                let entry = entries[index].clone();

                if !seen.insert(entry.item_id.clone()) {
                    info!(target: "queue", "同一批次中重复的链接，跳过: {}", entry.link);
                    let outcome = ItemOutcome::immediate(entry, DownloadStatus::SkippedDuplicate);
                    finish(&mut reporter, &mut outcomes, on_event, index, outcome);
                    continue;
                }
                if self.options.skip_duplicates && self.tracker.is_downloaded(&entry.item_id) {
                    info!(target: "queue", "已下载过，跳过: {}", entry.link);
                    let outcome = ItemOutcome::immediate(entry, DownloadStatus::SkippedDuplicate);
                    finish(&mut reporter, &mut outcomes, on_event, index, outcome);
                    continue;
                }

                match self.dispatch(index, &entry, &pool) {
                    Ok(flight) => {
                        on_event(QueueEvent::Started {
                            index,
                            entry: entry.clone(),
                        });
                        in_flight.insert(index, flight);
                    }
                    Err(err) => {
                        warn!(target: "queue", "无法开始下载 {}: {err:#}", entry.link);
                        let mut outcome = ItemOutcome::immediate(entry, DownloadStatus::Failed);
                        outcome.error = Some(format!("{err:#}"));
                        finish(&mut reporter, &mut outcomes, on_event, index, outcome);
                    }
                }
            }

            if in_flight.is_empty() {
                break;
            }

            let Ok(evt) = pool.rx_evt.recv() else {
                warn!(target: "queue", "下载线程意外退出");
                break;
            };
            match evt {
                WorkerEvent::Line { index, line } => {
                    debug!(target: "external", "[{index}] {line}");
                    if let Some(ev) = parse_output_line(&line) {
                        if ev == OutputEvent::ImageDownloaded
                            && let Some(flight) = in_flight.get_mut(&index)
                        {
                            flight.images += 1;
                        }
                        if reporter.apply(ev) {
                            on_event(QueueEvent::Progress(reporter.snapshot));
                        }
                    }
                    on_event(QueueEvent::Output { index, line });
                }
                WorkerEvent::Done {
                    index,
                    result,
                    elapsed,
                } => {
                    let Some(flight) = in_flight.remove(&index) else {
                        continue;
                    };
                    let outcome = self.complete(flight, result, elapsed);
                    finish(&mut reporter, &mut outcomes, on_event, index, outcome);
                }
            }
        }

        // 停止后尚未派发的条目保持 pending
        for (index, entry) in entries.iter().enumerate() {
            if outcomes[index].is_none() {
                let outcome = ItemOutcome::immediate(entry.clone(), DownloadStatus::Pending);
                finish(&mut reporter, &mut outcomes, on_event, index, outcome);
            }
        }

        pool.shutdown();
        reporter.finish_cli_bars();

        let mut report = BatchReport::default();
        for outcome in outcomes.into_iter().flatten() {
            report.push(outcome);
        }
        info!(target: "queue", "批量下载结束：{}", report.summary());
        report
    }

    fn dispatch(&mut self, index: usize, entry: &QueueEntry, pool: &FetchPool) -> Result<InFlight> {
        let out = &self.options.output_dir;
        fs::create_dir_all(out).with_context(|| format!("创建输出目录失败: {}", out.display()))?;

        let (staging, work_dir) = if self.options.auto_organize {
            let tmp = tempfile::Builder::new()
                .prefix(".staging-")
                .tempdir_in(out)
                .with_context(|| format!("创建暂存目录失败: {}", out.display()))?;
            let path = tmp.path().to_path_buf();
            (Some(tmp), path)
        } else {
            (None, out.clone())
        };

        if let Err(err) = self
            .tracker
            .mark_pending(entry, &self.organizer.closet_name())
        {
            warn!(target: "tracker", "写入下载记录失败: {err}");
        }

        let submitted = pool.submit(FetchJob {
            index,
            link: entry.link.clone(),
            work_dir: work_dir.clone(),
        });
        if !submitted {
            anyhow::bail!("下载线程不可用");
        }
        info!(target: "queue", "开始下载 {}", entry.link);

        Ok(InFlight {
            entry: entry.clone(),
            staging,
            work_dir,
            images: 0,
        })
    }

    fn complete(
        &mut self,
        flight: InFlight,
        result: Result<FetchReport, FetchError>,
        elapsed: Duration,
    ) -> ItemOutcome {
        let InFlight {
            entry,
            staging,
            work_dir,
            images,
        } = flight;

        let mut record = self.tracker.get(&entry.item_id).cloned().unwrap_or_else(|| {
            DownloadRecord::pending(&entry, &self.organizer.closet_name(), String::new())
        });
        record.downloaded_at = now_rfc3339();
        record.error = None;

        let mut outcome = ItemOutcome::immediate(entry, DownloadStatus::Failed);
        outcome.elapsed = elapsed;

        match result {
            Err(err) => {
                warn!(target: "queue", "下载失败 {}: {err}", outcome.entry.link);
                outcome.error = Some(err.to_string());
            }
            Ok(_) if self.options.auto_organize => match self.organizer.organize(&work_dir) {
                Ok(rep) => {
                    record.seller = rep.metadata.seller;
                    record.title = rep.metadata.title;
                    record.image_count = rep.files.len();
                    record.destination = Some(rep.seller_dir.clone());
                    outcome.status = DownloadStatus::Success;
                    outcome.destination = Some(rep.seller_dir);
                    outcome.files = rep.files.len();
                    record.files = rep.files;
                }
                Err(err) => {
                    warn!(target: "organizer", "整理失败 {}: {err}", outcome.entry.link);
                    outcome.error = Some(format!("整理失败: {err}"));
                    let kept = self.keep_unorganized(&outcome.entry, &work_dir);
                    record.destination = kept.clone();
                    outcome.destination = kept;
                }
            },
            Ok(_) => {
                record.image_count = images;
                record.destination = Some(work_dir.clone());
                outcome.status = DownloadStatus::Success;
                outcome.destination = Some(work_dir);
                outcome.files = images;
            }
        }

        record.status = outcome.status;
        record.error = outcome.error.clone();
        if let Err(err) = self.tracker.record(record) {
            warn!(target: "tracker", "写入下载记录失败: {err}");
        }

        // 暂存目录在这里清理
        drop(staging);
        if outcome.status == DownloadStatus::Success {
            info!(
                target: "queue",
                "下载完成 {}（{} 张图片，{:.1}s）",
                outcome.entry.link,
                outcome.files,
                outcome.elapsed.as_secs_f64()
            );
        }
        outcome
    }

    /// 整理失败时把暂存目录改名保留下来，避免已下载的文件随暂存目录一起删除。
    fn keep_unorganized(&self, entry: &QueueEntry, staging: &Path) -> Option<PathBuf> {
        let base = format!("unorganized_{}", normalize_name(&entry.item_id));
        let mut target = self.options.output_dir.join(&base);
        let mut n = 1usize;
        while target.exists() {
            target = self.options.output_dir.join(format!("{base}_dup{n}"));
            n += 1;
        }
        match fs::rename(staging, &target) {
            Ok(()) => {
                warn!(target: "organizer", "未整理的文件保留在 {}", target.display());
                Some(target)
            }
            Err(err) => {
                warn!(target: "organizer", "保留未整理文件失败: {err}");
                None
            }
        }
    }
}

fn finish(
    reporter: &mut ProgressReporter,
    outcomes: &mut [Option<ItemOutcome>],
    on_event: &mut dyn FnMut(QueueEvent),
    index: usize,
    outcome: ItemOutcome,
) {
    reporter.item_finished(outcome.status);
    if outcome.status == DownloadStatus::Failed {
        reporter.println(&format!(
            "失败: {} ({})",
            outcome.entry.link,
            outcome.error.as_deref().unwrap_or("")
        ));
    }
    on_event(QueueEvent::Progress(reporter.snapshot));
    on_event(QueueEvent::Finished {
        index,
        outcome: outcome.clone(),
    });
    outcomes[index] = Some(outcome);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use crate::base_system::item_id::parse_item_id;

    /// 模拟下载器：写出 item.json 和两张图片；链接含 `fail` 时失败，含 `panic` 时 panic。
    #[derive(Default)]
    struct FakeFetcher {
        calls: AtomicUsize,
        stop_on_first: Option<Arc<AtomicBool>>,
        delay: Duration,
    }

    impl ItemFetcher for FakeFetcher {
        fn fetch(
            &self,
            link: &str,
            work_dir: &Path,
            sink: &mut dyn FnMut(&str),
        ) -> Result<FetchReport, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(flag) = &self.stop_on_first {
                flag.store(true, Ordering::SeqCst);
            }
            std::thread::sleep(self.delay);

            sink("Downloading details for item");
            if link.contains("panic") {
                panic!("fetcher blew up on {link}");
            }
            if link.contains("fail") {
                sink("HTTP 404");
                return Err(FetchError::Exit {
                    code: Some(1),
                    tail: "HTTP 404".to_string(),
                });
            }

            let id = parse_item_id(link).unwrap_or_else(|| "0".to_string());
            fs::write(
                work_dir.join("item.json"),
                format!(r#"{{"id": {id}, "title": "Item {id}", "user": {{"login": "seller_one"}}}}"#),
            )?;
            sink("Found data: 2 images");
            for n in 1..=2 {
                fs::write(work_dir.join(format!("photo_{n}.jpg")), b"jpg")?;
                sink(&format!("Downloading resource: photo_{n}.jpg"));
            }
            Ok(FetchReport {
                lines: 4,
                tail: Vec::new(),
            })
        }
    }

    struct Harness {
        dir: tempfile::TempDir,
        fetcher: Arc<FakeFetcher>,
        manager: QueueManager,
    }

    fn harness(fetcher: FakeFetcher, workers: usize) -> Harness {
        let dir = tempfile::TempDir::new().unwrap();
        let fetcher = Arc::new(fetcher);
        let manager = QueueManager::new(
            fetcher.clone(),
            DuplicateTracker::open(dir.path().join("downloaded_items.json")),
            FileOrganizer::new(dir.path().join("out").join("closet"), true),
            QueueOptions {
                skip_duplicates: true,
                auto_organize: true,
                max_workers: workers,
                output_dir: dir.path().join("out"),
                cli_progress: false,
            },
        );
        Harness {
            dir,
            fetcher,
            manager,
        }
    }

    fn links(ids: &[&str]) -> Vec<String> {
        ids.iter()
            .map(|id| format!("https://www.vinted.it/items/{id}"))
            .collect()
    }

    fn statuses(report: &BatchReport) -> Vec<DownloadStatus> {
        report.outcomes.iter().map(|o| o.status).collect()
    }

    fn run(h: &mut Harness, links: &[String]) -> BatchReport {
        let cancel = AtomicBool::new(false);
        h.manager.run(links, &cancel, &mut |_| {})
    }

    #[test]
    fn downloads_and_organizes_new_items() {
        let mut h = harness(FakeFetcher::default(), 1);
        let report = run(&mut h, &links(&["10-giacca"]));

        assert_eq!(statuses(&report), vec![DownloadStatus::Success]);
        let seller_dir = h.dir.path().join("out/closet/seller_one");
        assert!(seller_dir.join("Item_10_001.jpg").exists());
        assert!(seller_dir.join("Item_10_002.jpg").exists());
        assert!(seller_dir.join("Item_10.json").exists());
        assert_eq!(report.outcomes[0].files, 2);

        let rec = h.manager.tracker().get("10").unwrap();
        assert_eq!(rec.status, DownloadStatus::Success);
        assert_eq!(rec.seller, "seller_one");
        assert_eq!(rec.image_count, 2);

        // 暂存目录已清理
        let leftovers = fs::read_dir(h.dir.path().join("out"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".staging-"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn known_items_are_skipped_without_invoking_downloader() {
        let mut h = harness(FakeFetcher::default(), 1);
        run(&mut h, &links(&["1"]));
        assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 1);

        let report = run(&mut h, &links(&["1", "2"]));
        assert_eq!(
            statuses(&report),
            vec![DownloadStatus::SkippedDuplicate, DownloadStatus::Success]
        );
        assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(h.manager.tracker().len(), 2);
    }

    #[test]
    fn one_failure_does_not_stop_the_batch() {
        let mut h = harness(FakeFetcher::default(), 1);
        let report = run(
            &mut h,
            &[
                "https://www.vinted.it/items/1".to_string(),
                "https://www.vinted.it/items/2-fail".to_string(),
                "https://www.vinted.it/items/3".to_string(),
            ],
        );

        assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            statuses(&report),
            vec![
                DownloadStatus::Success,
                DownloadStatus::Failed,
                DownloadStatus::Success
            ]
        );
        assert!(report.has_failures());
        assert!(report.outcomes[1].error.as_deref().unwrap().contains("HTTP 404"));

        let failed = h.manager.tracker().get("2").unwrap();
        assert_eq!(failed.status, DownloadStatus::Failed);
        assert!(!h.manager.tracker().is_downloaded("2"));
    }

    #[test]
    fn duplicate_within_batch_is_dispatched_once() {
        let mut h = harness(FakeFetcher::default(), 2);
        let report = run(
            &mut h,
            &[
                "https://www.vinted.it/items/5-a".to_string(),
                "https://www.vinted.fr/items/5-a?ref=x".to_string(),
            ],
        );
        assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            statuses(&report),
            vec![DownloadStatus::Success, DownloadStatus::SkippedDuplicate]
        );
    }

    #[test]
    fn cancel_stops_further_dispatch() {
        let cancel = Arc::new(AtomicBool::new(false));
        let fetcher = FakeFetcher {
            stop_on_first: Some(cancel.clone()),
            ..FakeFetcher::default()
        };
        let mut h = harness(fetcher, 1);

        let report = h
            .manager
            .run(&links(&["1", "2", "3"]), &cancel, &mut |_| {});

        assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            statuses(&report),
            vec![
                DownloadStatus::Success,
                DownloadStatus::Pending,
                DownloadStatus::Pending
            ]
        );
        assert_eq!(report.canceled, 2);
        assert!(h.manager.tracker().get("2").is_none());
    }

    #[test]
    fn force_redownload_replaces_single_record() {
        let mut h = harness(FakeFetcher::default(), 1);
        run(&mut h, &links(&["8"]));
        h.manager.options_mut().skip_duplicates = false;

        let report = run(&mut h, &links(&["8"]));
        assert_eq!(statuses(&report), vec![DownloadStatus::Success]);
        assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.manager.tracker().len(), 1);

        // 第二次下载的同名图片不会覆盖第一次的
        let seller_dir = h.dir.path().join("out/closet/seller_one");
        assert!(seller_dir.join("Item_8_001.jpg").exists());
        assert!(seller_dir.join("Item_8_001_dup1.jpg").exists());
    }

    #[test]
    fn parallel_workers_keep_result_order() {
        let fetcher = FakeFetcher {
            delay: Duration::from_millis(20),
            ..FakeFetcher::default()
        };
        let mut h = harness(fetcher, 3);
        let input = links(&["1", "2", "3", "4", "5", "6"]);

        let mut started = 0usize;
        let mut finished = 0usize;
        let mut last_progress = None;
        let cancel = AtomicBool::new(false);
        let report = h.manager.run(&input, &cancel, &mut |ev| match ev {
            QueueEvent::Started { .. } => started += 1,
            QueueEvent::Finished { .. } => finished += 1,
            QueueEvent::Progress(p) => last_progress = Some(p),
            QueueEvent::Output { .. } => {}
        });

        assert_eq!(report.success, 6);
        let order: Vec<&str> = report.outcomes.iter().map(|o| o.entry.link.as_str()).collect();
        let expected: Vec<&str> = input.iter().map(String::as_str).collect();
        assert_eq!(order, expected);
        assert_eq!((started, finished), (6, 6));

        let p = last_progress.unwrap();
        assert_eq!((p.items_done, p.items_total), (6, 6));
        assert_eq!((p.images_done, p.images_total), (12, 12));
    }

    #[test]
    fn without_organize_files_stay_in_output_dir() {
        let mut h = harness(FakeFetcher::default(), 1);
        h.manager.options_mut().auto_organize = false;

        let report = run(&mut h, &links(&["77"]));
        assert_eq!(statuses(&report), vec![DownloadStatus::Success]);
        assert_eq!(report.outcomes[0].files, 2);
        assert!(h.dir.path().join("out/photo_1.jpg").exists());
        assert_eq!(h.manager.tracker().get("77").unwrap().image_count, 2);
    }

    #[test]
    fn panicking_fetcher_fails_only_its_item() {
        for workers in [1, 2] {
            let mut h = harness(FakeFetcher::default(), workers);
            let report = run(
                &mut h,
                &[
                    "https://www.vinted.it/items/1".to_string(),
                    "https://www.vinted.it/items/2-panic".to_string(),
                    "https://www.vinted.it/items/3".to_string(),
                ],
            );
            assert_eq!(
                statuses(&report),
                vec![
                    DownloadStatus::Success,
                    DownloadStatus::Failed,
                    DownloadStatus::Success
                ]
            );
            let err = report.outcomes[1].error.as_deref().unwrap_or_default();
            assert!(err.contains("fetcher blew up"), "{err}");
            assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 3);
        }
    }
}
