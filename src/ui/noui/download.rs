//! 命令行下的批量下载与统计输出（旧 CLI 与无界面批处理共用）。

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Instant;

use tracing::info;

use crate::base_system::context::Config;
use crate::base_system::logging::LogSystem;
use crate::download::models::{BatchReport, DownloadStatus, QueueEvent};
use crate::download::queue::QueueManager;
use crate::download::tracker::DuplicateTracker;

/// 依次下载 `links`；`force` 为 true 时忽略下载记录重新下载。
///
/// 运行期间第一次 Ctrl+C 只停止派发新条目，进行中的条目会正常结束。
pub fn run_batch(config: &Config, links: &[String], force: bool, log: &LogSystem) -> BatchReport {
    let start = Instant::now();
    let cancel = Arc::new(AtomicBool::new(false));
    log.set_interrupt_flag(Some(Arc::clone(&cancel)));

    let mut manager = QueueManager::from_config(config);
    manager.options_mut().cli_progress = true;
    if force {
        manager.options_mut().skip_duplicates = false;
    }
    for warning in manager.tracker().warnings() {
        println!("警告: {warning}");
    }

    println!(
        "开始下载 {} 个链接，保存到 {}",
        links.len(),
        config.closet_root().display()
    );
    let report = manager.run(links, &cancel, &mut |ev| {
        if let QueueEvent::Finished { outcome, .. } = ev
            && outcome.status == DownloadStatus::Success
        {
            info!(
                target: "cli",
                "完成 {} ({} 个文件, {:.1}s)",
                outcome.entry.link,
                outcome.files,
                outcome.elapsed.as_secs_f64()
            );
        }
    });
    log.set_interrupt_flag(None);

    print_report(&report);
    println!("耗时 {:.1} 秒\n", start.elapsed().as_secs_f64());
    report
}

fn print_report(report: &BatchReport) {
    println!("\n===== 下载结果 =====");
    for outcome in &report.outcomes {
        let mut line = format!("[{}] {}", outcome.status.label(), outcome.entry.link);
        if let Some(dest) = outcome.destination.as_ref() {
            line.push_str(&format!(" -> {}", dest.display()));
        }
        if let Some(err) = outcome.error.as_deref() {
            line.push_str(&format!(" ({err})"));
        }
        println!("{line}");
    }
    println!("{}", report.summary());
}

/// 打印下载记录统计（`--stats` 与旧 CLI 的 `st` 命令）。
pub fn print_stats(config: &Config) {
    let tracker = DuplicateTracker::open(config.tracking_file_path());
    for warning in tracker.warnings() {
        println!("警告: {warning}");
    }
    let stats = tracker.stats();
    println!("下载记录: {}", tracker.path().display());
    println!("closet 目录: {}", config.closet_root().display());
    println!(
        "已下载 {} 件商品，{} 位卖家，{} 张图片",
        stats.items, stats.sellers, stats.images
    );
    println!();
}
