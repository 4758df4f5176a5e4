//! 下载器输出解析、进度上报与 CLI 进度条管理。

use std::sync::OnceLock;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use regex::Regex;

use super::models::{DownloadStatus, ProgressSnapshot};

/// 从下载器的一行输出中识别出的进度信号。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputEvent {
    /// `Found data: N images`
    TotalImages(usize),
    /// `Downloading details ...`
    ItemStarted,
    /// `Downloading resource ...`
    ImageDownloaded,
}

static RE_FOUND: OnceLock<Regex> = OnceLock::new();

pub fn parse_output_line(line: &str) -> Option<OutputEvent> {
    let lower = line.trim().to_lowercase();
    if lower.is_empty() {
        return None;
    }

    let found = RE_FOUND
        .get_or_init(|| Regex::new(r"found data:?\s*(\d+)\s*images?").expect("compile RE_FOUND"));
    if let Some(n) = found
        .captures(&lower)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<usize>().ok())
    {
        return Some(OutputEvent::TotalImages(n));
    }

    if lower.contains("downloading details") {
        return Some(OutputEvent::ItemStarted);
    }
    if lower.contains("downloading resource") {
        return Some(OutputEvent::ImageDownloaded);
    }
    None
}

struct CliBars {
    _mp: MultiProgress,
    item_bar: ProgressBar,
    image_bar: ProgressBar,
}

pub(crate) struct ProgressReporter {
    pub(crate) snapshot: ProgressSnapshot,
    cli: Option<CliBars>,
}

impl ProgressReporter {
    /// 应用一条输出信号；返回快照是否变化。
    pub(crate) fn apply(&mut self, event: OutputEvent) -> bool {
        match event {
            OutputEvent::TotalImages(n) => {
                if n == 0 {
                    return false;
                }
                self.snapshot.images_total += n;
            }
            OutputEvent::ImageDownloaded => {
                self.snapshot.images_done += 1;
                // 下载器有时不报告总数，至少让分母不小于分子
                if self.snapshot.images_total < self.snapshot.images_done {
                    self.snapshot.images_total = self.snapshot.images_done;
                }
            }
            OutputEvent::ItemStarted => return false,
        }
        self.sync_image_bar();
        true
    }

    pub(crate) fn item_finished(&mut self, status: DownloadStatus) {
        self.snapshot.items_done = (self.snapshot.items_done + 1).min(self.snapshot.items_total);
        match status {
            DownloadStatus::Failed => self.snapshot.failed += 1,
            DownloadStatus::SkippedDuplicate => self.snapshot.skipped += 1,
            _ => {}
        }
        if let Some(cli) = self.cli.as_ref() {
            cli.item_bar.set_position(self.snapshot.items_done as u64);
        }
    }

    pub(crate) fn println(&self, line: &str) {
        if let Some(cli) = self.cli.as_ref() {
            cli.item_bar.println(line);
        }
    }

    pub(crate) fn finish_cli_bars(&mut self) {
        let Some(cli) = self.cli.take() else {
            return;
        };
        cli.item_bar.finish_and_clear();
        cli.image_bar.finish_and_clear();
        drop(cli);
    }

    fn sync_image_bar(&self) {
        if let Some(cli) = self.cli.as_ref() {
            cli.image_bar.set_length(self.snapshot.images_total as u64);
            cli.image_bar.set_position(self.snapshot.images_done as u64);
        }
    }
}

// ── 构造函数 ──────────────────────────────────────────────────

pub(crate) fn make_reporter(items_total: usize, use_cli_bars: bool) -> ProgressReporter {
    let cli = if use_cli_bars && items_total > 0 {
        let mp = MultiProgress::with_draw_target(ProgressDrawTarget::stderr());
        let style = ProgressStyle::with_template(
            "{prefix} [{elapsed_precise}] {wide_bar} {pos}/{len} ({eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");

        let item_bar = mp.add(ProgressBar::new(items_total as u64));
        item_bar.set_style(style.clone());
        item_bar.set_prefix("商品");

        let image_bar = mp.add(ProgressBar::new(0));
        image_bar.set_style(style);
        image_bar.set_prefix("图片");

        Some(CliBars {
            _mp: mp,
            item_bar,
            image_bar,
        })
    } else {
        None
    };

    ProgressReporter {
        snapshot: ProgressSnapshot {
            items_total,
            ..ProgressSnapshot::default()
        },
        cli,
    }
}
