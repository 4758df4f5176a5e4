//! 剪贴板读取与监听（TUI 用）。
//!
//! - Desktop：通过 `clipboard-arboard` 使用 arboard。
//! - Android：使用 Termux `termux-clipboard-get`。
//!
//! `ClipboardWatcher` 定期读取剪贴板，内容变化时取出其中新出现的商品链接。

use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::debug;

use crate::base_system::item_id::extract_links;

#[cfg(any(
    all(feature = "clipboard", target_os = "android"),
    all(
        feature = "clipboard",
        feature = "clipboard-arboard",
        not(target_os = "android")
    )
))]
use anyhow::Context;

const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[cfg(all(feature = "clipboard", target_os = "android"))]
pub(super) fn get_text() -> Result<Option<String>> {
    use std::process::Command;

    let output = match Command::new("termux-clipboard-get").output() {
        Ok(o) => o,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(None);
        }
        Err(e) => return Err(e).context("run termux-clipboard-get"),
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("termux-clipboard-get failed: {}", stderr.trim());
    }

    let text = String::from_utf8_lossy(&output.stdout)
        .trim_end_matches(['\r', '\n'])
        .to_string();
    Ok((!text.is_empty()).then_some(text))
}

#[cfg(all(
    feature = "clipboard",
    feature = "clipboard-arboard",
    not(target_os = "android")
))]
pub(super) fn get_text() -> Result<Option<String>> {
    let mut clip = arboard::Clipboard::new().context("init clipboard")?;
    let text = clip.get_text().context("get clipboard text")?;
    Ok((!text.trim().is_empty()).then_some(text))
}

#[cfg(all(
    feature = "clipboard",
    not(target_os = "android"),
    not(feature = "clipboard-arboard")
))]
pub(super) fn get_text() -> Result<Option<String>> {
    Ok(None)
}

#[cfg(not(feature = "clipboard"))]
pub(super) fn get_text() -> Result<Option<String>> {
    Ok(None)
}

pub(super) struct ClipboardWatcher {
    last_text: Option<String>,
    primed: bool,
    last_poll: Option<Instant>,
    failed: bool,
}

impl ClipboardWatcher {
    pub(super) fn new() -> Self {
        Self {
            last_text: None,
            primed: false,
            last_poll: None,
            failed: false,
        }
    }

    /// 距上次读取不足一秒时直接返回空。
    pub(super) fn poll(&mut self) -> Vec<String> {
        if self
            .last_poll
            .is_some_and(|at| at.elapsed() < POLL_INTERVAL)
        {
            return Vec::new();
        }
        self.last_poll = Some(Instant::now());

        match get_text() {
            Ok(text) => {
                self.failed = false;
                self.observe(text)
            }
            Err(err) => {
                // 只记一次，避免每秒刷屏
                if !self.failed {
                    debug!(target: "ui", "读取剪贴板失败: {err}");
                    self.failed = true;
                }
                Vec::new()
            }
        }
    }

    /// 处理一次读取结果。首次读取只记录基线，启动前已在剪贴板里的内容不会被加入。
    pub(super) fn observe(&mut self, text: Option<String>) -> Vec<String> {
        if !self.primed {
            self.primed = true;
            self.last_text = text;
            return Vec::new();
        }
        if text == self.last_text {
            return Vec::new();
        }
        let links = text.as_deref().map(extract_links).unwrap_or_default();
        self.last_text = text;
        links
    }
}
