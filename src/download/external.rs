//! 外部下载器调用。
//!
//! 每个链接启动一次下载器子进程，stdout/stderr 并行逐行读取并转发给调用方。

use std::collections::VecDeque;
use std::ffi::OsString;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel as channel;
use thiserror::Error;
use tracing::debug;

use crate::base_system::context::Config;

const TAIL_LINES: usize = 8;
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("无法启动下载器 `{program}`: {source}")]
    Spawn { program: String, source: io::Error },
    #[error("下载器异常退出（{}）: {tail}", exit_code_text(.code))]
    Exit { code: Option<i32>, tail: String },
    #[error("下载超时（{secs} 秒），已终止下载器")]
    Timeout { secs: u64 },
    #[error("下载线程异常: {0}")]
    Panicked(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

fn exit_code_text(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("退出码 {c}"),
        None => "被信号终止".to_string(),
    }
}

#[derive(Debug, Clone, Default)]
pub struct FetchReport {
    pub lines: usize,
    pub tail: Vec<String>,
}

/// 把一个链接的内容下载到 `work_dir`。输出行通过 `sink` 实时回传。
pub trait ItemFetcher: Send + Sync {
    fn fetch(
        &self,
        link: &str,
        work_dir: &Path,
        sink: &mut dyn FnMut(&str),
    ) -> Result<FetchReport, FetchError>;
}

#[derive(Debug, Clone)]
pub struct ExternalDownloader {
    program: String,
    base_args: Vec<String>,
    download_all: bool,
    save_in_dir: bool,
    seller_avatar: bool,
    timeout: Option<Duration>,
}

impl ExternalDownloader {
    pub fn from_config(cfg: &Config) -> Self {
        let program = cfg.downloader_program.trim();
        Self {
            program: if program.is_empty() {
                Config::default().downloader_program
            } else {
                program.to_string()
            },
            base_args: cfg.downloader_args.clone(),
            download_all: cfg.download_all_items,
            save_in_dir: cfg.save_in_dir,
            seller_avatar: cfg.download_seller_avatar,
            timeout: (cfg.item_timeout > 0).then(|| Duration::from_secs(cfg.item_timeout)),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// `<args...> <link> -o <dir> [--all] [--save-in-dir] [--seller]`
    pub fn command_args(&self, link: &str, work_dir: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.base_args.iter().map(OsString::from).collect();
        args.push(link.into());
        args.push("-o".into());
        args.push(work_dir.as_os_str().to_os_string());
        if self.download_all {
            args.push("--all".into());
        }
        if self.save_in_dir {
            args.push("--save-in-dir".into());
        }
        if self.seller_avatar {
            args.push("--seller".into());
        }
        args
    }
}

impl ItemFetcher for ExternalDownloader {
    fn fetch(
        &self,
        link: &str,
        work_dir: &Path,
        sink: &mut dyn FnMut(&str),
    ) -> Result<FetchReport, FetchError> {
        let args = self.command_args(link, work_dir);
        debug!(target: "external", "run {} {:?}", self.program, args);

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| FetchError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let (tx, rx) = channel::unbounded::<String>();
        let mut readers = Vec::with_capacity(2);
        if let Some(out) = child.stdout.take() {
            readers.push(spawn_line_reader(out, tx.clone()));
        }
        if let Some(err) = child.stderr.take() {
            readers.push(spawn_line_reader(err, tx.clone()));
        }
        drop(tx);

        let started = Instant::now();
        let mut report = FetchReport::default();
        let mut tail: VecDeque<String> = VecDeque::with_capacity(TAIL_LINES);
        let mut forward = |line: String, report: &mut FetchReport| {
            report.lines += 1;
            if tail.len() == TAIL_LINES {
                tail.pop_front();
            }
            sink(&line);
            tail.push_back(line);
        };

        let status = loop {
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(line) => forward(line, &mut report),
                Err(channel::RecvTimeoutError::Timeout) => {}
                Err(channel::RecvTimeoutError::Disconnected) => thread::sleep(POLL_INTERVAL),
            }

            if let Some(status) = child.try_wait()? {
                break status;
            }

            if let Some(limit) = self.timeout
                && started.elapsed() >= limit
            {
                let _ = child.kill();
                let _ = child.wait();
                // 读线程可能被孙进程持有的管道卡住，不等待它们
                return Err(FetchError::Timeout {
                    secs: limit.as_secs(),
                });
            }
        };

        // 进程已退出，收完管道里剩余的行
        for line in rx.iter() {
            forward(line, &mut report);
        }
        for handle in readers {
            let _ = handle.join();
        }

        report.tail = tail.into_iter().collect();
        if status.success() {
            Ok(report)
        } else {
            Err(FetchError::Exit {
                code: status.code(),
                tail: report.tail.join(" | "),
            })
        }
    }
}

fn spawn_line_reader<R>(stream: R, tx: channel::Sender<String>) -> thread::JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let reader = BufReader::new(stream);
        for line in reader.split(b'\n') {
            let Ok(bytes) = line else {
                break;
            };
            let text = String::from_utf8_lossy(&bytes)
                .trim_end_matches('\r')
                .to_string();
            if text.trim().is_empty() {
                continue;
            }
            if tx.send(text).is_err() {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn downloader(program: &str, args: &[&str]) -> ExternalDownloader {
        ExternalDownloader {
            program: program.to_string(),
            base_args: args.iter().map(|s| s.to_string()).collect(),
            download_all: false,
            save_in_dir: false,
            seller_avatar: false,
            timeout: None,
        }
    }

    #[test]
    fn builds_command_line_from_config() {
        let mut cfg = Config::default();
        cfg.downloader_program = "python3".to_string();
        cfg.downloader_args = vec!["vinted_downloader.py".to_string()];
        cfg.download_all_items = true;
        cfg.download_seller_avatar = true;

        let d = ExternalDownloader::from_config(&cfg);
        let args = d.command_args(
            "https://www.vinted.it/items/1-a",
            &PathBuf::from("/tmp/stage"),
        );
        let args: Vec<String> = args
            .into_iter()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert_eq!(d.program(), "python3");
        assert_eq!(
            args,
            vec![
                "vinted_downloader.py",
                "https://www.vinted.it/items/1-a",
                "-o",
                "/tmp/stage",
                "--all",
                "--seller",
            ]
        );
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let d = downloader("closet-downloader-no-such-program", &[]);
        let dir = tempfile::TempDir::new().unwrap();
        let err = d.fetch("x", dir.path(), &mut |_| {}).unwrap_err();
        assert!(matches!(err, FetchError::Spawn { .. }));
        assert!(err.to_string().contains("closet-downloader-no-such-program"));
    }

    #[cfg(unix)]
    #[test]
    fn forwards_stdout_and_stderr_lines() {
        // sh -c SCRIPT sh <link> -o <dir>  →  $1=link $2=-o $3=dir
        let script = r#"echo "Downloading details for $1"; echo "Found data: 2 images"; echo '{"title":"x"}' > "$3/item.json"; echo "warn line" >&2"#;
        let d = downloader("sh", &["-c", script, "sh"]);
        let dir = tempfile::TempDir::new().unwrap();

        let mut seen = Vec::new();
        let report = d
            .fetch("https://www.vinted.it/items/9-z", dir.path(), &mut |l| {
                seen.push(l.to_string())
            })
            .unwrap();

        assert_eq!(report.lines, 3);
        assert!(seen.contains(&"Downloading details for https://www.vinted.it/items/9-z".to_string()));
        assert!(seen.contains(&"Found data: 2 images".to_string()));
        assert!(seen.contains(&"warn line".to_string()));
        assert!(dir.path().join("item.json").exists());
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_reports_code_and_tail() {
        let d = downloader("sh", &["-c", "echo boom >&2; exit 3", "sh"]);
        let dir = tempfile::TempDir::new().unwrap();
        match d.fetch("x", dir.path(), &mut |_| {}) {
            Err(FetchError::Exit { code, tail }) => {
                assert_eq!(code, Some(3));
                assert!(tail.contains("boom"));
            }
            other => panic!("expected exit error, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn timeout_kills_child() {
        let mut d = downloader("sh", &["-c", "exec sleep 5", "sh"]);
        d.timeout = Some(Duration::from_millis(300));
        let dir = tempfile::TempDir::new().unwrap();

        let started = Instant::now();
        let err = d.fetch("x", dir.path(), &mut |_| {}).unwrap_err();
        assert!(matches!(err, FetchError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
