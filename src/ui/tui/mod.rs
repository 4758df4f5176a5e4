use std::path::PathBuf;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
    mpsc::{self, Receiver, Sender},
};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, KeyModifiers,
    MouseButton, MouseEventKind,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout};
use ratatui::prelude::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, List, ListItem, ListState, Paragraph, Wrap};
use tracing::{debug, info, warn};

mod clipboard;
mod config;
mod config_model;
mod home;

use config_model::{ConfigCategory, ConfigEntry, build_config_categories};

use crate::base_system::config::config_path;
use crate::base_system::context::Config;
use crate::base_system::item_id::extract_links;
use crate::base_system::logging::take_broadcast_rx;
use crate::download::models::{BatchReport, DownloadStatus, ProgressSnapshot, QueueEvent};
use crate::download::pending::PendingList;
use crate::download::queue::QueueManager;
use crate::download::tracker::{DuplicateTracker, TrackerStats};

/// TUI 退出方式：直接退出，或切换到旧版命令行界面。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TuiExit {
    Quit,
    SwitchToOldCli,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
    Input,
    Dir,
    Queue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    Home,
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFocus {
    Category,
    Entry,
}

enum WorkerMsg {
    Queue(QueueEvent),
    BatchDone {
        report: BatchReport,
        stats: TrackerStats,
    },
}

struct App {
    input: String,
    dir_input: String,
    focus: Focus,
    view: View,
    status: String,
    messages: Vec<String>,
    logs: Vec<String>,
    config: Config,
    config_file: PathBuf,
    exit: Option<TuiExit>,

    // 下载列表
    pending: PendingList,
    queue_state: ListState,
    tracker_stats: TrackerStats,

    // 当前批次
    batch_links: Vec<String>,
    batch_progress: Option<ProgressSnapshot>,
    last_output: Option<String>,
    cancel_flag: Option<Arc<AtomicBool>>,
    batch_handle: Option<thread::JoinHandle<()>>,
    quit_after_batch: bool,

    worker_tx: Sender<WorkerMsg>,
    worker_rx: Receiver<WorkerMsg>,

    spinner_active: bool,
    spinner_text: String,
    spinner_idx: usize,
    spinner_last: Instant,

    log_rx: Option<crossbeam_channel::Receiver<String>>,
    clipboard: clipboard::ClipboardWatcher,

    // 配置页
    cfg_categories: Vec<ConfigCategory>,
    cfg_cat_state: ListState,
    cfg_entry_state: ListState,
    cfg_focus: ConfigFocus,
    cfg_editing: Option<(usize, usize)>,
    cfg_edit_buffer: String,
    last_config_layout: Option<[Rect; 3]>,

    last_home_layout: Option<[Rect; 4]>,
    stop_button_area: Option<Rect>,
}

impl App {
    fn new(config: Config, worker_tx: Sender<WorkerMsg>, worker_rx: Receiver<WorkerMsg>) -> Self {
        let config_file = config_path::<Config>(None, Some(&config.data_dir()));

        let mut pending = PendingList::open(config.queue_file_path());
        pending.reset_in_progress();
        let mut queue_state = ListState::default();
        if pending.count() > 0 {
            queue_state.select(Some(0));
        }

        let tracker = DuplicateTracker::open(config.tracking_file_path());
        let tracker_stats = tracker.stats();

        let mut cfg_cat_state = ListState::default();
        cfg_cat_state.select(Some(0));
        let mut cfg_entry_state = ListState::default();
        cfg_entry_state.select(Some(0));

        let mut app = Self {
            input: String::new(),
            dir_input: config.save_path.clone(),
            focus: Focus::Input,
            view: View::Home,
            status: "粘贴 Vinted 商品链接后回车加入列表，F5/r 开始下载，Tab 切换焦点".to_string(),
            messages: Vec::new(),
            logs: Vec::new(),
            config,
            config_file,
            exit: None,
            pending,
            queue_state,
            tracker_stats,
            batch_links: Vec::new(),
            batch_progress: None,
            last_output: None,
            cancel_flag: None,
            batch_handle: None,
            quit_after_batch: false,
            worker_tx,
            worker_rx,
            spinner_active: false,
            spinner_text: String::new(),
            spinner_idx: 0,
            spinner_last: Instant::now(),
            log_rx: take_broadcast_rx(),
            clipboard: clipboard::ClipboardWatcher::new(),
            cfg_categories: build_config_categories(),
            cfg_cat_state,
            cfg_entry_state,
            cfg_focus: ConfigFocus::Entry,
            cfg_editing: None,
            cfg_edit_buffer: String::new(),
            last_config_layout: None,
            last_home_layout: None,
            stop_button_area: None,
        };
        for warning in tracker.warnings() {
            app.push_message(format!("下载记录: {warning}"));
        }
        app
    }

    fn push_message(&mut self, msg: impl Into<String>) {
        self.messages.push(msg.into());
        if self.messages.len() > 8 {
            let overflow = self.messages.len() - 8;
            self.messages.drain(0..overflow);
        }
    }

    fn push_log(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        let trimmed = msg.trim_end_matches(['\r', '\n']);
        self.logs.push(trimmed.to_string());
        if self.logs.len() > 200 {
            let overflow = self.logs.len() - 200;
            self.logs.drain(0..overflow);
        }
    }

    fn is_running(&self) -> bool {
        self.cancel_flag.is_some()
    }

    fn select_next(&mut self) {
        let len = self.pending.count();
        if len == 0 {
            self.queue_state.select(None);
            return;
        }
        let next = match self.queue_state.selected() {
            Some(idx) if idx + 1 < len => idx + 1,
            _ => 0,
        };
        self.queue_state.select(Some(next));
    }

    fn select_prev(&mut self) {
        let len = self.pending.count();
        if len == 0 {
            self.queue_state.select(None);
            return;
        }
        let prev = match self.queue_state.selected() {
            Some(0) | None => len.saturating_sub(1),
            Some(idx) => idx - 1,
        };
        self.queue_state.select(Some(prev));
    }

    /// 列表增删后修正选中行。
    fn clamp_selection(&mut self) {
        let len = self.pending.count();
        match self.queue_state.selected() {
            _ if len == 0 => self.queue_state.select(None),
            Some(idx) if idx >= len => self.queue_state.select(Some(len - 1)),
            None => self.queue_state.select(Some(0)),
            _ => {}
        }
    }
}

pub fn run(config: Config) -> Result<TuiExit> {
    let (worker_tx, worker_rx) = mpsc::channel();
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)
        .context("enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("init terminal")?;

    let result = run_loop(&mut terminal, config, worker_tx, worker_rx);

    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), DisableMouseCapture, LeaveAlternateScreen).ok();
    terminal.show_cursor().ok();

    result
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    config: Config,
    worker_tx: Sender<WorkerMsg>,
    worker_rx: Receiver<WorkerMsg>,
) -> Result<TuiExit> {
    let mut app = App::new(config, worker_tx, worker_rx);

    loop {
        tick_spinner(&mut app);
        poll_worker(&mut app);
        poll_clipboard(&mut app);
        drain_log_channel(&mut app);

        terminal.draw(|f| draw_ui(f, &mut app))?;

        handle_event(&mut app)?;
        if let Some(exit) = app.exit {
            if app.is_running() {
                app.status = "正在等待进行中的条目完成后退出…".to_string();
                terminal.draw(|f| draw_ui(f, &mut app))?;
            }
            shutdown_batch(&mut app);
            return Ok(exit);
        }
    }
}

/// 退出前收尾后台批次：停止派发，等待进行中的条目整理、记录完毕，
/// 再把剩余事件写回下载列表。
fn shutdown_batch(app: &mut App) {
    if let Some(flag) = app.cancel_flag.as_ref() {
        flag.store(true, Ordering::SeqCst);
    }
    let exit = app.exit;
    if let Some(handle) = app.batch_handle.take()
        && handle.join().is_err()
    {
        warn!(target: "ui", "后台下载线程异常结束");
    }
    poll_worker(app);
    app.cancel_flag = None;
    app.exit = exit;
}

fn draw_ui(frame: &mut ratatui::Frame, app: &mut App) {
    match app.view {
        View::Home => home::draw_home(frame, app),
        View::Config => config::draw_config(frame, app),
    }
}

fn handle_event(app: &mut App) -> Result<()> {
    if !event::poll(Duration::from_millis(200)).context("poll event")? {
        return Ok(());
    }

    let evt = event::read().context("read event")?;
    match app.view {
        View::Home => home::handle_event_home(app, evt)?,
        View::Config => config::handle_event_config(app, evt)?,
    }
    Ok(())
}

/// 把文本里的商品链接加入下载列表，返回新增数量。
fn add_links_from_text(app: &mut App, text: &str) -> usize {
    let mut added = 0;
    for link in extract_links(text) {
        if app.pending.add(&link) {
            debug!(target: "ui", "加入下载列表: {link}");
            added += 1;
        }
    }
    if added > 0 {
        app.clamp_selection();
    }
    added
}

fn start_batch(app: &mut App) -> Result<()> {
    if app.is_running() {
        app.status = "已有下载任务在进行".to_string();
        return Ok(());
    }
    let links = app.pending.runnable_urls();
    if links.is_empty() {
        app.status = "下载列表中没有等待下载的链接".to_string();
        return Ok(());
    }

    let cancel = Arc::new(AtomicBool::new(false));
    let tx = app.worker_tx.clone();
    let cfg = app.config.clone();
    let worker_links = links.clone();
    let worker_cancel = Arc::clone(&cancel);
    let handle = thread::Builder::new()
        .name("batch".to_string())
        .spawn(move || {
            let mut manager = QueueManager::from_config(&cfg);
            let report = manager.run(&worker_links, &worker_cancel, &mut |ev| {
                let _ = tx.send(WorkerMsg::Queue(ev));
            });
            let stats = manager.tracker().stats();
            let _ = tx.send(WorkerMsg::BatchDone { report, stats });
        })
        .context("spawn batch worker")?;

    info!(target: "ui", "开始批量下载 {} 个链接", links.len());
    app.batch_progress = Some(ProgressSnapshot {
        items_total: links.len(),
        ..ProgressSnapshot::default()
    });
    app.batch_links = links;
    app.last_output = None;
    app.cancel_flag = Some(cancel);
    app.batch_handle = Some(handle);
    app.quit_after_batch = false;
    let total = app.batch_links.len();
    start_spinner(app, format!("下载中 0/{total}"));
    Ok(())
}

fn request_stop(app: &mut App) {
    if let Some(flag) = app.cancel_flag.as_ref() {
        flag.store(true, Ordering::SeqCst);
        app.spinner_text = "正在停止，等待进行中的条目结束".to_string();
        app.status = "已请求停止下载…".to_string();
        app.push_message("已发送停止信号，进行中的条目完成后结束");
    } else {
        app.status = "当前没有正在进行的下载".to_string();
    }
    app.stop_button_area = None;
}

fn poll_worker(app: &mut App) {
    while let Ok(msg) = app.worker_rx.try_recv() {
        match msg {
            WorkerMsg::Queue(ev) => apply_queue_event(app, ev),
            WorkerMsg::BatchDone { report, stats } => finish_batch(app, report, stats),
        }
    }
}

fn apply_queue_event(app: &mut App, ev: QueueEvent) {
    match ev {
        QueueEvent::Started { index, entry } => {
            if let Some(url) = app.batch_links.get(index).cloned() {
                app.pending.update_status(&url, DownloadStatus::InProgress);
            }
            if !app.cancel_flag.as_ref().is_some_and(|f| f.load(Ordering::Relaxed)) {
                app.spinner_text = format!("下载中: {}", truncate(&entry.link, 60));
            }
        }
        QueueEvent::Output { line, .. } => {
            app.last_output = Some(line);
        }
        QueueEvent::Progress(snapshot) => {
            app.batch_progress = Some(snapshot);
        }
        QueueEvent::Finished { index, outcome } => {
            if let Some(url) = app.batch_links.get(index).cloned() {
                app.pending.update_status(&url, outcome.status);
            }
            if outcome.status == DownloadStatus::Failed {
                let reason = outcome.error.as_deref().unwrap_or("未知错误");
                app.push_message(format!("失败: {} ({reason})", truncate(&outcome.entry.link, 50)));
            }
        }
    }
}

fn finish_batch(app: &mut App, report: BatchReport, stats: TrackerStats) {
    stop_spinner(app);
    app.cancel_flag = None;
    if let Some(handle) = app.batch_handle.take()
        && handle.join().is_err()
    {
        warn!(target: "ui", "后台下载线程异常结束");
    }
    app.stop_button_area = None;
    app.tracker_stats = stats;
    app.batch_links.clear();
    app.status = format!("下载结束：{}", report.summary());
    app.push_message(app.status.clone());
    if report.has_failures() {
        warn!(target: "ui", "批量下载存在失败条目：{}", report.summary());
    }
    if app.quit_after_batch {
        app.exit = Some(TuiExit::Quit);
    }
}

/// 剪贴板监听：开启后约每秒检查一次，新复制的商品链接自动加入列表。
fn poll_clipboard(app: &mut App) {
    if !app.config.clipboard_monitor {
        return;
    }
    let links = app.clipboard.poll();
    if links.is_empty() {
        return;
    }
    let mut added = 0;
    for link in &links {
        if app.pending.add(link) {
            added += 1;
        }
    }
    if added > 0 {
        app.clamp_selection();
        app.push_message(format!("从剪贴板添加了 {added} 个链接"));
        info!(target: "ui", "从剪贴板添加了 {added} 个链接");
    }
}

fn save_config(app: &mut App) -> Result<()> {
    crate::base_system::config::write_with_comments(&app.config, &app.config_file)
        .with_context(|| format!("写入 {}", app.config_file.display()))
}

const SPINNER_FRAMES: &[char] = &['|', '/', '-', '\\'];

const LOG_HEIGHT: u16 = 7;

fn current_category(app: &App) -> Option<(usize, &ConfigCategory)> {
    let idx = app.cfg_cat_state.selected()?;
    app.cfg_categories.get(idx).map(|c| (idx, c))
}

fn current_cfg_entries(app: &App) -> Option<&[ConfigEntry]> {
    current_category(app).map(|(_, c)| c.entries.as_slice())
}

fn ensure_entry_selection(app: &mut App) {
    let len = current_cfg_entries(app).map(|e| e.len()).unwrap_or(0);
    if len == 0 {
        app.cfg_entry_state.select(None);
        return;
    }
    let idx = app.cfg_entry_state.selected().unwrap_or(0).min(len - 1);
    app.cfg_entry_state.select(Some(idx));
}

fn select_next_category(app: &mut App) {
    if app.cfg_categories.is_empty() {
        app.cfg_cat_state.select(None);
        return;
    }
    let next = app
        .cfg_cat_state
        .selected()
        .map(|i| (i + 1) % app.cfg_categories.len())
        .unwrap_or(0);
    app.cfg_cat_state.select(Some(next));
    ensure_entry_selection(app);
    if let Some((_, cat)) = current_category(app) {
        app.status = format!("当前分类: {}", cat.title);
    }
}

fn select_prev_category(app: &mut App) {
    if app.cfg_categories.is_empty() {
        app.cfg_cat_state.select(None);
        return;
    }
    let len = app.cfg_categories.len();
    let prev = app
        .cfg_cat_state
        .selected()
        .map(|i| if i == 0 { len - 1 } else { i - 1 })
        .unwrap_or(0);
    app.cfg_cat_state.select(Some(prev));
    ensure_entry_selection(app);
    if let Some((_, cat)) = current_category(app) {
        app.status = format!("当前分类: {}", cat.title);
    }
}

fn select_next_entry(app: &mut App) {
    let len = current_cfg_entries(app).map(|e| e.len()).unwrap_or(0);
    if len == 0 {
        app.cfg_entry_state.select(None);
        return;
    }
    let next = app
        .cfg_entry_state
        .selected()
        .map(|i| (i + 1) % len)
        .unwrap_or(0);
    app.cfg_entry_state.select(Some(next));
}

fn select_prev_entry(app: &mut App) {
    let len = current_cfg_entries(app).map(|e| e.len()).unwrap_or(0);
    if len == 0 {
        app.cfg_entry_state.select(None);
        return;
    }
    let prev = app
        .cfg_entry_state
        .selected()
        .map(|i| if i == 0 { len - 1 } else { i - 1 })
        .unwrap_or(0);
    app.cfg_entry_state.select(Some(prev));
}

fn start_spinner(app: &mut App, text: impl Into<String>) {
    app.spinner_active = true;
    app.spinner_text = text.into();
    app.spinner_idx = 0;
    app.spinner_last = Instant::now();
    app.status = format!("{} {}", app.spinner_text, SPINNER_FRAMES[app.spinner_idx]);
}

fn stop_spinner(app: &mut App) {
    app.spinner_active = false;
    app.spinner_text.clear();
}

fn tick_spinner(app: &mut App) {
    if !app.spinner_active {
        return;
    }
    if app.spinner_last.elapsed() < Duration::from_millis(140) {
        return;
    }
    app.spinner_idx = (app.spinner_idx + 1) % SPINNER_FRAMES.len();
    app.spinner_last = Instant::now();
    app.status = format!("{} {}", app.spinner_text, SPINNER_FRAMES[app.spinner_idx]);
}

fn split_with_log(area: Rect) -> (Rect, Rect) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(LOG_HEIGHT.max(4)),
            Constraint::Length(LOG_HEIGHT),
        ])
        .split(area);
    let main = layout.first().copied().unwrap_or(area);
    let log = layout.get(1).copied().unwrap_or(Rect {
        x: area.x,
        y: area
            .y
            .saturating_add(area.height.saturating_sub(LOG_HEIGHT)),
        width: area.width,
        height: LOG_HEIGHT,
    });
    (main, log)
}

fn render_log_box(frame: &mut ratatui::Frame, area: Rect, app: &App) {
    let mut lines = Vec::new();
    if app.logs.is_empty() {
        lines.push(Line::from("日志: 暂无"));
    } else {
        let visible = area.height.saturating_sub(2).max(1) as usize;
        lines.extend(
            app.logs
                .iter()
                .rev()
                .take(visible)
                .rev()
                .map(|m| style_log_line(m)),
        );
    }

    let log = Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("日志"));
    frame.render_widget(log, area);
}

fn style_log_line(line: &str) -> Line<'static> {
    let mut parts = line.split_whitespace();
    let ts = parts.next().unwrap_or("");
    let level = parts.next().unwrap_or("").to_ascii_uppercase();
    let rest: Vec<&str> = parts.collect();

    let mut spans: Vec<Span<'static>> = Vec::new();
    if !ts.is_empty() {
        spans.push(Span::styled(
            ts.to_string(),
            Style::default().fg(Color::DarkGray),
        ));
    }

    if !level.is_empty() {
        let color = match level.as_str() {
            "ERROR" => Color::Red,
            "WARN" => Color::Yellow,
            "INFO" => Color::Cyan,
            "DEBUG" | "TRACE" => Color::Gray,
            _ => Color::White,
        };
        if !spans.is_empty() {
            spans.push(Span::raw(" "));
        }
        spans.push(Span::styled(
            level,
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ));
    }

    if let Some(target) = rest.first()
        && !target.is_empty()
    {
        if !spans.is_empty() {
            spans.push(Span::raw(" "));
        }
        spans.push(Span::styled(
            (*target).to_string(),
            Style::default().fg(Color::LightBlue),
        ));
    }

    let message = rest.iter().skip(1).copied().collect::<Vec<_>>().join(" ");
    if !message.is_empty() {
        if !spans.is_empty() {
            spans.push(Span::raw(" "));
        }
        spans.push(Span::raw(message));
    }

    Line::from(spans)
}

fn drain_log_channel(app: &mut App) {
    if let Some(rx) = app.log_rx.as_ref() {
        let rx = rx.clone();
        for line in rx.try_iter() {
            app.push_log(line);
        }
    }
}

fn pos_in(area: Rect, col: u16, row: u16) -> bool {
    col >= area.x && col < area.x + area.width && row >= area.y && row < area.y + area.height
}

/// 按字符截断，超出部分用 `…` 表示。
fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_app(dir: &TempDir) -> App {
        let (tx, rx) = mpsc::channel();
        let mut config = Config::default().with_data_dir(Some(dir.path()));
        config.clipboard_monitor = false;
        App::new(config, tx, rx)
    }

    #[test]
    fn truncate_counts_chars() {
        assert_eq!(truncate("abc", 5), "abc");
        assert_eq!(truncate("连衣裙连衣裙", 4), "连衣裙…");
    }

    #[test]
    fn log_line_is_split_into_styled_parts() {
        let line = style_log_line("12:00:01 warn queue 下载 失败");
        let text: Vec<String> = line.spans.iter().map(|s| s.content.to_string()).collect();
        assert_eq!(text.first().map(String::as_str), Some("12:00:01"));
        assert!(text.contains(&"WARN".to_string()));
        assert!(text.contains(&"queue".to_string()));
        assert_eq!(text.last().map(String::as_str), Some("下载 失败"));
    }

    #[test]
    fn pasted_text_adds_each_link_once() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(&dir);
        let text = "https://www.vinted.it/items/11-a\nhttps://www.vinted.fr/items/12-b https://www.vinted.it/items/11-a";
        assert_eq!(add_links_from_text(&mut app, text), 2);
        assert_eq!(add_links_from_text(&mut app, text), 0);
        assert_eq!(app.pending.count(), 2);
        assert_eq!(app.queue_state.selected(), Some(0));
    }

    #[test]
    fn queue_events_update_list_status() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(&dir);
        add_links_from_text(&mut app, "https://www.vinted.it/items/21-a");
        app.batch_links = app.pending.runnable_urls();
        app.cancel_flag = Some(Arc::new(AtomicBool::new(false)));

        let entry = crate::download::models::QueueEntry::new("https://www.vinted.it/items/21-a");
        apply_queue_event(
            &mut app,
            QueueEvent::Started {
                index: 0,
                entry: entry.clone(),
            },
        );
        assert_eq!(app.pending.all()[0].status, DownloadStatus::InProgress);

        let mut outcome = crate::download::models::ItemOutcome::immediate(entry, DownloadStatus::Failed);
        outcome.error = Some("退出码 1".to_string());
        apply_queue_event(&mut app, QueueEvent::Finished { index: 0, outcome });
        assert_eq!(app.pending.all()[0].status, DownloadStatus::Failed);
        assert!(app.messages.iter().any(|m| m.contains("退出码 1")));

        finish_batch(&mut app, BatchReport::default(), TrackerStats::default());
        assert!(!app.is_running());
        assert!(app.exit.is_none());
    }

    #[test]
    fn stop_without_batch_only_reports() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(&dir);
        request_stop(&mut app);
        assert_eq!(app.status, "当前没有正在进行的下载");
    }

    #[test]
    fn exit_waits_for_batch_thread_and_applies_its_events() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(&dir);
        add_links_from_text(&mut app, "https://www.vinted.it/items/31-a");
        app.batch_links = app.pending.runnable_urls();

        let flag = Arc::new(AtomicBool::new(false));
        let worker_flag = Arc::clone(&flag);
        let tx = app.worker_tx.clone();
        app.cancel_flag = Some(flag);
        app.batch_handle = Some(thread::spawn(move || {
            while !worker_flag.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(5));
            }
            thread::sleep(Duration::from_millis(50));
            let entry =
                crate::download::models::QueueEntry::new("https://www.vinted.it/items/31-a");
            let outcome =
                crate::download::models::ItemOutcome::immediate(entry, DownloadStatus::Success);
            let _ = tx.send(WorkerMsg::Queue(QueueEvent::Finished { index: 0, outcome }));
            let _ = tx.send(WorkerMsg::BatchDone {
                report: BatchReport::default(),
                stats: TrackerStats::default(),
            });
        }));
        app.exit = Some(TuiExit::Quit);

        shutdown_batch(&mut app);
        assert!(app.batch_handle.is_none());
        assert!(!app.is_running());
        assert_eq!(app.exit, Some(TuiExit::Quit));
        assert_eq!(app.pending.all()[0].status, DownloadStatus::Success);
    }
}
