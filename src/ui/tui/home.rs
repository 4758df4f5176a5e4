//! TUI 主界面：链接输入、保存目录、下载列表与进度。

use super::*;

pub(super) fn handle_event_home(app: &mut App, event: Event) -> Result<()> {
    match event {
        Event::Paste(s) => paste_text(app, &s),
        Event::Key(key) if key.kind == KeyEventKind::Press => {
            let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
            match key.code {
                KeyCode::Char('c') if ctrl => {
                    let stopping = app
                        .cancel_flag
                        .as_ref()
                        .is_some_and(|f| f.load(Ordering::Relaxed));
                    if app.is_running() && !stopping {
                        request_stop(app);
                    } else {
                        app.exit = Some(TuiExit::Quit);
                    }
                }
                KeyCode::Char('v') if ctrl => paste_from_clipboard(app),
                KeyCode::Tab => cycle_focus(app),
                KeyCode::Esc => {
                    if app.focus == Focus::Input && !app.input.is_empty() {
                        app.input.clear();
                    } else {
                        app.focus = Focus::Input;
                    }
                }
                KeyCode::F(5) => start_batch(app)?,
                KeyCode::Enter => match app.focus {
                    Focus::Input => submit_input(app)?,
                    Focus::Dir => save_dir(app),
                    Focus::Queue => start_batch(app)?,
                },
                KeyCode::Backspace => match app.focus {
                    Focus::Input => {
                        app.input.pop();
                    }
                    Focus::Dir => {
                        app.dir_input.pop();
                    }
                    Focus::Queue => {}
                },
                KeyCode::Delete if app.focus == Focus::Queue => remove_selected(app),
                KeyCode::Up if app.focus == Focus::Queue => app.select_prev(),
                KeyCode::Down if app.focus == Focus::Queue => app.select_next(),
                KeyCode::Char(c) if !ctrl && !key.modifiers.contains(KeyModifiers::ALT) => {
                    match app.focus {
                        Focus::Input => app.input.push(c),
                        Focus::Dir => app.dir_input.push(c),
                        Focus::Queue => queue_command(app, c)?,
                    }
                }
                _ => {}
            }
        }
        Event::Mouse(me) => handle_mouse_home(app, me),
        _ => {}
    }
    Ok(())
}

fn queue_command(app: &mut App, c: char) -> Result<()> {
    match c {
        'q' => request_quit(app),
        'r' => start_batch(app)?,
        's' => request_stop(app),
        'c' => {
            app.view = View::Config;
            ensure_entry_selection(app);
            app.status = "配置编辑".to_string();
        }
        'd' => remove_selected(app),
        'x' => {
            let removed = app.pending.clear_finished();
            app.clamp_selection();
            app.status = format!("已移除 {removed} 个已完成的链接");
        }
        'X' => {
            if app.is_running() {
                app.status = "下载进行中，不能清空列表".to_string();
            } else {
                app.pending.clear();
                app.clamp_selection();
                app.status = "下载列表已清空".to_string();
            }
        }
        _ => {}
    }
    Ok(())
}

/// 下载进行中按 q：先请求停止，批次结束后自动退出；再按一次直接退出，
/// 退出前仍会等进行中的条目收尾。
fn request_quit(app: &mut App) {
    if !app.is_running() || app.quit_after_batch {
        app.exit = Some(TuiExit::Quit);
        return;
    }
    app.quit_after_batch = true;
    request_stop(app);
    app.status = "正在停止，进行中的条目结束后退出".to_string();
}

fn cycle_focus(app: &mut App) {
    app.focus = match app.focus {
        Focus::Input => Focus::Dir,
        Focus::Dir => Focus::Queue,
        Focus::Queue => Focus::Input,
    };
    if app.focus == Focus::Queue {
        app.clamp_selection();
    }
}

fn paste_text(app: &mut App, text: &str) {
    match app.focus {
        Focus::Input => app.input.push_str(text),
        Focus::Dir => app
            .dir_input
            .push_str(text.trim_end_matches(['\r', '\n'])),
        Focus::Queue => {
            let added = add_links_from_text(app, text);
            app.status = format!("已添加 {added} 个链接");
        }
    }
}

fn paste_from_clipboard(app: &mut App) {
    match clipboard::get_text() {
        Ok(Some(text)) => paste_text(app, &text),
        Ok(None) => {
            #[cfg(target_os = "android")]
            {
                app.status = "Android 剪贴板未就绪：需要 Termux + termux-api（termux-clipboard-get）"
                    .to_string();
            }
            #[cfg(not(target_os = "android"))]
            {
                app.status = "剪贴板为空，或当前构建未包含剪贴板后端".to_string();
            }
        }
        Err(e) => {
            app.status = format!("读取剪贴板失败：{e}");
        }
    }
}

fn submit_input(app: &mut App) -> Result<()> {
    let text = app.input.trim().to_string();
    if text.is_empty() {
        return Ok(());
    }

    if text == "ooo" {
        if app.is_running() {
            app.status = "下载进行中，结束后才能切换到旧版界面".to_string();
            return Ok(());
        }
        app.config.old_cli = true;
        save_config(app)?;
        app.exit = Some(TuiExit::SwitchToOldCli);
        return Ok(());
    }

    let found = extract_links(&text).len();
    if found == 0 {
        app.status = "未识别到 Vinted 商品链接".to_string();
        return Ok(());
    }
    let added = add_links_from_text(app, &text);
    app.input.clear();
    app.status = if added == found {
        format!("已添加 {added} 个链接，F5 或在列表中按 r 开始下载")
    } else {
        format!("已添加 {added} 个链接，{} 个已在列表中", found - added)
    };
    Ok(())
}

fn save_dir(app: &mut App) {
    let dir = app.dir_input.trim().to_string();
    if dir == app.config.save_path {
        app.status = "保存目录未变化".to_string();
        return;
    }
    app.config.save_path = dir;
    match save_config(app) {
        Ok(()) => {
            info!(target: "ui", "保存目录已改为 {}", app.config.default_save_dir().display());
            app.status = format!("closet 位置: {}", app.config.closet_root().display());
        }
        Err(err) => {
            app.status = format!("保存配置失败: {err}");
        }
    }
}

fn remove_selected(app: &mut App) {
    let Some(item) = app
        .queue_state
        .selected()
        .and_then(|idx| app.pending.all().get(idx))
        .cloned()
    else {
        return;
    };
    if item.status == DownloadStatus::InProgress {
        app.status = "该链接正在下载，不能移除".to_string();
        return;
    }
    app.pending.remove(&item.url);
    app.clamp_selection();
    app.status = format!("已移除: {}", truncate(&item.url, 60));
}

fn handle_mouse_home(app: &mut App, me: event::MouseEvent) {
    if !matches!(me.kind, MouseEventKind::Down(MouseButton::Left)) {
        return;
    }
    if let Some(stop_area) = app.stop_button_area
        && pos_in(stop_area, me.column, me.row)
    {
        request_stop(app);
        return;
    }
    let Some([input_area, dir_area, queue_area, _]) = app.last_home_layout else {
        return;
    };
    if pos_in(input_area, me.column, me.row) {
        app.focus = Focus::Input;
    } else if pos_in(dir_area, me.column, me.row) {
        app.focus = Focus::Dir;
    } else if pos_in(queue_area, me.column, me.row) {
        app.focus = Focus::Queue;
        let offset = app.queue_state.offset();
        let idx = offset + me.row.saturating_sub(queue_area.y + 1) as usize;
        if idx < app.pending.count() {
            app.queue_state.select(Some(idx));
        }
    }
}

fn status_color(status: DownloadStatus) -> Color {
    match status {
        DownloadStatus::Pending => Color::White,
        DownloadStatus::InProgress => Color::Yellow,
        DownloadStatus::Success => Color::Green,
        DownloadStatus::Failed => Color::Red,
        DownloadStatus::SkippedDuplicate => Color::DarkGray,
    }
}

fn focused_style(focused: bool) -> Style {
    if focused {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    }
}

pub(super) fn draw_home(frame: &mut ratatui::Frame, app: &mut App) {
    let (main, log_area) = split_with_log(frame.size());
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(5),
            Constraint::Length(6),
            Constraint::Length(6),
        ])
        .split(main);
    app.last_home_layout = Some([layout[1], layout[2], layout[3], layout[4]]);

    let stats = app.tracker_stats;
    let header_line = Line::from(vec![
        Span::styled(
            "Vinted 衣橱下载器",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw("  |  closet: "),
        Span::styled(
            app.config.closet_root().display().to_string(),
            Style::default().fg(Color::Green),
        ),
        Span::raw(format!(
            "  |  已下载 {} 件 / {} 位卖家 / {} 张图片",
            stats.items, stats.sellers, stats.images
        )),
    ]);
    let header = Paragraph::new(header_line).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Vinted Closet Downloader"),
    );
    frame.render_widget(header, layout[0]);

    let input = Paragraph::new(format!("> {}", app.input))
        .style(focused_style(app.focus == Focus::Input))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("商品链接 (可一次粘贴多个, Enter 加入列表, Ctrl+V 粘贴)"),
        );
    frame.render_widget(input, layout[1]);

    let dir_text = if app.dir_input.is_empty() && app.focus != Focus::Dir {
        "(当前目录)".to_string()
    } else {
        app.dir_input.clone()
    };
    let dir = Paragraph::new(dir_text)
        .style(focused_style(app.focus == Focus::Dir))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("保存目录 (Enter 保存)"),
        );
    frame.render_widget(dir, layout[2]);

    let items: Vec<ListItem> = if app.pending.count() == 0 {
        vec![ListItem::new("列表为空：粘贴链接或复制到剪贴板即可添加")]
    } else {
        app.pending
            .all()
            .iter()
            .map(|item| {
                ListItem::new(Line::from(vec![
                    Span::styled(
                        format!("[{}] ", item.status.label()),
                        Style::default().fg(status_color(item.status)),
                    ),
                    Span::raw(item.url.clone()),
                ]))
            })
            .collect()
    };
    let queue_title = format!(
        "下载列表 {} 条 / 等待 {} (r 开始, s 停止, d 移除, x 清理已完成, X 清空, c 配置, q 退出)",
        app.pending.count(),
        app.pending.count_pending()
    );
    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(queue_title)
                .border_style(focused_style(app.focus == Focus::Queue)),
        )
        .highlight_style(
            Style::default()
                .fg(Color::LightCyan)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol(">> ");
    frame.render_stateful_widget(list, layout[3], &mut app.queue_state);

    draw_progress(frame, app, layout[4]);

    let mut msg_lines: Vec<Line> = vec![Line::from(app.status.clone())];
    msg_lines.extend(
        app.messages
            .iter()
            .rev()
            .take(3)
            .rev()
            .map(|m| Line::from(m.as_str())),
    );
    let messages = Paragraph::new(msg_lines)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("状态 / 消息"));
    frame.render_widget(messages, layout[5]);

    render_log_box(frame, log_area, app);
}

fn draw_progress(frame: &mut ratatui::Frame, app: &mut App, area: Rect) {
    let block = Block::default().borders(Borders::ALL).title("进度");
    let inner = block.inner(area);
    frame.render_widget(block, area);

    app.stop_button_area = None;
    let Some(snap) = app.batch_progress else {
        frame.render_widget(Paragraph::new("尚未开始下载"), inner);
        return;
    };

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(inner);

    let gauges = [
        ("商品", snap.items_done, snap.items_total, snap.item_ratio(), Color::Green),
        ("图片", snap.images_done, snap.images_total, snap.image_ratio(), Color::Cyan),
    ];
    for (row, (label, done, total, ratio, color)) in rows.iter().zip(gauges) {
        let gauge = Gauge::default()
            .gauge_style(Style::default().fg(color))
            .ratio(ratio)
            .label(format!("{label} {done}/{total}"));
        frame.render_widget(gauge, *row);
    }

    if let Some(row) = rows.get(2) {
        let line = format!(
            "失败 {}  跳过 {}  |  {}",
            snap.failed,
            snap.skipped,
            app.last_output.as_deref().unwrap_or("")
        );
        frame.render_widget(
            Paragraph::new(truncate(&line, row.width as usize))
                .style(Style::default().fg(Color::DarkGray)),
            *row,
        );
    }

    if let Some(row) = rows.get(3)
        && app.is_running()
    {
        let para = Paragraph::new("[ 停止下载 ] (s/点击)")
            .alignment(Alignment::Center)
            .style(Style::default().fg(Color::Red).add_modifier(Modifier::BOLD));
        frame.render_widget(para, *row);
        app.stop_button_area = Some(*row);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEvent;
    use tempfile::TempDir;

    fn test_app(dir: &TempDir) -> App {
        let (tx, rx) = mpsc::channel();
        let mut config = Config::default().with_data_dir(Some(dir.path()));
        config.clipboard_monitor = false;
        App::new(config, tx, rx)
    }

    fn press(app: &mut App, code: KeyCode) {
        handle_event_home(app, Event::Key(KeyEvent::new(code, KeyModifiers::NONE))).unwrap();
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            press(app, KeyCode::Char(c));
        }
    }

    #[test]
    fn typed_link_goes_into_list() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(&dir);
        type_text(&mut app, "https://www.vinted.it/items/77-borsa");
        press(&mut app, KeyCode::Enter);
        assert!(app.input.is_empty());
        assert_eq!(app.pending.count(), 1);

        type_text(&mut app, "niente link qui");
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.status, "未识别到 Vinted 商品链接");
        assert_eq!(app.pending.count(), 1);
    }

    #[test]
    fn queue_focus_commands() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(&dir);
        add_links_from_text(
            &mut app,
            "https://www.vinted.it/items/1-a https://www.vinted.it/items/2-b",
        );
        app.pending
            .update_status("https://www.vinted.it/items/1-a", DownloadStatus::Success);

        press(&mut app, KeyCode::Tab);
        press(&mut app, KeyCode::Tab);
        assert_eq!(app.focus, Focus::Queue);

        press(&mut app, KeyCode::Char('x'));
        assert_eq!(app.pending.count(), 1);
        press(&mut app, KeyCode::Char('d'));
        assert_eq!(app.pending.count(), 0);
        assert_eq!(app.queue_state.selected(), None);

        press(&mut app, KeyCode::Char('c'));
        assert_eq!(app.view, View::Config);
    }

    #[test]
    fn dir_field_updates_save_path() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(&dir);
        press(&mut app, KeyCode::Tab);
        type_text(&mut app, "/tmp/vinted");
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.config.save_path, "/tmp/vinted");
        assert!(dir.path().join("config.yml").exists());
    }

    #[test]
    fn quit_without_batch_exits() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(&dir);
        app.focus = Focus::Queue;
        press(&mut app, KeyCode::Char('q'));
        assert_eq!(app.exit, Some(TuiExit::Quit));
    }

    #[test]
    fn quit_during_batch_stops_first() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(&dir);
        let flag = Arc::new(AtomicBool::new(false));
        app.cancel_flag = Some(Arc::clone(&flag));
        app.focus = Focus::Queue;

        press(&mut app, KeyCode::Char('q'));
        assert!(flag.load(Ordering::SeqCst));
        assert!(app.exit.is_none());
        press(&mut app, KeyCode::Char('q'));
        assert_eq!(app.exit, Some(TuiExit::Quit));
    }

    #[test]
    fn old_cli_switch_refused_while_batch_runs() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(&dir);
        app.cancel_flag = Some(Arc::new(AtomicBool::new(false)));

        type_text(&mut app, "ooo");
        press(&mut app, KeyCode::Enter);
        assert!(app.exit.is_none());
        assert!(!app.config.old_cli);

        app.cancel_flag = None;
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.exit, Some(TuiExit::SwitchToOldCli));
    }
}
