use super::*;

use super::config_model::{apply_cfg_edit, current_cfg_value, start_cfg_edit};

fn back_home(app: &mut App) {
    app.view = View::Home;
    app.cfg_focus = ConfigFocus::Entry;
    app.status = "返回主界面".to_string();
}

pub(super) fn handle_event_config(app: &mut App, event: Event) -> Result<()> {
    match event {
        Event::Paste(s) if app.cfg_editing.is_some() => {
            app.cfg_edit_buffer.push_str(s.trim_end_matches(['\r', '\n']));
        }
        Event::Key(key) if key.kind == KeyEventKind::Press => {
            if let Some((cat_idx, entry_idx)) = app.cfg_editing {
                match key.code {
                    KeyCode::Esc => {
                        app.cfg_editing = None;
                        app.cfg_edit_buffer.clear();
                        app.status = "取消修改".to_string();
                    }
                    KeyCode::Enter => {
                        if let Err(err) = apply_cfg_edit(app, cat_idx, entry_idx) {
                            app.status = format!("保存失败: {err}");
                        } else {
                            app.cfg_editing = None;
                            app.cfg_edit_buffer.clear();
                        }
                    }
                    KeyCode::Backspace => {
                        app.cfg_edit_buffer.pop();
                    }
                    KeyCode::Char(c) => {
                        app.cfg_edit_buffer.push(c);
                    }
                    _ => {}
                }
                return Ok(());
            }

            match key.code {
                KeyCode::Char('q') | KeyCode::Esc | KeyCode::Char('c') | KeyCode::Char('b') => {
                    back_home(app)
                }
                KeyCode::Tab => {
                    app.cfg_focus = match app.cfg_focus {
                        ConfigFocus::Category => ConfigFocus::Entry,
                        ConfigFocus::Entry => ConfigFocus::Category,
                    };
                }
                KeyCode::Left => {
                    select_prev_category(app);
                    app.cfg_focus = ConfigFocus::Category;
                }
                KeyCode::Right => {
                    select_next_category(app);
                    app.cfg_focus = ConfigFocus::Category;
                }
                KeyCode::Up => match app.cfg_focus {
                    ConfigFocus::Category => select_prev_category(app),
                    ConfigFocus::Entry => select_prev_entry(app),
                },
                KeyCode::Down => match app.cfg_focus {
                    ConfigFocus::Category => select_next_category(app),
                    ConfigFocus::Entry => select_next_entry(app),
                },
                KeyCode::Enter | KeyCode::Char(' ') => match app.cfg_focus {
                    ConfigFocus::Category => {
                        app.cfg_focus = ConfigFocus::Entry;
                        ensure_entry_selection(app);
                    }
                    ConfigFocus::Entry => start_cfg_edit(app),
                },
                _ => {}
            }
        }
        Event::Mouse(me) => handle_mouse_config(app, me),
        _ => {}
    }

    Ok(())
}

fn handle_mouse_config(app: &mut App, me: event::MouseEvent) {
    let Some([_, cat_area, entry_area]) = app.last_config_layout else {
        return;
    };
    if app.cfg_editing.is_some() {
        return;
    }
    let clicked = matches!(me.kind, MouseEventKind::Down(MouseButton::Left));
    if !clicked && !matches!(me.kind, MouseEventKind::Moved) {
        return;
    }

    if pos_in(cat_area, me.column, me.row) {
        let idx = me.row.saturating_sub(cat_area.y + 1) as usize;
        if idx < app.cfg_categories.len() {
            app.cfg_cat_state.select(Some(idx));
            ensure_entry_selection(app);
            app.cfg_focus = ConfigFocus::Category;
        }
        return;
    }

    if pos_in(entry_area, me.column, me.row) {
        let len = current_cfg_entries(app).map(|e| e.len()).unwrap_or(0);
        let idx = me.row.saturating_sub(entry_area.y + 1) as usize;
        if idx < len {
            app.cfg_entry_state.select(Some(idx));
            app.cfg_focus = ConfigFocus::Entry;
            if clicked {
                start_cfg_edit(app);
            }
        }
    }
}

pub(super) fn draw_config(frame: &mut ratatui::Frame, app: &mut App) {
    let (main, log_area) = split_with_log(frame.size());
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(10),
            Constraint::Length(5),
        ])
        .split(main);
    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(20), Constraint::Min(40)])
        .split(layout[1]);
    app.last_config_layout = Some([layout[0], body[0], body[1]]);

    let header_line = Line::from(vec![
        Span::styled(
            "配置编辑",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw("  |  "),
        Span::styled(
            app.config_file.display().to_string(),
            Style::default().fg(Color::Green),
        ),
    ]);
    let header = Paragraph::new(header_line).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Vinted Closet Downloader"),
    );
    frame.render_widget(header, layout[0]);

    let focus_style = |focused: bool| {
        let base = Style::default().fg(Color::LightCyan);
        if focused {
            base.add_modifier(Modifier::BOLD)
        } else {
            base
        }
    };

    let cat_items: Vec<ListItem> = app
        .cfg_categories
        .iter()
        .map(|c| ListItem::new(c.title))
        .collect();
    let cat_list = List::new(cat_items)
        .block(Block::default().borders(Borders::ALL).title("分类"))
        .highlight_style(focus_style(app.cfg_focus == ConfigFocus::Category))
        .highlight_symbol(">> ");
    frame.render_stateful_widget(cat_list, body[0], &mut app.cfg_cat_state);

    let editing_row = app
        .cfg_editing
        .filter(|(cat, _)| Some(*cat) == app.cfg_cat_state.selected())
        .map(|(_, entry)| entry);
    let entry_items: Vec<ListItem> = match current_cfg_entries(app) {
        Some(entries) => entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| {
                let mut spans = vec![Span::raw(format!(
                    "{}: {}",
                    entry.title,
                    current_cfg_value(app, entry.field)
                ))];
                if editing_row == Some(idx) {
                    spans.push(Span::raw("  [编辑中] "));
                    spans.push(Span::styled(
                        app.cfg_edit_buffer.clone(),
                        Style::default().fg(Color::Yellow),
                    ));
                }
                ListItem::new(Line::from(spans))
            })
            .collect(),
        None => vec![ListItem::new("无可编辑配置")],
    };
    let entry_list = List::new(entry_items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("配置项 (上下选择, 回车编辑/切换)"),
        )
        .highlight_style(focus_style(app.cfg_focus == ConfigFocus::Entry))
        .highlight_symbol(">> ");
    frame.render_stateful_widget(entry_list, body[1], &mut app.cfg_entry_state);

    let hint = if app.cfg_editing.is_some() {
        "编辑中: 回车保存，Esc 取消。"
    } else {
        "左右/Tab 切换分类，↑↓ 选择，Enter 编辑，q/Esc 返回。修改立即写入 config.yml。"
    };
    let msg_lines = vec![Line::from(app.status.clone()), Line::from(hint)];
    let messages = Paragraph::new(msg_lines)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("状态"));
    frame.render_widget(messages, layout[2]);

    render_log_box(frame, log_area, app);
}
