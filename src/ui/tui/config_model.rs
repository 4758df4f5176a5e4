//! TUI 配置模型与编辑逻辑。
//!
//! 将 `Config` 映射为可展示/可编辑的字段列表，并负责写回 `config.yml`。

use anyhow::{Result, anyhow};

use crate::download::pending::PendingList;
use crate::download::queue::MAX_WORKERS;
use crate::download::tracker::DuplicateTracker;

use super::App;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ConfigField {
    OldCli,
    ClipboardMonitor,
    DownloaderProgram,
    DownloaderArgs,
    ItemTimeout,
    MaxWorkers,
    DownloadAllItems,
    SaveInDir,
    DownloadSellerAvatar,
    SavePath,
    ClosetDir,
    TrackingFile,
    QueueFile,
    SkipDuplicates,
    AutoOrganize,
    KeepItemJson,
}

#[derive(Debug, Clone)]
pub(super) struct ConfigEntry {
    pub(super) title: &'static str,
    pub(super) field: ConfigField,
}

#[derive(Debug, Clone)]
pub(super) struct ConfigCategory {
    pub(super) title: &'static str,
    pub(super) entries: Vec<ConfigEntry>,
}

fn entry(title: &'static str, field: ConfigField) -> ConfigEntry {
    ConfigEntry { title, field }
}

pub(super) fn build_config_categories() -> Vec<ConfigCategory> {
    vec![
        ConfigCategory {
            title: "下载器",
            entries: vec![
                entry("下载器程序", ConfigField::DownloaderProgram),
                entry("附加参数(逗号分隔)", ConfigField::DownloaderArgs),
                entry("单条超时(秒, 0=不限)", ConfigField::ItemTimeout),
                entry("并发数(1-4)", ConfigField::MaxWorkers),
                entry("下载卖家全部商品", ConfigField::DownloadAllItems),
                entry("每件商品单独建目录", ConfigField::SaveInDir),
                entry("下载卖家头像", ConfigField::DownloadSellerAvatar),
            ],
        },
        ConfigCategory {
            title: "路径",
            entries: vec![
                entry("保存路径", ConfigField::SavePath),
                entry("closet 目录", ConfigField::ClosetDir),
                entry("下载记录文件", ConfigField::TrackingFile),
                entry("下载列表文件", ConfigField::QueueFile),
            ],
        },
        ConfigCategory {
            title: "整理与去重",
            entries: vec![
                entry("跳过已下载商品", ConfigField::SkipDuplicates),
                entry("自动整理到 closet", ConfigField::AutoOrganize),
                entry("保留 item.json", ConfigField::KeepItemJson),
            ],
        },
        ConfigCategory {
            title: "界面",
            entries: vec![
                entry("监听剪贴板", ConfigField::ClipboardMonitor),
                entry("使用旧版命令行界面", ConfigField::OldCli),
            ],
        },
    ]
}

pub(super) fn current_cfg_value(app: &App, field: ConfigField) -> String {
    let cfg = &app.config;
    match field {
        ConfigField::OldCli => cfg.old_cli.to_string(),
        ConfigField::ClipboardMonitor => cfg.clipboard_monitor.to_string(),
        ConfigField::DownloaderProgram => cfg.downloader_program.clone(),
        ConfigField::DownloaderArgs => cfg.downloader_args.join(", "),
        ConfigField::ItemTimeout => cfg.item_timeout.to_string(),
        ConfigField::MaxWorkers => cfg.max_workers.to_string(),
        ConfigField::DownloadAllItems => cfg.download_all_items.to_string(),
        ConfigField::SaveInDir => cfg.save_in_dir.to_string(),
        ConfigField::DownloadSellerAvatar => cfg.download_seller_avatar.to_string(),
        ConfigField::SavePath => cfg.save_path.clone(),
        ConfigField::ClosetDir => cfg.closet_dir.clone(),
        ConfigField::TrackingFile => cfg.tracking_file.clone(),
        ConfigField::QueueFile => cfg.queue_file.clone(),
        ConfigField::SkipDuplicates => cfg.skip_duplicates.to_string(),
        ConfigField::AutoOrganize => cfg.auto_organize.to_string(),
        ConfigField::KeepItemJson => cfg.keep_item_json.to_string(),
    }
}

pub(super) fn cfg_field_is_bool(field: ConfigField) -> bool {
    matches!(
        field,
        ConfigField::OldCli
            | ConfigField::ClipboardMonitor
            | ConfigField::DownloadAllItems
            | ConfigField::SaveInDir
            | ConfigField::DownloadSellerAvatar
            | ConfigField::SkipDuplicates
            | ConfigField::AutoOrganize
            | ConfigField::KeepItemJson
    )
}

fn selected_entry(app: &App) -> Option<(usize, usize, &ConfigEntry)> {
    let cat_idx = app.cfg_cat_state.selected()?;
    let entry_idx = app.cfg_entry_state.selected()?;
    let entry = app.cfg_categories.get(cat_idx)?.entries.get(entry_idx)?;
    Some((cat_idx, entry_idx, entry))
}

/// 回车：布尔项直接切换并保存，其余进入文本编辑。
pub(super) fn start_cfg_edit(app: &mut App) {
    let Some((cat_idx, entry_idx, entry)) = selected_entry(app) else {
        return;
    };
    let field = entry.field;
    let title = entry.title;

    if cfg_field_is_bool(field) {
        let flipped = !parse_bool(&current_cfg_value(app, field)).unwrap_or(false);
        app.cfg_edit_buffer = flipped.to_string();
        if let Err(err) = apply_cfg_edit(app, cat_idx, entry_idx) {
            app.status = format!("保存失败: {err}");
        }
        app.cfg_edit_buffer.clear();
        return;
    }

    app.cfg_editing = Some((cat_idx, entry_idx));
    app.cfg_edit_buffer = current_cfg_value(app, field);
    let cat_title = app.cfg_categories[cat_idx].title;
    app.status = format!("正在编辑 [{cat_title}]: {title}");
}

pub(super) fn apply_cfg_edit(app: &mut App, cat_idx: usize, entry_idx: usize) -> Result<()> {
    let Some(entry) = app
        .cfg_categories
        .get(cat_idx)
        .and_then(|c| c.entries.get(entry_idx))
    else {
        return Ok(());
    };
    let field = entry.field;
    let entry_title = entry.title;
    let raw = app.cfg_edit_buffer.trim().to_string();

    let mut note: Option<String> = None;

    match field {
        ConfigField::OldCli => {
            app.config.old_cli = parse_bool(&raw).ok_or_else(|| anyhow!("请输入 true/false"))?;
            if app.config.old_cli {
                note = Some("下次启动生效".to_string());
            }
        }
        ConfigField::ClipboardMonitor => {
            app.config.clipboard_monitor =
                parse_bool(&raw).ok_or_else(|| anyhow!("请输入 true/false"))?;
        }
        ConfigField::DownloaderProgram => {
            if raw.is_empty() {
                app.status = "下载器程序不能为空".to_string();
                return Ok(());
            }
            app.config.downloader_program = raw;
        }
        ConfigField::DownloaderArgs => {
            app.config.downloader_args = parse_string_list(&raw);
        }
        ConfigField::ItemTimeout => {
            app.config.item_timeout = raw.parse().map_err(|_| anyhow!("请输入秒数"))?;
        }
        ConfigField::MaxWorkers => {
            let val: usize = raw.parse().map_err(|_| anyhow!("请输入正整数"))?;
            if val == 0 || val > MAX_WORKERS {
                app.status = format!("并发数需在 1-{MAX_WORKERS} 之间");
                return Ok(());
            }
            app.config.max_workers = val;
        }
        ConfigField::DownloadAllItems => {
            app.config.download_all_items =
                parse_bool(&raw).ok_or_else(|| anyhow!("请输入 true/false"))?;
        }
        ConfigField::SaveInDir => {
            app.config.save_in_dir = parse_bool(&raw).ok_or_else(|| anyhow!("请输入 true/false"))?;
        }
        ConfigField::DownloadSellerAvatar => {
            app.config.download_seller_avatar =
                parse_bool(&raw).ok_or_else(|| anyhow!("请输入 true/false"))?;
        }
        ConfigField::SavePath => {
            app.config.save_path = raw;
            app.dir_input = app.config.save_path.clone();
        }
        ConfigField::ClosetDir => {
            app.config.closet_dir = raw;
        }
        ConfigField::TrackingFile => {
            if raw.is_empty() {
                app.status = "下载记录文件不能为空".to_string();
                return Ok(());
            }
            if app.is_running() {
                app.status = "下载进行中，暂不能修改记录文件".to_string();
                return Ok(());
            }
            app.config.tracking_file = raw;
            app.tracker_stats = DuplicateTracker::open(app.config.tracking_file_path()).stats();
        }
        ConfigField::QueueFile => {
            if raw.is_empty() {
                app.status = "下载列表文件不能为空".to_string();
                return Ok(());
            }
            if app.is_running() {
                app.status = "下载进行中，暂不能修改列表文件".to_string();
                return Ok(());
            }
            app.config.queue_file = raw;
            app.pending = PendingList::open(app.config.queue_file_path());
            app.queue_state.select(None);
            app.clamp_selection();
            note = Some(format!("已载入 {} 个链接", app.pending.count()));
        }
        ConfigField::SkipDuplicates => {
            app.config.skip_duplicates =
                parse_bool(&raw).ok_or_else(|| anyhow!("请输入 true/false"))?;
        }
        ConfigField::AutoOrganize => {
            app.config.auto_organize =
                parse_bool(&raw).ok_or_else(|| anyhow!("请输入 true/false"))?;
        }
        ConfigField::KeepItemJson => {
            app.config.keep_item_json =
                parse_bool(&raw).ok_or_else(|| anyhow!("请输入 true/false"))?;
        }
    }

    super::save_config(app)?;
    match note {
        Some(extra) => app.status = format!("已保存: {entry_title}（{extra}）"),
        None => app.status = format!("已保存: {entry_title}"),
    }
    Ok(())
}

fn parse_bool(input: &str) -> Option<bool> {
    match input.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" | "on" => Some(true),
        "false" | "0" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

fn parse_string_list(input: &str) -> Vec<String> {
    input
        .split([',', ';', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
