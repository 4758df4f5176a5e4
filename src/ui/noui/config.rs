//! 无 UI 配置编辑器。
//!
//! 提供交互式菜单修改 `config.yml`。

use anyhow::{Context, Result, anyhow, bail};

use crate::base_system::config::{config_path, write_with_comments};
use crate::base_system::context::Config;
use crate::download::queue::MAX_WORKERS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigValueType {
    Bool,
    Int,
    String,
    List,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigField {
    SavePath,
    ClosetDir,
    DownloaderProgram,
    DownloaderArgs,
    ItemTimeout,
    MaxWorkers,
    DownloadAllItems,
    SaveInDir,
    DownloadSellerAvatar,
    SkipDuplicates,
    AutoOrganize,
    KeepItemJson,
    TrackingFile,
    QueueFile,
    OldCli,
}

#[derive(Debug, Clone, Copy)]
struct ConfigOption {
    name: &'static str,
    field: ConfigField,
    ty: ConfigValueType,
}

const fn opt(name: &'static str, field: ConfigField, ty: ConfigValueType) -> ConfigOption {
    ConfigOption { name, field, ty }
}

const OPTS: &[ConfigOption] = &[
    opt("保存路径", ConfigField::SavePath, ConfigValueType::String),
    opt("closet 目录(留空=保存路径/closet)", ConfigField::ClosetDir, ConfigValueType::String),
    opt("下载器程序", ConfigField::DownloaderProgram, ConfigValueType::String),
    opt("下载器附加参数(逗号分隔)", ConfigField::DownloaderArgs, ConfigValueType::List),
    opt("单条超时秒数(0=不限)", ConfigField::ItemTimeout, ConfigValueType::Int),
    opt("并发数(1-4)", ConfigField::MaxWorkers, ConfigValueType::Int),
    opt("下载卖家全部商品", ConfigField::DownloadAllItems, ConfigValueType::Bool),
    opt("每件商品单独建目录", ConfigField::SaveInDir, ConfigValueType::Bool),
    opt("下载卖家头像", ConfigField::DownloadSellerAvatar, ConfigValueType::Bool),
    opt("跳过已下载商品", ConfigField::SkipDuplicates, ConfigValueType::Bool),
    opt("自动整理到 closet", ConfigField::AutoOrganize, ConfigValueType::Bool),
    opt("保留 item.json", ConfigField::KeepItemJson, ConfigValueType::Bool),
    opt("下载记录文件", ConfigField::TrackingFile, ConfigValueType::String),
    opt("下载列表文件", ConfigField::QueueFile, ConfigValueType::String),
    opt("使用旧版命令行界面", ConfigField::OldCli, ConfigValueType::Bool),
];

pub(super) fn show_config_menu(config: &mut Config) -> Result<()> {
    let path = config_path::<Config>(None, Some(&config.data_dir()));
    loop {
        println!("\n===== 配置 ({}) =====", path.display());
        for (idx, opt) in OPTS.iter().enumerate() {
            println!(
                "{}. {}: {}",
                idx + 1,
                opt.name,
                config_value_display(config, opt.field)
            );
        }
        println!("0. 返回主菜单");

        let Some(choice) = super::read_line("\n请选择要修改的配置项编号: ")? else {
            break;
        };
        let choice = choice.trim();
        if choice == "0" || choice.is_empty() {
            break;
        }
        let Ok(idx) = choice.parse::<usize>() else {
            println!("请输入数字编号");
            continue;
        };
        if idx == 0 || idx > OPTS.len() {
            println!("编号超出范围");
            continue;
        }
        let opt = OPTS[idx - 1];
        let cur = config_value_display(config, opt.field);
        let hint = match opt.ty {
            ConfigValueType::Bool => "(true/false)",
            ConfigValueType::Int => "(整数)",
            ConfigValueType::List => "(逗号分隔, 输入 - 清空)",
            ConfigValueType::String => "(输入 - 清空)",
        };
        let Some(input) = super::read_line(&format!(
            "当前 {} = {}\n输入新值{}(留空取消): ",
            opt.name, cur, hint
        ))?
        else {
            break;
        };
        let new_text = input.trim();
        if new_text.is_empty() {
            println!("已取消修改");
            continue;
        }

        if let Err(err) = apply_config_edit(config, opt, new_text) {
            println!("修改失败: {err}");
            continue;
        }

        write_with_comments(config, &path)
            .with_context(|| format!("写入 {}", path.display()))?;
        println!(
            "已更新 {} = {}",
            opt.name,
            config_value_display(config, opt.field)
        );
    }

    Ok(())
}

fn config_value_display(config: &Config, field: ConfigField) -> String {
    match field {
        ConfigField::SavePath => config.default_save_dir().display().to_string(),
        ConfigField::ClosetDir => config.closet_root().display().to_string(),
        ConfigField::DownloaderProgram => config.downloader_program.clone(),
        ConfigField::DownloaderArgs => config.downloader_args.join(", "),
        ConfigField::ItemTimeout => config.item_timeout.to_string(),
        ConfigField::MaxWorkers => config.max_workers.to_string(),
        ConfigField::DownloadAllItems => config.download_all_items.to_string(),
        ConfigField::SaveInDir => config.save_in_dir.to_string(),
        ConfigField::DownloadSellerAvatar => config.download_seller_avatar.to_string(),
        ConfigField::SkipDuplicates => config.skip_duplicates.to_string(),
        ConfigField::AutoOrganize => config.auto_organize.to_string(),
        ConfigField::KeepItemJson => config.keep_item_json.to_string(),
        ConfigField::TrackingFile => config.tracking_file_path().display().to_string(),
        ConfigField::QueueFile => config.queue_file_path().display().to_string(),
        ConfigField::OldCli => config.old_cli.to_string(),
    }
}

fn apply_config_edit(config: &mut Config, opt: ConfigOption, raw: &str) -> Result<()> {
    // "-" 表示清空字符串/列表
    let cleared = raw == "-";
    let text = if cleared { "" } else { raw };

    match (opt.field, opt.ty) {
        (field, ConfigValueType::Bool) => {
            let val = parse_bool(text).ok_or_else(|| anyhow!("请输入 true/false"))?;
            match field {
                ConfigField::DownloadAllItems => config.download_all_items = val,
                ConfigField::SaveInDir => config.save_in_dir = val,
                ConfigField::DownloadSellerAvatar => config.download_seller_avatar = val,
                ConfigField::SkipDuplicates => config.skip_duplicates = val,
                ConfigField::AutoOrganize => config.auto_organize = val,
                ConfigField::KeepItemJson => config.keep_item_json = val,
                ConfigField::OldCli => config.old_cli = val,
                _ => {}
            }
        }
        (ConfigField::ItemTimeout, _) => {
            config.item_timeout = text.parse().map_err(|_| anyhow!("请输入秒数"))?;
        }
        (ConfigField::MaxWorkers, _) => {
            let val: usize = text.parse().map_err(|_| anyhow!("请输入正整数"))?;
            if val == 0 || val > MAX_WORKERS {
                bail!("并发数需在 1-{MAX_WORKERS} 之间");
            }
            config.max_workers = val;
        }
        (ConfigField::DownloaderArgs, _) => {
            config.downloader_args = text
                .split([',', ';'])
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        (ConfigField::DownloaderProgram, _) => {
            if text.is_empty() {
                bail!("下载器程序不能为空");
            }
            config.downloader_program = text.to_string();
        }
        (ConfigField::SavePath, _) => config.save_path = text.to_string(),
        (ConfigField::ClosetDir, _) => config.closet_dir = text.to_string(),
        (ConfigField::TrackingFile | ConfigField::QueueFile, _) if text.is_empty() => {
            bail!("文件路径不能为空");
        }
        (ConfigField::TrackingFile, _) => config.tracking_file = text.to_string(),
        (ConfigField::QueueFile, _) => config.queue_file = text.to_string(),
        (field, ty) => bail!("不支持修改 {field:?} ({ty:?})"),
    }
    Ok(())
}

fn parse_bool(input: &str) -> Option<bool> {
    match input.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" | "on" | "是" => Some(true),
        "false" | "0" | "no" | "n" | "off" | "否" => Some(false),
        _ => None,
    }
}
