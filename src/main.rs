//! Vinted 衣橱下载器。
//!
//! 本 crate 负责：配置加载、交互界面（TUI/CLI）、批量调度外部下载器，
//! 以及把下载结果按卖家整理到 closet 目录并记录，避免重复下载。
//!
//! 代码结构（读代码入口）：
//! - `base_system`：配置/日志/链接解析等基础设施
//! - `download`：外部下载器调用、去重记录、整理、批量队列
//! - `ui`：TUI 与无 UI（old cli）两套交互

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tracing::info;

mod base_system;
mod download;
mod ui;

use base_system::config::load_or_create;
use base_system::context::Config;
use base_system::logging::{LogOptions, LogSystem};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(name = "closet-downloader")]
#[command(about = "Vinted closet downloader (TUI / CLI)")]
struct Cli {
    /// 启用调试日志输出
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// 显示版本信息后退出
    #[arg(long, default_value_t = false)]
    version: bool,

    /// 数据目录路径（存放 config.yml、logs、下载记录等文件）
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// 打印下载记录统计后退出
    #[arg(long, default_value_t = false)]
    stats: bool,

    /// 忽略下载记录，重新下载已下载过的商品
    #[arg(long, default_value_t = false)]
    force: bool,

    /// 覆盖配置中的 closet 目录（仅本次运行）
    #[arg(long)]
    closet_dir: Option<String>,

    /// 商品链接；给出时以无界面批处理模式运行
    links: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("Vinted Closet Downloader v{VERSION}");
        return Ok(());
    }

    let headless = cli.stats || !cli.links.is_empty();
    let data_dir = cli.data_dir.as_deref();
    let log = init_logging(cli.debug, headless, data_dir)?;

    let mut config = load_config(data_dir, cli.closet_dir.as_deref())?;

    if cli.stats {
        ui::noui::print_stats(&config);
        return Ok(());
    }

    if !cli.links.is_empty() {
        info!(target: "startup", "批处理模式: {} 个链接", cli.links.len());
        let report = ui::noui::run_batch(&config, &cli.links, cli.force, &log);
        if report.has_failures() {
            // 退出前收尾日志（archive），std::process::exit 不会运行析构
            drop(log);
            std::process::exit(1);
        }
        return Ok(());
    }

    info!(target: "startup", "当前版本: v{VERSION}");
    loop {
        if config.old_cli {
            ui::noui::run(&mut config, &log)?;
            if config.old_cli {
                return Ok(());
            }
            continue;
        }

        match ui::tui::run(config.clone())? {
            ui::tui::TuiExit::Quit => return Ok(()),
            ui::tui::TuiExit::SwitchToOldCli => {
                // 重新从磁盘加载配置（TUI 中的修改已写回），然后进入 noui
                config = load_config(data_dir, cli.closet_dir.as_deref())?;
                config.old_cli = true;
            }
        }
    }
}

fn load_config(data_dir: Option<&Path>, closet_override: Option<&str>) -> Result<Config> {
    let config = load_or_create::<Config>(data_dir).context("加载 config.yml")?;
    Ok(config
        .with_data_dir(data_dir)
        .with_closet_override(closet_override.map(Path::new)))
}

fn init_logging(debug: bool, headless: bool, base_dir: Option<&Path>) -> Result<LogSystem> {
    let opts = LogOptions {
        debug,
        use_color: true,
        archive_on_exit: true,
        console: headless,
        broadcast_to_ui: !headless,
    };
    LogSystem::init_with_base(opts, base_dir).map_err(|e| anyhow!(e))
}
