//! 无 UI（旧 CLI）交互入口。
//!
//! 使用标准输入输出进行交互，并在进入前尽量恢复终端模式。

use std::fs;
use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};

use crossterm::event::DisableMouseCapture;
use crossterm::execute;
use crossterm::terminal::{LeaveAlternateScreen, disable_raw_mode};

use crate::base_system::config::{config_path, write_with_comments};
use crate::base_system::context::Config;
use crate::base_system::item_id::{extract_links, tracking_key};
use crate::base_system::logging::LogSystem;
use crate::download::pending::PendingList;
use crate::download::tracker::DuplicateTracker;

mod config;
mod download;

pub use download::{print_stats, run_batch};

const HELP: &str = "\
命令：
  <链接...>     直接下载（可一次粘贴多个）
  a <链接...>   加入下载列表
  l             查看下载列表
  r             下载列表中等待/失败的链接
  x             清理列表中已完成的链接
  st [卖家]     下载统计（可指定卖家）
  f <ID/链接>   删除一条下载记录，下次不再当作重复
  s             配置
  tui           切换回全屏界面
  q             退出";

pub fn run(config: &mut Config, log: &LogSystem) -> Result<()> {
    // 上一次可能在 TUI raw 模式下退出，这里尽量恢复终端，保证按行输入可用
    let _ = disable_raw_mode();
    let mut out = io::stdout();
    let _ = execute!(out, DisableMouseCapture, LeaveAlternateScreen);

    println!(
        "Vinted 衣橱下载器 v{}\n\
把商品链接交给外部下载器，按 卖家/标题 整理到 closet 目录，并记录已下载的商品避免重复。\n\
仅供学习研究使用，请遵守平台条款，勿用于侵犯他人权益的用途。\n\n{HELP}\n",
        env!("CARGO_PKG_VERSION")
    );

    let mut pending = PendingList::open(config.queue_file_path());
    pending.reset_in_progress();

    loop {
        let prompt = format!(
            "请输入 Vinted 商品链接或命令（h 帮助，保存到 {}）：",
            config.closet_root().display()
        );
        let Some(input) = read_line(&prompt)? else {
            println!();
            break;
        };
        let text = input.trim();
        if text.is_empty() {
            continue;
        }
        let (cmd, rest) = match text.split_once(char::is_whitespace) {
            Some((c, r)) => (c, r.trim()),
            None => (text, ""),
        };

        match cmd {
            "q" | "Q" => {
                println!("已退出。");
                break;
            }
            "h" | "help" | "?" => println!("{HELP}\n"),
            "s" => {
                config::show_config_menu(config)?;
                pending = PendingList::open(config.queue_file_path());
            }
            "tui" => {
                config.old_cli = false;
                let path = config_path::<Config>(None, Some(&config.data_dir()));
                write_with_comments(config, &path)
                    .with_context(|| format!("写入 {}", path.display()))?;
                break;
            }
            "st" => show_stats(config, rest),
            "f" => forget_record(config, rest)?,
            "l" => show_pending(&pending),
            "a" => {
                let links = extract_links(rest);
                let added = links.iter().filter(|l| pending.add(l)).count();
                println!("已加入 {added} 个链接（共 {} 个）\n", pending.count());
            }
            "x" => {
                let removed = pending.clear_finished();
                println!("已移除 {removed} 个已完成的链接\n");
            }
            "r" => {
                let links = pending.runnable_urls();
                if links.is_empty() {
                    println!("下载列表中没有等待下载的链接\n");
                    continue;
                }
                let report = run_batch(config, &links, false, log);
                for outcome in &report.outcomes {
                    pending.update_status(&outcome.entry.link, outcome.status);
                }
            }
            _ => {
                let links = extract_links(text);
                if links.is_empty() {
                    println!("未识别到 Vinted 商品链接，输入 h 查看命令\n");
                    continue;
                }
                ask_save_dir(config)?;
                run_batch(config, &links, false, log);
            }
        }
    }

    Ok(())
}

fn ask_save_dir(config: &mut Config) -> Result<()> {
    let Some(input) = read_line(&format!(
        "保存路径（默认：{}）：",
        config.default_save_dir().display()
    ))?
    else {
        return Ok(());
    };
    let p = input.trim().trim_end_matches(['/', '\\']);
    if !p.is_empty() {
        fs::create_dir_all(p).with_context(|| format!("创建目录失败: {p}"))?;
        config.save_path = p.to_string();
    }
    Ok(())
}

fn show_pending(pending: &PendingList) {
    if pending.count() == 0 {
        println!("下载列表为空\n");
        return;
    }
    println!("\n===== 下载列表 =====");
    for (idx, item) in pending.all().iter().enumerate() {
        println!(
            "{}. [{}] {}  ({})",
            idx + 1,
            item.status.label(),
            item.url,
            item.added_at
        );
    }
    println!("共 {} 个，等待 {} 个\n", pending.count(), pending.count_pending());
}

fn show_stats(config: &Config, seller: &str) {
    if seller.is_empty() {
        print_stats(config);
        return;
    }
    let tracker = DuplicateTracker::open(config.tracking_file_path());
    let records = tracker.records_for_seller(seller);
    if records.is_empty() {
        println!("没有卖家 {seller} 的下载记录\n");
        return;
    }
    let stats = tracker.seller_stats(seller);
    println!("\n===== {seller} =====");
    for rec in records {
        println!("{} | {} | {} 张 | {}", rec.item_id, rec.title, rec.image_count, rec.downloaded_at);
    }
    println!("共 {} 件商品，{} 张图片\n", stats.items, stats.images);
}

fn forget_record(config: &Config, target: &str) -> Result<()> {
    if target.is_empty() {
        println!("用法: f <商品ID或链接>\n");
        return Ok(());
    }
    let key = tracking_key(target);
    let mut tracker = DuplicateTracker::open(config.tracking_file_path());
    if tracker
        .forget(&key)
        .with_context(|| format!("更新下载记录 {}", tracker.path().display()))?
    {
        println!("已删除记录 {key}\n");
    } else {
        println!("没有找到记录 {key}\n");
    }
    Ok(())
}

/// 读取一行输入；stdin 已关闭时返回 `None`。
fn read_line(prompt: &str) -> Result<Option<String>> {
    print!("{prompt}");
    io::stdout().flush().ok();
    let mut line = String::new();
    let n = io::stdin().lock().read_line(&mut line)?;
    Ok((n > 0).then_some(line))
}
