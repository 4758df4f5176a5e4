//! 全局配置结构（Config）与默认值。
//!
//! 该模块同时提供生成 `config.yml` 的字段元信息，以及文件名规范化工具。

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use super::config::{ConfigSpec, FieldMeta};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // 程序配置
    #[serde(default = "default_false")]
    pub old_cli: bool,
    #[serde(default = "default_true")]
    pub clipboard_monitor: bool,

    // 外部下载器
    #[serde(default = "default_downloader_program")]
    pub downloader_program: String,
    #[serde(default)]
    pub downloader_args: Vec<String>,
    #[serde(default = "default_item_timeout")]
    pub item_timeout: u64,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_false")]
    pub download_all_items: bool,
    #[serde(default = "default_false")]
    pub save_in_dir: bool,
    #[serde(default = "default_false")]
    pub download_seller_avatar: bool,

    // 路径配置
    #[serde(default)]
    pub save_path: String,
    #[serde(default)]
    pub closet_dir: String,
    #[serde(default = "default_tracking_file")]
    pub tracking_file: String,
    #[serde(default = "default_queue_file")]
    pub queue_file: String,

    // 整理与去重
    #[serde(default = "default_true")]
    pub skip_duplicates: bool,
    #[serde(default = "default_true")]
    pub auto_organize: bool,
    #[serde(default = "default_true")]
    pub keep_item_json: bool,

    #[serde(skip)]
    data_dir: Option<PathBuf>,
    /// 命令行 `--closet-dir`，不写回 config.yml。
    #[serde(skip)]
    closet_override: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            old_cli: default_false(),
            clipboard_monitor: default_true(),
            downloader_program: default_downloader_program(),
            downloader_args: Vec::new(),
            item_timeout: default_item_timeout(),
            max_workers: default_max_workers(),
            download_all_items: default_false(),
            save_in_dir: default_false(),
            download_seller_avatar: default_false(),
            save_path: String::new(),
            closet_dir: String::new(),
            tracking_file: default_tracking_file(),
            queue_file: default_queue_file(),
            skip_duplicates: default_true(),
            auto_organize: default_true(),
            keep_item_json: default_true(),
            data_dir: None,
            closet_override: None,
        }
    }
}

impl ConfigSpec for Config {
    const FILE_NAME: &'static str = "config.yml";

    fn fields() -> &'static [FieldMeta] {
        static FIELDS: [FieldMeta; 16] = [
            FieldMeta {
                name: "old_cli",
                description: "是否使用老版本命令行界面",
            },
            FieldMeta {
                name: "clipboard_monitor",
                description: "TUI 中自动监听剪贴板，复制的 Vinted 链接直接加入下载列表",
            },
            FieldMeta {
                name: "downloader_program",
                description: "外部下载器可执行文件（需已安装并在 PATH 中，或填写绝对路径）",
            },
            FieldMeta {
                name: "downloader_args",
                description: "放在链接之前的固定参数，例如 [\"vinted_downloader.py\"] 配合 downloader_program: python3",
            },
            FieldMeta {
                name: "item_timeout",
                description: "单个链接的下载超时（秒），0 表示不限制",
            },
            FieldMeta {
                name: "max_workers",
                description: "同时运行的下载进程数 (1-4)",
            },
            FieldMeta {
                name: "download_all_items",
                description: "下载该卖家的全部商品（--all）",
            },
            FieldMeta {
                name: "save_in_dir",
                description: "让下载器保存到子目录（--save-in-dir）",
            },
            FieldMeta {
                name: "download_seller_avatar",
                description: "下载卖家头像（--seller）",
            },
            FieldMeta {
                name: "save_path",
                description: "下载根目录（留空为当前目录）",
            },
            FieldMeta {
                name: "closet_dir",
                description: "整理后的 closet 目录（留空为 <save_path>/closet）",
            },
            FieldMeta {
                name: "tracking_file",
                description: "已下载记录文件（相对路径基于数据目录）",
            },
            FieldMeta {
                name: "queue_file",
                description: "下载列表文件（相对路径基于数据目录）",
            },
            FieldMeta {
                name: "skip_duplicates",
                description: "跳过已经下载过的商品",
            },
            FieldMeta {
                name: "auto_organize",
                description: "自动整理为 closet/用户名/标题_001.webp",
            },
            FieldMeta {
                name: "keep_item_json",
                description: "整理时保留下载器生成的 item.json（保存为 标题.json）",
            },
        ];
        &FIELDS
    }
}

impl Config {
    /// 绑定数据目录（config.yml / logs / 记录文件所在目录）。
    pub fn with_data_dir(mut self, dir: Option<&Path>) -> Self {
        self.data_dir = dir.map(Path::to_path_buf);
        self
    }

    pub fn with_closet_override(mut self, dir: Option<&Path>) -> Self {
        self.closet_override = dir.map(Path::to_path_buf);
        self
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn default_save_dir(&self) -> PathBuf {
        if self.save_path.trim().is_empty() {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        } else {
            PathBuf::from(self.save_path.trim())
        }
    }

    pub fn closet_root(&self) -> PathBuf {
        if let Some(dir) = self.closet_override.as_ref() {
            return dir.clone();
        }
        if self.closet_dir.trim().is_empty() {
            self.default_save_dir().join("closet")
        } else {
            PathBuf::from(self.closet_dir.trim())
        }
    }

    pub fn tracking_file_path(&self) -> PathBuf {
        self.resolve_in_data_dir(&self.tracking_file)
    }

    pub fn queue_file_path(&self) -> PathBuf {
        self.resolve_in_data_dir(&self.queue_file)
    }

    pub fn worker_count(&self) -> usize {
        self.max_workers.clamp(1, 4)
    }

    fn resolve_in_data_dir(&self, raw: &str) -> PathBuf {
        let p = PathBuf::from(raw.trim());
        if p.is_absolute() {
            p
        } else {
            self.data_dir().join(p)
        }
    }
}

static RE_NOT_NAME: OnceLock<Regex> = OnceLock::new();
static RE_SPACES: OnceLock<Regex> = OnceLock::new();
static RE_UNDERSCORES: OnceLock<Regex> = OnceLock::new();

const MAX_NAME_LEN: usize = 100;

/// 卖家名/标题 → 文件夹、文件名。
///
/// 仅保留字母数字（含 Unicode）、空白、`-`、`_`；空白折叠后替换为 `_`，
/// 连续 `_` 合并，首尾 `_` 去掉，最长 100 个字符，结果为空时返回 `unknown`。
pub fn normalize_name(raw: &str) -> String {
    let not_name = RE_NOT_NAME.get_or_init(|| Regex::new(r"[^\w\s\-]").expect("compile RE_NOT_NAME"));
    let spaces = RE_SPACES.get_or_init(|| Regex::new(r"\s+").expect("compile RE_SPACES"));
    let underscores =
        RE_UNDERSCORES.get_or_init(|| Regex::new(r"_+").expect("compile RE_UNDERSCORES"));

    let cleaned = not_name.replace_all(raw, "");
    let cleaned = spaces.replace_all(cleaned.trim(), "_");
    let cleaned = underscores.replace_all(&cleaned, "_");
    let mut out = cleaned.trim_matches('_').to_string();

    if out.chars().count() > MAX_NAME_LEN {
        // 按字符截断，避免切在多字节 UTF-8 中间
        out = out.chars().take(MAX_NAME_LEN).collect();
        out = out.trim_end_matches('_').to_string();
    }

    if out.is_empty() {
        "unknown".to_string()
    } else {
        out
    }
}

fn default_false() -> bool {
    false
}

fn default_true() -> bool {
    true
}

fn default_downloader_program() -> String {
    "vinted-downloader".to_string()
}

fn default_item_timeout() -> u64 {
    0
}

fn default_max_workers() -> usize {
    1
}

fn default_tracking_file() -> String {
    "downloaded_items.json".to_string()
}

fn default_queue_file() -> String {
    "data/download_queue.json".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_name_matches_folder_convention() {
        assert_eq!(normalize_name("Maglietta  vintage!! (taglia M)"), "Maglietta_vintage_taglia_M");
        assert_eq!(normalize_name("__jeans -- blu__"), "jeans_--_blu");
        assert_eq!(normalize_name("???"), "unknown");
        assert_eq!(normalize_name("Çà et là"), "Çà_et_là");
    }

    #[test]
    fn normalize_name_caps_length() {
        let long = "a".repeat(99) + " bcd";
        let out = normalize_name(&long);
        assert_eq!(out.chars().count(), 99);
        assert!(!out.ends_with('_'));
    }

    #[test]
    fn paths_resolve_against_data_dir() {
        let cfg = Config::default().with_data_dir(Some(Path::new("/srv/closet")));
        assert_eq!(
            cfg.tracking_file_path(),
            PathBuf::from("/srv/closet/downloaded_items.json")
        );
        assert_eq!(
            cfg.queue_file_path(),
            PathBuf::from("/srv/closet/data/download_queue.json")
        );

        let mut cfg = Config::default();
        cfg.save_path = "/downloads".to_string();
        assert_eq!(cfg.closet_root(), PathBuf::from("/downloads/closet"));
        cfg.closet_dir = "/elsewhere".to_string();
        assert_eq!(cfg.closet_root(), PathBuf::from("/elsewhere"));

        let cfg = cfg.with_closet_override(Some(Path::new("/tmp/once")));
        assert_eq!(cfg.closet_root(), PathBuf::from("/tmp/once"));
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        assert!(yaml.contains("/elsewhere"));
        assert!(!yaml.contains("/tmp/once"));
    }

    #[test]
    fn worker_count_is_bounded() {
        let mut cfg = Config::default();
        cfg.max_workers = 0;
        assert_eq!(cfg.worker_count(), 1);
        cfg.max_workers = 32;
        assert_eq!(cfg.worker_count(), 4);
    }
}
