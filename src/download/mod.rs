//! 下载流程模块入口。
//!
//! 子模块：
//! - `models`     — 数据模型（DownloadRecord / QueueEntry / BatchReport 等）
//! - `external`   — 外部下载器子进程调用
//! - `tracker`    — 已下载记录（去重）
//! - `organizer`  — 下载结果整理到 closet
//! - `progress`   — 下载器输出解析与进度上报
//! - `pending`    — 持久化的下载列表
//! - `queue`      — 批量下载调度

pub mod external;
pub mod models;
pub mod organizer;
pub mod pending;
pub mod progress;
pub mod queue;
pub mod tracker;
