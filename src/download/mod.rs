//! 下载流程模块入口。
//!
//! 子模块：
//! - `models`     — 数据模型（FetchedImage / ChapterOutcome / Stage 等）
//! - `transcode`  — 图片格式嗅探与 WebP → JPEG 转码
//! - `pool`       — 章节内图片并发下载工作池
//! - `archive`    — CBZ 原子写入
//! - `progress`   — CLI 进度条
//! - `downloader` — 单章流水线编排

pub mod archive;
pub mod downloader;
pub mod models;
pub mod pool;
pub(crate) mod progress;
pub(crate) mod transcode;
