//! 下载相关的数据模型定义。
//!
//! 包含抓取结果、章节结果、流水线阶段与整轮统计。

use std::fmt;
use std::path::PathBuf;

pub use crate::drm::ResolvedAsset;

/// 按文件头嗅探出的图片编码。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
    Unknown,
}

/// 一张已下载（必要时已转码）的图片，`index` 与 `ResolvedAsset::index` 对应。
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub index: usize,
    pub bytes: Vec<u8>,
    pub source_format: SourceFormat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChapterOutcome {
    Skipped(PathBuf),
    Written(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Page,
    Extract,
    Resolve,
    Fetch,
    Archive,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Page => "page",
            Stage::Extract => "extract",
            Stage::Resolve => "resolve",
            Stage::Fetch => "fetch",
            Stage::Archive => "archive",
        })
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DownloadResult {
    pub written: u32,
    pub skipped: u32,
    pub failed: u32,
}
