//! Bato 风格漫画站的 CBZ 下载器。
//!
//! 本 crate 负责：配置加载、章节发现、页面 DRM 解除、并发抓图与 CBZ 归档。
//!
//! 代码结构（读代码入口）：
//! - `base_system`：配置/日志/路径等基础设施
//! - `network_parser`：HTTP 传输层与章节列表解析
//! - `drm`：页面参数提取、口令求值与 AES 解密
//! - `download`：抓图、转码、归档与单章流水线

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

mod base_system;
mod download;
mod drm;
mod network_parser;

use base_system::config::load_or_create;
use base_system::logging::{LogOptions, LogSystem};
use download::downloader::ChapterDownloader;
use network_parser::chapters::get_chapters;
use network_parser::transport::{HttpOptions, HttpTransport};

#[derive(Debug, Parser)]
#[command(name = "manga-dl", version)]
#[command(about = "Download every chapter of a series as CBZ archives")]
struct Cli {
    /// 系列页地址
    series_url: String,

    /// 输出根目录（默认取配置里的 save_path）
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// 配置文件路径（默认 ./config.yml）
    #[arg(long)]
    config: Option<PathBuf>,

    /// 启用调试日志输出
    #[arg(long, default_value_t = false)]
    debug: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log = match LogSystem::init(
        LogOptions {
            debug: cli.debug,
            ..LogOptions::default()
        },
        None,
    ) {
        Ok(log) => log,
        Err(err) => {
            eprintln!("failed to initialize logging: {err}");
            return ExitCode::FAILURE;
        }
    };

    let code = match run(&cli) {
        Ok(0) => ExitCode::SUCCESS,
        Ok(failed) => {
            error!("{failed} chapter(s) failed");
            ExitCode::FAILURE
        }
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    };
    log.safe_exit();
    code
}

/// 返回失败章节数。
fn run(cli: &Cli) -> Result<u32> {
    let config = load_or_create(cli.config.as_deref()).context("loading config")?;
    let output_root = cli
        .output
        .clone()
        .unwrap_or_else(|| config.default_save_dir());
    info!(target: "startup", "输出目录: {}", output_root.display());

    let transport = Arc::new(
        HttpTransport::new(&HttpOptions::from(&config)).context("building http client")?,
    );
    let chapters = get_chapters(transport.as_ref(), &cli.series_url)
        .with_context(|| format!("discovering chapters of {}", cli.series_url))?;
    if chapters.is_empty() {
        info!("no chapters found at {}", cli.series_url);
        return Ok(0);
    }

    let downloader = ChapterDownloader::new(transport, &config, output_root);
    Ok(downloader.download_series(&chapters).failed)
}
