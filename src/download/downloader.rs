//! 单章下载流水线：章节页 → 参数提取 → DRM 解除 → 并发抓图 → 原子写入 CBZ。
//!
//! 章节之间串行执行；一章失败只影响这一章，由 `download_series` 记录后继续。

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info};

use super::archive::{ArchiveError, ArchiveWriter};
use super::models::{ChapterOutcome, DownloadResult, Stage};
use super::pool::{FetchError, FetchPool};
use super::progress::ChapterProgress;
use crate::base_system::config::Config;
use crate::drm::extract::ExtractError;
use crate::drm::resolver::ResolveError;
use crate::drm::{extract, extract_names, resolve};
use crate::network_parser::transport::{Transport, TransportError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

#[derive(Debug, Error)]
#[error("chapter {chapter_url} failed at {stage}: {source}")]
pub struct ChapterError {
    pub chapter_url: String,
    pub stage: Stage,
    #[source]
    pub source: PipelineError,
}

fn at<'a, E: Into<PipelineError>>(
    chapter_url: &'a str,
    stage: Stage,
) -> impl FnOnce(E) -> ChapterError + 'a {
    move |err| ChapterError {
        chapter_url: chapter_url.to_string(),
        stage,
        source: err.into(),
    }
}

pub struct ChapterDownloader {
    transport: Arc<dyn Transport>,
    pool: FetchPool,
    archive: ArchiveWriter,
    show_progress: bool,
}

impl ChapterDownloader {
    pub fn new(transport: Arc<dyn Transport>, config: &Config, output_root: PathBuf) -> Self {
        Self {
            pool: FetchPool::new(
                Arc::clone(&transport),
                config.max_workers,
                config.jpeg_quality,
            ),
            archive: ArchiveWriter::new(
                output_root,
                &config.entry_extension,
                config.compress_entries,
            ),
            transport,
            show_progress: config.show_progress,
        }
    }

    /// 需要先请求章节页才能知道系列名和章节名，所以已存在的章节也会产生一次请求。
    pub fn download_chapter(&self, chapter_url: &str) -> Result<ChapterOutcome, ChapterError> {
        let page = self
            .transport
            .get_text(chapter_url)
            .map_err(at(chapter_url, Stage::Page))?;

        let (series_name, chapter_name) =
            extract_names(&page.body).map_err(at(chapter_url, Stage::Extract))?;
        let out_path = self.archive.path_for(&series_name, &chapter_name);
        if out_path.exists() {
            debug!("Skipping {}", out_path.display());
            return Ok(ChapterOutcome::Skipped(out_path));
        }

        self.process_page(chapter_url, &page.body)
    }

    /// 名字已知时可以完全不发请求地跳过。
    #[allow(dead_code)]
    pub fn download_known(
        &self,
        chapter_url: &str,
        series_name: &str,
        chapter_name: &str,
    ) -> Result<ChapterOutcome, ChapterError> {
        if self.archive.exists(series_name, chapter_name) {
            let out_path = self.archive.path_for(series_name, chapter_name);
            debug!("Skipping {}", out_path.display());
            return Ok(ChapterOutcome::Skipped(out_path));
        }
        self.download_chapter(chapter_url)
    }

    fn process_page(&self, chapter_url: &str, body: &str) -> Result<ChapterOutcome, ChapterError> {
        let params = extract(body).map_err(at(chapter_url, Stage::Extract))?;
        let assets = resolve(&params).map_err(at(chapter_url, Stage::Resolve))?;
        debug!(
            chapter = %params.chapter_name,
            images = assets.len(),
            "resolved image urls"
        );

        let progress = ChapterProgress::new(self.show_progress, &params.chapter_name, assets.len());
        let fetched = self.pool.fetch_all(&assets, || progress.inc());
        progress.finish();
        let images = fetched.map_err(at(chapter_url, Stage::Fetch))?;

        let path = self
            .archive
            .write(&params.series_name, &params.chapter_name, &images)
            .map_err(at(chapter_url, Stage::Archive))?;
        Ok(ChapterOutcome::Written(path))
    }

    /// 依次处理每一章，失败的章节记日志后跳过。
    pub fn download_series(&self, chapter_urls: &[String]) -> DownloadResult {
        let mut result = DownloadResult::default();
        info!("开始下载：{} 章", chapter_urls.len());
        for url in chapter_urls {
            match self.download_chapter(url) {
                Ok(ChapterOutcome::Written(_)) => result.written += 1,
                Ok(ChapterOutcome::Skipped(_)) => result.skipped += 1,
                Err(err) => {
                    error!(stage = %err.stage, "{err}");
                    result.failed += 1;
                }
            }
        }
        info!(
            written = result.written,
            skipped = result.skipped,
            failed = result.failed,
            "下载结束"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::models::SourceFormat;
    use crate::download::transcode::sniff_format;
    use crate::download::transcode::tests::{sample_png, sample_webp};
    use crate::network_parser::fake::FakeTransport;
    use std::fs;
    use std::io::Read;
    use std::path::Path;

    const CHAPTER_URL: &str = "https://manga.example/chapter/1001";
    const WEBP_URL: &str = "https://img.example/a.webp?t=1&e=2";
    const PNG_URL: &str = "https://img.example/b.png?t=3&e=4";

    // batoWord 明文为 ["t=1&e=2","t=3&e=4"]，口令 hunter2
    fn chapter_page(series: &str, chapter: &str) -> String {
        format!(
            r#"<html><head><script>
const local_text_sub = '{series}';
const local_text_epi = '{chapter}';
const imgHttpLis = ["https://img.example/a.webp", "https://img.example/b.png"];
const batoPass = 'hunt' + 'er' + 2;
const batoWord = "U2FsdGVkX18BAgMEBQYHCGbRN/FqrsyXg1x6NMxHs7tA+cGxWk2TviOVzCW3vbM6";
</script></head><body></body></html>"#
        )
    }

    fn config() -> Config {
        Config {
            max_workers: 4,
            show_progress: false,
            ..Config::default()
        }
    }

    fn files_under(dir: &Path) -> Vec<PathBuf> {
        let mut out = Vec::new();
        let Ok(rd) = fs::read_dir(dir) else {
            return out;
        };
        for entry in rd.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.is_dir() {
                out.extend(files_under(&path));
            } else {
                out.push(path);
            }
        }
        out
    }

    #[test]
    fn writes_ordered_archive_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let png = sample_png();
        let transport = Arc::new(
            FakeTransport::new()
                .page(CHAPTER_URL, &chapter_page("My Series", "Ch.1"))
                .blob(WEBP_URL, sample_webp())
                .blob(PNG_URL, png.clone()),
        );
        let dl = ChapterDownloader::new(transport.clone(), &config(), dir.path().to_path_buf());

        let outcome = dl.download_chapter(CHAPTER_URL).unwrap();
        let expected = dir.path().join("My Series").join("My Series_Ch.1.cbz");
        assert_eq!(outcome, ChapterOutcome::Written(expected.clone()));

        let mut zip = zip::ZipArchive::new(fs::File::open(&expected).unwrap()).unwrap();
        assert_eq!(zip.len(), 2);
        let mut first = Vec::new();
        {
            let mut entry = zip.by_index(0).unwrap();
            assert_eq!(entry.name(), "0000.png");
            entry.read_to_end(&mut first).unwrap();
        }
        assert_eq!(sniff_format(&first), SourceFormat::Jpeg);

        let mut second = Vec::new();
        let mut entry = zip.by_index(1).unwrap();
        assert_eq!(entry.name(), "0001.png");
        entry.read_to_end(&mut second).unwrap();
        assert_eq!(second, png);

        let mut requests = transport.requests();
        requests.sort();
        assert_eq!(requests, vec![WEBP_URL, PNG_URL, CHAPTER_URL]);
        assert_eq!(files_under(dir.path()), vec![expected]);
    }

    #[test]
    fn one_broken_image_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(
            FakeTransport::new()
                .page(CHAPTER_URL, &chapter_page("S", "C"))
                .blob(WEBP_URL, sample_webp())
                .fail(PNG_URL),
        );
        let dl = ChapterDownloader::new(transport, &config(), dir.path().to_path_buf());

        let err = dl.download_chapter(CHAPTER_URL).unwrap_err();
        assert_eq!(err.stage, Stage::Fetch);
        assert_eq!(err.chapter_url, CHAPTER_URL);
        match &err.source {
            PipelineError::Fetch(f) => assert_eq!(f.url, PNG_URL),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(files_under(dir.path()).is_empty());
    }

    #[test]
    fn existing_archive_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("S").join("S_C.cbz");
        fs::create_dir_all(existing.parent().unwrap()).unwrap();
        fs::write(&existing, b"old").unwrap();

        let transport = Arc::new(
            FakeTransport::new()
                .page(CHAPTER_URL, &chapter_page("S", "C"))
                .blob(WEBP_URL, sample_webp())
                .blob(PNG_URL, sample_png()),
        );
        let dl = ChapterDownloader::new(transport.clone(), &config(), dir.path().to_path_buf());

        let outcome = dl.download_known(CHAPTER_URL, "S", "C").unwrap();
        assert_eq!(outcome, ChapterOutcome::Skipped(existing.clone()));
        assert!(transport.requests().is_empty());

        let outcome = dl.download_chapter(CHAPTER_URL).unwrap();
        assert_eq!(outcome, ChapterOutcome::Skipped(existing.clone()));
        assert_eq!(transport.requests(), vec![CHAPTER_URL]);
        assert_eq!(fs::read(&existing).unwrap(), b"old");
    }

    #[test]
    fn blocked_page_fails_at_extract() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(
            FakeTransport::new().page(CHAPTER_URL, "<html>Just a moment...</html>"),
        );
        let dl = ChapterDownloader::new(transport, &config(), dir.path().to_path_buf());

        let err = dl.download_chapter(CHAPTER_URL).unwrap_err();
        assert_eq!(err.stage, Stage::Extract);
        assert!(matches!(
            err.source,
            PipelineError::Extract(ExtractError::MissingMarker(_))
        ));
    }

    #[test]
    fn series_run_isolates_failures() {
        let dir = tempfile::tempdir().unwrap();
        let missing = "https://manga.example/chapter/404".to_string();
        let transport = Arc::new(
            FakeTransport::new()
                .page(CHAPTER_URL, &chapter_page("S", "C"))
                .blob(WEBP_URL, sample_webp())
                .blob(PNG_URL, sample_png()),
        );
        let dl = ChapterDownloader::new(transport, &config(), dir.path().to_path_buf());
        let urls = vec![missing, CHAPTER_URL.to_string()];

        let first = dl.download_series(&urls);
        assert_eq!(
            first,
            DownloadResult {
                written: 1,
                skipped: 0,
                failed: 1
            }
        );

        let second = dl.download_series(&urls);
        assert_eq!(
            second,
            DownloadResult {
                written: 0,
                skipped: 1,
                failed: 1
            }
        );
    }
}
