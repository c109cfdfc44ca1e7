//! 章节内图片并发下载工作池。
//!
//! 固定数量的工作线程从队列里取 `(位置, URL)`，结果经事件通道回到调用线程，按位置落进槽位；
//! 全部线程结束后才交出结果，所以输出顺序与完成顺序无关。任何一张失败都会让整章失败。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crossbeam_channel as channel;
use thiserror::Error;
use tracing::{debug, warn};

use super::models::{FetchedImage, ResolvedAsset};
use super::transcode;
use crate::network_parser::transport::{Transport, TransportError};

pub const DEFAULT_WORKERS: usize = 10;

#[derive(Debug, Error)]
pub enum FetchFailure {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("transcode failed: {0}")]
    Transcode(#[from] image::ImageError),
    #[error("no result was produced")]
    Missing,
}

#[derive(Debug, Error)]
#[error("failed to fetch {url}: {source}")]
pub struct FetchError {
    pub url: String,
    #[source]
    pub source: FetchFailure,
}

pub struct FetchPool {
    transport: Arc<dyn Transport>,
    workers: usize,
    jpeg_quality: u8,
}

impl FetchPool {
    pub fn new(transport: Arc<dyn Transport>, workers: usize, jpeg_quality: u8) -> Self {
        Self {
            transport,
            workers: workers.max(1),
            jpeg_quality,
        }
    }

    fn fetch_one(&self, asset: &ResolvedAsset) -> Result<FetchedImage, FetchError> {
        let fail = |source: FetchFailure| FetchError {
            url: asset.url.clone(),
            source,
        };
        let raw = self
            .transport
            .get_bytes(&asset.url)
            .map_err(|e| fail(e.into()))?;
        let (bytes, source_format) = transcode::normalize(&asset.url, raw, self.jpeg_quality)
            .map_err(|e| fail(e.into()))?;
        Ok(FetchedImage {
            index: asset.index,
            bytes,
            source_format,
        })
    }

    /// 抓取全部图片，返回顺序与 `assets` 一致；`on_done` 在调用线程上每完成一张调用一次。
    pub fn fetch_all(
        &self,
        assets: &[ResolvedAsset],
        mut on_done: impl FnMut(),
    ) -> Result<Vec<FetchedImage>, FetchError> {
        if assets.is_empty() {
            return Ok(Vec::new());
        }

        let workers = self.workers.min(assets.len());
        let (job_tx, job_rx) = channel::unbounded::<(usize, &ResolvedAsset)>();
        for job in assets.iter().enumerate() {
            // 接收端此时一定存活
            let _ = job_tx.send(job);
        }
        drop(job_tx);

        let (evt_tx, evt_rx) = channel::unbounded::<(usize, Result<FetchedImage, FetchError>)>();
        let abort = AtomicBool::new(false);
        let mut slots: Vec<Option<FetchedImage>> = (0..assets.len()).map(|_| None).collect();
        let mut first_error: Option<FetchError> = None;

        thread::scope(|scope| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let evt_tx = evt_tx.clone();
                let abort = &abort;
                scope.spawn(move || {
                    while let Ok((pos, asset)) = job_rx.recv() {
                        if abort.load(Ordering::Relaxed) {
                            return;
                        }
                        let result = self.fetch_one(asset);
                        if result.is_err() {
                            abort.store(true, Ordering::Relaxed);
                        }
                        if evt_tx.send((pos, result)).is_err() {
                            return;
                        }
                    }
                });
            }
            drop(evt_tx);

            for (pos, result) in evt_rx.iter() {
                match result {
                    Ok(image) => {
                        debug!(index = image.index, format = ?image.source_format, "fetched");
                        slots[pos] = Some(image);
                        on_done();
                    }
                    Err(err) => {
                        warn!("{err}");
                        first_error.get_or_insert(err);
                    }
                }
            }
        });

        if let Some(err) = first_error {
            let kept = slots.iter().filter(|s| s.is_some()).count();
            debug!("discarding {kept} fetched images after failure");
            return Err(err);
        }

        slots
            .into_iter()
            .zip(assets)
            .map(|(slot, asset)| {
                slot.ok_or_else(|| FetchError {
                    url: asset.url.clone(),
                    source: FetchFailure::Missing,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::models::SourceFormat;
    use crate::download::transcode::tests::{sample_png, sample_webp};
    use crate::network_parser::fake::FakeTransport;
    use std::time::Duration;

    fn assets(n: usize, ext: &str) -> Vec<ResolvedAsset> {
        (0..n)
            .map(|index| ResolvedAsset {
                index,
                url: format!("https://img.example/p/{index}.{ext}?t={index}"),
            })
            .collect()
    }

    #[test]
    fn output_order_ignores_completion_order() {
        let list = assets(24, "png");
        let mut transport = FakeTransport::new();
        let mut seed: u32 = 0x2545_F491;
        for a in &list {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            transport = transport
                .blob(&a.url, format!("page-{}", a.index).into_bytes())
                .delay(&a.url, Duration::from_millis(u64::from(seed % 25)));
        }
        let transport = Arc::new(transport);

        let pool = FetchPool::new(transport.clone(), 6, 95);
        let mut done = 0;
        let images = pool.fetch_all(&list, || done += 1).unwrap();

        assert_eq!(done, list.len());
        assert_eq!(images.len(), list.len());
        for (i, img) in images.iter().enumerate() {
            assert_eq!(img.index, i);
            assert_eq!(img.bytes, format!("page-{i}").into_bytes());
            assert_eq!(img.source_format, SourceFormat::Unknown);
        }
        assert_eq!(transport.requests().len(), list.len());
    }

    #[test]
    fn webp_assets_are_transcoded_in_workers() {
        let list = vec![
            ResolvedAsset {
                index: 0,
                url: "https://img.example/0.webp?a".to_string(),
            },
            ResolvedAsset {
                index: 1,
                url: "https://img.example/1.png?b".to_string(),
            },
        ];
        let png = sample_png();
        let transport = Arc::new(
            FakeTransport::new()
                .blob(&list[0].url, sample_webp())
                .blob(&list[1].url, png.clone()),
        );
        let images = FetchPool::new(transport, DEFAULT_WORKERS, 95)
            .fetch_all(&list, || {})
            .unwrap();
        assert_eq!(images[0].source_format, SourceFormat::Webp);
        assert_eq!(transcode::sniff_format(&images[0].bytes), SourceFormat::Jpeg);
        assert_eq!(images[1].bytes, png);
    }

    #[test]
    fn one_failure_fails_the_whole_batch() {
        let list = assets(8, "png");
        let mut transport = FakeTransport::new();
        for a in &list {
            transport = transport.blob(&a.url, vec![1, 2, 3]);
        }
        let transport = Arc::new(transport.fail(&list[5].url));

        let err = FetchPool::new(transport, 3, 95)
            .fetch_all(&list, || {})
            .unwrap_err();
        assert_eq!(err.url, list[5].url);
        assert!(matches!(
            err.source,
            FetchFailure::Transport(TransportError::Status { status: 500, .. })
        ));
    }

    #[test]
    fn failure_stops_remaining_work() {
        let list = assets(5, "png");
        let mut transport = FakeTransport::new().fail(&list[0].url);
        for a in &list[1..] {
            transport = transport.blob(&a.url, vec![0]);
        }
        let transport = Arc::new(transport);

        assert!(FetchPool::new(transport.clone(), 1, 95)
            .fetch_all(&list, || {})
            .is_err());
        assert_eq!(transport.requests(), vec![list[0].url.clone()]);
    }

    #[test]
    fn empty_input_spawns_nothing() {
        let transport = Arc::new(FakeTransport::new());
        let images = FetchPool::new(transport.clone(), 4, 95)
            .fetch_all(&[], || {})
            .unwrap();
        assert!(images.is_empty());
        assert!(transport.requests().is_empty());
    }
}
