//! CBZ 归档写入。
//!
//! 先写同目录下的隐藏临时文件，成功后再 rename 到最终路径；出错时临时文件随析构删除，
//! 读者永远看不到写了一半的归档。

use std::fs;
use std::io::{self, Seek, Write};
use std::path::{Path, PathBuf};

use tempfile::{Builder, NamedTempFile};
use thiserror::Error;
use tracing::{debug, info};
use zip::CompressionMethod;
use zip::write::FileOptions;

use super::models::FetchedImage;
use crate::base_system::paths::archive_path;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("io error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("failed to move archive into place: {0}")]
    Persist(#[from] tempfile::PersistError),
}

#[derive(Debug, Clone)]
pub struct ArchiveWriter {
    root: PathBuf,
    extension: String,
    compression: CompressionMethod,
}

impl ArchiveWriter {
    pub fn new(root: impl Into<PathBuf>, extension: &str, compress: bool) -> Self {
        Self {
            root: root.into(),
            extension: extension.trim_start_matches('.').to_string(),
            compression: if compress {
                CompressionMethod::Deflated
            } else {
                CompressionMethod::Stored
            },
        }
    }

    pub fn path_for(&self, series_name: &str, chapter_name: &str) -> PathBuf {
        archive_path(&self.root, series_name, chapter_name)
    }

    pub fn exists(&self, series_name: &str, chapter_name: &str) -> bool {
        self.path_for(series_name, chapter_name).exists()
    }

    fn entry_name(&self, index: usize) -> String {
        format!("{index:04}.{}", self.extension)
    }

    /// 按 `index` 升序写出全部条目。
    pub fn write_entries<W: Write + Seek>(
        &self,
        images: &[FetchedImage],
        writer: W,
    ) -> Result<W, ArchiveError> {
        let mut ordered: Vec<&FetchedImage> = images.iter().collect();
        ordered.sort_by_key(|img| img.index);

        let options = FileOptions::default().compression_method(self.compression);
        let mut zip = zip::ZipWriter::new(writer);
        for img in ordered {
            zip.start_file(self.entry_name(img.index), options)?;
            zip.write_all(&img.bytes).map_err(zip::result::ZipError::Io)?;
        }
        Ok(zip.finish()?)
    }

    pub fn write(
        &self,
        series_name: &str,
        chapter_name: &str,
        images: &[FetchedImage],
    ) -> Result<PathBuf, ArchiveError> {
        self.write_with(series_name, chapter_name, images, |images, file| {
            self.write_entries(images, file).map(|_| ())
        })
    }

    pub(crate) fn write_with<F>(
        &self,
        series_name: &str,
        chapter_name: &str,
        images: &[FetchedImage],
        serialize: F,
    ) -> Result<PathBuf, ArchiveError>
    where
        F: FnOnce(&[FetchedImage], &mut fs::File) -> Result<(), ArchiveError>,
    {
        let out_path = self.path_for(series_name, chapter_name);
        if out_path.exists() {
            debug!("Skipping {}", out_path.display());
            return Ok(out_path);
        }

        let dir = out_path.parent().unwrap_or(Path::new("."));
        fs::create_dir_all(dir).map_err(|source| ArchiveError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        info!("Writing to {}", out_path.display());
        let mut tmp: NamedTempFile = Builder::new()
            .prefix(".")
            .suffix(".cbz.part")
            .tempfile_in(dir)
            .map_err(|source| ArchiveError::Io {
                path: dir.to_path_buf(),
                source,
            })?;

        serialize(images, tmp.as_file_mut())?;
        tmp.as_file().sync_all().map_err(|source| ArchiveError::Io {
            path: tmp.path().to_path_buf(),
            source,
        })?;
        tmp.persist(&out_path)?;
        Ok(out_path)
    }
}
