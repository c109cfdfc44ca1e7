//! 图片格式嗅探与 WebP → JPEG 转码。

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;

use super::models::SourceFormat;

pub(crate) fn sniff_format(bytes: &[u8]) -> SourceFormat {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return SourceFormat::Jpeg;
    }
    if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        return SourceFormat::Png;
    }
    if bytes.len() >= 6 && bytes.starts_with(b"GIF") {
        return SourceFormat::Gif;
    }
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return SourceFormat::Webp;
    }
    SourceFormat::Unknown
}

/// 站点按 URL 区分有损 WebP，判断只看地址。
pub(crate) fn needs_jpeg(url: &str) -> bool {
    url.contains(".webp")
}

pub(crate) fn to_jpeg(bytes: &[u8], quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let rgb = image::load_from_memory(bytes)?.to_rgb8();
    let mut out = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
    rgb.write_with_encoder(encoder)?;
    Ok(out.into_inner())
}

/// 返回最终写入归档的字节，以及原始字节的格式。
pub(crate) fn normalize(
    url: &str,
    bytes: Vec<u8>,
    quality: u8,
) -> Result<(Vec<u8>, SourceFormat), image::ImageError> {
    let source_format = sniff_format(&bytes);
    if needs_jpeg(url) {
        return Ok((to_jpeg(&bytes, quality)?, source_format));
    }
    Ok((bytes, source_format))
}
