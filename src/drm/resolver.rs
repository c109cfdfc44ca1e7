//! 把页面参数还原成真实图片地址。

use thiserror::Error;
use tracing::debug;

use super::cipher::{self, CipherError};
use super::extract::PageParameters;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Cipher(#[from] CipherError),
    #[error("decrypted payload is not a JSON string array: {0}")]
    Json(String),
    #[error("{images} image urls but {args} query arguments")]
    LengthMismatch { images: usize, args: usize },
}

/// 单张图片的最终地址，`index` 决定归档中的顺序。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAsset {
    pub index: usize,
    pub url: String,
}

pub fn resolve(params: &PageParameters) -> Result<Vec<ResolvedAsset>, ResolveError> {
    debug!(
        password = %params.cipher_password,
        word = %params.cipher_word,
        "Breaking DRM"
    );

    let plain = cipher::decrypt(&params.cipher_word, &params.cipher_password)?;
    let text = String::from_utf8(plain).map_err(|e| ResolveError::Json(e.to_string()))?;
    let query_args: Vec<String> =
        serde_json::from_str(&text).map_err(|e| ResolveError::Json(e.to_string()))?;

    pair_urls(&params.image_urls, &query_args)
}

pub(crate) fn pair_urls(
    image_urls: &[String],
    query_args: &[String],
) -> Result<Vec<ResolvedAsset>, ResolveError> {
    if image_urls.len() != query_args.len() {
        return Err(ResolveError::LengthMismatch {
            images: image_urls.len(),
            args: query_args.len(),
        });
    }

    Ok(image_urls
        .iter()
        .zip(query_args)
        .enumerate()
        .map(|(index, (img, args))| ResolvedAsset {
            index,
            url: format!("{img}?{args}"),
        })
        .collect())
}
