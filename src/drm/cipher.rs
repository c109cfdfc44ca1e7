//! OpenSSL `Salted__` 兼容的 AES-256-CBC 解密。
//!
//! 密钥派生沿用 `EVP_BytesToKey(MD5, count = 1)`：
//! `d_i = MD5(d_{i-1} || passphrase || salt)`，拼接到 48 字节后前 32 字节为 key，后 16 字节为 IV。
//! 本模块只负责解密，salt 永远来自密文头部。

use aes::Aes256;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use cbc::cipher::{BlockDecryptMut, KeyIvInit, block_padding::NoPadding};
use md5::{Digest, Md5};
use thiserror::Error;
use tracing::debug;

type Aes256CbcDec = cbc::Decryptor<Aes256>;

const MAGIC: &[u8; 8] = b"Salted__";
const SALT_LEN: usize = 8;
const HEADER_LEN: usize = MAGIC.len() + SALT_LEN;
const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;
const BLOCK_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum CipherError {
    #[error("malformed ciphertext: {0}")]
    Format(String),
    #[error("decryption failed: {0}")]
    Decrypt(String),
}

/// 由口令与 salt 派生出的 key/IV。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherParameters {
    pub salt: [u8; SALT_LEN],
    pub key: [u8; KEY_LEN],
    pub iv: [u8; IV_LEN],
}

pub fn derive_parameters(passphrase: &[u8], salt: [u8; SALT_LEN]) -> CipherParameters {
    let mut material = Vec::with_capacity(KEY_LEN + IV_LEN + BLOCK_LEN);
    let mut prev: Vec<u8> = Vec::new();
    while material.len() < KEY_LEN + IV_LEN {
        let mut hasher = Md5::new();
        hasher.update(&prev);
        hasher.update(passphrase);
        hasher.update(salt);
        prev = hasher.finalize().to_vec();
        material.extend_from_slice(&prev);
    }

    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&material[..KEY_LEN]);
    let mut iv = [0u8; IV_LEN];
    iv.copy_from_slice(&material[KEY_LEN..KEY_LEN + IV_LEN]);
    CipherParameters { salt, key, iv }
}

/// 解密 base64 编码的 `Salted__` 密文，返回去除填充后的明文。
pub fn decrypt(ciphertext_b64: &str, passphrase: &str) -> Result<Vec<u8>, CipherError> {
    let raw = STANDARD
        .decode(ciphertext_b64.trim())
        .map_err(|e| CipherError::Format(format!("invalid base64: {e}")))?;

    if raw.len() < HEADER_LEN {
        return Err(CipherError::Format(format!(
            "payload too short ({} bytes)",
            raw.len()
        )));
    }
    if &raw[..MAGIC.len()] != MAGIC {
        return Err(CipherError::Format("missing Salted__ marker".to_string()));
    }

    let mut salt = [0u8; SALT_LEN];
    salt.copy_from_slice(&raw[MAGIC.len()..HEADER_LEN]);
    let params = derive_parameters(passphrase.as_bytes(), salt);
    debug!(salt = %hex::encode(params.salt), "derived cipher parameters");

    let mut body = raw[HEADER_LEN..].to_vec();
    if body.len() % BLOCK_LEN != 0 {
        return Err(CipherError::Decrypt(format!(
            "ciphertext length {} is not a multiple of {BLOCK_LEN}",
            body.len()
        )));
    }

    let plain_len = Aes256CbcDec::new(&params.key.into(), &params.iv.into())
        .decrypt_padded_mut::<NoPadding>(&mut body)
        .map_err(|e| CipherError::Decrypt(e.to_string()))?
        .len();
    body.truncate(plain_len);

    unpad(body)
}

/// 末字节按无符号整数解释为填充长度，只校验范围。
fn unpad(mut data: Vec<u8>) -> Result<Vec<u8>, CipherError> {
    let Some(&last) = data.last() else {
        return Err(CipherError::Decrypt("empty plaintext, no padding".to_string()));
    };
    let n = usize::from(last);
    if n == 0 || n > BLOCK_LEN || n > data.len() {
        return Err(CipherError::Decrypt(format!("invalid padding length {n}")));
    }
    data.truncate(data.len() - n);
    Ok(data)
}
