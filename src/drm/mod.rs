//! 章节页 DRM 解除。
//!
//! - `cipher`   — `Salted__` AES-256-CBC 解密
//! - `expr`     — `batoPass` 口令表达式求值
//! - `extract`  — 从页面脚本提取参数
//! - `resolver` — 解密查询参数并拼出真实图片地址

pub mod cipher;
pub mod expr;
pub mod extract;
pub mod resolver;

pub use extract::{PageParameters, extract, extract_names};
pub use resolver::{ResolvedAsset, resolve};
