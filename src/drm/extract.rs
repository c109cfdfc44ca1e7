//! 章节页脚本变量提取。
//!
//! 页面内联脚本里有五个赋值：`imgHttpLis`（图片 URL 列表，JSON 数组）、`batoPass`（口令表达式）、
//! `batoWord`（base64 密文）、`local_text_sub` / `local_text_epi`（系列名 / 章节名）。
//! 任何一个缺失都意味着页面结构变了或者请求被拦了。

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use super::expr;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("marker `{0}` not found in page (layout changed or request blocked)")]
    MissingMarker(&'static str),
    #[error("marker `{marker}` is malformed: {reason}")]
    Malformed {
        marker: &'static str,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    ImageList,
    Password,
    Word,
    Series,
    Chapter,
}

impl Marker {
    const ALL: [Marker; 5] = [
        Marker::ImageList,
        Marker::Password,
        Marker::Word,
        Marker::Series,
        Marker::Chapter,
    ];

    fn var_name(self) -> &'static str {
        match self {
            Marker::ImageList => "imgHttpLis",
            Marker::Password => "batoPass",
            Marker::Word => "batoWord",
            Marker::Series => "local_text_sub",
            Marker::Chapter => "local_text_epi",
        }
    }
}

/// 从单个章节页提取出的全部参数，提取后不再修改。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageParameters {
    pub image_urls: Vec<String>,
    pub cipher_password: String,
    pub cipher_word: String,
    pub series_name: String,
    pub chapter_name: String,
}

static ASSIGNMENTS: OnceLock<Vec<(Marker, Regex)>> = OnceLock::new();

fn assignments() -> &'static [(Marker, Regex)] {
    ASSIGNMENTS.get_or_init(|| {
        Marker::ALL
            .iter()
            .map(|m| {
                // 右值里允许出现带引号的 `;`
                let pattern = format!(
                    r#"\b(?:const|let|var)\s+{}\s*=\s*((?:'(?:[^'\\\n]|\\.)*'|"(?:[^"\\\n]|\\.)*"|[^;'"\n])+?)\s*;"#,
                    m.var_name()
                );
                (*m, Regex::new(&pattern).expect("compile assignment regex"))
            })
            .collect()
    })
}

fn raw_value(body: &str, marker: Marker) -> Result<&str, ExtractError> {
    let re = assignments()
        .iter()
        .find(|(m, _)| *m == marker)
        .map(|(_, re)| re)
        .ok_or(ExtractError::MissingMarker(marker.var_name()))?;
    re.captures(body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .ok_or(ExtractError::MissingMarker(marker.var_name()))
}

/// 字符串字面量：带引号的按 JS 规则反转义，否则只去掉首尾引号。
fn string_literal(body: &str, marker: Marker) -> Result<String, ExtractError> {
    let raw = raw_value(body, marker)?;
    let quoted = raw.len() >= 2
        && ((raw.starts_with('\'') && raw.ends_with('\''))
            || (raw.starts_with('"') && raw.ends_with('"')));
    if quoted {
        return expr::evaluate_to_string(raw).map_err(|e| ExtractError::Malformed {
            marker: marker.var_name(),
            reason: e.to_string(),
        });
    }
    Ok(raw.trim_matches(|c| c == '\'' || c == '"').to_string())
}

/// 只取系列名与章节名，用于在解密前判断是否可以跳过。
pub fn extract_names(body: &str) -> Result<(String, String), ExtractError> {
    Ok((
        string_literal(body, Marker::Series)?,
        string_literal(body, Marker::Chapter)?,
    ))
}

pub fn extract(body: &str) -> Result<PageParameters, ExtractError> {
    let (series_name, chapter_name) = extract_names(body)?;

    let list_raw = raw_value(body, Marker::ImageList)?;
    let image_urls: Vec<String> =
        serde_json::from_str(list_raw).map_err(|e| ExtractError::Malformed {
            marker: Marker::ImageList.var_name(),
            reason: e.to_string(),
        })?;

    let pass_raw = raw_value(body, Marker::Password)?;
    let cipher_password =
        expr::evaluate_to_string(pass_raw).map_err(|e| ExtractError::Malformed {
            marker: Marker::Password.var_name(),
            reason: e.to_string(),
        })?;

    let cipher_word = string_literal(body, Marker::Word)?;

    Ok(PageParameters {
        image_urls,
        cipher_password,
        cipher_word,
        series_name,
        chapter_name,
    })
}
