//! 输出路径规则：`<root>/<series>/<series>_<chapter>.cbz`。

use std::path::{Path, PathBuf};

const MAX_NAME_LEN: usize = 120;

/// 把页面给出的名字变成可以安全落盘的单级文件名。
pub fn safe_fs_name(name: &str, max_len: usize) -> String {
    let mut cleaned: String = name
        .trim()
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if (c as u32) < 32 => '_',
            c => c,
        })
        .collect();

    while cleaned.ends_with(' ') || cleaned.ends_with('.') {
        cleaned.pop();
    }
    if cleaned.is_empty() {
        cleaned.push_str("unnamed");
    }

    const RESERVED: [&str; 22] = [
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    if RESERVED.contains(&cleaned.to_uppercase().as_str()) {
        cleaned.insert(0, '_');
    }

    if cleaned.len() > max_len {
        // 不能切在多字节字符中间
        let mut end = max_len;
        while end > 0 && !cleaned.is_char_boundary(end) {
            end -= 1;
        }
        cleaned.truncate(end);
    }
    cleaned
}

pub fn archive_path(root: &Path, series_name: &str, chapter_name: &str) -> PathBuf {
    let series = safe_fs_name(series_name, MAX_NAME_LEN);
    let chapter = safe_fs_name(chapter_name, MAX_NAME_LEN);
    root.join(&series).join(format!("{series}_{chapter}.cbz"))
}
