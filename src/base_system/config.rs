//! 配置文件（`config.yml`）读写。
//!
//! 文件不存在时写出带注释的默认配置；用户文件缺字段时以默认值补齐并回写。

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use thiserror::Error;

pub const FILE_NAME: &str = "config.yml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("invalid yaml at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // 网络
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    // 图片与归档
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    #[serde(default = "default_entry_extension")]
    pub entry_extension: String,
    #[serde(default)]
    pub compress_entries: bool,

    // 输出
    #[serde(default)]
    pub save_path: String,
    #[serde(default = "default_true")]
    pub show_progress: bool,
}

fn default_max_workers() -> usize {
    10
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:140.0) Gecko/20100101 Firefox/140.0".to_string()
}
fn default_jpeg_quality() -> u8 {
    95
}
fn default_entry_extension() -> String {
    "png".to_string()
}
fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            user_agent: default_user_agent(),
            jpeg_quality: default_jpeg_quality(),
            entry_extension: default_entry_extension(),
            compress_entries: false,
            save_path: String::new(),
            show_progress: default_true(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct FieldMeta {
    name: &'static str,
    description: &'static str,
}

const FIELDS: [FieldMeta; 9] = [
    FieldMeta {
        name: "max_workers",
        description: "每章并发下载图片数",
    },
    FieldMeta {
        name: "request_timeout_secs",
        description: "单次请求超时（秒）",
    },
    FieldMeta {
        name: "connect_timeout_secs",
        description: "连接超时（秒）",
    },
    FieldMeta {
        name: "user_agent",
        description: "请求使用的 User-Agent",
    },
    FieldMeta {
        name: "jpeg_quality",
        description: "WebP 转 JPEG 的质量（1-100）",
    },
    FieldMeta {
        name: "entry_extension",
        description: "CBZ 内图片条目扩展名",
    },
    FieldMeta {
        name: "compress_entries",
        description: "是否以 deflate 压缩 CBZ 条目（默认仅存储）",
    },
    FieldMeta {
        name: "save_path",
        description: "默认输出目录，留空为当前目录；命令行 -o 优先",
    },
    FieldMeta {
        name: "show_progress",
        description: "是否显示图片下载进度条",
    },
];

impl Config {
    pub fn default_save_dir(&self) -> PathBuf {
        if self.save_path.trim().is_empty() {
            PathBuf::from(".")
        } else {
            PathBuf::from(self.save_path.trim())
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::Validation(
                "max_workers must be at least 1".to_string(),
            ));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ConfigError::Validation(format!(
                "jpeg_quality must be within 1..=100, got {}",
                self.jpeg_quality
            )));
        }
        let ext = self.entry_extension.trim();
        if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ConfigError::Validation(format!(
                "entry_extension must be alphanumeric, got {:?}",
                self.entry_extension
            )));
        }
        Ok(())
    }
}

/// 读取配置；`path` 为空时使用当前目录下的 `config.yml`。
pub fn load_or_create(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(FILE_NAME));
    ensure_parent(&path)?;

    if !path.exists() {
        let config = Config::default();
        write_with_comments(&config, &path)?;
        return Ok(config);
    }

    let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    let user_yaml: Value = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.clone(),
        source,
    })?;
    let missing = has_missing_fields(&user_yaml);

    let mut merged = serde_yaml::to_value(Config::default())
        .map_err(|err| ConfigError::Validation(err.to_string()))?;
    merge_values(&mut merged, user_yaml);
    let config: Config =
        serde_yaml::from_value(merged).map_err(|err| ConfigError::Validation(err.to_string()))?;
    config.validate()?;

    if missing {
        write_with_comments(&config, &path)?;
    }
    Ok(config)
}

pub fn write_with_comments(config: &Config, path: &Path) -> Result<(), ConfigError> {
    ensure_parent(path)?;
    let yaml = generate_yaml_with_comments(config)?;
    fs::write(path, yaml).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn generate_yaml_with_comments(config: &Config) -> Result<String, ConfigError> {
    let Value::Mapping(mapping) =
        serde_yaml::to_value(config).map_err(|err| ConfigError::Validation(err.to_string()))?
    else {
        return Err(ConfigError::Validation(
            "config must serialize to a mapping".to_string(),
        ));
    };

    let mut lines = Vec::with_capacity(FIELDS.len() * 2);
    for field in FIELDS {
        lines.push(format!("# {}", field.description));
        let key = Value::String(field.name.to_string());
        let val = mapping.get(&key).cloned().unwrap_or(Value::Null);
        let line = serde_yaml::to_string(&serde_yaml::Mapping::from_iter([(key, val)]))
            .map_err(|err| ConfigError::Validation(err.to_string()))?;
        lines.push(line.trim().to_string());
    }
    Ok(lines.join("\n") + "\n")
}

fn has_missing_fields(user_yaml: &Value) -> bool {
    let Value::Mapping(map) = user_yaml else {
        return true;
    };
    FIELDS
        .iter()
        .any(|f| !map.contains_key(Value::String(f.name.to_string())))
}

fn merge_values(default: &mut Value, user: Value) {
    match (default, user) {
        (Value::Mapping(dest), Value::Mapping(src)) => {
            for (key, user_val) in src {
                match dest.get_mut(&key) {
                    Some(dest_val) => merge_values(dest_val, user_val),
                    None => {
                        dest.insert(key, user_val);
                    }
                }
            }
        }
        // 空文件解析为 Null，保留默认值
        (_, Value::Null) => {}
        (dest, other) => *dest = other,
    }
}

fn ensure_parent(path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_commented_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(FILE_NAME);
        let cfg = load_or_create(Some(&path)).unwrap();
        assert_eq!(cfg.max_workers, 10);
        assert_eq!(cfg.jpeg_quality, 95);

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("# 每章并发下载图片数\nmax_workers: 10"));
        assert!(text.contains("entry_extension: png"));
    }

    #[test]
    fn merges_partial_file_and_backfills() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(FILE_NAME);
        fs::write(&path, "max_workers: 4\nsave_path: out\n").unwrap();

        let cfg = load_or_create(Some(&path)).unwrap();
        assert_eq!(cfg.max_workers, 4);
        assert_eq!(cfg.default_save_dir(), PathBuf::from("out"));
        assert_eq!(cfg.request_timeout_secs, 30);

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("max_workers: 4"));
        assert!(text.contains("request_timeout_secs: 30"));
    }

    #[test]
    fn empty_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(FILE_NAME);
        fs::write(&path, "").unwrap();
        let cfg = load_or_create(Some(&path)).unwrap();
        assert_eq!(cfg.max_workers, 10);
        assert_eq!(cfg.default_save_dir(), PathBuf::from("."));
    }

    #[test]
    fn rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(FILE_NAME);

        fs::write(&path, "max_workers: 0\n").unwrap();
        assert!(matches!(
            load_or_create(Some(&path)),
            Err(ConfigError::Validation(_))
        ));

        fs::write(&path, "entry_extension: '../x'\n").unwrap();
        assert!(matches!(
            load_or_create(Some(&path)),
            Err(ConfigError::Validation(_))
        ));

        fs::write(&path, "max_workers: [").unwrap();
        assert!(matches!(
            load_or_create(Some(&path)),
            Err(ConfigError::Parse { .. })
        ));
    }
}
