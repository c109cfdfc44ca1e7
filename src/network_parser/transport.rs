//! HTTP 传输层。
//!
//! 整个会话共用一个 blocking `reqwest` 客户端（连接池 + cookie），下载流程只依赖 `Transport` trait，
//! 测试里换成内存实现即可。

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, ACCEPT_ENCODING, CONNECTION, HeaderMap, HeaderValue, USER_AGENT};
use thiserror::Error;
use tracing::info;

use crate::base_system::config::Config;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
}

/// 一次文本请求的结果；`url` 是跟随重定向之后的最终地址。
#[derive(Debug, Clone)]
pub struct Page {
    pub url: String,
    pub body: String,
}

pub trait Transport: Send + Sync {
    fn get_text(&self, url: &str) -> Result<Page, TransportError>;
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, TransportError>;
}

#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
}

impl From<&Config> for HttpOptions {
    fn from(cfg: &Config) -> Self {
        Self {
            request_timeout: Duration::from_secs(cfg.request_timeout_secs.max(1)),
            connect_timeout: Duration::from_secs(cfg.connect_timeout_secs.max(1)),
            user_agent: cfg.user_agent.clone(),
        }
    }
}

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(options: &HttpOptions) -> Result<Self, TransportError> {
        // 未启用 gzip 解码，要求服务端直接返回原始字节。
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&options.user_agent)
                .unwrap_or(HeaderValue::from_static("Mozilla/5.0")),
        );

        let client = Client::builder()
            .default_headers(headers)
            .cookie_store(true)
            .timeout(options.request_timeout)
            .connect_timeout(options.connect_timeout)
            .build()
            .map_err(TransportError::Client)?;

        Ok(Self { client })
    }

    fn send(&self, url: &str) -> Result<reqwest::blocking::Response, TransportError> {
        info!("GET {url}");
        let resp = self
            .client
            .get(url)
            .send()
            .map_err(|source| TransportError::Http {
                url: url.to_string(),
                source,
            })?;
        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(resp)
    }
}

impl Transport for HttpTransport {
    fn get_text(&self, url: &str) -> Result<Page, TransportError> {
        let resp = self.send(url)?;
        let final_url = resp.url().to_string();
        let body = resp.text().map_err(|source| TransportError::Http {
            url: url.to_string(),
            source,
        })?;
        Ok(Page {
            url: final_url,
            body,
        })
    }

    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        let resp = self.send(url)?;
        let bytes = resp.bytes().map_err(|source| TransportError::Http {
            url: url.to_string(),
            source,
        })?;
        Ok(bytes.to_vec())
    }
}
