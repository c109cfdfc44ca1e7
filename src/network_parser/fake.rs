//! 测试用的内存 `Transport`：记录每次请求，可按 URL 注入延迟和失败。

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use super::transport::{Page, Transport, TransportError};

#[derive(Default)]
pub(crate) struct FakeTransport {
    pages: HashMap<String, String>,
    blobs: HashMap<String, Vec<u8>>,
    failing: HashSet<String>,
    latency: HashMap<String, Duration>,
    log: Mutex<Vec<String>>,
}

impl FakeTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn page(mut self, url: &str, body: &str) -> Self {
        self.pages.insert(url.to_string(), body.to_string());
        self
    }

    pub(crate) fn blob(mut self, url: &str, bytes: Vec<u8>) -> Self {
        self.blobs.insert(url.to_string(), bytes);
        self
    }

    pub(crate) fn fail(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }

    pub(crate) fn delay(mut self, url: &str, latency: Duration) -> Self {
        self.latency.insert(url.to_string(), latency);
        self
    }

    pub(crate) fn requests(&self) -> Vec<String> {
        self.log.lock().map(|l| l.clone()).unwrap_or_default()
    }

    fn hit(&self, url: &str) -> Result<(), TransportError> {
        if let Ok(mut log) = self.log.lock() {
            log.push(url.to_string());
        }
        if let Some(d) = self.latency.get(url) {
            std::thread::sleep(*d);
        }
        if self.failing.contains(url) {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: 500,
            });
        }
        Ok(())
    }
}

impl Transport for FakeTransport {
    fn get_text(&self, url: &str) -> Result<Page, TransportError> {
        self.hit(url)?;
        self.pages
            .get(url)
            .map(|body| Page {
                url: url.to_string(),
                body: body.clone(),
            })
            .ok_or(TransportError::Status {
                url: url.to_string(),
                status: 404,
            })
    }

    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        self.hit(url)?;
        self.blobs.get(url).cloned().ok_or(TransportError::Status {
            url: url.to_string(),
            status: 404,
        })
    }
}
