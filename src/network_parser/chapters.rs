//! 系列页章节列表抓取。

use std::collections::BTreeSet;

use reqwest::Url;
use scraper::{Html, Selector};
use thiserror::Error;
use tracing::{debug, warn};

use super::transport::{Transport, TransportError};

const CHAPTER_LINK: &str = "a.visited.chapt";

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("invalid series url {url}: {reason}")]
    BadUrl { url: String, reason: String },
}

/// 返回去重并排序后的章节绝对地址。
pub fn get_chapters(
    transport: &dyn Transport,
    series_url: &str,
) -> Result<Vec<String>, DiscoveryError> {
    debug!("Getting chapters");
    let page = transport.get_text(series_url)?;
    let base = Url::parse(&page.url).map_err(|e| DiscoveryError::BadUrl {
        url: page.url.clone(),
        reason: e.to_string(),
    })?;

    let document = Html::parse_document(&page.body);
    let selector = Selector::parse(CHAPTER_LINK).map_err(|e| DiscoveryError::BadUrl {
        url: page.url.clone(),
        reason: e.to_string(),
    })?;

    let mut urls = BTreeSet::new();
    for anchor in document.select(&selector) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        match base.join(href.trim()) {
            Ok(u) => {
                urls.insert(u.to_string());
            }
            Err(e) => warn!("ignoring chapter link {href:?}: {e}"),
        }
    }

    debug!("found {} chapters", urls.len());
    Ok(urls.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network_parser::fake::FakeTransport;

    const SERIES: &str = r#"<html><body>
        <div class="main">
          <a class="visited chapt" href="/chapter/300">Ch.3</a>
          <a class="visited chapt" href="/chapter/100">Ch.1</a>
          <a class="chapt" href="/chapter/999">not visited</a>
          <a class="visited chapt" href="https://cdn.example.org/chapter/200">Ch.2</a>
          <a class="visited chapt" href="/chapter/100">Ch.1 again</a>
          <a class="visited chapt">no href</a>
        </div></body></html>"#;

    #[test]
    fn collects_sorted_unique_absolute_links() {
        let transport = FakeTransport::new().page("https://bato.example/series/77", SERIES);
        let chapters = get_chapters(&transport, "https://bato.example/series/77").unwrap();
        assert_eq!(
            chapters,
            vec![
                "https://bato.example/chapter/100".to_string(),
                "https://bato.example/chapter/300".to_string(),
                "https://cdn.example.org/chapter/200".to_string(),
            ]
        );
        assert_eq!(transport.requests(), vec!["https://bato.example/series/77"]);
    }

    #[test]
    fn empty_listing_is_not_an_error() {
        let transport = FakeTransport::new().page("https://bato.example/s", "<html></html>");
        assert!(get_chapters(&transport, "https://bato.example/s").unwrap().is_empty());
    }

    #[test]
    fn transport_errors_surface() {
        let transport = FakeTransport::new();
        assert!(matches!(
            get_chapters(&transport, "https://bato.example/missing"),
            Err(DiscoveryError::Transport(TransportError::Status { status: 404, .. }))
        ));
    }
}
