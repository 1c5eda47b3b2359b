//! RSS feed source.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rss::Channel;
use tracing::{debug, info, warn};

use crate::config::FeedConfig;
use crate::metrics;

use super::{AnnouncementItem, FeedError, FeedSource};

/// Fetches and parses an RSS 2.0 feed over HTTP, optionally through a proxy.
pub struct RssFeedSource {
    client: Client,
}

impl RssFeedSource {
    pub fn new(config: &FeedConfig) -> Result<Self, FeedError> {
        let mut builder = Client::builder().timeout(Duration::from_secs(config.timeout_secs as u64));
        if let Some(proxy) = config.proxy.as_deref().filter(|p| !p.trim().is_empty()) {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| FeedError::NotConfigured(format!("invalid proxy {}: {}", proxy, e)))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| FeedError::NotConfigured(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedSource for RssFeedSource {
    async fn fetch(&self, feed_url: &str) -> Result<Vec<AnnouncementItem>, FeedError> {
        if feed_url.trim().is_empty() {
            return Err(FeedError::NotConfigured("feed URL is empty".to_string()));
        }

        let response = self
            .client
            .get(feed_url)
            .send()
            .await
            .map_err(|e| FeedError::Request(e.to_string()))?;
        let status = response.status();
        metrics::EXTERNAL_SERVICE_REQUESTS
            .with_label_values(&["feed", "fetch", status.as_str()])
            .inc();
        if !status.is_success() {
            return Err(FeedError::Request(format!("HTTP {} from {}", status, feed_url)));
        }

        let content = response
            .bytes()
            .await
            .map_err(|e| FeedError::Request(e.to_string()))?;
        let items = parse_channel(&content[..])?;
        info!(url = %feed_url, items = items.len(), "Fetched feed");
        Ok(items)
    }
}

/// Parse an RSS document into announcement items. Items missing a title,
/// link or enclosure are dropped.
pub fn parse_channel(content: &[u8]) -> Result<Vec<AnnouncementItem>, FeedError> {
    let channel = Channel::read_from(content).map_err(|e| FeedError::Parse(e.to_string()))?;
    debug!(channel = %channel.title(), "Parsed feed channel");

    let items = channel
        .items()
        .iter()
        .filter_map(|item| {
            let title = item.title().map(str::trim).filter(|t| !t.is_empty());
            let link = item.link().map(str::trim).filter(|l| !l.is_empty());
            let enclosure = item.enclosure().filter(|e| !e.url().trim().is_empty());

            match (title, link, enclosure) {
                (Some(title), Some(link), Some(enclosure)) => Some(AnnouncementItem {
                    title: title.to_string(),
                    episode_page_url: link.to_string(),
                    torrent_url: enclosure.url().trim().to_string(),
                    size_bytes: enclosure.length().trim().parse().ok(),
                }),
                _ => {
                    warn!(title = ?item.title(), link = ?item.link(), "Skipping incomplete feed item");
                    None
                }
            }
        })
        .collect();
    Ok(items)
}
