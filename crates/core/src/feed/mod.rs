//! Announcement feed source.
//!
//! A feed lists newly published episodes. Each item names the episode, links
//! to its page on the publishing site and carries a `.torrent` enclosure.

mod rss_source;

pub use rss_source::{parse_channel, RssFeedSource};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while fetching a feed.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Feed not configured: {0}")]
    NotConfigured(String),

    #[error("Feed request failed: {0}")]
    Request(String),

    #[error("Failed to parse feed: {0}")]
    Parse(String),
}

/// One published episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnouncementItem {
    pub title: String,
    pub episode_page_url: String,
    pub torrent_url: String,
    /// Torrent payload size from the enclosure, when advertised.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

impl AnnouncementItem {
    pub fn new(
        title: impl Into<String>,
        episode_page_url: impl Into<String>,
        torrent_url: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            episode_page_url: episode_page_url.into(),
            torrent_url: torrent_url.into(),
            size_bytes: None,
        }
    }
}

/// Trait for announcement feed backends.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch every item currently in the feed.
    async fn fetch(&self, feed_url: &str) -> Result<Vec<AnnouncementItem>, FeedError>;
}
