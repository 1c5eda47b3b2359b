//! Mock feed source for testing.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::feed::{AnnouncementItem, FeedError, FeedSource};

/// Mock implementation of the FeedSource trait.
///
/// Returns the configured items for any URL and records the URLs fetched.
#[derive(Debug, Default)]
pub struct MockFeedSource {
    items: Arc<RwLock<Vec<AnnouncementItem>>>,
    fetched: Arc<RwLock<Vec<String>>>,
    next_error: Arc<RwLock<Option<FeedError>>>,
}

impl MockFeedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: Vec<AnnouncementItem>) -> Self {
        Self {
            items: Arc::new(RwLock::new(items)),
            ..Self::default()
        }
    }

    pub async fn set_items(&self, items: Vec<AnnouncementItem>) {
        *self.items.write().await = items;
    }

    /// The next fetch fails with `error`.
    pub async fn set_next_error(&self, error: FeedError) {
        *self.next_error.write().await = Some(error);
    }

    /// URLs fetched so far, in order.
    pub async fn fetched_urls(&self) -> Vec<String> {
        self.fetched.read().await.clone()
    }
}

#[async_trait]
impl FeedSource for MockFeedSource {
    async fn fetch(&self, feed_url: &str) -> Result<Vec<AnnouncementItem>, FeedError> {
        self.fetched.write().await.push(feed_url.to_string());
        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }
        Ok(self.items.read().await.clone())
    }
}
