//! Subject resolution.
//!
//! An announcement links to an episode page. The episode page links to the
//! anime page, and the anime page links to the subject page on the metadata
//! platform. The trailing path segment of that URL is the subject id.

mod mikan;

pub use mikan::MikanResolver;

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

/// Errors that can occur during subject resolution.
#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// Trait for resolving an episode page to a subject id.
#[async_trait]
pub trait SubjectResolver: Send + Sync {
    /// Episode page URL to anime page URL.
    async fn resolve_anime_page(&self, episode_page_url: &str) -> Result<String, ResolverError>;

    /// Anime page URL to subject page URL.
    async fn resolve_subject_page(&self, anime_page_url: &str) -> Result<String, ResolverError>;

    /// Episode page URL to subject id.
    async fn resolve_subject_id(&self, episode_page_url: &str) -> Result<String, ResolverError> {
        let anime_page = self.resolve_anime_page(episode_page_url).await?;
        let subject_page = self.resolve_subject_page(&anime_page).await?;
        subject_id_from_url(&subject_page).ok_or(ResolverError::InvalidUrl(subject_page))
    }
}

/// Trailing non-empty path segment of an absolute URL. Query, fragment and
/// trailing slashes are ignored; a URL without a path yields `None`.
pub fn subject_id_from_url(url: &str) -> Option<String> {
    let url = Url::parse(url.trim()).ok()?;
    url.path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()
        .map(str::to_string)
}
