//! Mock subject resolver for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::resolver::{ResolverError, SubjectResolver};

const ANIME_PAGE_PREFIX: &str = "https://mikanime.tv/Home/Bangumi/";
const SUBJECT_PAGE_PREFIX: &str = "https://bgm.tv/subject/";

/// Mock implementation of the SubjectResolver trait.
///
/// Episode pages registered with [`MockSubjectResolver::set_subject`] resolve
/// to that subject; any other page fails with `ElementNotFound`.
#[derive(Debug, Default)]
pub struct MockSubjectResolver {
    subjects: Arc<RwLock<HashMap<String, String>>>,
    anime_page_calls: AtomicUsize,
    subject_page_calls: AtomicUsize,
}

impl MockSubjectResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `episode_page_url` to `subject_id`.
    pub async fn set_subject(&self, episode_page_url: &str, subject_id: &str) {
        self.subjects
            .write()
            .await
            .insert(episode_page_url.to_string(), subject_id.to_string());
    }

    /// Number of episode page lookups, i.e. resolution attempts.
    pub fn resolve_calls(&self) -> usize {
        self.anime_page_calls.load(Ordering::SeqCst)
    }

    pub fn subject_page_calls(&self) -> usize {
        self.subject_page_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SubjectResolver for MockSubjectResolver {
    async fn resolve_anime_page(&self, episode_page_url: &str) -> Result<String, ResolverError> {
        self.anime_page_calls.fetch_add(1, Ordering::SeqCst);
        self.subjects
            .read()
            .await
            .get(episode_page_url)
            .map(|id| format!("{}{}", ANIME_PAGE_PREFIX, id))
            .ok_or_else(|| {
                ResolverError::ElementNotFound(format!("anime link on {}", episode_page_url))
            })
    }

    async fn resolve_subject_page(&self, anime_page_url: &str) -> Result<String, ResolverError> {
        self.subject_page_calls.fetch_add(1, Ordering::SeqCst);
        anime_page_url
            .strip_prefix(ANIME_PAGE_PREFIX)
            .filter(|id| !id.is_empty())
            .map(|id| format!("{}{}", SUBJECT_PAGE_PREFIX, id))
            .ok_or_else(|| {
                ResolverError::ElementNotFound(format!("Bangumi link on {}", anime_page_url))
            })
    }
}
