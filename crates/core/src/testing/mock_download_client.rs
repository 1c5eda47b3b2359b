//! Mock download client for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::torrent_client::{
    AddJobRequest, Category, DownloadClient, DownloadClientError, DownloadJob, JobFilter,
    JobQuery, JobState, JobTag,
};

/// A recorded `add_tags` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedTagging {
    pub hash: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone)]
struct MockJob {
    job: DownloadJob,
    visible_at: Instant,
}

#[derive(Debug, Default)]
struct MockState {
    jobs: Vec<MockJob>,
    categories: Vec<Category>,
    added: Vec<AddJobRequest>,
    taggings: Vec<RecordedTagging>,
    resumed: Vec<String>,
    name_overrides: HashMap<String, String>,
    logins: usize,
    list_categories_calls: usize,
    next_error: Option<DownloadClientError>,
}

/// Mock implementation of the DownloadClient trait.
///
/// Added jobs get a hash derived from the submitted URL, so submitting the
/// same URL twice leaves a single job (like the real client). Tags written
/// through `add_tags` are visible in later listings.
///
/// # Example
///
/// ```rust,ignore
/// let client = MockDownloadClient::new();
/// client.set_visibility_delay(Duration::from_secs(10)).await; // never matched
/// client.add_job(AddJobRequest::new(url, "mikan")).await?;
/// assert_eq!(client.added_jobs().await.len(), 1);
/// ```
#[derive(Debug)]
pub struct MockDownloadClient {
    state: Arc<RwLock<MockState>>,
    visibility_delay: Arc<RwLock<Duration>>,
    download_dir: String,
}

impl Default for MockDownloadClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDownloadClient {
    pub fn new() -> Self {
        Self::with_download_dir("/mock/downloads")
    }

    /// Mock whose jobs report content under `dir`.
    pub fn with_download_dir(dir: impl Into<String>) -> Self {
        Self {
            state: Arc::new(RwLock::new(MockState::default())),
            visibility_delay: Arc::new(RwLock::new(Duration::ZERO)),
            download_dir: dir.into(),
        }
    }

    /// Hash the mock assigns to a job added from `url`.
    pub fn hash_for_url(url: &str) -> String {
        format!("{:x}", md5::compute(url.as_bytes()))
    }

    /// Delay before an added job shows up in listings.
    pub async fn set_visibility_delay(&self, delay: Duration) {
        *self.visibility_delay.write().await = delay;
    }

    /// Name the client gives a job added from `url`, instead of the rename.
    pub async fn set_job_name(&self, url: &str, name: impl Into<String>) {
        self.state
            .write()
            .await
            .name_overrides
            .insert(url.to_string(), name.into());
    }

    /// The next call fails with `error`.
    pub async fn set_next_error(&self, error: DownloadClientError) {
        self.state.write().await.next_error = Some(error);
    }

    /// Insert a job directly, visible immediately.
    pub async fn insert_job(&self, job: DownloadJob) {
        let mut state = self.state.write().await;
        state.jobs.retain(|j| j.job.hash != job.hash);
        state.jobs.push(MockJob {
            job,
            visible_at: Instant::now(),
        });
    }

    pub async fn set_progress(&self, hash: &str, progress: f64) {
        self.update_job(hash, |job| job.progress = progress).await;
    }

    pub async fn set_content_path(&self, hash: &str, path: impl Into<String>) {
        let path = path.into();
        self.update_job(hash, |job| job.content_path = path).await;
    }

    pub async fn set_state(&self, hash: &str, state: JobState) {
        self.update_job(hash, |job| job.state = state).await;
    }

    pub async fn job(&self, hash: &str) -> Option<DownloadJob> {
        self.state
            .read()
            .await
            .jobs
            .iter()
            .find(|j| j.job.hash == hash)
            .map(|j| j.job.clone())
    }

    pub async fn added_jobs(&self) -> Vec<AddJobRequest> {
        self.state.read().await.added.clone()
    }

    pub async fn taggings(&self) -> Vec<RecordedTagging> {
        self.state.read().await.taggings.clone()
    }

    pub async fn resumed(&self) -> Vec<String> {
        self.state.read().await.resumed.clone()
    }

    pub async fn categories(&self) -> Vec<Category> {
        self.state.read().await.categories.clone()
    }

    pub async fn logins(&self) -> usize {
        self.state.read().await.logins
    }

    pub async fn list_categories_calls(&self) -> usize {
        self.state.read().await.list_categories_calls
    }

    async fn update_job(&self, hash: &str, f: impl FnOnce(&mut DownloadJob)) {
        let mut state = self.state.write().await;
        if let Some(entry) = state.jobs.iter_mut().find(|j| j.job.hash == hash) {
            f(&mut entry.job);
        }
    }

    async fn take_error(&self) -> Result<(), DownloadClientError> {
        match self.state.write().await.next_error.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn matches_filter(job: &DownloadJob, filter: JobFilter) -> bool {
        match filter {
            JobFilter::Errored => matches!(job.state, JobState::Error | JobState::MissingFiles),
            JobFilter::Completed => job.is_finished(),
            JobFilter::Downloading => job.state == JobState::Downloading,
            JobFilter::Seeding => job.state == JobState::Seeding,
            JobFilter::Paused => job.state == JobState::Paused,
            JobFilter::Stalled => job.state == JobState::Stalled,
            _ => true,
        }
    }
}

#[async_trait]
impl DownloadClient for MockDownloadClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn login(&self) -> Result<String, DownloadClientError> {
        self.take_error().await?;
        let mut state = self.state.write().await;
        state.logins += 1;
        Ok(format!("mock-sid-{}", state.logins))
    }

    async fn list_categories(&self) -> Result<Vec<Category>, DownloadClientError> {
        self.take_error().await?;
        let mut state = self.state.write().await;
        state.list_categories_calls += 1;
        Ok(state.categories.clone())
    }

    async fn create_category(&self, name: &str, save_path: &str) -> Result<(), DownloadClientError> {
        self.take_error().await?;
        let mut state = self.state.write().await;
        if state.categories.iter().any(|c| c.name == name) {
            return Err(DownloadClientError::from_status(409, "Category name already exists"));
        }
        state.categories.push(Category {
            name: name.to_string(),
            save_path: save_path.to_string(),
        });
        Ok(())
    }

    async fn add_job(&self, request: AddJobRequest) -> Result<(), DownloadClientError> {
        self.take_error().await?;
        let delay = *self.visibility_delay.read().await;
        let mut state = self.state.write().await;
        state.added.push(request.clone());

        let hash = Self::hash_for_url(&request.url);
        if state.jobs.iter().any(|j| j.job.hash == hash) {
            return Ok(());
        }

        let name = state
            .name_overrides
            .get(&request.url)
            .cloned()
            .or_else(|| request.rename.clone())
            .unwrap_or_else(|| hash.clone());
        let save_path = request
            .save_path
            .clone()
            .unwrap_or_else(|| self.download_dir.clone());
        let job = DownloadJob {
            hash,
            content_path: format!("{}/{}", save_path, name),
            name,
            tag: JobTag::Untagged,
            progress: 0.0,
            state: if request.flags.paused {
                JobState::Paused
            } else {
                JobState::Downloading
            },
            raw_state: "downloading".to_string(),
            save_path: Some(save_path),
            category: Some(request.category.clone()),
            size_bytes: 0,
            added_at: Some(chrono::Utc::now()),
        };
        state.jobs.push(MockJob {
            job,
            visible_at: Instant::now() + delay,
        });
        Ok(())
    }

    async fn list_jobs(&self, query: &JobQuery) -> Result<Vec<DownloadJob>, DownloadClientError> {
        self.take_error().await?;
        let now = Instant::now();
        let state = self.state.read().await;
        let offset = query.offset.unwrap_or(0) as usize;
        let limit = query.limit.map(|l| l as usize).unwrap_or(usize::MAX);

        Ok(state
            .jobs
            .iter()
            .filter(|j| j.visible_at <= now)
            .map(|j| &j.job)
            .filter(|job| {
                query
                    .category
                    .as_ref()
                    .is_none_or(|c| job.category.as_deref() == Some(c.as_str()))
            })
            .filter(|job| {
                query
                    .tag
                    .as_ref()
                    .is_none_or(|t| job.tag.subject_id() == Some(t.as_str()))
            })
            .filter(|job| query.hashes.is_empty() || query.hashes.contains(&job.hash))
            .filter(|job| query.filter.is_none_or(|f| Self::matches_filter(job, f)))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn add_tags(&self, hash: &str, tags: &[&str]) -> Result<(), DownloadClientError> {
        self.take_error().await?;
        let mut state = self.state.write().await;
        let entry = state
            .jobs
            .iter_mut()
            .find(|j| j.job.hash == hash)
            .ok_or_else(|| DownloadClientError::JobNotFound(hash.to_string()))?;
        // Appended tags never displace the first one.
        if !entry.job.tag.is_tagged() {
            entry.job.tag = JobTag::from_tags(&tags.join(","));
        }
        state.taggings.push(RecordedTagging {
            hash: hash.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        });
        Ok(())
    }

    async fn resume(&self, hashes: &[&str]) -> Result<(), DownloadClientError> {
        self.take_error().await?;
        let mut state = self.state.write().await;
        for hash in hashes {
            if let Some(entry) = state.jobs.iter_mut().find(|j| j.job.hash == *hash) {
                entry.job.state = JobState::Downloading;
            }
            state.resumed.push(hash.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_same_url_twice_keeps_one_job() {
        let client = MockDownloadClient::new();
        let request = AddJobRequest::new("http://x/dl/1.torrent", "mikan").with_rename("Show A - 01");
        client.add_job(request.clone()).await.unwrap();
        client.add_job(request).await.unwrap();

        let jobs = client.list_jobs(&JobQuery::new()).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].name, "Show A - 01");
        assert_eq!(jobs[0].content_path, "/mock/downloads/Show A - 01");
        assert_eq!(client.added_jobs().await.len(), 2);
    }

    #[tokio::test]
    async fn test_tags_are_visible_in_listings() {
        let client = MockDownloadClient::new();
        client
            .add_job(AddJobRequest::new("http://x/dl/1.torrent", "mikan"))
            .await
            .unwrap();
        let hash = MockDownloadClient::hash_for_url("http://x/dl/1.torrent");
        client.add_tags(&hash, &["12345"]).await.unwrap();

        let jobs = client
            .list_jobs(&JobQuery::new().with_tag("12345"))
            .await
            .unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].tag, JobTag::SubjectId("12345".to_string()));
    }

    #[tokio::test]
    async fn test_add_tags_unknown_job() {
        let client = MockDownloadClient::new();
        let result = client.add_tags("nope", &["1"]).await;
        assert!(matches!(result, Err(DownloadClientError::JobNotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_visibility_delay() {
        let client = MockDownloadClient::new();
        client.set_visibility_delay(Duration::from_secs(1)).await;
        client
            .add_job(AddJobRequest::new("http://x/dl/1.torrent", "mikan"))
            .await
            .unwrap();
        assert!(client.list_jobs(&JobQuery::new()).await.unwrap().is_empty());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(client.list_jobs(&JobQuery::new()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_next_error_is_consumed() {
        let client = MockDownloadClient::new();
        client.set_next_error(DownloadClientError::Timeout).await;
        assert!(client.login().await.is_err());
        assert!(client.login().await.is_ok());
    }
}
