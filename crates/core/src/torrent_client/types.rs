//! Types for download client operations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that can occur during download client operations.
#[derive(Debug, Error)]
pub enum DownloadClientError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Request failed with HTTP {status}: {message}")]
    Request { status: u16, message: String },

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Download client not configured: {0}")]
    NotConfigured(String),
}

impl DownloadClientError {
    /// Builds a `Request` error from a non-success status code.
    pub fn from_status(status: u16, body: &str) -> Self {
        Self::Request {
            status,
            message: body.chars().take(200).collect(),
        }
    }
}

/// State of a download job, as reported by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Downloading from peers.
    Downloading,
    /// Seeding to peers.
    Seeding,
    /// Download or upload is paused.
    Paused,
    /// Checking file integrity.
    Checking,
    /// Queued for download.
    Queued,
    /// Stalled (no peers).
    Stalled,
    /// Data files are missing on disk.
    MissingFiles,
    /// Any other error state.
    Error,
    /// Unknown state.
    Unknown,
}

impl JobState {
    /// Returns the string representation for API responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Downloading => "downloading",
            JobState::Seeding => "seeding",
            JobState::Paused => "paused",
            JobState::Checking => "checking",
            JobState::Queued => "queued",
            JobState::Stalled => "stalled",
            JobState::MissingFiles => "missing_files",
            JobState::Error => "error",
            JobState::Unknown => "unknown",
        }
    }
}

/// Subject correlation carried on a job as a client-side tag.
///
/// The tag is the only state shared between the announce and import passes.
/// It lives in the download client, so it survives restarts of this process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "subject_id", rename_all = "snake_case")]
pub enum JobTag {
    Untagged,
    SubjectId(String),
}

impl JobTag {
    /// Parse the client's comma-separated tag list. The first non-blank tag
    /// is the subject identifier.
    pub fn from_tags(raw: &str) -> Self {
        raw.split(',')
            .map(str::trim)
            .find(|t| !t.is_empty())
            .map(|t| JobTag::SubjectId(t.to_string()))
            .unwrap_or(JobTag::Untagged)
    }

    pub fn subject_id(&self) -> Option<&str> {
        match self {
            JobTag::Untagged => None,
            JobTag::SubjectId(id) => Some(id),
        }
    }

    pub fn is_tagged(&self) -> bool {
        matches!(self, JobTag::SubjectId(_))
    }
}

/// A job in the download client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadJob {
    /// Info hash (lowercase hex).
    pub hash: String,
    /// Job name.
    pub name: String,
    /// Subject correlation tag.
    pub tag: JobTag,
    /// Download progress (0.0 - 1.0).
    pub progress: f64,
    /// Current state.
    pub state: JobState,
    /// Raw state string reported by the client.
    pub raw_state: String,
    /// Path of the job's content: the single file, or the root directory.
    pub content_path: String,
    /// Save path on disk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_path: Option<String>,
    /// Category.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Total size in bytes.
    pub size_bytes: u64,
    /// When the job was added.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub added_at: Option<DateTime<Utc>>,
}

impl DownloadJob {
    /// Fully downloaded. Partial completion never counts.
    pub fn is_finished(&self) -> bool {
        self.progress == 1.0
    }
}

/// State filter accepted by the job list endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobFilter {
    All,
    Downloading,
    Seeding,
    Completed,
    Paused,
    Active,
    Inactive,
    Resumed,
    Stalled,
    StalledUploading,
    StalledDownloading,
    Errored,
}

impl JobFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobFilter::All => "all",
            JobFilter::Downloading => "downloading",
            JobFilter::Seeding => "seeding",
            JobFilter::Completed => "completed",
            JobFilter::Paused => "paused",
            JobFilter::Active => "active",
            JobFilter::Inactive => "inactive",
            JobFilter::Resumed => "resumed",
            JobFilter::Stalled => "stalled",
            JobFilter::StalledUploading => "stalled_uploading",
            JobFilter::StalledDownloading => "stalled_downloading",
            JobFilter::Errored => "errored",
        }
    }
}

/// Query for listing jobs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<JobFilter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
    /// Hashes to restrict to.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hashes: Vec<String>,
}

impl JobQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: JobFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hashes.push(hash.into());
        self
    }
}

/// Options for adding a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddJobFlags {
    pub skip_checking: bool,
    pub paused: bool,
    pub sequential: bool,
    /// Kept off by default: with it enabled, fresh jobs frequently end up
    /// reporting missing files.
    pub first_last_piece_priority: bool,
}

impl Default for AddJobFlags {
    fn default() -> Self {
        Self {
            skip_checking: true,
            paused: false,
            sequential: false,
            first_last_piece_priority: false,
        }
    }
}

/// Request to add a job from a remote URL (http(s), magnet).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddJobRequest {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_path: Option<String>,
    pub category: String,
    /// Display name for the job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rename: Option<String>,
    pub flags: AddJobFlags,
}

impl AddJobRequest {
    pub fn new(url: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            save_path: None,
            category: category.into(),
            rename: None,
            flags: AddJobFlags::default(),
        }
    }

    pub fn with_save_path(mut self, path: impl Into<String>) -> Self {
        self.save_path = Some(path.into());
        self
    }

    pub fn with_rename(mut self, name: impl Into<String>) -> Self {
        self.rename = Some(name.into());
        self
    }

    pub fn with_flags(mut self, flags: AddJobFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// A job category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub save_path: String,
}

/// Trait for download client backends.
#[async_trait]
pub trait DownloadClient: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Log in with the current credentials and return the session token.
    async fn login(&self) -> Result<String, DownloadClientError>;

    /// List all categories.
    async fn list_categories(&self) -> Result<Vec<Category>, DownloadClientError>;

    /// Create a category.
    async fn create_category(&self, name: &str, save_path: &str)
        -> Result<(), DownloadClientError>;

    /// Add a job from a remote URL.
    ///
    /// The job typically shows up in [`list_jobs`](Self::list_jobs) only
    /// after a short delay.
    async fn add_job(&self, request: AddJobRequest) -> Result<(), DownloadClientError>;

    /// List jobs matching a query.
    async fn list_jobs(&self, query: &JobQuery) -> Result<Vec<DownloadJob>, DownloadClientError>;

    /// Append tags to a job.
    async fn add_tags(&self, hash: &str, tags: &[&str]) -> Result<(), DownloadClientError>;

    /// Resume jobs.
    async fn resume(&self, hashes: &[&str]) -> Result<(), DownloadClientError>;

    /// Create the category unless one with the same name (case-insensitive)
    /// already exists. Failures are logged and swallowed.
    async fn ensure_category(&self, name: &str, save_path: &str) {
        let existing = match self.list_categories().await {
            Ok(categories) => categories,
            Err(e) => {
                warn!(category = name, error = %e, "Failed to list categories");
                return;
            }
        };
        if existing.iter().any(|c| c.name.eq_ignore_ascii_case(name)) {
            debug!(category = name, "Category already exists");
            return;
        }
        match self.create_category(name, save_path).await {
            Ok(()) => info!(category = name, save_path, "Created category"),
            Err(e) => warn!(category = name, error = %e, "Failed to create category"),
        }
    }

    /// Resume every errored job in `category` whose state is missing files.
    /// Returns the number of jobs resumed.
    async fn resume_all_missing_files(
        &self,
        category: &str,
        page_size: u32,
    ) -> Result<usize, DownloadClientError> {
        let query = JobQuery::new()
            .with_filter(JobFilter::Errored)
            .with_category(category)
            .with_limit(page_size);
        let stuck: Vec<DownloadJob> = self
            .list_jobs(&query)
            .await?
            .into_iter()
            .filter(|job| job.state == JobState::MissingFiles)
            .collect();

        let mut resumed = 0;
        for job in &stuck {
            match self.resume(&[job.hash.as_str()]).await {
                Ok(()) => {
                    debug!(hash = %job.hash, name = %job.name, "Resumed job with missing files");
                    resumed += 1;
                }
                Err(e) => warn!(hash = %job.hash, error = %e, "Failed to resume job"),
            }
        }
        Ok(resumed)
    }
}
