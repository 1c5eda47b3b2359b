//! Types for the reconciler.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{Config, ReconcilerConfig};
use crate::importer::ImportReport;

/// Errors that abort a whole pass, or a single item or job within one.
#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("download client error: {0}")]
    DownloadClient(#[from] crate::torrent_client::DownloadClientError),

    #[error("feed error: {0}")]
    Feed(#[from] crate::feed::FeedError),

    #[error("resolver error: {0}")]
    Resolver(#[from] crate::resolver::ResolverError),

    #[error("library error: {0}")]
    Library(#[from] crate::library::LibraryError),

    #[error("import error: {0}")]
    Import(#[from] crate::importer::ImportError),
}

/// Which loop a pass belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopKind {
    Announce,
    Import,
}

impl LoopKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopKind::Announce => "announce",
            LoopKind::Import => "import",
        }
    }
}

/// Settings both passes read, fixed for the reconciler's lifetime.
#[derive(Debug, Clone)]
pub struct PassSettings {
    pub category: String,
    /// Save path for the category. Empty means the client default.
    pub category_save_path: String,
    pub import_folder: String,
    pub work_dir: PathBuf,
    pub reconciler: ReconcilerConfig,
}

impl PassSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            category: config.qbittorrent.category.clone(),
            category_save_path: config
                .qbittorrent
                .category_save_path
                .clone()
                .unwrap_or_default(),
            import_folder: config.library.import_folder.clone(),
            work_dir: config.library.work_dir.clone(),
            reconciler: config.reconciler.clone(),
        }
    }
}

/// Outcome of a single announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Resolved and tagged in this pass.
    Tagged { subject_id: String },
    /// The job already carried a subject tag.
    AlreadyTagged { subject_id: String },
    /// No matching job showed up within the poll window.
    Unmatched,
}

/// Summary of an announce pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnounceReport {
    pub items: usize,
    pub tagged: usize,
    pub already_tagged: usize,
    pub unmatched: usize,
    pub failed: usize,
    pub resumed: usize,
    /// False when no feed URL is configured; the pass then does nothing.
    pub feed_configured: bool,
}

impl AnnounceReport {
    pub fn record(&mut self, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Tagged { .. } => self.tagged += 1,
            ItemOutcome::AlreadyTagged { .. } => self.already_tagged += 1,
            ItemOutcome::Unmatched => self.unmatched += 1,
        }
    }
}

/// Summary of an import pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportPassReport {
    /// Jobs at 100% progress.
    pub finished_jobs: usize,
    pub failed_jobs: usize,
    /// Files linked to subjects (new links only).
    pub linked: usize,
    pub files: ImportReport,
}

/// Last pass of a loop, as shown in status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassRecord<R> {
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<R>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<R> PassRecord<R> {
    pub fn new<E: std::fmt::Display>(duration: Duration, result: &Result<R, E>) -> Self
    where
        R: Clone,
    {
        let (report, error) = match result {
            Ok(report) => (Some(report.clone()), None),
            Err(e) => (None, Some(e.to_string())),
        };
        Self {
            finished_at: Utc::now(),
            duration_ms: duration.as_millis() as u64,
            report,
            error,
        }
    }
}

/// Current status of the reconciler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerStatus {
    pub running: bool,
    pub announce_interval_secs: u64,
    pub import_interval_secs: u64,
    pub last_announce: Option<PassRecord<AnnounceReport>>,
    pub last_import: Option<PassRecord<ImportPassReport>>,
}
