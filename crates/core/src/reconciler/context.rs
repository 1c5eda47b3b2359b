//! Shared state handed to every pass.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::config::SettingsCell;
use crate::feed::FeedSource;
use crate::importer::FileImporter;
use crate::library::Library;
use crate::resolver::SubjectResolver;
use crate::torrent_client::DownloadClient;

use super::types::PassSettings;

/// External services the reconciler drives.
#[derive(Clone)]
pub struct Collaborators {
    pub client: Arc<dyn DownloadClient>,
    pub feed: Arc<dyn FeedSource>,
    pub resolver: Arc<dyn SubjectResolver>,
    pub library: Arc<dyn Library>,
}

/// Everything a pass needs.
#[derive(Clone)]
pub struct PassContext {
    pub collaborators: Collaborators,
    /// Runtime-mutable feed URL; read once per pass.
    pub settings: SettingsCell,
    pub pass: PassSettings,
    /// Cleared on shutdown so long directory walks stop early.
    pub walk_enabled: Arc<AtomicBool>,
}

impl PassContext {
    pub fn new(collaborators: Collaborators, settings: SettingsCell, pass: PassSettings) -> Self {
        Self {
            collaborators,
            settings,
            pass,
            walk_enabled: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn importer(&self) -> FileImporter {
        FileImporter::new(self.collaborators.library.clone(), &self.pass.work_dir)
            .with_running_flag(self.walk_enabled.clone())
    }
}
