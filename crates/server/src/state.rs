use std::sync::Arc;

use mikansync_core::{
    Config, Library, QBittorrentClient, Reconciler, SanitizedConfig, SettingsCell,
};

/// Shared application state
pub struct AppState {
    config: Config,
    settings: SettingsCell,
    reconciler: Arc<Reconciler>,
    library: Arc<dyn Library>,
    qbittorrent: Option<Arc<QBittorrentClient>>,
}

impl AppState {
    pub fn new(
        config: Config,
        settings: SettingsCell,
        reconciler: Arc<Reconciler>,
        library: Arc<dyn Library>,
    ) -> Self {
        Self {
            config,
            settings,
            reconciler,
            library,
            qbittorrent: None,
        }
    }

    /// Attach the qBittorrent client so status can report its version.
    pub fn with_qbittorrent(mut self, client: Arc<QBittorrentClient>) -> Self {
        self.qbittorrent = Some(client);
        self
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn settings(&self) -> &SettingsCell {
        &self.settings
    }

    pub fn reconciler(&self) -> &Reconciler {
        self.reconciler.as_ref()
    }

    pub fn library(&self) -> &dyn Library {
        self.library.as_ref()
    }

    pub fn qbittorrent(&self) -> Option<&QBittorrentClient> {
        self.qbittorrent.as_deref()
    }
}
