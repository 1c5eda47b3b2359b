//! Runtime-mutable settings.
//!
//! The feed URL and the download client credentials can change while the
//! daemon runs. They live in a single [`SettingsCell`]; readers take an
//! immutable snapshot per use and never observe a half-applied update.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::Config;

/// Download client connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QbCredentials {
    pub url: String,
    pub username: String,
    pub password: String,
}

/// Immutable snapshot of the runtime settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeSettings {
    pub feed_url: Option<String>,
    pub qbittorrent: QbCredentials,
}

impl RuntimeSettings {
    /// Initial settings taken from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            feed_url: config
                .feed
                .rss_url
                .clone()
                .filter(|url| !url.trim().is_empty()),
            qbittorrent: QbCredentials {
                url: config.qbittorrent.url.clone(),
                username: config.qbittorrent.username.clone(),
                password: config.qbittorrent.password.clone(),
            },
        }
    }
}

/// Partial update of the runtime settings. Blank values are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsPatch {
    #[serde(default)]
    pub feed_url: Option<String>,
    #[serde(default)]
    pub qbittorrent_url: Option<String>,
    #[serde(default)]
    pub qbittorrent_username: Option<String>,
    #[serde(default)]
    pub qbittorrent_password: Option<String>,
}

impl SettingsPatch {
    /// Apply to a snapshot, returning the new settings.
    pub fn apply(&self, current: &RuntimeSettings) -> RuntimeSettings {
        fn non_blank(value: &Option<String>) -> Option<String> {
            value
                .as_ref()
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        }

        let mut next = current.clone();
        if let Some(url) = non_blank(&self.feed_url) {
            next.feed_url = Some(url);
        }
        if let Some(url) = non_blank(&self.qbittorrent_url) {
            next.qbittorrent.url = url;
        }
        if let Some(username) = non_blank(&self.qbittorrent_username) {
            next.qbittorrent.username = username;
        }
        // Passwords are taken verbatim, only emptiness is rejected.
        if let Some(password) = self.qbittorrent_password.as_ref().filter(|p| !p.is_empty()) {
            next.qbittorrent.password = password.clone();
        }
        next
    }
}

/// Shared, thread-safe owner of the current [`RuntimeSettings`].
#[derive(Debug, Clone)]
pub struct SettingsCell {
    tx: Arc<watch::Sender<Arc<RuntimeSettings>>>,
}

impl SettingsCell {
    pub fn new(settings: RuntimeSettings) -> Self {
        let (tx, _) = watch::channel(Arc::new(settings));
        Self { tx: Arc::new(tx) }
    }

    /// Current settings.
    pub fn snapshot(&self) -> Arc<RuntimeSettings> {
        Arc::clone(&self.tx.borrow())
    }

    /// Apply a patch atomically. Returns the new snapshot and whether the
    /// download client credentials changed.
    pub fn update(&self, patch: &SettingsPatch) -> (Arc<RuntimeSettings>, bool) {
        let mut credentials_changed = false;
        let mut updated = None;
        self.tx.send_if_modified(|current| {
            let next = patch.apply(current);
            if next == **current {
                updated = Some(Arc::clone(current));
                return false;
            }
            credentials_changed = next.qbittorrent != current.qbittorrent;
            let next = Arc::new(next);
            *current = Arc::clone(&next);
            updated = Some(next);
            true
        });
        let snapshot = updated.unwrap_or_else(|| self.snapshot());
        (snapshot, credentials_changed)
    }

    /// Receiver notified on every effective change.
    pub fn subscribe(&self) -> watch::Receiver<Arc<RuntimeSettings>> {
        self.tx.subscribe()
    }
}
