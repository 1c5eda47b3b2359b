//! Download client session upkeep.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use mikansync_core::{DownloadClient, QBittorrentClient, SettingsCell};

/// Log in to the download client, warning instead of failing.
pub async fn initial_login(client: &QBittorrentClient) {
    match client.login().await {
        Ok(_) => info!("Download client session established"),
        Err(e) => warn!(error = %e, "Initial download client login failed, will retry on first request"),
    }
}

/// Re-login whenever the download client credentials change. Feed URL
/// changes alone do not touch the session.
pub fn spawn_credentials_watcher(
    settings: &SettingsCell,
    client: Arc<QBittorrentClient>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    let mut settings_rx = settings.subscribe();
    let mut current = settings_rx.borrow_and_update().qbittorrent.clone();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                changed = settings_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let next = settings_rx.borrow_and_update().qbittorrent.clone();
                    if next == current {
                        continue;
                    }
                    current = next;
                    match client.refresh_session().await {
                        Ok(()) => info!(url = %current.url, "Re-authenticated with updated credentials"),
                        Err(e) => warn!(url = %current.url, error = %e, "Login with updated credentials failed"),
                    }
                }
            }
        }
    })
}
