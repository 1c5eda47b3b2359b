//! Reconciler API handlers.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use mikansync_core::reconciler::{AnnounceReport, ImportPassReport};
use mikansync_core::{ReconcilerStatus, SettingsPatch};

use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn pass_failed(e: impl std::fmt::Display) -> ApiError {
    (
        StatusCode::BAD_GATEWAY,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}

/// Download client reachability as seen from the daemon.
#[derive(Debug, Serialize)]
pub struct DownloadClientStatus {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LibraryStatus {
    pub files: u64,
    pub folders: u64,
}

/// Combined daemon status
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub feed_configured: bool,
    pub reconciler: ReconcilerStatus,
    pub download_client: DownloadClientStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library: Option<LibraryStatus>,
}

/// Runtime settings after an update. Secrets are never echoed back.
#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    pub feed_configured: bool,
    pub qbittorrent_url: String,
    pub qbittorrent_username: String,
    pub credentials_changed: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// Get reconciler, download client and library status
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let settings = state.settings().snapshot();
    let mut download_client = DownloadClientStatus {
        url: settings.qbittorrent.url.clone(),
        version: None,
        api_version: None,
        error: None,
    };
    if let Some(client) = state.qbittorrent() {
        match client.app_version().await {
            Ok(version) => {
                download_client.version = Some(version);
                download_client.api_version = client.api_version().await.ok();
            }
            Err(e) => download_client.error = Some(e.to_string()),
        }
    }

    let library = state.library();
    let library = match (library.count_files().await, library.count_folders().await) {
        (Ok(files), Ok(folders)) => Some(LibraryStatus { files, folders }),
        (Err(e), _) | (_, Err(e)) => {
            warn!(error = %e, "Failed to count library entries");
            None
        }
    };

    Json(StatusResponse {
        feed_configured: settings.feed_url.is_some(),
        reconciler: state.reconciler().status().await,
        download_client,
        library,
    })
}

/// Update the feed URL and/or download client credentials
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    Json(patch): Json<SettingsPatch>,
) -> Json<SettingsResponse> {
    let (settings, credentials_changed) = state.settings().update(&patch);
    info!(
        feed_configured = settings.feed_url.is_some(),
        credentials_changed, "Runtime settings updated"
    );
    Json(SettingsResponse {
        feed_configured: settings.feed_url.is_some(),
        qbittorrent_url: settings.qbittorrent.url.clone(),
        qbittorrent_username: settings.qbittorrent.username.clone(),
        credentials_changed,
    })
}

/// Run an announce pass now and return its report
pub async fn run_announce_pass(
    State(state): State<Arc<AppState>>,
) -> Result<Json<AnnounceReport>, ApiError> {
    state
        .reconciler()
        .run_announce_pass()
        .await
        .map(Json)
        .map_err(pass_failed)
}

/// Run an import pass now and return its report
pub async fn run_import_pass(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ImportPassReport>, ApiError> {
    state
        .reconciler()
        .run_import_pass()
        .await
        .map(Json)
        .map_err(pass_failed)
}
