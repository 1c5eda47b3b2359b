//! Admin API integration tests.
//!
//! Requests go through the full router against mock collaborators and an
//! in-memory library.

#[macro_use]
mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{TestFixture, FEED_URL};
use mikansync_core::{
    feed::FeedError,
    testing::{fixtures, MockDownloadClient},
    torrent_client::JobTag,
    Library,
};

// =============================================================================
// Health and config
// =============================================================================

#[tokio::test]
async fn test_health() {
    let fixture = TestFixture::new();

    let response = fixture.get("/api/v1/health").await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
}

#[tokio::test]
async fn test_config_hides_secrets() {
    let fixture = TestFixture::new();

    let response = fixture.get("/api/v1/config").await;

    assert_status!(response, StatusCode::OK);
    assert!(!response.text.contains("adminadmin"));
    assert!(!response.text.contains("secret-token"));
    assert_eq!(response.body["qbittorrent"]["password_configured"], true);
    assert_eq!(response.body["qbittorrent"]["category"], "mikan");
    assert_eq!(response.body["feed"]["rss_url_configured"], true);
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let fixture = TestFixture::new();

    let response = fixture.get("/api/v1/nope").await;

    assert_status!(response, StatusCode::NOT_FOUND);
}

// =============================================================================
// Status and settings
// =============================================================================

#[tokio::test]
async fn test_status_before_any_pass() {
    let fixture = TestFixture::new();

    let response = fixture.get("/api/v1/status").await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["feed_configured"], true);
    assert_eq!(response.body["reconciler"]["running"], false);
    assert!(response.body["reconciler"]["last_announce"].is_null());
    assert!(response.body["reconciler"]["last_import"].is_null());
    assert_eq!(response.body["library"]["files"], 0);
    assert_eq!(
        response.body["download_client"]["url"],
        "http://127.0.0.1:8081"
    );
}

#[tokio::test]
async fn test_update_settings_sets_feed_url() {
    let fixture = TestFixture::without_feed();

    let response = fixture
        .put("/api/v1/settings", json!({ "feed_url": FEED_URL }))
        .await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["feed_configured"], true);
    assert_eq!(response.body["credentials_changed"], false);
    assert_eq!(
        fixture.settings.snapshot().feed_url.as_deref(),
        Some(FEED_URL)
    );
}

#[tokio::test]
async fn test_update_settings_credentials_not_echoed() {
    let fixture = TestFixture::new();

    let response = fixture
        .put(
            "/api/v1/settings",
            json!({
                "qbittorrent_username": "operator",
                "qbittorrent_password": "hunter2"
            }),
        )
        .await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["credentials_changed"], true);
    assert_eq!(response.body["qbittorrent_username"], "operator");
    assert!(!response.text.contains("hunter2"));
    assert_eq!(fixture.settings.snapshot().qbittorrent.password, "hunter2");
}

#[tokio::test]
async fn test_update_settings_ignores_blank_values() {
    let fixture = TestFixture::new();

    let response = fixture
        .put(
            "/api/v1/settings",
            json!({ "feed_url": "   ", "qbittorrent_url": "" }),
        )
        .await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["credentials_changed"], false);
    assert_eq!(response.body["qbittorrent_url"], "http://127.0.0.1:8081");
    assert_eq!(
        fixture.settings.snapshot().feed_url.as_deref(),
        Some(FEED_URL)
    );
}

#[tokio::test]
async fn test_update_settings_rejects_malformed_body() {
    let fixture = TestFixture::new();

    let response = fixture
        .put("/api/v1/settings", json!({ "feed_url": 42 }))
        .await;

    assert!(response.status.is_client_error());
}

// =============================================================================
// Passes
// =============================================================================

#[tokio::test]
async fn test_announce_pass_tags_job() {
    let fixture = TestFixture::new();
    fixture
        .feed
        .set_items(vec![fixtures::item("Show A - 01", 1)])
        .await;
    fixture
        .resolver
        .set_subject(&fixtures::episode_url(1), "12345")
        .await;

    let response = fixture.post("/api/v1/passes/announce", None).await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["items"], 1);
    assert_eq!(response.body["tagged"], 1);
    assert_eq!(response.body["failed"], 0);

    let hash = MockDownloadClient::hash_for_url(&fixtures::torrent_url(1));
    let job = fixture.client.job(&hash).await.unwrap();
    assert_eq!(job.tag, JobTag::SubjectId("12345".to_string()));
    assert_eq!(fixture.feed.fetched_urls().await, vec![FEED_URL.to_string()]);
}

#[tokio::test]
async fn test_announce_pass_without_feed_is_idle() {
    let fixture = TestFixture::without_feed();

    let response = fixture.post("/api/v1/passes/announce", None).await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["feed_configured"], false);
    assert_eq!(response.body["items"], 0);
    assert!(fixture.feed.fetched_urls().await.is_empty());
}

#[tokio::test]
async fn test_announce_pass_feed_failure_is_bad_gateway() {
    let fixture = TestFixture::new();
    fixture
        .feed
        .set_next_error(FeedError::Request("connection reset".to_string()))
        .await;

    let response = fixture.post("/api/v1/passes/announce", None).await;

    assert_status!(response, StatusCode::BAD_GATEWAY);
    assert!(response.body["error"]
        .as_str()
        .unwrap()
        .contains("connection reset"));

    let status = fixture.get("/api/v1/status").await;
    assert!(status.body["reconciler"]["last_announce"]["error"].is_string());
}

#[tokio::test]
async fn test_import_pass_links_finished_job() {
    let fixture = TestFixture::new();
    let path = fixture.write_download("Show.A.01.mkv", b"episode one");
    fixture
        .client
        .insert_job(fixtures::finished_job(
            "aaa",
            &path,
            JobTag::SubjectId("12345".to_string()),
        ))
        .await;

    let response = fixture.post("/api/v1/passes/import", None).await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["finished_jobs"], 1);
    assert_eq!(response.body["linked"], 1);
    assert_eq!(response.body["files"]["imported"], 1);
    assert_eq!(fixture.library.count_files().await.unwrap(), 1);

    let status = fixture.get("/api/v1/status").await;
    assert_eq!(status.body["library"]["files"], 1);
    assert_eq!(status.body["reconciler"]["last_import"]["report"]["linked"], 1);
}

#[tokio::test]
async fn test_import_pass_skips_partial_download() {
    let fixture = TestFixture::new();
    let path = fixture.write_download("Show.A.02.mkv", b"half an episode");
    let mut job = fixtures::finished_job("bbb", &path, JobTag::SubjectId("12345".to_string()));
    job.progress = 0.5;
    fixture.client.insert_job(job).await;

    let response = fixture.post("/api/v1/passes/import", None).await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["finished_jobs"], 0);
    assert_eq!(response.body["linked"], 0);
    assert_eq!(fixture.library.count_files().await.unwrap(), 0);
}

// =============================================================================
// Metrics
// =============================================================================

#[tokio::test]
async fn test_metrics_exposition() {
    let fixture = TestFixture::new();
    fixture.get("/api/v1/health").await;

    let response = fixture.get("/metrics").await;

    assert_status!(response, StatusCode::OK);
    assert!(response.text.contains("mikansync_http_requests_total"));
    assert!(response.text.contains("mikansync_reconciler_running"));
    assert!(response.text.contains("path=\"/api/v1/health\""));
}
