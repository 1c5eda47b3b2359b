//! Common test utilities for API integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use mikansync_core::{
    config::{Config, RuntimeSettings},
    testing::{fixtures, MockDownloadClient, MockFeedSource, MockSubjectResolver},
    Collaborators, PassSettings, Reconciler, SettingsCell, SqliteLibrary,
};
use mikansync_server::{api::create_router, state::AppState};

pub const FEED_URL: &str = "https://mikanime.tv/RSS/MyBangumi?token=secret-token";

/// Test fixture with the router and handles on every mock collaborator.
pub struct TestFixture {
    pub router: Router,
    pub client: Arc<MockDownloadClient>,
    pub feed: Arc<MockFeedSource>,
    pub resolver: Arc<MockSubjectResolver>,
    pub library: Arc<SqliteLibrary>,
    pub reconciler: Arc<Reconciler>,
    pub settings: SettingsCell,
    pub downloads: TempDir,
    _work_dir: TempDir,
}

/// A response with its body parsed as JSON (or kept as text).
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    pub text: String,
}

impl TestFixture {
    /// Fixture with a feed URL configured.
    pub fn new() -> Self {
        Self::with_feed(Some(FEED_URL))
    }

    /// Fixture without any feed URL, as on a fresh install.
    pub fn without_feed() -> Self {
        Self::with_feed(None)
    }

    fn with_feed(feed_url: Option<&str>) -> Self {
        let downloads = TempDir::new().expect("Failed to create downloads dir");
        let work_dir = TempDir::new().expect("Failed to create work dir");

        let mut config: Config = fixtures::config();
        config.library.work_dir = work_dir.path().to_path_buf();
        config.feed.rss_url = feed_url.map(str::to_string);

        let client = Arc::new(MockDownloadClient::with_download_dir(
            downloads.path().to_string_lossy(),
        ));
        let feed = Arc::new(MockFeedSource::new());
        let resolver = Arc::new(MockSubjectResolver::new());
        let library = Arc::new(SqliteLibrary::in_memory().expect("Failed to create library"));

        let settings = SettingsCell::new(RuntimeSettings::from_config(&config));
        let reconciler = Arc::new(Reconciler::new(
            Collaborators {
                client: client.clone(),
                feed: feed.clone(),
                resolver: resolver.clone(),
                library: library.clone(),
            },
            settings.clone(),
            PassSettings::from_config(&config),
        ));

        let state = Arc::new(AppState::new(
            config,
            settings.clone(),
            reconciler.clone(),
            library.clone(),
        ));
        let router = create_router(state);

        Self {
            router,
            client,
            feed,
            resolver,
            library,
            reconciler,
            settings,
            downloads,
            _work_dir: work_dir,
        }
    }

    /// Write a file under the mock download directory, returning its path.
    pub fn write_download(&self, relative: &str, content: &[u8]) -> String {
        let path = self.downloads.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        std::fs::write(&path, content).expect("Failed to write download");
        path.to_string_lossy().into_owned()
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.request(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: Option<Value>) -> TestResponse {
        self.request(Method::POST, path, body).await
    }

    pub async fn put(&self, path: &str, body: Value) -> TestResponse {
        self.request(Method::PUT, path, Some(body)).await
    }

    pub async fn request(&self, method: Method, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let text = String::from_utf8_lossy(&body_bytes).into_owned();
        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body, text }
    }
}

/// Helper to assert a response has expected status.
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status, $response.status, $response.text
        );
    };
}
