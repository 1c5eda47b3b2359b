//! qBittorrent Web API v2 client.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{header, multipart, Client, RequestBuilder};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::{QbCredentials, SettingsCell};
use crate::metrics;

use super::{
    AddJobRequest, Category, DownloadClient, DownloadClientError, DownloadJob, JobQuery, JobState,
    JobTag,
};

const SESSION_COOKIE: &str = "SID";

/// Session token bound to the base URL it was obtained from.
#[derive(Debug, Clone)]
struct Session {
    base_url: String,
    sid: String,
}

/// qBittorrent client.
///
/// Connection settings are read from the shared [`SettingsCell`] on every
/// request, so a settings update takes effect without rebuilding the client.
pub struct QBittorrentClient {
    client: Client,
    settings: SettingsCell,
    session: RwLock<Option<Session>>,
}

impl QBittorrentClient {
    /// Create a new qBittorrent client.
    pub fn new(settings: SettingsCell, timeout_secs: u32) -> Result<Self, DownloadClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs as u64))
            .build()
            .map_err(|e| DownloadClientError::NotConfigured(e.to_string()))?;

        Ok(Self {
            client,
            settings,
            session: RwLock::new(None),
        })
    }

    fn credentials(&self) -> QbCredentials {
        self.settings.snapshot().qbittorrent.clone()
    }

    /// Drop the current session and log in again with the latest credentials.
    pub async fn refresh_session(&self) -> Result<(), DownloadClientError> {
        self.session.write().await.take();
        self.login().await.map(|_| ())
    }

    /// Return a session token valid for the current base URL.
    async fn ensure_session(&self) -> Result<Session, DownloadClientError> {
        let base = base_url(&self.credentials().url);
        if let Some(session) = self.session.read().await.as_ref() {
            if session.base_url == base {
                return Ok(session.clone());
            }
        }
        let sid = self.login().await?;
        Ok(Session {
            base_url: base,
            sid,
        })
    }

    /// Send an authenticated request. A 403 means the session expired: the
    /// token is dropped, a new one obtained and the request sent once more.
    async fn execute<F>(&self, operation: &str, build: F) -> Result<String, DownloadClientError>
    where
        F: Fn(&Client, &str) -> RequestBuilder + Send + Sync,
    {
        let session = self.ensure_session().await?;
        let response = build(&self.client, &session.base_url)
            .header(header::COOKIE, format!("{}={}", SESSION_COOKIE, session.sid))
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let response = if response.status() == reqwest::StatusCode::FORBIDDEN {
            warn!(operation, "qBittorrent session expired, re-authenticating");
            self.session.write().await.take();
            let session = self.ensure_session().await?;
            build(&self.client, &session.base_url)
                .header(header::COOKIE, format!("{}={}", SESSION_COOKIE, session.sid))
                .send()
                .await
                .map_err(map_reqwest_error)?
        } else {
            response
        };

        let status = response.status();
        let body = response.text().await.map_err(map_reqwest_error)?;
        metrics::EXTERNAL_SERVICE_REQUESTS
            .with_label_values(&["qbittorrent", operation, status.as_str()])
            .inc();

        if !status.is_success() {
            return Err(DownloadClientError::from_status(status.as_u16(), &body));
        }
        Ok(body)
    }

    async fn get(&self, operation: &str, endpoint: &str) -> Result<String, DownloadClientError> {
        self.execute(operation, |client, base| {
            client.get(format!("{}{}", base, endpoint))
        })
        .await
    }

    async fn post_form(
        &self,
        operation: &str,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<String, DownloadClientError> {
        self.execute(operation, |client, base| {
            client.post(format!("{}{}", base, endpoint)).form(params)
        })
        .await
    }

    /// Application version, e.g. `v4.6.2`.
    pub async fn app_version(&self) -> Result<String, DownloadClientError> {
        self.get("app_version", "/api/v2/app/version").await
    }

    /// Web API version, e.g. `2.9.3`.
    pub async fn api_version(&self) -> Result<String, DownloadClientError> {
        self.get("api_version", "/api/v2/app/webapiVersion").await
    }

    pub async fn pause(&self, hashes: &[&str]) -> Result<(), DownloadClientError> {
        let hashes = join_hashes(hashes);
        self.post_form("pause", "/api/v2/torrents/pause", &[("hashes", &hashes)])
            .await?;
        Ok(())
    }

    pub async fn recheck(&self, hashes: &[&str]) -> Result<(), DownloadClientError> {
        let hashes = join_hashes(hashes);
        self.post_form("recheck", "/api/v2/torrents/recheck", &[("hashes", &hashes)])
            .await?;
        Ok(())
    }

    pub async fn delete(&self, hashes: &[&str], delete_files: bool) -> Result<(), DownloadClientError> {
        let hashes = join_hashes(hashes);
        let delete_files = if delete_files { "true" } else { "false" };
        self.post_form(
            "delete",
            "/api/v2/torrents/delete",
            &[("hashes", &hashes), ("deleteFiles", delete_files)],
        )
        .await?;
        Ok(())
    }

    /// Rename a file inside a job. Paths are relative to the job root.
    pub async fn rename_file(
        &self,
        hash: &str,
        old_path: &str,
        new_path: &str,
    ) -> Result<(), DownloadClientError> {
        let hash = hash.to_lowercase();
        self.post_form(
            "rename_file",
            "/api/v2/torrents/renameFile",
            &[("hash", &hash), ("oldPath", old_path), ("newPath", new_path)],
        )
        .await
        .map_err(|e| match e {
            DownloadClientError::Request { status: 409, .. } => DownloadClientError::Request {
                status: 409,
                message: format!("{} cannot be renamed to {}", old_path, new_path),
            },
            other => other,
        })?;
        Ok(())
    }

    pub async fn edit_category(&self, name: &str, save_path: &str) -> Result<(), DownloadClientError> {
        self.post_form(
            "edit_category",
            "/api/v2/torrents/editCategory",
            &[("category", name), ("savePath", save_path)],
        )
        .await?;
        Ok(())
    }

    pub async fn remove_categories(&self, names: &[&str]) -> Result<(), DownloadClientError> {
        let names = names.join("\n");
        self.post_form(
            "remove_categories",
            "/api/v2/torrents/removeCategories",
            &[("categories", &names)],
        )
        .await?;
        Ok(())
    }
}

/// Base URL without trailing slash.
fn base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

fn join_hashes(hashes: &[&str]) -> String {
    hashes
        .iter()
        .map(|h| h.to_lowercase())
        .collect::<Vec<_>>()
        .join("|")
}

fn map_reqwest_error(e: reqwest::Error) -> DownloadClientError {
    if e.is_timeout() {
        DownloadClientError::Timeout
    } else if e.is_connect() {
        DownloadClientError::ConnectionFailed(e.to_string())
    } else {
        DownloadClientError::InvalidResponse(e.to_string())
    }
}

/// Build the query string for `/api/v2/torrents/info`.
fn info_query(query: &JobQuery) -> String {
    let mut parts = Vec::new();
    if let Some(filter) = query.filter {
        parts.push(format!("filter={}", filter.as_str()));
    }
    if let Some(category) = &query.category {
        parts.push(format!("category={}", urlencoding::encode(category)));
    }
    if let Some(tag) = &query.tag {
        parts.push(format!("tag={}", urlencoding::encode(tag)));
    }
    if let Some(limit) = query.limit {
        parts.push(format!("limit={}", limit));
    }
    if let Some(offset) = query.offset {
        parts.push(format!("offset={}", offset));
    }
    if !query.hashes.is_empty() {
        let hashes: Vec<&str> = query.hashes.iter().map(String::as_str).collect();
        parts.push(format!("hashes={}", urlencoding::encode(&join_hashes(&hashes))));
    }

    if parts.is_empty() {
        String::new()
    } else {
        format!("?{}", parts.join("&"))
    }
}

/// qBittorrent torrent info response.
#[derive(Debug, Deserialize)]
struct QbTorrentInfo {
    hash: String,
    name: String,
    state: String,
    progress: f64,
    #[serde(default)]
    size: i64,
    #[serde(default)]
    added_on: i64,
    #[serde(default)]
    content_path: String,
    #[serde(default)]
    save_path: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    tags: String,
}

impl QbTorrentInfo {
    fn into_job(self) -> DownloadJob {
        DownloadJob {
            hash: self.hash.to_lowercase(),
            name: self.name,
            tag: JobTag::from_tags(&self.tags),
            progress: self.progress,
            state: parse_qb_state(&self.state),
            raw_state: self.state,
            content_path: self.content_path,
            save_path: Some(self.save_path).filter(|p| !p.is_empty()),
            category: Some(self.category).filter(|c| !c.is_empty()),
            size_bytes: self.size.max(0) as u64,
            added_at: timestamp_to_datetime(self.added_on),
        }
    }
}

#[derive(Debug, Deserialize)]
struct QbCategory {
    name: String,
    #[serde(rename = "savePath", default)]
    save_path: String,
}

/// Parse a qBittorrent state string.
fn parse_qb_state(state: &str) -> JobState {
    if state.eq_ignore_ascii_case("missingFiles") {
        return JobState::MissingFiles;
    }
    match state {
        "downloading" | "forcedDL" | "metaDL" | "forcedMetaDL" | "allocating" => {
            JobState::Downloading
        }
        "uploading" | "forcedUP" => JobState::Seeding,
        "pausedDL" | "pausedUP" | "stoppedDL" | "stoppedUP" => JobState::Paused,
        "checkingDL" | "checkingUP" | "checkingResumeData" | "moving" => JobState::Checking,
        "queuedDL" | "queuedUP" => JobState::Queued,
        "stalledDL" | "stalledUP" => JobState::Stalled,
        "error" => JobState::Error,
        _ => JobState::Unknown,
    }
}

/// Convert Unix timestamp to DateTime<Utc>.
fn timestamp_to_datetime(ts: i64) -> Option<DateTime<Utc>> {
    if ts > 0 {
        Utc.timestamp_opt(ts, 0).single()
    } else {
        None
    }
}

#[async_trait]
impl DownloadClient for QBittorrentClient {
    fn name(&self) -> &str {
        "qbittorrent"
    }

    async fn login(&self) -> Result<String, DownloadClientError> {
        let credentials = self.credentials();
        let base = base_url(&credentials.url);
        if base.is_empty() {
            return Err(DownloadClientError::NotConfigured(
                "qBittorrent URL is empty".to_string(),
            ));
        }

        let url = format!("{}/api/v2/auth/login", base);
        let params = [
            ("username", credentials.username.as_str()),
            ("password", credentials.password.as_str()),
        ];
        let response = self
            .client
            .post(&url)
            // qBittorrent rejects logins whose Referer does not match its host.
            .header(header::REFERER, &base)
            .form(&params)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        let sid = response
            .cookies()
            .find(|c| c.name() == SESSION_COOKIE)
            .map(|c| c.value().to_string());
        let body = response.text().await.unwrap_or_default();
        metrics::EXTERNAL_SERVICE_REQUESTS
            .with_label_values(&["qbittorrent", "login", status.as_str()])
            .inc();

        if status == reqwest::StatusCode::FORBIDDEN {
            return Err(DownloadClientError::AuthenticationFailed(
                "client IP is banned after too many failed attempts".to_string(),
            ));
        }
        if body.contains("Fails.") {
            return Err(DownloadClientError::AuthenticationFailed(
                "Invalid credentials".to_string(),
            ));
        }
        if !status.is_success() {
            return Err(DownloadClientError::from_status(status.as_u16(), &body));
        }
        let sid = sid.ok_or_else(|| {
            DownloadClientError::AuthenticationFailed("no session cookie in response".to_string())
        })?;

        info!(url = %base, username = %credentials.username, "Logged in to qBittorrent");
        *self.session.write().await = Some(Session {
            base_url: base,
            sid: sid.clone(),
        });
        Ok(sid)
    }

    async fn list_categories(&self) -> Result<Vec<Category>, DownloadClientError> {
        let body = self
            .get("list_categories", "/api/v2/torrents/categories")
            .await?;
        let categories: HashMap<String, QbCategory> = serde_json::from_str(&body).map_err(|e| {
            DownloadClientError::InvalidResponse(format!("Failed to parse categories: {}", e))
        })?;

        let mut categories: Vec<Category> = categories
            .into_values()
            .map(|c| Category {
                name: c.name,
                save_path: c.save_path,
            })
            .collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn create_category(&self, name: &str, save_path: &str) -> Result<(), DownloadClientError> {
        self.post_form(
            "create_category",
            "/api/v2/torrents/createCategory",
            &[("category", name), ("savePath", save_path)],
        )
        .await?;
        Ok(())
    }

    async fn add_job(&self, request: AddJobRequest) -> Result<(), DownloadClientError> {
        let bool_str = |b: bool| if b { "true" } else { "false" };
        let body = self
            .execute("add_job", |client, base| {
                let flags = request.flags;
                let mut form = multipart::Form::new()
                    .text("urls", request.url.clone())
                    .text("category", request.category.clone())
                    .text("skip_checking", bool_str(flags.skip_checking))
                    .text("paused", bool_str(flags.paused))
                    .text("sequentialDownload", bool_str(flags.sequential))
                    .text("firstLastPiecePrio", bool_str(flags.first_last_piece_priority));
                if let Some(path) = &request.save_path {
                    form = form.text("savepath", path.clone());
                }
                if let Some(name) = &request.rename {
                    form = form.text("rename", name.clone());
                }
                client
                    .post(format!("{}/api/v2/torrents/add", base))
                    .multipart(form)
            })
            .await?;

        if body.contains("Fails.") {
            return Err(DownloadClientError::InvalidResponse(format!(
                "qBittorrent refused to add {}",
                request.url
            )));
        }
        debug!(url = %request.url, rename = ?request.rename, "Submitted job");
        Ok(())
    }

    async fn list_jobs(&self, query: &JobQuery) -> Result<Vec<DownloadJob>, DownloadClientError> {
        let endpoint = format!("/api/v2/torrents/info{}", info_query(query));
        let body = self.get("list_jobs", &endpoint).await?;
        let torrents: Vec<QbTorrentInfo> = serde_json::from_str(&body).map_err(|e| {
            DownloadClientError::InvalidResponse(format!("Failed to parse response: {}", e))
        })?;
        Ok(torrents.into_iter().map(QbTorrentInfo::into_job).collect())
    }

    async fn add_tags(&self, hash: &str, tags: &[&str]) -> Result<(), DownloadClientError> {
        let hash = hash.to_lowercase();
        let tags = tags.join(",");
        self.post_form(
            "add_tags",
            "/api/v2/torrents/addTags",
            &[("hashes", &hash), ("tags", &tags)],
        )
        .await?;
        Ok(())
    }

    async fn resume(&self, hashes: &[&str]) -> Result<(), DownloadClientError> {
        let hashes = join_hashes(hashes);
        self.post_form("resume", "/api/v2/torrents/resume", &[("hashes", &hashes)])
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::torrent_client::JobFilter;
    use chrono::Datelike;

    #[test]
    fn test_parse_qb_state_downloading() {
        assert_eq!(parse_qb_state("downloading"), JobState::Downloading);
        assert_eq!(parse_qb_state("forcedDL"), JobState::Downloading);
        assert_eq!(parse_qb_state("metaDL"), JobState::Downloading);
    }

    #[test]
    fn test_parse_qb_state_paused() {
        assert_eq!(parse_qb_state("pausedDL"), JobState::Paused);
        assert_eq!(parse_qb_state("stoppedUP"), JobState::Paused);
    }

    #[test]
    fn test_parse_qb_state_missing_files_is_distinct() {
        assert_eq!(parse_qb_state("missingFiles"), JobState::MissingFiles);
        assert_eq!(parse_qb_state("MISSINGFILES"), JobState::MissingFiles);
        assert_eq!(parse_qb_state("error"), JobState::Error);
    }

    #[test]
    fn test_parse_qb_state_unknown() {
        assert_eq!(parse_qb_state("something_else"), JobState::Unknown);
    }

    #[test]
    fn test_timestamp_to_datetime() {
        let dt = timestamp_to_datetime(1703980800).unwrap();
        assert_eq!(dt.year(), 2023);
        assert!(timestamp_to_datetime(0).is_none());
        assert!(timestamp_to_datetime(-1).is_none());
    }

    #[test]
    fn test_base_url_trims_trailing_slash() {
        assert_eq!(base_url("http://qb:8080/"), "http://qb:8080");
        assert_eq!(base_url(" http://qb:8080 "), "http://qb:8080");
    }

    #[test]
    fn test_join_hashes() {
        assert_eq!(join_hashes(&["ABC", "def"]), "abc|def");
        assert_eq!(join_hashes(&[]), "");
    }

    #[test]
    fn test_info_query_empty() {
        assert_eq!(info_query(&JobQuery::new()), "");
    }

    #[test]
    fn test_info_query_full() {
        let query = JobQuery::new()
            .with_filter(JobFilter::Errored)
            .with_category("mikan anime")
            .with_limit(100)
            .with_offset(0);
        assert_eq!(
            info_query(&query),
            "?filter=errored&category=mikan%20anime&limit=100&offset=0"
        );
    }

    #[test]
    fn test_info_query_hashes() {
        let query = JobQuery::new().with_hash("AA").with_hash("bb");
        assert_eq!(info_query(&query), "?hashes=aa%7Cbb");
    }

    #[test]
    fn test_qb_torrent_info_conversion() {
        let json = r#"{
            "hash": "ABC123",
            "name": "Show A - 01",
            "state": "uploading",
            "progress": 1,
            "size": 1000000,
            "added_on": 1703980800,
            "content_path": "/downloads/Show A - 01.mkv",
            "save_path": "/downloads",
            "category": "mikan",
            "tags": "12345"
        }"#;
        let info: QbTorrentInfo = serde_json::from_str(json).unwrap();
        let job = info.into_job();
        assert_eq!(job.hash, "abc123");
        assert_eq!(job.state, JobState::Seeding);
        assert_eq!(job.raw_state, "uploading");
        assert!(job.is_finished());
        assert_eq!(job.tag, JobTag::SubjectId("12345".to_string()));
        assert_eq!(job.category.as_deref(), Some("mikan"));
        assert_eq!(job.content_path, "/downloads/Show A - 01.mkv");
    }

    #[test]
    fn test_qb_torrent_info_missing_optional_fields() {
        let json = r#"{"hash": "x", "name": "n", "state": "missingFiles", "progress": 0.5}"#;
        let job = serde_json::from_str::<QbTorrentInfo>(json).unwrap().into_job();
        assert_eq!(job.tag, JobTag::Untagged);
        assert_eq!(job.state, JobState::MissingFiles);
        assert!(job.category.is_none());
        assert!(job.save_path.is_none());
        assert!(job.added_at.is_none());
    }

    #[test]
    fn test_category_response_shape() {
        let json = r#"{"mikan": {"name": "mikan", "savePath": "/downloads/mikan"}}"#;
        let parsed: HashMap<String, QbCategory> = serde_json::from_str(json).unwrap();
        assert_eq!(parsed["mikan"].save_path, "/downloads/mikan");
    }
}
