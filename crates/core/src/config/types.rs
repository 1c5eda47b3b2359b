use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    pub qbittorrent: QBittorrentConfig,
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
}

/// Admin HTTP server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Log output configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Database configuration (SQLite library store)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("mikansync.db")
}

/// Subscription feed configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeedConfig {
    /// Personal subscription RSS URL. Can also be set at runtime.
    #[serde(default)]
    pub rss_url: Option<String>,
    /// Site the episode/anime page links are relative to.
    #[serde(default = "default_site_url")]
    pub site_url: String,
    /// Optional proxy URL used for feed and page requests.
    #[serde(default)]
    pub proxy: Option<String>,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            rss_url: None,
            site_url: default_site_url(),
            proxy: None,
            timeout_secs: default_timeout(),
        }
    }
}

fn default_site_url() -> String {
    "https://mikanime.tv".to_string()
}

fn default_timeout() -> u32 {
    30
}

/// qBittorrent Web API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QBittorrentConfig {
    /// Web UI URL (e.g., "http://192.168.2.229:8080")
    pub url: String,
    #[serde(default = "default_qb_username")]
    pub username: String,
    #[serde(default = "default_qb_password")]
    pub password: String,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
    /// Category every subscription job is filed under.
    #[serde(default = "default_category")]
    pub category: String,
    /// Save path for the category; omitted means the client default.
    #[serde(default)]
    pub category_save_path: Option<String>,
}

fn default_qb_username() -> String {
    "admin".to_string()
}

fn default_qb_password() -> String {
    "adminadmin".to_string()
}

fn default_category() -> String {
    "mikan".to_string()
}

/// Media library configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LibraryConfig {
    /// Working directory; imported files land under `<work_dir>/upload`.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    /// Name of the root-level library folder finished downloads are imported into.
    #[serde(default = "default_import_folder")]
    pub import_folder: String,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            import_folder: default_import_folder(),
        }
    }
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("work")
}

fn default_import_folder() -> String {
    "downloads".to_string()
}

/// Runtime mode; development shortens both loop intervals.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeMode {
    #[default]
    Production,
    Development,
}

/// Reconciliation loop configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReconcilerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub mode: RuntimeMode,
    /// Overrides the mode-derived announce interval.
    #[serde(default)]
    pub announce_interval_secs: Option<u64>,
    /// Overrides the mode-derived import interval.
    #[serde(default)]
    pub import_interval_secs: Option<u64>,
    /// How long to wait for a submitted job to show up in the job list.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_ms: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Similarity needed between an announcement title and a job name.
    #[serde(default = "default_title_threshold")]
    pub title_match_threshold: f64,
    /// Page size used when looking for jobs stuck on missing files.
    #[serde(default = "default_missing_files_page_size")]
    pub missing_files_page_size: u32,
    /// Announcements processed concurrently within one pass.
    #[serde(default = "default_concurrency")]
    pub item_concurrency: usize,
    /// Finished jobs imported concurrently within one pass.
    #[serde(default = "default_concurrency")]
    pub job_concurrency: usize,
}

fn default_true() -> bool {
    true
}

fn default_poll_timeout() -> u64 {
    5000
}

fn default_poll_interval() -> u64 {
    100
}

fn default_title_threshold() -> f64 {
    crate::matching::TITLE_MATCH_THRESHOLD
}

fn default_missing_files_page_size() -> u32 {
    100
}

fn default_concurrency() -> usize {
    1
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: RuntimeMode::default(),
            announce_interval_secs: None,
            import_interval_secs: None,
            poll_timeout_ms: default_poll_timeout(),
            poll_interval_ms: default_poll_interval(),
            title_match_threshold: default_title_threshold(),
            missing_files_page_size: default_missing_files_page_size(),
            item_concurrency: default_concurrency(),
            job_concurrency: default_concurrency(),
        }
    }
}

impl ReconcilerConfig {
    /// Interval of the announce-to-download loop.
    pub fn announce_interval(&self) -> Duration {
        match self.announce_interval_secs {
            Some(secs) => Duration::from_secs(secs),
            None => match self.mode {
                RuntimeMode::Production => Duration::from_secs(30 * 60),
                RuntimeMode::Development => Duration::from_secs(3 * 60),
            },
        }
    }

    /// Interval of the download-to-catalog loop.
    pub fn import_interval(&self) -> Duration {
        match self.import_interval_secs {
            Some(secs) => Duration::from_secs(secs),
            None => match self.mode {
                RuntimeMode::Production => Duration::from_secs(5 * 60),
                RuntimeMode::Development => Duration::from_secs(60),
            },
        }
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub feed: SanitizedFeedConfig,
    pub qbittorrent: SanitizedQBittorrentConfig,
    pub library: LibraryConfig,
    pub reconciler: ReconcilerConfig,
}

/// Feed config with the personal RSS token hidden
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedFeedConfig {
    pub rss_url_configured: bool,
    pub site_url: String,
    pub proxy_configured: bool,
    pub timeout_secs: u32,
}

/// qBittorrent config with the password hidden
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedQBittorrentConfig {
    pub url: String,
    pub username: String,
    pub password_configured: bool,
    pub timeout_secs: u32,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_save_path: Option<String>,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            feed: SanitizedFeedConfig {
                rss_url_configured: config
                    .feed
                    .rss_url
                    .as_ref()
                    .is_some_and(|u| !u.trim().is_empty()),
                site_url: config.feed.site_url.clone(),
                proxy_configured: config.feed.proxy.is_some(),
                timeout_secs: config.feed.timeout_secs,
            },
            qbittorrent: SanitizedQBittorrentConfig {
                url: config.qbittorrent.url.clone(),
                username: config.qbittorrent.username.clone(),
                password_configured: !config.qbittorrent.password.is_empty(),
                timeout_secs: config.qbittorrent.timeout_secs,
                category: config.qbittorrent.category.clone(),
                category_save_path: config.qbittorrent.category_save_path.clone(),
            },
            library: config.library.clone(),
            reconciler: config.reconciler.clone(),
        }
    }
}
