//! Testing utilities and mock implementations.
//!
//! Mocks of the external collaborators let both passes run end to end
//! against an in-memory library, without a download client or network.
//!
//! # Example
//!
//! ```rust,ignore
//! use mikansync_core::testing::{fixtures, MockDownloadClient, MockFeedSource, MockSubjectResolver};
//!
//! let feed = MockFeedSource::with_items(vec![fixtures::item("Show A - 01", 1)]);
//! let resolver = MockSubjectResolver::new();
//! resolver.set_subject(&fixtures::episode_url(1), "12345").await;
//! let client = MockDownloadClient::new();
//! ```

mod mock_download_client;
mod mock_feed;
mod mock_resolver;

pub use mock_download_client::{MockDownloadClient, RecordedTagging};
pub use mock_feed::MockFeedSource;
pub use mock_resolver::MockSubjectResolver;

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::config::{
        Config, DatabaseConfig, FeedConfig, LibraryConfig, LoggingConfig, QBittorrentConfig,
        ReconcilerConfig, ServerConfig,
    };
    use crate::feed::AnnouncementItem;
    use crate::torrent_client::{DownloadJob, JobState, JobTag};

    /// Config with a short poll window, so unmatched items fail fast.
    pub fn config() -> Config {
        Config {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            database: DatabaseConfig::default(),
            feed: FeedConfig::default(),
            qbittorrent: QBittorrentConfig {
                url: "http://127.0.0.1:8081".to_string(),
                username: "admin".to_string(),
                password: "adminadmin".to_string(),
                timeout_secs: 5,
                category: "mikan".to_string(),
                category_save_path: None,
            },
            library: LibraryConfig::default(),
            reconciler: ReconcilerConfig {
                poll_timeout_ms: 200,
                poll_interval_ms: 10,
                ..ReconcilerConfig::default()
            },
        }
    }

    pub fn episode_url(n: u32) -> String {
        format!("https://mikanime.tv/Home/Episode/{:04}", n)
    }

    pub fn torrent_url(n: u32) -> String {
        format!("https://mikanime.tv/Download/20240101/{:04}.torrent", n)
    }

    /// Announcement number `n` with the given title.
    pub fn item(title: &str, n: u32) -> AnnouncementItem {
        AnnouncementItem::new(title, episode_url(n), torrent_url(n))
    }

    /// A downloading job in the `mikan` category.
    pub fn job(hash: &str, name: &str, tag: JobTag) -> DownloadJob {
        DownloadJob {
            hash: hash.to_string(),
            name: name.to_string(),
            tag,
            progress: 0.0,
            state: JobState::Downloading,
            raw_state: "downloading".to_string(),
            content_path: format!("/mock/downloads/{}", name),
            save_path: Some("/mock/downloads".to_string()),
            category: Some("mikan".to_string()),
            size_bytes: 0,
            added_at: None,
        }
    }

    /// A fully downloaded job whose content lives at `content_path`.
    pub fn finished_job(hash: &str, content_path: &str, tag: JobTag) -> DownloadJob {
        let name = std::path::Path::new(content_path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        DownloadJob {
            progress: 1.0,
            state: JobState::Seeding,
            raw_state: "uploading".to_string(),
            content_path: content_path.to_string(),
            ..job(hash, &name, tag)
        }
    }
}
