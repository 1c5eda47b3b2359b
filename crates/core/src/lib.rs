pub mod config;
pub mod feed;
pub mod importer;
pub mod library;
pub mod matching;
pub mod metrics;
pub mod reconciler;
pub mod resolver;
pub mod testing;
pub mod torrent_client;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, RuntimeSettings,
    SanitizedConfig, SettingsCell, SettingsPatch,
};
pub use feed::{AnnouncementItem, FeedError, FeedSource, RssFeedSource};
pub use importer::{FileImporter, ImportError, ImportReport};
pub use library::{Library, LibraryError, SqliteLibrary, SubjectPlatform};
pub use reconciler::{Collaborators, PassSettings, Reconciler, ReconcilerError, ReconcilerStatus};
pub use resolver::{MikanResolver, ResolverError, SubjectResolver};
pub use torrent_client::{DownloadClient, DownloadClientError, JobTag, QBittorrentClient};
