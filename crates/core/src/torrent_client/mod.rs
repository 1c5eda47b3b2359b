//! Download client abstraction.
//!
//! This module provides a `DownloadClient` trait for submitting, listing,
//! tagging and resuming jobs. qBittorrent is the only backend.

mod qbittorrent;
mod types;

pub use qbittorrent::QBittorrentClient;
pub use types::*;
