//! Library types.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Id of the implicit root folder. It has no row of its own.
pub const ROOT_FOLDER_ID: i64 = 0;

/// Errors that can occur during library operations.
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A file with this content hash is already recorded.
    #[error("Duplicate content hash: {0}")]
    DuplicateHash(String),
}

impl From<rusqlite::Error> for LibraryError {
    fn from(e: rusqlite::Error) -> Self {
        LibraryError::Database(e.to_string())
    }
}

/// Metadata platform a subject is synced from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubjectPlatform {
    /// bgm.tv (Bangumi).
    BgmTv,
    Tmdb,
    Tvdb,
}

impl SubjectPlatform {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectPlatform::BgmTv => "BGM_TV",
            SubjectPlatform::Tmdb => "TMDB",
            SubjectPlatform::Tvdb => "TVDB",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "BGM_TV" => Some(SubjectPlatform::BgmTv),
            "TMDB" => Some(SubjectPlatform::Tmdb),
            "TVDB" => Some(SubjectPlatform::Tvdb),
            _ => None,
        }
    }
}

impl std::fmt::Display for SubjectPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A subject (an anime series) known to the library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub id: i64,
    pub platform: SubjectPlatform,
    pub platform_id: String,
    pub synced_at: DateTime<Utc>,
}

/// A folder in the library tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: i64,
    pub parent_id: i64,
    pub name: String,
}

/// Coarse file classification derived from the extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Video,
    Image,
    Voice,
    Document,
    Unknown,
}

impl FileType {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "mp4" | "mkv" | "avi" | "mov" | "wmv" | "flv" | "webm" | "m4v" | "ts" | "rmvb" => {
                FileType::Video
            }
            "jpg" | "jpeg" | "png" | "gif" | "bmp" | "webp" | "svg" => FileType::Image,
            "mp3" | "flac" | "wav" | "aac" | "ogg" | "m4a" | "ape" | "mka" => FileType::Voice,
            "txt" | "pdf" | "ass" | "ssa" | "srt" | "vtt" | "sub" | "nfo" | "md" => {
                FileType::Document
            }
            _ => FileType::Unknown,
        }
    }

    pub fn from_file_name(name: &str) -> Self {
        Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(Self::from_extension)
            .unwrap_or(FileType::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Video => "video",
            FileType::Image => "image",
            FileType::Voice => "voice",
            FileType::Document => "document",
            FileType::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "video" => FileType::Video,
            "image" => FileType::Image,
            "voice" => FileType::Voice,
            "document" => FileType::Document,
            _ => FileType::Unknown,
        }
    }
}

/// A file record in the library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryFile {
    pub id: i64,
    pub folder_id: i64,
    pub name: String,
    pub size_bytes: u64,
    /// Lowercase hex md5 of the content.
    pub md5: String,
    pub file_type: FileType,
    /// Where the content lives on disk.
    pub fs_path: String,
    /// Path relative to the work dir, `/` separated.
    pub url: String,
    pub created_at: DateTime<Utc>,
}

/// Data for a new file record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLibraryFile {
    pub folder_id: i64,
    pub name: String,
    pub size_bytes: u64,
    pub md5: String,
    pub file_type: FileType,
    pub fs_path: String,
    pub url: String,
}
