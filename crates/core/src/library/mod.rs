//! Media library (catalog) adapter.
//!
//! The library owns subjects, a folder tree and file records. The reconciler
//! only needs find-or-create on folders, dedup lookups on files, and linking
//! files to subjects.

mod sqlite;
mod types;

pub use sqlite::SqliteLibrary;
pub use types::*;

use async_trait::async_trait;

/// Trait for media library backends.
#[async_trait]
pub trait Library: Send + Sync {
    /// Create or refresh the subject identified by platform + id.
    async fn sync_subject(
        &self,
        platform: SubjectPlatform,
        platform_id: &str,
    ) -> Result<Subject, LibraryError>;

    /// Look up a subject without touching it.
    async fn find_subject(
        &self,
        platform: SubjectPlatform,
        platform_id: &str,
    ) -> Result<Option<Subject>, LibraryError>;

    /// Find a folder by parent and name.
    async fn find_folder(&self, parent_id: i64, name: &str) -> Result<Option<Folder>, LibraryError>;

    /// Create a folder. Creating an existing (parent, name) returns it.
    async fn create_folder(&self, parent_id: i64, name: &str) -> Result<Folder, LibraryError>;

    /// Find-or-create a folder.
    async fn ensure_folder(&self, parent_id: i64, name: &str) -> Result<Folder, LibraryError> {
        match self.find_folder(parent_id, name).await? {
            Some(folder) => Ok(folder),
            None => self.create_folder(parent_id, name).await,
        }
    }

    /// Files with exactly this name and type, anywhere in the tree.
    async fn find_files_by_name_and_type(
        &self,
        name: &str,
        file_type: FileType,
    ) -> Result<Vec<LibraryFile>, LibraryError>;

    /// Whether any file has this content hash.
    async fn exists_by_hash(&self, md5: &str) -> Result<bool, LibraryError>;

    /// Record a new file.
    async fn create_file(&self, file: NewLibraryFile) -> Result<LibraryFile, LibraryError>;

    /// Find a file by name directly inside a folder.
    async fn find_file_in_folder(
        &self,
        folder_id: i64,
        name: &str,
    ) -> Result<Option<LibraryFile>, LibraryError>;

    /// Link files to a subject. Returns the number of new links.
    async fn link_files_to_subject(
        &self,
        subject_id: i64,
        file_ids: &[i64],
    ) -> Result<usize, LibraryError>;

    /// Files linked to a subject.
    async fn subject_files(&self, subject_id: i64) -> Result<Vec<LibraryFile>, LibraryError>;

    async fn count_files(&self) -> Result<u64, LibraryError>;

    async fn count_folders(&self) -> Result<u64, LibraryError>;
}
