//! SQLite-backed library implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use tracing::debug;

use super::{
    FileType, Folder, Library, LibraryError, LibraryFile, NewLibraryFile, Subject, SubjectPlatform,
};

const FILE_COLUMNS: &str =
    "id, folder_id, name, size_bytes, md5, file_type, fs_path, url, created_at";

/// SQLite-backed library.
pub struct SqliteLibrary {
    conn: Mutex<Connection>,
}

impl SqliteLibrary {
    /// Open (or create) the database file and its tables.
    pub fn new(path: &Path) -> Result<Self, LibraryError> {
        let conn = Connection::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory library (useful for testing).
    pub fn in_memory() -> Result<Self, LibraryError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), LibraryError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS subjects (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                platform TEXT NOT NULL,
                platform_id TEXT NOT NULL,
                synced_at TEXT NOT NULL,
                UNIQUE(platform, platform_id)
            );

            -- Parent 0 is the implicit root
            CREATE TABLE IF NOT EXISTS folders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                parent_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                UNIQUE(parent_id, name)
            );

            CREATE TABLE IF NOT EXISTS files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                folder_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                size_bytes INTEGER NOT NULL,
                md5 TEXT NOT NULL,
                file_type TEXT NOT NULL,
                fs_path TEXT NOT NULL,
                url TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            DROP INDEX IF EXISTS idx_files_md5;
            CREATE UNIQUE INDEX IF NOT EXISTS idx_files_md5_unique ON files(md5);
            CREATE INDEX IF NOT EXISTS idx_files_name ON files(name);
            CREATE INDEX IF NOT EXISTS idx_files_folder ON files(folder_id);

            CREATE TABLE IF NOT EXISTS subject_files (
                subject_id INTEGER NOT NULL REFERENCES subjects(id) ON DELETE CASCADE,
                file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
                UNIQUE(subject_id, file_id)
            );
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, LibraryError> {
        self.conn
            .lock()
            .map_err(|_| LibraryError::Database("connection mutex poisoned".to_string()))
    }

    fn row_to_file(row: &rusqlite::Row) -> rusqlite::Result<LibraryFile> {
        let file_type: String = row.get(5)?;
        let created_at: String = row.get(8)?;
        let size: i64 = row.get(3)?;
        Ok(LibraryFile {
            id: row.get(0)?,
            folder_id: row.get(1)?,
            name: row.get(2)?,
            size_bytes: size.max(0) as u64,
            md5: row.get(4)?,
            file_type: FileType::parse(&file_type),
            fs_path: row.get(6)?,
            url: row.get(7)?,
            created_at: parse_timestamp(&created_at),
        })
    }

    fn query_subject(
        conn: &Connection,
        platform: SubjectPlatform,
        platform_id: &str,
    ) -> Result<Option<Subject>, LibraryError> {
        let subject = conn
            .query_row(
                "SELECT id, platform_id, synced_at FROM subjects WHERE platform = ?1 AND platform_id = ?2",
                params![platform.as_str(), platform_id],
                |row| {
                    let synced_at: String = row.get(2)?;
                    Ok(Subject {
                        id: row.get(0)?,
                        platform,
                        platform_id: row.get(1)?,
                        synced_at: parse_timestamp(&synced_at),
                    })
                },
            )
            .optional()?;
        Ok(subject)
    }

    fn row_to_folder(row: &rusqlite::Row) -> rusqlite::Result<Folder> {
        Ok(Folder {
            id: row.get(0)?,
            parent_id: row.get(1)?,
            name: row.get(2)?,
        })
    }
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl Library for SqliteLibrary {
    async fn sync_subject(
        &self,
        platform: SubjectPlatform,
        platform_id: &str,
    ) -> Result<Subject, LibraryError> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO subjects (platform, platform_id, synced_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(platform, platform_id) DO UPDATE SET synced_at = excluded.synced_at",
            params![platform.as_str(), platform_id, now],
        )?;

        let subject = Self::query_subject(&conn, platform, platform_id)?
            .ok_or_else(|| LibraryError::NotFound(format!("subject {}:{}", platform, platform_id)))?;
        debug!(platform = %platform, platform_id, subject_id = subject.id, "Synced subject");
        Ok(subject)
    }

    async fn find_subject(
        &self,
        platform: SubjectPlatform,
        platform_id: &str,
    ) -> Result<Option<Subject>, LibraryError> {
        let conn = self.conn()?;
        Self::query_subject(&conn, platform, platform_id)
    }

    async fn find_folder(&self, parent_id: i64, name: &str) -> Result<Option<Folder>, LibraryError> {
        let conn = self.conn()?;
        let folder = conn
            .query_row(
                "SELECT id, parent_id, name FROM folders WHERE parent_id = ?1 AND name = ?2",
                params![parent_id, name],
                Self::row_to_folder,
            )
            .optional()?;
        Ok(folder)
    }

    async fn create_folder(&self, parent_id: i64, name: &str) -> Result<Folder, LibraryError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO folders (parent_id, name) VALUES (?1, ?2)
             ON CONFLICT(parent_id, name) DO NOTHING",
            params![parent_id, name],
        )?;
        let folder = conn.query_row(
            "SELECT id, parent_id, name FROM folders WHERE parent_id = ?1 AND name = ?2",
            params![parent_id, name],
            Self::row_to_folder,
        )?;
        Ok(folder)
    }

    async fn find_files_by_name_and_type(
        &self,
        name: &str,
        file_type: FileType,
    ) -> Result<Vec<LibraryFile>, LibraryError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM files WHERE name = ?1 AND file_type = ?2 ORDER BY id",
            FILE_COLUMNS
        ))?;
        let rows = stmt.query_map(params![name, file_type.as_str()], Self::row_to_file)?;

        let mut files = Vec::new();
        for row in rows {
            files.push(row?);
        }
        Ok(files)
    }

    async fn exists_by_hash(&self, md5: &str) -> Result<bool, LibraryError> {
        let conn = self.conn()?;
        let exists = conn
            .query_row(
                "SELECT 1 FROM files WHERE md5 = ?1 LIMIT 1",
                params![md5],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        Ok(exists)
    }

    async fn create_file(&self, file: NewLibraryFile) -> Result<LibraryFile, LibraryError> {
        let conn = self.conn()?;
        let created_at = Utc::now();
        conn.execute(
            "INSERT INTO files (folder_id, name, size_bytes, md5, file_type, fs_path, url, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                file.folder_id,
                file.name,
                file.size_bytes as i64,
                file.md5,
                file.file_type.as_str(),
                file.fs_path,
                file.url,
                created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| match e.sqlite_error_code() {
            Some(ErrorCode::ConstraintViolation) => LibraryError::DuplicateHash(file.md5.clone()),
            _ => LibraryError::from(e),
        })?;
        let id = conn.last_insert_rowid();

        Ok(LibraryFile {
            id,
            folder_id: file.folder_id,
            name: file.name,
            size_bytes: file.size_bytes,
            md5: file.md5,
            file_type: file.file_type,
            fs_path: file.fs_path,
            url: file.url,
            created_at,
        })
    }

    async fn find_file_in_folder(
        &self,
        folder_id: i64,
        name: &str,
    ) -> Result<Option<LibraryFile>, LibraryError> {
        let conn = self.conn()?;
        let file = conn
            .query_row(
                &format!(
                    "SELECT {} FROM files WHERE folder_id = ?1 AND name = ?2 ORDER BY id LIMIT 1",
                    FILE_COLUMNS
                ),
                params![folder_id, name],
                Self::row_to_file,
            )
            .optional()?;
        Ok(file)
    }

    async fn link_files_to_subject(
        &self,
        subject_id: i64,
        file_ids: &[i64],
    ) -> Result<usize, LibraryError> {
        let mut conn = self.conn()?;
        let exists = conn
            .query_row(
                "SELECT 1 FROM subjects WHERE id = ?1",
                params![subject_id],
                |_| Ok(()),
            )
            .optional()?;
        if exists.is_none() {
            return Err(LibraryError::NotFound(format!("subject {}", subject_id)));
        }

        let tx = conn.transaction()?;
        let mut linked = 0;
        for file_id in file_ids {
            linked += tx.execute(
                "INSERT OR IGNORE INTO subject_files (subject_id, file_id) VALUES (?1, ?2)",
                params![subject_id, file_id],
            )?;
        }
        tx.commit()?;
        Ok(linked)
    }

    async fn subject_files(&self, subject_id: i64) -> Result<Vec<LibraryFile>, LibraryError> {
        let conn = self.conn()?;
        let columns = FILE_COLUMNS
            .split(", ")
            .map(|c| format!("f.{}", c))
            .collect::<Vec<_>>()
            .join(", ");
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM files f JOIN subject_files sf ON sf.file_id = f.id
             WHERE sf.subject_id = ?1 ORDER BY f.id",
            columns
        ))?;
        let rows = stmt.query_map(params![subject_id], Self::row_to_file)?;

        let mut files = Vec::new();
        for row in rows {
            files.push(row?);
        }
        Ok(files)
    }

    async fn count_files(&self) -> Result<u64, LibraryError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    async fn count_folders(&self) -> Result<u64, LibraryError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM folders", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }
}
