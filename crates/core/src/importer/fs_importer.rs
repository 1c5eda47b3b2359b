//! File system importer implementation.

use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{Datelike, Utc};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, BufReader};
use tracing::{debug, info, warn};

use crate::library::{FileType, Library, LibraryError, NewLibraryFile};
use crate::metrics;

use super::error::ImportError;
use super::types::{FileOutcome, ImportReport};

const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Imports files and directory trees into the library.
///
/// Files are hard-linked into `<work_dir>/upload/YYYY/MM/DD/` when the
/// source shares a filesystem with the work dir, and copied otherwise.
pub struct FileImporter {
    library: Arc<dyn Library>,
    work_dir: PathBuf,
    running: Option<Arc<AtomicBool>>,
}

impl FileImporter {
    pub fn new(library: Arc<dyn Library>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            library,
            work_dir: work_dir.into(),
            running: None,
        }
    }

    /// Stop the walk between entries once `flag` reads false.
    pub fn with_running_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.running = Some(flag);
        self
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    fn should_stop(&self) -> bool {
        self.running
            .as_ref()
            .map(|running| !running.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Import `source` (a file or a directory tree) under `parent_folder`.
    ///
    /// A missing source is an empty no-op. Failures below the source are
    /// counted in the report and do not stop siblings; only a failure on the
    /// source itself is returned as an error.
    pub async fn import(
        &self,
        source: &Path,
        parent_folder: i64,
    ) -> Result<ImportReport, ImportError> {
        let mut report = ImportReport::default();

        match fs::metadata(source).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %source.display(), "Import source does not exist, nothing to do");
                return Ok(report);
            }
            Err(e) => return Err(ImportError::io(source, e)),
        }

        let mut worklist: Vec<(PathBuf, i64)> = vec![(source.to_path_buf(), parent_folder)];
        let mut is_root = true;

        while let Some((path, parent_id)) = worklist.pop() {
            if self.should_stop() {
                info!(path = %path.display(), "Import stopped before walk finished");
                report.cancelled = true;
                break;
            }

            let result = self.import_entry(&path, parent_id, &mut worklist, &mut report).await;
            match result {
                Ok(()) => {}
                Err(e) if is_root => return Err(e),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to import entry");
                    metrics::FILES_IMPORTED.with_label_values(&["failed"]).inc();
                    report.failed += 1;
                }
            }
            is_root = false;
        }

        debug!(
            path = %source.display(),
            imported = report.imported,
            duplicates = report.duplicates,
            skipped = report.skipped,
            failed = report.failed,
            "Import finished"
        );
        Ok(report)
    }

    /// Import one worklist entry. Directories enqueue their children after
    /// their own folder exists.
    async fn import_entry(
        &self,
        path: &Path,
        parent_id: i64,
        worklist: &mut Vec<(PathBuf, i64)>,
        report: &mut ImportReport,
    ) -> Result<(), ImportError> {
        let meta = match fs::metadata(path).await {
            Ok(meta) => meta,
            // Removed by the download client between listing and import.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(ImportError::io(path, e)),
        };

        if meta.is_dir() {
            let name = file_name(path);
            let folder = self.library.ensure_folder(parent_id, &name).await?;
            report.folders += 1;

            let mut children = Vec::new();
            let mut entries = fs::read_dir(path)
                .await
                .map_err(|e| ImportError::io(path, e))?;
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| ImportError::io(path, e))?
            {
                children.push(entry.path());
            }
            // Stack order: the first child by name is imported first.
            children.sort();
            worklist.extend(children.into_iter().rev().map(|child| (child, folder.id)));
            return Ok(());
        }

        let outcome = self.import_file(path, parent_id, meta.len()).await?;
        let label = match &outcome {
            FileOutcome::Imported(_) => "imported",
            FileOutcome::Duplicate => "duplicate",
            FileOutcome::Skipped => "skipped",
        };
        metrics::FILES_IMPORTED.with_label_values(&[label]).inc();
        report.record(&outcome);
        Ok(())
    }

    /// Import a single file.
    pub async fn import_file(
        &self,
        path: &Path,
        folder_id: i64,
        size_bytes: u64,
    ) -> Result<FileOutcome, ImportError> {
        let name = file_name(path);
        let file_type = FileType::from_file_name(&name);

        let same_name = self.library.find_file_in_folder(folder_id, &name).await?;
        if same_name.is_some_and(|file| file.file_type == file_type) {
            debug!(path = %path.display(), folder_id, "File with same name already in folder, skipping");
            return Ok(FileOutcome::Skipped);
        }

        let md5 = file_md5(path).await?;
        if self.library.exists_by_hash(&md5).await? {
            debug!(path = %path.display(), md5 = %md5, "Content already in library, skipping");
            return Ok(FileOutcome::Duplicate);
        }

        let destination = self.allocate_upload_path(&name);
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ImportError::io(parent, e))?;
        }
        link_or_copy(path, &destination).await?;

        let url = relative_url(&self.work_dir, &destination);
        let created = self
            .library
            .create_file(NewLibraryFile {
                folder_id,
                name,
                size_bytes,
                md5,
                file_type,
                fs_path: destination.to_string_lossy().into_owned(),
                url,
            })
            .await;
        let file = match created {
            Ok(file) => file,
            Err(e) => {
                // Nothing references the upload any more.
                remove_upload(&destination).await;
                return match e {
                    LibraryError::DuplicateHash(md5) => {
                        debug!(path = %path.display(), md5 = %md5, "Content recorded concurrently, skipping");
                        Ok(FileOutcome::Duplicate)
                    }
                    other => Err(other.into()),
                };
            }
        };
        info!(
            source = %path.display(),
            destination = %destination.display(),
            file_id = file.id,
            "Imported file"
        );
        Ok(FileOutcome::Imported(file))
    }

    /// `<work_dir>/upload/YYYY/MM/DD/<uuid>.<ext>`
    fn allocate_upload_path(&self, name: &str) -> PathBuf {
        let now = Utc::now();
        let file_name = match Path::new(name).extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{}.{}", uuid::Uuid::new_v4(), ext),
            None => uuid::Uuid::new_v4().to_string(),
        };
        self.work_dir
            .join("upload")
            .join(format!("{:04}", now.year()))
            .join(format!("{:02}", now.month()))
            .join(format!("{:02}", now.day()))
            .join(file_name)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Streamed md5 of a file, lowercase hex.
pub async fn file_md5(path: &Path) -> Result<String, ImportError> {
    let file = File::open(path)
        .await
        .map_err(|e| ImportError::io(path, e))?;
    let mut reader = BufReader::with_capacity(HASH_BUFFER_SIZE, file);
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];
    let mut context = md5::Context::new();

    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .await
            .map_err(|e| ImportError::io(path, e))?;
        if bytes_read == 0 {
            break;
        }
        context.consume(&buffer[..bytes_read]);
    }
    Ok(format!("{:x}", context.compute()))
}

/// Hard link `source` to `destination`, falling back to a byte copy.
/// A failed copy leaves no partial destination behind.
async fn link_or_copy(source: &Path, destination: &Path) -> Result<(), ImportError> {
    match fs::hard_link(source, destination).await {
        Ok(()) => {
            debug!(source = %source.display(), destination = %destination.display(), "Hard linked file");
            return Ok(());
        }
        Err(e) => {
            debug!(
                source = %source.display(),
                error = %e,
                "Hard link failed, falling back to copy"
            );
        }
    }

    if let Err(e) = fs::copy(source, destination).await {
        remove_upload(destination).await;
        return Err(ImportError::io(destination, e));
    }
    debug!(source = %source.display(), destination = %destination.display(), "Copied file");
    Ok(())
}

/// Remove a partial or unrecorded upload, logging anything but absence.
async fn remove_upload(destination: &Path) {
    if let Err(e) = fs::remove_file(destination).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %destination.display(), error = %e, "Failed to remove upload");
        }
    }
}

/// Path of `path` relative to `base`, `/` separated.
fn relative_url(base: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(base).unwrap_or(path);
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
