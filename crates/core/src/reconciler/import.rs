//! Download-to-library pass.
//!
//! Imports the content of every fully downloaded job into the library, then
//! links the imported files to the job's subject when the job is tagged.

use std::path::Path;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::importer::ImportReport;
use crate::library::{FileType, Folder, Library, SubjectPlatform, ROOT_FOLDER_ID};
use crate::torrent_client::{DownloadJob, JobQuery};

use super::context::PassContext;
use super::types::{ImportPassReport, ReconcilerError};

/// Outcome of one finished job.
#[derive(Debug, Default)]
struct JobImport {
    files: ImportReport,
    linked: usize,
}

/// Run one import pass.
///
/// Listing jobs and preparing the import root abort the pass on failure.
/// Failures of a single job are logged and counted.
pub async fn run_pass(ctx: &PassContext) -> Result<ImportPassReport, ReconcilerError> {
    let mut report = ImportPassReport::default();
    let query = JobQuery::new().with_category(&ctx.pass.category);
    let finished: Vec<DownloadJob> = ctx
        .collaborators
        .client
        .list_jobs(&query)
        .await?
        .into_iter()
        .filter(DownloadJob::is_finished)
        .collect();
    report.finished_jobs = finished.len();
    if finished.is_empty() {
        debug!(category = %ctx.pass.category, "No finished jobs to import");
        return Ok(report);
    }

    let import_root = ctx
        .collaborators
        .library
        .ensure_folder(ROOT_FOLDER_ID, &ctx.pass.import_folder)
        .await?;
    let import_root = &import_root;

    let concurrency = ctx.pass.reconciler.job_concurrency.max(1);
    let results: Vec<(DownloadJob, Result<JobImport, ReconcilerError>)> = stream::iter(finished)
        .map(|job| async move {
            let result = import_job(ctx, import_root, &job).await;
            (job, result)
        })
        .buffer_unordered(concurrency)
        .collect()
        .await;

    for (job, result) in results {
        match result {
            Ok(job_import) => {
                report.linked += job_import.linked;
                report.files.merge(job_import.files);
            }
            Err(e) => {
                warn!(hash = %job.hash, name = %job.name, path = %job.content_path, error = %e, "Failed to import job");
                report.failed_jobs += 1;
            }
        }
    }

    info!(
        finished_jobs = report.finished_jobs,
        failed_jobs = report.failed_jobs,
        imported = report.files.imported,
        linked = report.linked,
        "Import pass finished"
    );
    Ok(report)
}

/// Import one job's content and link it to its subject.
async fn import_job(
    ctx: &PassContext,
    import_root: &Folder,
    job: &DownloadJob,
) -> Result<JobImport, ReconcilerError> {
    let content_path = Path::new(&job.content_path);
    let files = ctx.importer().import(content_path, import_root.id).await?;
    let mut outcome = JobImport { files, linked: 0 };

    let Some(subject_id) = job.tag.subject_id() else {
        return Ok(outcome);
    };

    let library = &ctx.collaborators.library;
    let subject = library
        .sync_subject(SubjectPlatform::BgmTv, subject_id)
        .await?;

    let file_ids = content_file_ids(library.as_ref(), import_root, content_path).await?;
    if file_ids.is_empty() {
        debug!(hash = %job.hash, subject_id, "No imported files to link");
        return Ok(outcome);
    }
    outcome.linked = library.link_files_to_subject(subject.id, &file_ids).await?;
    info!(
        hash = %job.hash,
        subject_id,
        files = file_ids.len(),
        new_links = outcome.linked,
        "Linked files to subject"
    );
    Ok(outcome)
}

/// Library ids of a job's content: the single file under the import root,
/// or every immediate child file of the imported directory.
async fn content_file_ids(
    library: &dyn Library,
    import_root: &Folder,
    content_path: &Path,
) -> Result<Vec<i64>, ReconcilerError> {
    let meta = match tokio::fs::metadata(content_path).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(crate::importer::ImportError::io(content_path, e).into()),
    };
    let name = entry_name(content_path);

    if !meta.is_dir() {
        return Ok(locate_file(library, import_root.id, &name)
            .await?
            .into_iter()
            .collect());
    }

    let Some(folder) = library.find_folder(import_root.id, &name).await? else {
        return Ok(Vec::new());
    };

    let mut children = Vec::new();
    let mut entries = tokio::fs::read_dir(content_path)
        .await
        .map_err(|e| crate::importer::ImportError::io(content_path, e))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| crate::importer::ImportError::io(content_path, e))?
    {
        let is_file = entry
            .file_type()
            .await
            .map(|t| t.is_file())
            .unwrap_or(false);
        if is_file {
            children.push(entry_name(&entry.path()));
        }
    }
    children.sort();

    let mut ids = Vec::new();
    for child in children {
        // Only the job's own folder; other shows reuse episode names.
        match library.find_file_in_folder(folder.id, &child).await? {
            Some(file) => ids.push(file.id),
            None => debug!(folder = %folder.name, file = %child, "Imported file not found for linking"),
        }
    }
    Ok(ids)
}

/// A single-file job's record: by name under the import root, else any file
/// with the same name and type.
async fn locate_file(
    library: &dyn Library,
    folder_id: i64,
    name: &str,
) -> Result<Option<i64>, ReconcilerError> {
    if let Some(file) = library.find_file_in_folder(folder_id, name).await? {
        return Ok(Some(file.id));
    }
    let same_name = library
        .find_files_by_name_and_type(name, FileType::from_file_name(name))
        .await?;
    Ok(same_name.first().map(|f| f.id))
}

fn entry_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
