//! Announce-to-download pass.
//!
//! Submits every feed item to the download client, waits briefly for the
//! job to become visible, and tags it with the subject id so the import pass
//! can link files later. Jobs that already carry a tag are not resolved again.

use std::collections::HashSet;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::feed::AnnouncementItem;
use crate::library::SubjectPlatform;
use crate::matching::{similarity, title_matches};
use crate::metrics;
use crate::torrent_client::{AddJobRequest, DownloadJob, JobQuery, JobTag};

use super::context::PassContext;
use super::types::{AnnounceReport, ItemOutcome, ReconcilerError};
use super::wait::{poll_until, RetryWindow};

/// Run one announce pass.
///
/// Feed fetch failures abort the pass. Failures of a single item are logged
/// and counted, and never stop the others.
pub async fn run_pass(ctx: &PassContext) -> Result<AnnounceReport, ReconcilerError> {
    let mut report = AnnounceReport::default();
    let settings = ctx.settings.snapshot();
    let Some(feed_url) = settings.feed_url.clone() else {
        debug!("No feed URL configured, skipping announce pass");
        return Ok(report);
    };
    report.feed_configured = true;

    let client = &ctx.collaborators.client;
    client
        .ensure_category(&ctx.pass.category, &ctx.pass.category_save_path)
        .await;

    let items = ctx.collaborators.feed.fetch(&feed_url).await?;
    report.items = items.len();
    if items.is_empty() {
        debug!("Feed is empty");
    }

    let concurrency = ctx.pass.reconciler.item_concurrency.max(1);
    let outcomes: Vec<(AnnouncementItem, Result<ItemOutcome, ReconcilerError>)> =
        stream::iter(items)
            .map(|item| async move {
                let outcome = process_item(ctx, &item).await;
                (item, outcome)
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

    for (item, outcome) in outcomes {
        match outcome {
            Ok(outcome) => {
                let label = match &outcome {
                    ItemOutcome::Tagged { .. } => "tagged",
                    ItemOutcome::AlreadyTagged { .. } => "already_tagged",
                    ItemOutcome::Unmatched => "unmatched",
                };
                metrics::ANNOUNCEMENTS.with_label_values(&[label]).inc();
                report.record(&outcome);
            }
            Err(e) => {
                warn!(title = %item.title, episode_page = %item.episode_page_url, error = %e, "Failed to process announcement");
                metrics::ANNOUNCEMENTS.with_label_values(&["failed"]).inc();
                report.failed += 1;
            }
        }
    }

    // Runs after every item was attempted.
    match client
        .resume_all_missing_files(
            &ctx.pass.category,
            ctx.pass.reconciler.missing_files_page_size,
        )
        .await
    {
        Ok(resumed) => {
            if resumed > 0 {
                info!(resumed, "Resumed jobs with missing files");
            }
            metrics::JOBS_RESUMED.inc_by(resumed as u64);
            report.resumed = resumed;
        }
        Err(e) => warn!(category = %ctx.pass.category, error = %e, "Failed to resume jobs with missing files"),
    }

    info!(
        items = report.items,
        tagged = report.tagged,
        already_tagged = report.already_tagged,
        unmatched = report.unmatched,
        failed = report.failed,
        "Announce pass finished"
    );
    Ok(report)
}

/// Submit, match, tag and sync one announcement.
pub async fn process_item(
    ctx: &PassContext,
    item: &AnnouncementItem,
) -> Result<ItemOutcome, ReconcilerError> {
    let client = &ctx.collaborators.client;
    let query = JobQuery::new().with_category(&ctx.pass.category);
    let known: HashSet<String> = client
        .list_jobs(&query)
        .await?
        .into_iter()
        .map(|job| job.hash)
        .collect();

    let mut request =
        AddJobRequest::new(&item.torrent_url, &ctx.pass.category).with_rename(&item.title);
    if !ctx.pass.category_save_path.is_empty() {
        request = request.with_save_path(&ctx.pass.category_save_path);
    }
    client.add_job(request).await?;

    let threshold = ctx.pass.reconciler.title_match_threshold;
    let query = &query;
    let known = &known;
    let window = RetryWindow::from_config(&ctx.pass.reconciler);
    let matched = poll_until(window, move || async move {
        match client.list_jobs(query).await {
            Ok(jobs) => best_match(&item.title, jobs, known, threshold),
            Err(e) => {
                debug!(title = %item.title, error = %e, "Job list unavailable while waiting");
                None
            }
        }
    })
    .await;

    let Some(job) = matched else {
        warn!(title = %item.title, "Submitted job did not show up in time, skipping");
        return Ok(ItemOutcome::Unmatched);
    };

    let (outcome, subject_id) = match &job.tag {
        JobTag::SubjectId(subject_id) => {
            debug!(title = %item.title, hash = %job.hash, subject_id = %subject_id, "Job already tagged");
            (
                ItemOutcome::AlreadyTagged {
                    subject_id: subject_id.clone(),
                },
                subject_id.clone(),
            )
        }
        JobTag::Untagged => {
            let subject_id = ctx
                .collaborators
                .resolver
                .resolve_subject_id(&item.episode_page_url)
                .await?;
            client.add_tags(&job.hash, &[subject_id.as_str()]).await?;
            info!(title = %item.title, hash = %job.hash, subject_id = %subject_id, "Tagged job with subject");
            (
                ItemOutcome::Tagged {
                    subject_id: subject_id.clone(),
                },
                subject_id,
            )
        }
    };

    if let Err(e) = ctx
        .collaborators
        .library
        .sync_subject(SubjectPlatform::BgmTv, &subject_id)
        .await
    {
        warn!(title = %item.title, subject_id = %subject_id, error = %e, "Failed to sync subject");
    }
    Ok(outcome)
}

/// The job whose name best matches `title`, ignoring jobs without a hash.
///
/// A job named exactly `title` matches whenever it shows up. A fuzzy match
/// must be a job that was not in `known` before submission.
fn best_match(
    title: &str,
    jobs: Vec<DownloadJob>,
    known: &HashSet<String>,
    threshold: f64,
) -> Option<DownloadJob> {
    let jobs: Vec<DownloadJob> = jobs
        .into_iter()
        .filter(|job| !job.hash.trim().is_empty())
        .collect();
    if let Some(exact) = jobs.iter().find(|job| job.name == title) {
        return Some(exact.clone());
    }
    jobs.into_iter()
        .filter(|job| !known.contains(&job.hash))
        .filter(|job| title_matches(title, &job.name, threshold))
        .map(|job| (similarity(title, &job.name), job))
        .max_by(|(a, _), (b, _)| a.total_cmp(b))
        .map(|(_, job)| job)
}
