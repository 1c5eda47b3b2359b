//! Reconciler lifecycle integration tests.
//!
//! These tests drive both passes against mock collaborators and a real
//! SQLite library:
//! feed item -> submitted job -> tagged job -> finished job -> linked files

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use mikansync_core::{
    config::{Config, RuntimeSettings},
    feed::{AnnouncementItem, FeedError},
    library::{Library, SubjectPlatform},
    testing::{fixtures, MockDownloadClient, MockFeedSource, MockSubjectResolver},
    torrent_client::{DownloadClient, JobQuery, JobState, JobTag},
    Collaborators, PassSettings, Reconciler, SettingsCell, SqliteLibrary,
};

const FEED_URL: &str = "https://mikanime.tv/RSS/MyBangumi?token=test";

/// Test helper holding the reconciler and handles on every mock.
struct TestHarness {
    client: Arc<MockDownloadClient>,
    feed: Arc<MockFeedSource>,
    resolver: Arc<MockSubjectResolver>,
    library: Arc<SqliteLibrary>,
    reconciler: Reconciler,
    downloads: TempDir,
    _work_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        Self::with_config(fixtures::config())
    }

    fn with_config(mut config: Config) -> Self {
        let downloads = TempDir::new().expect("Failed to create downloads dir");
        let work_dir = TempDir::new().expect("Failed to create work dir");
        config.library.work_dir = work_dir.path().to_path_buf();

        let client = Arc::new(MockDownloadClient::with_download_dir(
            downloads.path().to_string_lossy(),
        ));
        let feed = Arc::new(MockFeedSource::new());
        let resolver = Arc::new(MockSubjectResolver::new());
        let library = Arc::new(SqliteLibrary::in_memory().expect("Failed to create library"));

        let mut settings = RuntimeSettings::from_config(&config);
        settings.feed_url = Some(FEED_URL.to_string());

        let reconciler = Reconciler::new(
            Collaborators {
                client: client.clone(),
                feed: feed.clone(),
                resolver: resolver.clone(),
                library: library.clone(),
            },
            SettingsCell::new(settings),
            PassSettings::from_config(&config),
        );

        Self {
            client,
            feed,
            resolver,
            library,
            reconciler,
            downloads,
            _work_dir: work_dir,
        }
    }

    fn write_download(&self, relative: &str, content: &[u8]) -> String {
        let path = self.downloads.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        std::fs::write(&path, content).expect("Failed to write download");
        path.to_string_lossy().into_owned()
    }

    async fn subject_file_names(&self, subject_id: &str) -> Vec<String> {
        let Some(subject) = self
            .library
            .find_subject(SubjectPlatform::BgmTv, subject_id)
            .await
            .unwrap()
        else {
            return Vec::new();
        };
        let mut names: Vec<String> = self
            .library
            .subject_files(subject.id)
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        names.sort();
        names
    }
}

fn show_a_item() -> AnnouncementItem {
    AnnouncementItem::new("Show A - 01", "http://x/ep/1", "http://x/dl/1.torrent")
}

// ============================================================================
// Announce pass
// ============================================================================

#[tokio::test]
async fn test_announce_tags_job_and_syncs_subject() {
    let harness = TestHarness::new();
    harness.feed.set_items(vec![show_a_item()]).await;
    harness.resolver.set_subject("http://x/ep/1", "12345").await;

    let report = harness.reconciler.run_announce_pass().await.unwrap();
    assert_eq!(report.items, 1);
    assert_eq!(report.tagged, 1);
    assert_eq!(report.failed, 0);

    let added = harness.client.added_jobs().await;
    assert_eq!(added.len(), 1);
    assert_eq!(added[0].url, "http://x/dl/1.torrent");
    assert_eq!(added[0].category, "mikan");
    assert_eq!(added[0].rename.as_deref(), Some("Show A - 01"));
    assert!(added[0].flags.skip_checking);

    let hash = MockDownloadClient::hash_for_url("http://x/dl/1.torrent");
    let job = harness.client.job(&hash).await.unwrap();
    assert_eq!(job.tag, JobTag::SubjectId("12345".to_string()));

    assert!(harness
        .library
        .find_subject(SubjectPlatform::BgmTv, "12345")
        .await
        .unwrap()
        .is_some());

    let categories = harness.client.categories().await;
    assert_eq!(categories.len(), 1);
    assert_eq!(categories[0].name, "mikan");
}

#[tokio::test]
async fn test_announce_twice_resolves_once() {
    let harness = TestHarness::new();
    harness.feed.set_items(vec![show_a_item()]).await;
    harness.resolver.set_subject("http://x/ep/1", "12345").await;

    let first = harness.reconciler.run_announce_pass().await.unwrap();
    let second = harness.reconciler.run_announce_pass().await.unwrap();

    assert_eq!(first.tagged, 1);
    assert_eq!(second.tagged, 0);
    assert_eq!(second.already_tagged, 1);
    assert_eq!(harness.resolver.resolve_calls(), 1);
    assert_eq!(harness.client.taggings().await.len(), 1);
    // The category exists after the first pass.
    assert_eq!(harness.client.categories().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unmatched_item_is_skipped_after_window() {
    let mut config = fixtures::config();
    config.reconciler.poll_timeout_ms = 5000;
    config.reconciler.poll_interval_ms = 100;
    let harness = TestHarness::with_config(config);

    harness.feed.set_items(vec![show_a_item()]).await;
    harness.resolver.set_subject("http://x/ep/1", "12345").await;
    harness
        .client
        .set_visibility_delay(Duration::from_secs(60))
        .await;

    let started = tokio::time::Instant::now();
    let report = harness.reconciler.run_announce_pass().await.unwrap();
    let waited = started.elapsed();

    assert_eq!(report.unmatched, 1);
    assert_eq!(report.tagged, 0);
    assert_eq!(report.failed, 0);
    assert!(waited >= Duration::from_secs(5));
    assert!(waited < Duration::from_secs(6));
    assert_eq!(harness.resolver.resolve_calls(), 0);
    assert!(harness.client.taggings().await.is_empty());
}

#[tokio::test]
async fn test_unmatched_item_does_not_block_others() {
    let harness = TestHarness::new();
    let unmatched = fixtures::item("Show B - 05", 5);
    let matched = fixtures::item("Show C - 07", 7);
    harness
        .client
        .set_job_name(&unmatched.torrent_url, "Something else entirely")
        .await;
    harness
        .resolver
        .set_subject(&unmatched.episode_page_url, "111")
        .await;
    harness
        .resolver
        .set_subject(&matched.episode_page_url, "222")
        .await;
    harness.feed.set_items(vec![unmatched, matched.clone()]).await;

    let report = harness.reconciler.run_announce_pass().await.unwrap();
    assert_eq!(report.items, 2);
    assert_eq!(report.unmatched, 1);
    assert_eq!(report.tagged, 1);

    let taggings = harness.client.taggings().await;
    assert_eq!(taggings.len(), 1);
    assert_eq!(
        taggings[0].hash,
        MockDownloadClient::hash_for_url(&matched.torrent_url)
    );
    assert_eq!(taggings[0].tags, vec!["222".to_string()]);
}

#[tokio::test]
async fn test_fuzzy_title_match_tags_renamed_job() {
    let harness = TestHarness::new();
    let item = fixtures::item("[ANi] Show A - 01 [1080P]", 1);
    // Client dropped the group prefix.
    harness
        .client
        .set_job_name(&item.torrent_url, "Show A - 01 [1080P]")
        .await;
    harness
        .resolver
        .set_subject(&item.episode_page_url, "12345")
        .await;
    harness.feed.set_items(vec![item]).await;

    let report = harness.reconciler.run_announce_pass().await.unwrap();
    assert_eq!(report.tagged, 1);
}

#[tokio::test(start_paused = true)]
async fn test_slow_job_is_not_confused_with_similar_tagged_job() {
    let mut config = fixtures::config();
    config.reconciler.poll_timeout_ms = 5000;
    config.reconciler.poll_interval_ms = 100;
    let harness = TestHarness::with_config(config);

    harness
        .client
        .insert_job(fixtures::job(
            "old",
            "Show B - 01",
            JobTag::SubjectId("999".to_string()),
        ))
        .await;
    harness
        .client
        .set_visibility_delay(Duration::from_millis(300))
        .await;
    harness.feed.set_items(vec![show_a_item()]).await;
    harness.resolver.set_subject("http://x/ep/1", "12345").await;

    let report = harness.reconciler.run_announce_pass().await.unwrap();
    assert_eq!(report.tagged, 1);
    assert_eq!(report.already_tagged, 0);
    assert_eq!(harness.resolver.resolve_calls(), 1);

    let hash = MockDownloadClient::hash_for_url("http://x/dl/1.torrent");
    let job = harness.client.job(&hash).await.unwrap();
    assert_eq!(job.tag, JobTag::SubjectId("12345".to_string()));
    let old = harness.client.job("old").await.unwrap();
    assert_eq!(old.tag, JobTag::SubjectId("999".to_string()));
}

#[tokio::test]
async fn test_resolution_failure_skips_item() {
    let harness = TestHarness::new();
    harness.feed.set_items(vec![show_a_item()]).await;

    let report = harness.reconciler.run_announce_pass().await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.tagged, 0);
    assert!(harness.client.taggings().await.is_empty());

    // The job was still submitted; the next pass retries resolution.
    harness.resolver.set_subject("http://x/ep/1", "12345").await;
    let report = harness.reconciler.run_announce_pass().await.unwrap();
    assert_eq!(report.tagged, 1);
}

#[tokio::test]
async fn test_feed_failure_aborts_pass() {
    let harness = TestHarness::new();
    harness.feed.set_items(vec![show_a_item()]).await;
    harness
        .feed
        .set_next_error(FeedError::Request("connection refused".to_string()))
        .await;

    let result = harness.reconciler.run_announce_pass().await;
    assert!(result.is_err());
    assert!(harness.client.added_jobs().await.is_empty());
    assert_eq!(harness.feed.fetched_urls().await, vec![FEED_URL.to_string()]);

    let status = harness.reconciler.status().await;
    let last = status.last_announce.unwrap();
    assert!(last.error.unwrap().contains("connection refused"));
}

#[tokio::test]
async fn test_empty_feed_still_resumes_missing_files() {
    let harness = TestHarness::new();

    let mut stuck = fixtures::job("aaa", "Show A - 01", JobTag::Untagged);
    stuck.state = JobState::MissingFiles;
    let mut errored = fixtures::job("bbb", "Show A - 02", JobTag::Untagged);
    errored.state = JobState::Error;
    let mut other_category = fixtures::job("ccc", "Other", JobTag::Untagged);
    other_category.state = JobState::MissingFiles;
    other_category.category = Some("movies".to_string());
    for job in [stuck, errored, other_category] {
        harness.client.insert_job(job).await;
    }

    let report = harness.reconciler.run_announce_pass().await.unwrap();
    assert_eq!(report.items, 0);
    assert_eq!(report.resumed, 1);
    assert_eq!(harness.client.resumed().await, vec!["aaa".to_string()]);

    let resumed = harness.client.job("aaa").await.unwrap();
    assert_eq!(resumed.state, JobState::Downloading);
}

// ============================================================================
// Import pass
// ============================================================================

#[tokio::test]
async fn test_import_single_file_links_subject() {
    let harness = TestHarness::new();
    let path = harness.write_download("Show.A.01.mkv", b"episode one");
    harness
        .client
        .insert_job(fixtures::finished_job(
            "aaa",
            &path,
            JobTag::SubjectId("12345".to_string()),
        ))
        .await;

    let report = tokio_test::assert_ok!(harness.reconciler.run_import_pass().await);
    assert_eq!(report.finished_jobs, 1);
    assert_eq!(report.failed_jobs, 0);
    assert_eq!(report.files.imported, 1);
    assert_eq!(report.linked, 1);

    assert_eq!(harness.library.count_files().await.unwrap(), 1);
    assert_eq!(
        harness.subject_file_names("12345").await,
        vec!["Show.A.01.mkv".to_string()]
    );
}

#[tokio::test]
async fn test_import_twice_does_not_duplicate() {
    let harness = TestHarness::new();
    let path = harness.write_download("Show.A.01.mkv", b"episode one");
    harness
        .client
        .insert_job(fixtures::finished_job(
            "aaa",
            &path,
            JobTag::SubjectId("12345".to_string()),
        ))
        .await;

    harness.reconciler.run_import_pass().await.unwrap();
    let files = harness.library.count_files().await.unwrap();
    let folders = harness.library.count_folders().await.unwrap();

    let second = harness.reconciler.run_import_pass().await.unwrap();
    assert_eq!(second.files.imported, 0);
    assert_eq!(second.linked, 0);
    assert_eq!(harness.library.count_files().await.unwrap(), files);
    assert_eq!(harness.library.count_folders().await.unwrap(), folders);
    assert_eq!(harness.subject_file_names("12345").await.len(), 1);
}

#[tokio::test]
async fn test_import_directory_links_every_child() {
    let harness = TestHarness::new();
    harness.write_download("Show A S01/Show.A.01.mkv", b"episode one");
    harness.write_download("Show A S01/Show.A.02.mkv", b"episode two");
    let dir = harness.downloads.path().join("Show A S01");
    harness
        .client
        .insert_job(fixtures::finished_job(
            "aaa",
            &dir.to_string_lossy(),
            JobTag::SubjectId("12345".to_string()),
        ))
        .await;

    let report = harness.reconciler.run_import_pass().await.unwrap();
    assert_eq!(report.files.imported, 2);
    assert_eq!(report.linked, 2);

    // Import root plus the job's directory.
    assert_eq!(harness.library.count_folders().await.unwrap(), 2);
    assert_eq!(harness.library.count_files().await.unwrap(), 2);
    assert_eq!(
        harness.subject_file_names("12345").await,
        vec!["Show.A.01.mkv".to_string(), "Show.A.02.mkv".to_string()]
    );
}

#[tokio::test]
async fn test_directory_jobs_with_same_child_name_link_own_files() {
    let harness = TestHarness::new();
    harness.write_download("Show A/01.mkv", b"show a episode one");
    harness.write_download("Show B/01.mkv", b"show b episode one");
    for (hash, show, subject) in [("aaa", "Show A", "111"), ("bbb", "Show B", "222")] {
        let dir = harness.downloads.path().join(show);
        harness
            .client
            .insert_job(fixtures::finished_job(
                hash,
                &dir.to_string_lossy(),
                JobTag::SubjectId(subject.to_string()),
            ))
            .await;
    }

    let report = harness.reconciler.run_import_pass().await.unwrap();
    assert_eq!(report.files.imported, 2);
    assert_eq!(report.linked, 2);
    assert_eq!(harness.library.count_files().await.unwrap(), 2);

    let mut linked = Vec::new();
    for (subject_id, bytes) in [("111", &b"show a episode one"[..]), ("222", &b"show b episode one"[..])] {
        let subject = harness
            .library
            .find_subject(SubjectPlatform::BgmTv, subject_id)
            .await
            .unwrap()
            .unwrap();
        let files = harness.library.subject_files(subject.id).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "01.mkv");
        assert_eq!(files[0].md5, format!("{:x}", md5::compute(bytes)));
        linked.push((files[0].id, files[0].folder_id));
    }
    assert_ne!(linked[0].0, linked[1].0);
    assert_ne!(linked[0].1, linked[1].1);
}

#[tokio::test]
async fn test_duplicate_content_is_not_imported_and_not_linked() {
    let harness = TestHarness::new();
    let first = harness.write_download("a/Show.A.01.mkv", b"same bytes");
    let second = harness.write_download("b/Show.A.01.v2.mkv", b"same bytes");
    harness
        .client
        .insert_job(fixtures::finished_job("aaa", &first, JobTag::Untagged))
        .await;
    harness.reconciler.run_import_pass().await.unwrap();

    harness
        .client
        .insert_job(fixtures::finished_job(
            "bbb",
            &second,
            JobTag::SubjectId("12345".to_string()),
        ))
        .await;
    let report = harness.reconciler.run_import_pass().await.unwrap();
    assert_eq!(report.files.imported, 0);
    assert_eq!(report.files.duplicates, 1);
    assert_eq!(harness.library.count_files().await.unwrap(), 1);
    // No record under the second name, so nothing to link.
    assert_eq!(report.linked, 0);
}

#[tokio::test]
async fn test_partial_download_is_not_imported() {
    let harness = TestHarness::new();
    let path = harness.write_download("Show.A.01.mkv", b"partial");
    let mut job = fixtures::finished_job("aaa", &path, JobTag::SubjectId("1".to_string()));
    job.progress = 0.999;
    harness.client.insert_job(job).await;

    let report = harness.reconciler.run_import_pass().await.unwrap();
    assert_eq!(report.finished_jobs, 0);
    assert_eq!(harness.library.count_files().await.unwrap(), 0);
    assert_eq!(harness.library.count_folders().await.unwrap(), 0);
}

#[tokio::test]
async fn test_untagged_job_is_imported_without_links() {
    let harness = TestHarness::new();
    let path = harness.write_download("Show.A.01.mkv", b"episode one");
    harness
        .client
        .insert_job(fixtures::finished_job("aaa", &path, JobTag::Untagged))
        .await;

    let report = harness.reconciler.run_import_pass().await.unwrap();
    assert_eq!(report.files.imported, 1);
    assert_eq!(report.linked, 0);
}

#[tokio::test]
async fn test_missing_content_path_is_noop() {
    let harness = TestHarness::new();
    let gone = harness.downloads.path().join("deleted.mkv");
    harness
        .client
        .insert_job(fixtures::finished_job(
            "aaa",
            &gone.to_string_lossy(),
            JobTag::SubjectId("12345".to_string()),
        ))
        .await;

    let report = harness.reconciler.run_import_pass().await.unwrap();
    assert_eq!(report.finished_jobs, 1);
    assert_eq!(report.failed_jobs, 0);
    assert_eq!(report.files.imported, 0);
    assert_eq!(harness.library.count_files().await.unwrap(), 0);
}

// ============================================================================
// Scheduled loops
// ============================================================================

#[tokio::test]
async fn test_loops_carry_job_from_feed_to_library() {
    let harness = TestHarness::new();
    harness.feed.set_items(vec![show_a_item()]).await;
    harness.resolver.set_subject("http://x/ep/1", "12345").await;

    harness.reconciler.start().await;

    let hash = MockDownloadClient::hash_for_url("http://x/dl/1.torrent");
    let client = harness.client.clone();
    let tagged_hash = hash.clone();
    wait_for(move || {
        let client = client.clone();
        let hash = tagged_hash.clone();
        async move {
            client
                .job(&hash)
                .await
                .is_some_and(|job| job.tag.is_tagged())
        }
    })
    .await;

    // Finish the download, then trigger the import pass by hand.
    let path = harness.write_download("Show A - 01", b"episode one");
    harness.client.set_content_path(&hash, path).await;
    harness.client.set_progress(&hash, 1.0).await;
    let report = harness.reconciler.run_import_pass().await.unwrap();
    assert_eq!(report.failed_jobs, 0);

    harness.reconciler.stop().await;
    let status = harness.reconciler.status().await;
    assert!(!status.running);
    assert!(status.last_announce.is_some());

    let jobs = harness
        .client
        .list_jobs(&JobQuery::new().with_tag("12345"))
        .await
        .unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(
        harness.subject_file_names("12345").await,
        vec!["Show A - 01".to_string()]
    );
}

async fn wait_for<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met in time");
}
