//! End-to-end tests for a full harvest pass
//!
//! Exercises the pipeline against a real stats directory on disk with faked
//! network and archive layers:
//! - Records gain today's snapshot and the archive is committed and pushed
//! - Removed artists (empty id) are skipped without a fetch
//! - A dirty archive aborts the pass before any fetch
//! - A pass with nothing to do reports "No stats changed"

use artist_stats_harvester::archive::Archive;
use artist_stats_harvester::errors::HarvestError;
use artist_stats_harvester::fetch::ArtistStatsSource;
use artist_stats_harvester::notify::{Channel, NotificationDispatcher, NotificationEvent, Severity};
use artist_stats_harvester::pipeline::HarvestPipeline;
use artist_stats_harvester::store::{ArtistStateStore, MetricsSnapshot};
use artist_stats_harvester::{Clock, ManualClock};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

struct FakeStatsSource {
    calls: AtomicUsize,
}

#[async_trait]
impl ArtistStatsSource for FakeStatsSource {
    async fn fetch(
        &self,
        _artist_id: &str,
        _cancel: &CancellationToken,
    ) -> Result<MetricsSnapshot, HarvestError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(MetricsSnapshot::new(1000, 500))
    }
}

#[derive(Default)]
struct FakeArchive {
    dirty_before_pass: AtomicBool,
    ops: Mutex<Vec<String>>,
    has_changes_calls: AtomicUsize,
}

#[async_trait]
impl Archive for FakeArchive {
    async fn has_changes(&self) -> Result<bool, HarvestError> {
        let call = self.has_changes_calls.fetch_add(1, Ordering::SeqCst);
        self.ops.lock().unwrap().push("has_changes".to_string());
        if call == 0 {
            // Before the pass: configured dirtiness.
            Ok(self.dirty_before_pass.load(Ordering::SeqCst))
        } else {
            // After the pass: dirty iff the test marked a write.
            Ok(self
                .ops
                .lock()
                .unwrap()
                .iter()
                .any(|op| op == "record_written"))
        }
    }

    async fn pull(&self) -> Result<(), HarvestError> {
        self.ops.lock().unwrap().push("pull".to_string());
        Ok(())
    }

    async fn commit_all(&self, message: &str) -> Result<(), HarvestError> {
        self.ops.lock().unwrap().push(format!("commit:{}", message));
        Ok(())
    }

    async fn push(&self) -> Result<(), HarvestError> {
        self.ops.lock().unwrap().push("push".to_string());
        Ok(())
    }
}

impl FakeArchive {
    fn mark_record_written(&self) {
        self.ops.lock().unwrap().push("record_written".to_string());
    }

    fn op_list(&self) -> Vec<String> {
        self.ops
            .lock()
            .unwrap()
            .iter()
            .filter(|op| *op != "record_written")
            .cloned()
            .collect()
    }
}

struct RecordingChannel {
    events: Mutex<Vec<(Severity, String)>>,
}

#[async_trait]
impl Channel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn deliver(&self, event: &NotificationEvent) -> anyhow::Result<()> {
        self.events
            .lock()
            .unwrap()
            .push((event.severity, event.message.clone()));
        Ok(())
    }
}

struct TestHarness {
    _stats_dir: TempDir,
    stats_path: PathBuf,
    pipeline: HarvestPipeline,
    source: Arc<FakeStatsSource>,
    archive: Arc<FakeArchive>,
    events: Arc<RecordingChannel>,
}

fn build_harness(records: &[(&str, &str)], dirty: bool) -> TestHarness {
    let stats_dir = TempDir::new().unwrap();
    for (file_name, content) in records {
        std::fs::write(stats_dir.path().join(file_name), content).unwrap();
    }

    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 6, 1, 22, 30, 0).unwrap(),
    ));
    let source = Arc::new(FakeStatsSource {
        calls: AtomicUsize::new(0),
    });
    let archive = Arc::new(FakeArchive::default());
    archive.dirty_before_pass.store(dirty, Ordering::SeqCst);
    let events = Arc::new(RecordingChannel {
        events: Mutex::new(Vec::new()),
    });

    let store = ArtistStateStore::new(
        Arc::clone(&source) as Arc<dyn ArtistStatsSource>,
        Arc::clone(&clock) as Arc<dyn Clock>,
        chrono_tz::UTC,
    );
    let dispatcher = Arc::new(NotificationDispatcher::new(vec![Box::new(
        RecordingChannelHandle(Arc::clone(&events)),
    )]));

    let pipeline = HarvestPipeline::new(
        stats_dir.path().to_path_buf(),
        store,
        Arc::clone(&archive) as Arc<dyn Archive>,
        dispatcher,
        clock,
        chrono_tz::UTC,
        CancellationToken::new(),
    );

    TestHarness {
        stats_path: stats_dir.path().to_path_buf(),
        _stats_dir: stats_dir,
        pipeline,
        source,
        archive,
        events,
    }
}

/// Boxed channels need ownership; this forwards into the shared recorder.
struct RecordingChannelHandle(Arc<RecordingChannel>);

#[async_trait]
impl Channel for RecordingChannelHandle {
    fn name(&self) -> &str {
        self.0.name()
    }

    async fn deliver(&self, event: &NotificationEvent) -> anyhow::Result<()> {
        self.0.deliver(event).await
    }
}

#[tokio::test]
async fn test_pass_updates_records_and_archives() {
    let harness = build_harness(
        &[
            ("artist_a.json", r#"{"id":"AAA","name":"Artist A","stats":{}}"#),
            ("artist_b.json", r#"{"id":"BBB","name":"Artist B","stats":{}}"#),
        ],
        false,
    );
    harness.archive.mark_record_written();

    harness.pipeline.execute(false).await.unwrap();

    assert_eq!(harness.source.calls.load(Ordering::SeqCst), 2);

    // Both files gained today's snapshot.
    for file_name in ["artist_a.json", "artist_b.json"] {
        let record =
            ArtistStateStore::load_record(&harness.stats_path.join(file_name)).unwrap();
        let snapshot = record.stats.get("2024-06-01").unwrap();
        assert_eq!(snapshot.monthly_listeners, 1000);
        assert_eq!(snapshot.followers, 500);
    }

    // Clean check, pull, post-pass check, dated commit, push, in that order.
    assert_eq!(
        harness.archive.op_list(),
        vec![
            "has_changes",
            "pull",
            "has_changes",
            "commit:DATA:2024-06-01",
            "push",
        ]
    );

    let events = harness.events.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, Severity::Info);
    assert!(events[0].1.contains("Stats updated"));
}

#[tokio::test]
async fn test_removed_artist_is_skipped() {
    let harness = build_harness(
        &[
            ("artist_a.json", r#"{"id":"AAA","name":"Artist A","stats":{}}"#),
            ("gone.json", r#"{"id":"","name":"Gone","stats":{}}"#),
        ],
        false,
    );
    harness.archive.mark_record_written();

    harness.pipeline.execute(false).await.unwrap();

    // Only the live artist was fetched; the removed one is untouched.
    assert_eq!(harness.source.calls.load(Ordering::SeqCst), 1);
    let gone = ArtistStateStore::load_record(&harness.stats_path.join("gone.json")).unwrap();
    assert!(gone.stats.is_empty());
}

#[tokio::test]
async fn test_dirty_archive_aborts_pass() {
    let harness = build_harness(
        &[("artist_a.json", r#"{"id":"AAA","name":"Artist A","stats":{}}"#)],
        true,
    );

    harness.pipeline.execute(false).await.unwrap();

    assert_eq!(harness.source.calls.load(Ordering::SeqCst), 0);
    assert_eq!(harness.archive.op_list(), vec!["has_changes"]);

    let events = harness.events.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, Severity::Error);
    assert!(events[0].1.contains("uncommitted changes"));
}

#[tokio::test]
async fn test_no_changes_short_circuits_commit() {
    // The record already carries today's snapshot, so nothing is fetched and
    // the post-pass tree is clean.
    let harness = build_harness(
        &[(
            "artist_a.json",
            r#"{"id":"AAA","name":"Artist A","stats":{"2024-06-01":{"followers":500,"monthlyListeners":1000}}}"#,
        )],
        false,
    );

    harness.pipeline.execute(false).await.unwrap();

    assert_eq!(harness.source.calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        harness.archive.op_list(),
        vec!["has_changes", "pull", "has_changes"]
    );

    let events = harness.events.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, Severity::Info);
    assert!(events[0].1.contains("No stats changed"));
}

struct AuthFailingStatsSource {
    calls: AtomicUsize,
}

#[async_trait]
impl ArtistStatsSource for AuthFailingStatsSource {
    async fn fetch(
        &self,
        _artist_id: &str,
        _cancel: &CancellationToken,
    ) -> Result<MetricsSnapshot, HarvestError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(HarvestError::Auth("token endpoint unreachable".to_string()))
    }
}

#[tokio::test]
async fn test_auth_failure_aborts_pass() {
    let harness = build_harness(
        &[
            ("artist_a.json", r#"{"id":"AAA","name":"Artist A","stats":{}}"#),
            ("artist_b.json", r#"{"id":"BBB","name":"Artist B","stats":{}}"#),
        ],
        false,
    );

    let source = Arc::new(AuthFailingStatsSource {
        calls: AtomicUsize::new(0),
    });
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 6, 1, 22, 30, 0).unwrap(),
    ));
    let store = ArtistStateStore::new(
        Arc::clone(&source) as Arc<dyn ArtistStatsSource>,
        Arc::clone(&clock) as Arc<dyn Clock>,
        chrono_tz::UTC,
    );
    let pipeline = HarvestPipeline::new(
        harness.stats_path.clone(),
        store,
        Arc::clone(&harness.archive) as Arc<dyn Archive>,
        Arc::new(NotificationDispatcher::new(vec![Box::new(
            RecordingChannelHandle(Arc::clone(&harness.events)),
        )])),
        clock,
        chrono_tz::UTC,
        CancellationToken::new(),
    );

    pipeline.execute(false).await.unwrap();

    // Without a token no artist can be fetched: one attempt, then stop.
    assert_eq!(source.calls.load(Ordering::SeqCst), 1);

    let events = harness.events.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, Severity::Error);
    assert!(events[0].1.contains("Fetch stopped"));

    // No commit or push after the abort.
    assert_eq!(harness.archive.op_list(), vec!["has_changes", "pull"]);

    // Neither record gained a snapshot.
    for file_name in ["artist_a.json", "artist_b.json"] {
        let record =
            ArtistStateStore::load_record(&harness.stats_path.join(file_name)).unwrap();
        assert!(record.stats.is_empty());
    }
}

#[tokio::test]
async fn test_cancelled_pass_propagates() {
    let harness = build_harness(
        &[("artist_a.json", r#"{"id":"AAA","name":"Artist A","stats":{}}"#)],
        false,
    );

    let cancelled = CancellationToken::new();
    cancelled.cancel();
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 6, 1, 22, 30, 0).unwrap(),
    ));
    let store = ArtistStateStore::new(
        Arc::clone(&harness.source) as Arc<dyn ArtistStatsSource>,
        Arc::clone(&clock) as Arc<dyn Clock>,
        chrono_tz::UTC,
    );
    let pipeline = HarvestPipeline::new(
        harness.stats_path.clone(),
        store,
        Arc::clone(&harness.archive) as Arc<dyn Archive>,
        Arc::new(NotificationDispatcher::new(vec![])),
        clock,
        chrono_tz::UTC,
        cancelled,
    );

    let err = pipeline.execute(false).await.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(harness.source.calls.load(Ordering::SeqCst), 0);
}
