//! One full harvest pass over the stats directory.

use crate::archive::Archive;
use crate::clock::Clock;
use crate::errors::HarvestError;
use crate::notify::{NotificationDispatcher, NotificationEvent, Severity};
use crate::scheduler::PassRunner;
use crate::store::{ArtistStateStore, UpdateOutcome};
use async_trait::async_trait;
use chrono_tz::Tz;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use walkdir::WalkDir;

pub struct HarvestPipeline {
    stats_dir: PathBuf,
    store: ArtistStateStore,
    archive: Arc<dyn Archive>,
    notifier: Arc<NotificationDispatcher>,
    clock: Arc<dyn Clock>,
    timezone: Tz,
    cancel: CancellationToken,
}

impl HarvestPipeline {
    pub fn new(
        stats_dir: PathBuf,
        store: ArtistStateStore,
        archive: Arc<dyn Archive>,
        notifier: Arc<NotificationDispatcher>,
        clock: Arc<dyn Clock>,
        timezone: Tz,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            stats_dir,
            store,
            archive,
            notifier,
            clock,
            timezone,
            cancel,
        }
    }

    fn record_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = WalkDir::new(&self.stats_dir)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();
        paths
    }

    async fn notify(&self, severity: Severity, message: impl Into<String>) {
        self.notifier
            .notify(NotificationEvent::new(severity, message))
            .await;
    }

    async fn notify_with_trace(&self, severity: Severity, message: impl Into<String>, trace: String) {
        self.notifier
            .notify(NotificationEvent::new(severity, message).with_trace(trace))
            .await;
    }

    /// Execute one pass: verify the archive is clean, pull, update every
    /// record, commit and push. Only cancellation escapes as an error; every
    /// other failure is reported through the notifier and ends the pass.
    pub async fn execute(&self, force: bool) -> Result<(), HarvestError> {
        match self.archive.has_changes().await {
            Ok(false) => {}
            Ok(true) => {
                self.notify(
                    Severity::Error,
                    "There are uncommitted changes in the stats repository. Fetch stopped",
                )
                .await;
                return Ok(());
            }
            Err(e) => {
                self.notify_with_trace(
                    Severity::Error,
                    "Could not inspect the stats repository. Fetch stopped",
                    e.to_string(),
                )
                .await;
                return Ok(());
            }
        }

        if let Err(e) = self.archive.pull().await {
            self.notify_with_trace(
                Severity::Error,
                "Stats repository could not be pulled. Fetch stopped",
                e.to_string(),
            )
            .await;
            return Ok(());
        }

        let paths = self.record_paths();
        info!("Updating {} artist records", paths.len());

        let mut updated = 0usize;
        let mut failed = 0usize;
        for path in &paths {
            if self.cancel.is_cancelled() {
                return Err(HarvestError::Cancelled);
            }
            match self.store.load_and_maybe_update(path, force, &self.cancel).await {
                Ok(UpdateOutcome::Updated(_)) => updated += 1,
                Ok(UpdateOutcome::Skipped(_)) => {}
                Err(e) if e.is_cancelled() => return Err(HarvestError::Cancelled),
                Err(e) if e.aborts_pass() => {
                    self.notify_with_trace(
                        Severity::Error,
                        "Stats could not be fetched. Fetch stopped",
                        e.to_string(),
                    )
                    .await;
                    return Ok(());
                }
                Err(e) => {
                    failed += 1;
                    warn!("{:?}: update failed: {}", path, e);
                    self.notify_with_trace(
                        Severity::Warning,
                        format!("Stats could not be updated for {:?}", path.file_name()),
                        e.to_string(),
                    )
                    .await;
                }
            }
        }

        match self.archive.has_changes().await {
            Ok(true) => {}
            Ok(false) => {
                self.notify(Severity::Info, "No stats changed").await;
                return Ok(());
            }
            Err(e) => {
                self.notify_with_trace(
                    Severity::Error,
                    "Could not inspect the stats repository after the update",
                    e.to_string(),
                )
                .await;
                return Ok(());
            }
        }

        let date = self
            .clock
            .now()
            .with_timezone(&self.timezone)
            .date_naive()
            .format("%Y-%m-%d");
        if let Err(e) = self.archive.commit_all(&format!("DATA:{}", date)).await {
            self.notify_with_trace(
                Severity::Error,
                "Stats could not be committed",
                e.to_string(),
            )
            .await;
            return Ok(());
        }
        if let Err(e) = self.archive.push().await {
            self.notify_with_trace(Severity::Error, "Stats could not be pushed", e.to_string())
                .await;
            return Ok(());
        }

        if failed > 0 {
            self.notify(
                Severity::Warning,
                format!("Stats updated: {} records, {} failed", updated, failed),
            )
            .await;
        } else {
            self.notify(Severity::Info, format!("Stats updated: {} records", updated))
                .await;
        }
        Ok(())
    }
}

#[async_trait]
impl PassRunner for HarvestPipeline {
    async fn run_pass(&self, force: bool) -> Result<(), HarvestError> {
        self.execute(force).await
    }
}
