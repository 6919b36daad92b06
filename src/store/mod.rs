//! Persisted per-artist state and the update decision around it.

mod format;
mod models;

pub use format::render_record;
pub use models::{ArtistRecord, MetricsSnapshot, SkipReason, UpdateOutcome, VOLATILE_FIELDS};

use crate::clock::Clock;
use crate::errors::HarvestError;
use crate::fetch::ArtistStatsSource;
use chrono_tz::Tz;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Reads an artist record, decides whether a fetch is needed today, merges
/// the new snapshot in and writes the record back.
pub struct ArtistStateStore {
    stats_source: Arc<dyn ArtistStatsSource>,
    clock: Arc<dyn Clock>,
    timezone: Tz,
}

impl ArtistStateStore {
    pub fn new(stats_source: Arc<dyn ArtistStatsSource>, clock: Arc<dyn Clock>, timezone: Tz) -> Self {
        Self {
            stats_source,
            clock,
            timezone,
        }
    }

    /// Today's date key in the configured timezone.
    pub fn date_key(&self) -> String {
        self.clock
            .now()
            .with_timezone(&self.timezone)
            .date_naive()
            .format("%Y-%m-%d")
            .to_string()
    }

    pub fn load_record(path: &Path) -> Result<ArtistRecord, HarvestError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| HarvestError::Persistence(format!("failed to read {:?}: {}", path, e)))?;
        serde_json::from_str(&content)
            .map_err(|e| HarvestError::Persistence(format!("failed to parse {:?}: {}", path, e)))
    }

    /// Fetch and merge today's snapshot if the record needs it.
    ///
    /// Skips permanently when the id is empty, and skips for the day when
    /// today's key already exists (unless `force`). The write is a temp file
    /// in the record's directory renamed over the original, so a concurrent
    /// reader or a cancellation mid-write never observes a partial record.
    pub async fn load_and_maybe_update(
        &self,
        path: &Path,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<UpdateOutcome, HarvestError> {
        let mut record = Self::load_record(path)?;
        let date_key = self.date_key();

        if record.id.is_empty() {
            info!("{} ({}): Not found", record.name, record.id);
            return Ok(UpdateOutcome::Skipped(SkipReason::NotFound));
        }

        if record.stats.contains_key(&date_key) && !force {
            debug!("{} ({}): Already fetched", record.name, record.id);
            return Ok(UpdateOutcome::Skipped(SkipReason::AlreadyFetched));
        }

        info!("{} ({}): Fetching", record.name, record.id);
        let snapshot = self.stats_source.fetch(&record.id, cancel).await?;
        record.stats.insert(date_key, snapshot.clone());

        Self::persist_record(path, &record)?;
        Ok(UpdateOutcome::Updated(snapshot))
    }

    pub fn persist_record(path: &Path, record: &ArtistRecord) -> Result<(), HarvestError> {
        let value = serde_json::to_value(record)
            .map_err(|e| HarvestError::Persistence(format!("failed to serialize record: {}", e)))?;
        let rendered = render_record(&value);

        let dir = path.parent().ok_or_else(|| {
            HarvestError::Persistence(format!("record path {:?} has no parent directory", path))
        })?;

        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| {
            HarvestError::Persistence(format!("failed to create temp file in {:?}: {}", dir, e))
        })?;
        tmp.write_all(rendered.as_bytes())
            .map_err(|e| HarvestError::Persistence(format!("failed to write record: {}", e)))?;
        tmp.persist(path).map_err(|e| {
            HarvestError::Persistence(format!("failed to replace {:?}: {}", path, e))
        })?;

        Ok(())
    }
}
