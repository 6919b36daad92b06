use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Platform fields that churn every day and produce meaningless diffs in
/// the archive, removed before a snapshot is persisted.
pub const VOLATILE_FIELDS: &[&str] = &["worldRank", "topCities"];

/// One day's metrics sample for one artist.
///
/// `monthly_listeners` and `followers` must be present and non-null in the
/// API response; anything else the platform returns rides along in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    #[serde(rename = "monthlyListeners")]
    pub monthly_listeners: u64,
    pub followers: u64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, JsonValue>,
}

impl MetricsSnapshot {
    pub fn new(monthly_listeners: u64, followers: u64) -> Self {
        Self {
            monthly_listeners,
            followers,
            extra: BTreeMap::new(),
        }
    }

    pub fn strip_volatile(&mut self) {
        for field in VOLATILE_FIELDS {
            self.extra.remove(*field);
        }
    }
}

/// Persisted per-artist record, one JSON document per artist.
///
/// `stats` maps ISO calendar dates to snapshots; an existing date key is
/// immutable unless a re-fetch is forced. An empty `id` means the artist was
/// never found on the platform and permanently disables fetching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtistRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub stats: BTreeMap<String, MetricsSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generations: Option<Vec<JsonValue>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, JsonValue>,
}

/// Result of one update attempt on one artist record. `Updated` carries the
/// snapshot that was written, so callers need not re-read the file.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    Skipped(SkipReason),
    Updated(MetricsSnapshot),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Record has an empty id, the artist does not exist on the platform.
    NotFound,
    /// Today's date key is already present.
    AlreadyFetched,
}
