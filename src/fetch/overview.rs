//! Artist overview query against the platform's partner API.

use crate::auth::TokenAuthManager;
use crate::errors::HarvestError;
use crate::fetch::RetryingClient;
use crate::store::MetricsSnapshot;
use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::error;

pub const DEFAULT_QUERY_URL: &str = "https://api-partner.spotify.com/pathfinder/v1/query";

/// Content hash of the server-side persisted `queryArtistOverview` query.
/// Changes across platform releases, so it is configurable.
pub const DEFAULT_OVERVIEW_QUERY_HASH: &str =
    "da986392124383827dc03cbb3d66c1de81225244b6e20f8d78f9f802cc43df6e";

/// Source of per-artist metrics snapshots.
#[async_trait]
pub trait ArtistStatsSource: Send + Sync {
    async fn fetch(
        &self,
        artist_id: &str,
        cancel: &CancellationToken,
    ) -> Result<MetricsSnapshot, HarvestError>;
}

/// Fetches and validates one artist's stats via the persisted GraphQL query.
pub struct StatsFetcher {
    http: Arc<RetryingClient>,
    tokens: Arc<TokenAuthManager>,
    query_url: String,
    query_hash: String,
}

impl StatsFetcher {
    pub fn new(
        http: Arc<RetryingClient>,
        tokens: Arc<TokenAuthManager>,
        query_url: String,
        query_hash: String,
    ) -> Self {
        Self {
            http,
            tokens,
            query_url,
            query_hash,
        }
    }
}

#[async_trait]
impl ArtistStatsSource for StatsFetcher {
    async fn fetch(
        &self,
        artist_id: &str,
        cancel: &CancellationToken,
    ) -> Result<MetricsSnapshot, HarvestError> {
        let token = self.tokens.get_token(cancel).await?;

        let variables = json!({
            "uri": format!("spotify:artist:{}", artist_id),
            "locale": "",
            "includePrerelease": true,
        })
        .to_string();
        let extensions = json!({
            "persistedQuery": {
                "version": 1,
                "sha256Hash": self.query_hash,
            }
        })
        .to_string();

        let request = self
            .http
            .client()
            .get(&self.query_url)
            .query(&[
                ("operationName", "queryArtistOverview"),
                ("variables", variables.as_str()),
                ("extensions", extensions.as_str()),
            ])
            .header("accept", "application/json")
            .header("accept-language", "en")
            .bearer_auth(&token.value);

        let response = self.http.execute(request, cancel).await?;
        let body: JsonValue = response.json().await.map_err(|e| {
            HarvestError::Validation(format!("response is not valid JSON: {}", e))
        })?;

        extract_snapshot(&body).inspect_err(|_| {
            error!("Bad API response:\n{}", body);
        })
    }
}

/// Pull the stats object out of the nested response and validate its shape.
///
/// `monthlyListeners` and `followers` must be present and non-null; a null
/// value is a hard validation failure, not merely absent. Volatile fields
/// are dropped before the snapshot is returned.
pub fn extract_snapshot(body: &JsonValue) -> Result<MetricsSnapshot, HarvestError> {
    let stats = body
        .pointer("/data/artistUnion/stats")
        .ok_or_else(|| HarvestError::Validation("missing data.artistUnion.stats".to_string()))?;

    for field in ["monthlyListeners", "followers"] {
        match stats.get(field) {
            None | Some(JsonValue::Null) => {
                return Err(HarvestError::Validation(format!("{} not returned!", field)));
            }
            Some(_) => {}
        }
    }

    let mut snapshot: MetricsSnapshot = serde_json::from_value(stats.clone())
        .map_err(|e| HarvestError::Validation(format!("malformed stats object: {}", e)))?;
    snapshot.strip_volatile();
    Ok(snapshot)
}
