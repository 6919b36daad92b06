//! Acquisition and caching of the platform's OTP secret material.
//!
//! The secret bytes are not served by any API; they are embedded as a JSON
//! blob inside a versioned web-player script referenced from the landing
//! page. Cache misses therefore cost two outbound requests. The cached
//! material is replaced wholesale once its validity window passes, never
//! partially merged.

use crate::clock::Clock;
use crate::errors::HarvestError;
use crate::fetch::RetryingClient;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const DEFAULT_LANDING_URL: &str = "https://open.spotify.com";

/// The landing page is served differently to clients without a browser UA.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/137.0.0.0 Safari/537.36";

const ASSET_URL_PATTERN: &str = r#""([\w/:\-\.]*/web-player\.\w*\.js)""#;
const SECRETS_BLOB_PATTERN: &str = r#"'(\{"validUntil":[^']*)'"#;

/// One versioned secret entry; the first entry in the wire order is the
/// authoritative one.
#[derive(Debug, Clone, Deserialize)]
pub struct SecretEntry {
    pub secret: Vec<u8>,
    pub version: u32,
}

/// The platform's current OTP seed material and its validity window.
#[derive(Debug, Clone)]
pub struct SecretMaterial {
    pub secrets: Vec<SecretEntry>,
    pub valid_until: DateTime<Utc>,
}

#[derive(Deserialize)]
struct SecretsBlob {
    #[serde(rename = "validUntil")]
    valid_until: String,
    secrets: Vec<SecretEntry>,
}

#[async_trait]
pub trait SecretFetcher: Send + Sync {
    async fn fetch_secrets(
        &self,
        cancel: &CancellationToken,
    ) -> Result<SecretMaterial, HarvestError>;
}

/// Scrapes the secret material out of the platform's own web assets.
pub struct WebSecretSource {
    http: Arc<RetryingClient>,
    landing_url: String,
}

impl WebSecretSource {
    pub fn new(http: Arc<RetryingClient>, landing_url: String) -> Self {
        Self { http, landing_url }
    }
}

#[async_trait]
impl SecretFetcher for WebSecretSource {
    async fn fetch_secrets(
        &self,
        cancel: &CancellationToken,
    ) -> Result<SecretMaterial, HarvestError> {
        let request = self
            .http
            .client()
            .get(&self.landing_url)
            .header("User-Agent", BROWSER_USER_AGENT);
        let response = self
            .http
            .execute(request, cancel)
            .await
            .map_err(as_acquisition)?;
        let landing = response
            .text()
            .await
            .map_err(|e| HarvestError::Acquisition(format!("failed to read landing page: {}", e)))?;

        let asset_url = find_asset_url(&landing)
            .ok_or_else(|| HarvestError::Acquisition("Url of assets could not be found".to_string()))?;
        debug!("Secret asset located at {}", asset_url);

        let request = self.http.client().get(&asset_url);
        let response = self
            .http
            .execute(request, cancel)
            .await
            .map_err(as_acquisition)?;
        let asset = response
            .text()
            .await
            .map_err(|e| HarvestError::Acquisition(format!("failed to read asset: {}", e)))?;

        parse_secrets_blob(&asset)
    }
}

/// Failing to reach the platform means no secret material, which must abort
/// the whole pass. Cancellation stays cancellation.
fn as_acquisition(e: HarvestError) -> HarvestError {
    match e {
        HarvestError::Cancelled => HarvestError::Cancelled,
        other => HarvestError::Acquisition(other.to_string()),
    }
}

/// Locate the versioned web-player script URL in the landing page markup.
fn find_asset_url(landing: &str) -> Option<String> {
    let pattern = Regex::new(ASSET_URL_PATTERN).expect("static regex");
    pattern
        .captures(landing)
        .map(|captures| captures[1].to_string())
}

/// Locate and parse the embedded secrets JSON inside the script asset.
pub fn parse_secrets_blob(asset: &str) -> Result<SecretMaterial, HarvestError> {
    let pattern = Regex::new(SECRETS_BLOB_PATTERN).expect("static regex");
    let captures = pattern
        .captures(asset)
        .ok_or_else(|| HarvestError::Acquisition("Could not find secrets in assets".to_string()))?;

    let blob: SecretsBlob = serde_json::from_str(&captures[1])
        .map_err(|e| HarvestError::Acquisition(format!("malformed secrets blob: {}", e)))?;
    let valid_until = parse_valid_until(&blob.valid_until)?;

    Ok(SecretMaterial {
        secrets: blob.secrets,
        valid_until,
    })
}

fn parse_valid_until(raw: &str) -> Result<DateTime<Utc>, HarvestError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    // Some asset revisions carry a bare timestamp without zone or fraction.
    let bare = raw.split('.').next().unwrap_or(raw);
    NaiveDateTime::parse_from_str(bare, "%Y-%m-%dT%H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|e| HarvestError::Acquisition(format!("bad validUntil {:?}: {}", raw, e)))
}

/// Process-wide cache in front of a [`SecretFetcher`].
pub struct SecretMaterialCache {
    fetcher: Arc<dyn SecretFetcher>,
    clock: Arc<dyn Clock>,
    cached: Mutex<Option<SecretMaterial>>,
}

impl SecretMaterialCache {
    pub fn new(fetcher: Arc<dyn SecretFetcher>, clock: Arc<dyn Clock>) -> Self {
        Self {
            fetcher,
            clock,
            cached: Mutex::new(None),
        }
    }

    /// Current secret material, fetched lazily and reused while unexpired.
    pub async fn get(&self, cancel: &CancellationToken) -> Result<SecretMaterial, HarvestError> {
        let mut guard = self.cached.lock().await;

        if let Some(material) = guard.as_ref() {
            if self.clock.now() < material.valid_until {
                return Ok(material.clone());
            }
        }

        let fresh = self.fetcher.fetch_secrets(cancel).await?;
        if fresh.secrets.is_empty() {
            return Err(HarvestError::Acquisition(
                "secret material contains no entries".to_string(),
            ));
        }
        debug!(
            "Fetched secret material, {} entries, valid until {}",
            fresh.secrets.len(),
            fresh.valid_until
        );
        *guard = Some(fresh.clone());
        Ok(fresh)
    }
}
