//! Bearer token exchange and reuse.
//!
//! The partner API accepts the anonymous web-player token, which the token
//! endpoint hands out only against a valid TOTP derived from the current
//! secret material. Tokens live for roughly an hour; the manager reuses one
//! until the clock reaches its expiry instant.

use crate::auth::otp::{totp, OtpSeedDeriver};
use crate::auth::secrets::SecretMaterialCache;
use crate::clock::Clock;
use crate::errors::HarvestError;
use crate::fetch::RetryingClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const DEFAULT_TOKEN_URL: &str = "https://open.spotify.com/api/token";

#[derive(Debug, Clone)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

#[async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn exchange(
        &self,
        otp: &str,
        version: u32,
        cancel: &CancellationToken,
    ) -> Result<AccessToken, HarvestError>;
}

/// Trades a one-time password for a web-player access token.
pub struct WebTokenExchanger {
    http: Arc<RetryingClient>,
    token_url: String,
}

impl WebTokenExchanger {
    pub fn new(http: Arc<RetryingClient>, token_url: String) -> Self {
        Self { http, token_url }
    }
}

#[async_trait]
impl TokenExchanger for WebTokenExchanger {
    async fn exchange(
        &self,
        otp: &str,
        version: u32,
        cancel: &CancellationToken,
    ) -> Result<AccessToken, HarvestError> {
        let version = version.to_string();
        let request = self
            .http
            .client()
            .get(&self.token_url)
            .query(&[
                ("reason", "init"),
                ("productType", "web-player"),
                ("totp", otp),
                ("totpServer", otp),
                ("totpVer", version.as_str()),
            ])
            .header("accept", "*/*")
            .header("accept-language", "en-US,en;q=0.9")
            .header("dnt", "1")
            .header("priority", "u=1, i")
            .header("referer", "https://open.spotify.com/");

        let response = self
            .http
            .execute(request, cancel)
            .await
            .map_err(as_auth)?;
        let body: JsonValue = response
            .json()
            .await
            .map_err(|e| HarvestError::Auth(format!("token response is not valid JSON: {}", e)))?;
        parse_token_response(&body)
    }
}

/// An unreachable token endpoint leaves the pass without credentials, so the
/// failure must carry the pass-aborting classification. Cancellation stays
/// cancellation.
fn as_auth(e: HarvestError) -> HarvestError {
    match e {
        HarvestError::Cancelled => HarvestError::Cancelled,
        other => HarvestError::Auth(other.to_string()),
    }
}

pub fn parse_token_response(body: &JsonValue) -> Result<AccessToken, HarvestError> {
    let value = body
        .get("accessToken")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| HarvestError::Auth("token response lacks accessToken".to_string()))?;
    let expires_ms = body
        .get("accessTokenExpirationTimestampMs")
        .and_then(JsonValue::as_i64)
        .ok_or_else(|| {
            HarvestError::Auth("token response lacks accessTokenExpirationTimestampMs".to_string())
        })?;
    let expires_at = DateTime::from_timestamp_millis(expires_ms)
        .ok_or_else(|| HarvestError::Auth(format!("bad expiry timestamp {}", expires_ms)))?;

    Ok(AccessToken {
        value: value.to_string(),
        expires_at,
    })
}

/// Caches the access token and refreshes it through the full secret ->
/// seed -> TOTP -> exchange chain when it lapses.
pub struct TokenAuthManager {
    secrets: Arc<SecretMaterialCache>,
    exchanger: Arc<dyn TokenExchanger>,
    deriver: Arc<dyn OtpSeedDeriver>,
    clock: Arc<dyn Clock>,
    cached: Mutex<Option<AccessToken>>,
}

impl TokenAuthManager {
    pub fn new(
        secrets: Arc<SecretMaterialCache>,
        exchanger: Arc<dyn TokenExchanger>,
        deriver: Arc<dyn OtpSeedDeriver>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            secrets,
            exchanger,
            deriver,
            clock,
            cached: Mutex::new(None),
        }
    }

    pub async fn get_token(&self, cancel: &CancellationToken) -> Result<AccessToken, HarvestError> {
        let mut guard = self.cached.lock().await;

        if let Some(token) = guard.as_ref() {
            if token.is_valid_at(self.clock.now()) {
                return Ok(token.clone());
            }
        }

        let material = self.secrets.get(cancel).await?;
        let entry = material
            .secrets
            .first()
            .ok_or_else(|| HarvestError::Auth("no secret entry available".to_string()))?;

        let seed = self.deriver.derive_seed(&entry.secret, entry.version);
        let otp = totp(&seed, self.clock.now().timestamp())?;
        let token = self.exchanger.exchange(&otp, entry.version, cancel).await?;
        debug!("Fetched access token, expires at {}", token.expires_at);

        *guard = Some(token.clone());
        Ok(token)
    }
}
