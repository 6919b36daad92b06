use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub stats_dir: Option<String>,
    pub interval_days: Option<u32>,
    pub run_time: Option<String>,
    pub timezone: Option<String>,

    // Notification settings
    pub desktop_notifications: Option<bool>,
    pub email_recipient: Option<String>,
    pub sendmail_path: Option<String>,

    // Feature configs
    pub http: Option<HttpConfig>,
    pub api: Option<ApiConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_sec: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_delay_sec: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ApiConfig {
    pub landing_url: Option<String>,
    pub token_url: Option<String>,
    pub query_url: Option<String>,
    pub overview_query_hash: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
