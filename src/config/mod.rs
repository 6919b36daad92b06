mod file_config;

pub use file_config::{ApiConfig, FileConfig, HttpConfig};

use crate::auth::{DEFAULT_LANDING_URL, DEFAULT_TOKEN_URL};
use crate::fetch::{DEFAULT_OVERVIEW_QUERY_HASH, DEFAULT_QUERY_URL};
use anyhow::{bail, Result};
use chrono::NaiveTime;
use chrono_tz::Tz;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_INTERVAL_DAYS: u32 = 3;
pub const DEFAULT_RUN_TIME: &str = "22:00:00";
pub const DEFAULT_SENDMAIL_PATH: &str = "/usr/sbin/sendmail";

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub stats_dir: Option<PathBuf>,
    pub interval_days: u32,
    pub run_time: String,
    pub timezone: String,
    pub desktop_notifications: bool,
    pub email_recipient: Option<String>,
    pub sendmail_path: String,
    pub http_timeout_sec: u64,
    pub max_retries: u32,
    pub retry_delay_sec: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            stats_dir: None,
            interval_days: DEFAULT_INTERVAL_DAYS,
            run_time: DEFAULT_RUN_TIME.to_string(),
            timezone: "UTC".to_string(),
            desktop_notifications: true,
            email_recipient: None,
            sendmail_path: DEFAULT_SENDMAIL_PATH.to_string(),
            http_timeout_sec: 30,
            max_retries: 3,
            retry_delay_sec: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub stats_dir: PathBuf,
    pub interval_days: u32,
    pub run_time: NaiveTime,
    pub timezone: Tz,

    // Notifications
    pub desktop_notifications: bool,
    pub email_recipient: Option<String>,
    pub sendmail_path: String,

    // HTTP behaviour
    pub http_timeout_sec: u64,
    pub max_retries: u32,
    pub retry_delay_sec: u64,

    // API endpoints
    pub landing_url: String,
    pub token_url: String,
    pub query_url: String,
    pub overview_query_hash: String,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        // TOML overrides CLI for each field
        let stats_dir = file
            .stats_dir
            .map(PathBuf::from)
            .or_else(|| cli.stats_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("stats_dir must be specified via --stats-dir or in config file")
            })?;

        // Validate stats_dir exists
        if !stats_dir.exists() {
            bail!("Stats directory does not exist: {:?}", stats_dir);
        }
        if !stats_dir.is_dir() {
            bail!("stats_dir is not a directory: {:?}", stats_dir);
        }

        let interval_days = file.interval_days.unwrap_or(cli.interval_days);
        if interval_days == 0 {
            bail!("interval_days must be at least 1");
        }

        let run_time_raw = file.run_time.unwrap_or_else(|| cli.run_time.clone());
        let run_time = parse_run_time(&run_time_raw)?;

        let timezone_raw = file.timezone.unwrap_or_else(|| cli.timezone.clone());
        let timezone = Tz::from_str(&timezone_raw)
            .map_err(|e| anyhow::anyhow!("Unknown timezone {:?}: {}", timezone_raw, e))?;

        let desktop_notifications = file
            .desktop_notifications
            .unwrap_or(cli.desktop_notifications);
        let email_recipient = file
            .email_recipient
            .or_else(|| cli.email_recipient.clone());
        let sendmail_path = file
            .sendmail_path
            .unwrap_or_else(|| cli.sendmail_path.clone());

        let http = file.http.unwrap_or_default();
        let http_timeout_sec = http.timeout_sec.unwrap_or(cli.http_timeout_sec);
        let max_retries = http.max_retries.unwrap_or(cli.max_retries);
        let retry_delay_sec = http.retry_delay_sec.unwrap_or(cli.retry_delay_sec);

        let api = file.api.unwrap_or_default();
        let landing_url = api
            .landing_url
            .unwrap_or_else(|| DEFAULT_LANDING_URL.to_string());
        let token_url = api
            .token_url
            .unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string());
        let query_url = api
            .query_url
            .unwrap_or_else(|| DEFAULT_QUERY_URL.to_string());
        let overview_query_hash = api
            .overview_query_hash
            .unwrap_or_else(|| DEFAULT_OVERVIEW_QUERY_HASH.to_string());

        Ok(Self {
            stats_dir,
            interval_days,
            run_time,
            timezone,
            desktop_notifications,
            email_recipient,
            sendmail_path,
            http_timeout_sec,
            max_retries,
            retry_delay_sec,
            landing_url,
            token_url,
            query_url,
            overview_query_hash,
        })
    }
}

fn parse_run_time(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .map_err(|e| anyhow::anyhow!("Bad run_time {:?} (expected HH:MM:SS): {}", s, e))
}
