use anyhow::{Context, Result};
use artist_stats_harvester::archive::{Archive, GitArchive};
use artist_stats_harvester::auth::{
    PositionXorSeedDeriver, SecretMaterialCache, TokenAuthManager, WebSecretSource,
    WebTokenExchanger,
};
use artist_stats_harvester::config::{AppConfig, CliConfig, FileConfig};
use artist_stats_harvester::fetch::{RetryPolicy, RetryingClient, StatsFetcher};
use artist_stats_harvester::notify::{
    Channel, DesktopChannel, EmailChannel, LogChannel, NotificationDispatcher,
};
use artist_stats_harvester::pipeline::HarvestPipeline;
use artist_stats_harvester::scheduler::{ScheduleConfig, Scheduler};
use artist_stats_harvester::store::ArtistStateStore;
use artist_stats_harvester::{Clock, SystemClock};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the git-tracked directory of artist record files.
    #[clap(long, value_parser = parse_path)]
    pub stats_dir: Option<PathBuf>,

    /// Path to a TOML config file. Its values override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Days between harvest runs.
    #[clap(long, default_value_t = 3)]
    pub interval_days: u32,

    /// Time of day after which a scheduled run may start (HH:MM:SS).
    #[clap(long, default_value = "22:00:00")]
    pub run_time: String,

    /// IANA timezone the schedule is evaluated in.
    #[clap(long, default_value = "UTC")]
    pub timezone: String,

    /// Disable desktop popups.
    #[clap(long)]
    pub no_desktop_notifications: bool,

    /// Email address for error notifications. Emails are disabled when unset.
    #[clap(long)]
    pub email_recipient: Option<String>,

    /// Path to the sendmail binary.
    #[clap(long, default_value = "/usr/sbin/sendmail")]
    pub sendmail_path: String,

    /// Timeout in seconds for each HTTP request.
    #[clap(long, default_value_t = 30)]
    pub http_timeout_sec: u64,

    /// Extra attempts after a failed HTTP request.
    #[clap(long, default_value_t = 3)]
    pub max_retries: u32,

    /// Seconds to wait between HTTP attempts.
    #[clap(long, default_value_t = 10)]
    pub retry_delay_sec: u64,

    /// Run a single harvest pass immediately and exit.
    #[clap(long)]
    pub once: bool,

    /// Refetch artists already recorded today. Implies --once.
    #[clap(long)]
    pub force: bool,

    /// Email routine events too, not only errors.
    #[clap(long)]
    pub verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    info!(
        "Artist stats harvester {} ({}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH")
    );

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let cli_config = CliConfig {
        stats_dir: cli_args.stats_dir.clone(),
        interval_days: cli_args.interval_days,
        run_time: cli_args.run_time.clone(),
        timezone: cli_args.timezone.clone(),
        desktop_notifications: !cli_args.no_desktop_notifications,
        email_recipient: cli_args.email_recipient.clone(),
        sendmail_path: cli_args.sendmail_path.clone(),
        http_timeout_sec: cli_args.http_timeout_sec,
        max_retries: cli_args.max_retries,
        retry_delay_sec: cli_args.retry_delay_sec,
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    let cancel = CancellationToken::new();
    let ctrlc_cancel = cancel.clone();
    ctrlc::set_handler(move || {
        warn!("Shutdown requested");
        ctrlc_cancel.cancel();
    })
    .context("Failed to install shutdown handler")?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let policy = RetryPolicy {
        max_retries: config.max_retries,
        retry_delay: Duration::from_secs(config.retry_delay_sec),
    };
    let http = Arc::new(RetryingClient::new(config.http_timeout_sec, policy));

    let secrets = Arc::new(SecretMaterialCache::new(
        Arc::new(WebSecretSource::new(
            Arc::clone(&http),
            config.landing_url.clone(),
        )),
        Arc::clone(&clock),
    ));
    let tokens = Arc::new(TokenAuthManager::new(
        secrets,
        Arc::new(WebTokenExchanger::new(
            Arc::clone(&http),
            config.token_url.clone(),
        )),
        Arc::new(PositionXorSeedDeriver),
        Arc::clone(&clock),
    ));
    let stats_source = Arc::new(StatsFetcher::new(
        Arc::clone(&http),
        tokens,
        config.query_url.clone(),
        config.overview_query_hash.clone(),
    ));
    let store = ArtistStateStore::new(stats_source, Arc::clone(&clock), config.timezone);

    let archive: Arc<dyn Archive> = Arc::new(GitArchive::new(config.stats_dir.clone()));

    let mut channels: Vec<Box<dyn Channel>> = vec![Box::new(LogChannel)];
    if config.desktop_notifications {
        channels.push(Box::new(DesktopChannel::new("Artist stats")));
    }
    if let Some(recipient) = &config.email_recipient {
        channels.push(Box::new(EmailChannel::new(
            recipient.clone(),
            config.sendmail_path.clone(),
            "Artist stats",
            cli_args.verbose,
        )));
    }
    let notifier = Arc::new(NotificationDispatcher::new(channels));

    let pipeline = Arc::new(HarvestPipeline::new(
        config.stats_dir.clone(),
        store,
        archive,
        notifier,
        Arc::clone(&clock),
        config.timezone,
        cancel.clone(),
    ));

    if cli_args.once || cli_args.force {
        info!("Running a single pass");
        match pipeline.execute(cli_args.force).await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => warn!("Interrupt detected"),
            Err(e) => return Err(e.into()),
        }
        return Ok(());
    }

    let scheduler = Scheduler::new(
        ScheduleConfig {
            interval_days: config.interval_days,
            run_time: config.run_time,
            timezone: config.timezone,
        },
        pipeline,
        clock,
        cancel,
    );
    scheduler.run().await;
    info!("Harvester stopped");
    Ok(())
}
