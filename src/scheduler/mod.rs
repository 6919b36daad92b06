//! Interval scheduling of harvest passes.
//!
//! A pass is due every `interval_days` days, anchored to the day-of-year so
//! the cadence survives restarts, and runs no earlier than the configured
//! time of day in the configured timezone. Long waits sleep in bounded
//! chunks so a shutdown request is honoured within a minute.

use crate::clock::Clock;
use crate::errors::HarvestError;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveTime, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const MAX_SLEEP_CHUNK: Duration = Duration::from_secs(60);
const OFF_DAY_POLL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub interval_days: u32,
    pub run_time: NaiveTime,
    pub timezone: Tz,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleDecision {
    /// Today is a scheduled day and the run time has passed.
    Run,
    /// Today is a scheduled day but the run time is still ahead.
    WaitForRunTime(Duration),
    /// Not a scheduled day.
    OffDay { day_index: u32 },
}

/// Decide what the loop should do at instant `now`.
pub fn evaluate(config: &ScheduleConfig, now: DateTime<Utc>) -> ScheduleDecision {
    let local = now.with_timezone(&config.timezone);
    let day_index = local.ordinal0();

    if day_index % config.interval_days != 0 {
        return ScheduleDecision::OffDay { day_index };
    }

    let run_instant = local.date_naive().and_time(config.run_time);
    let local_now = local.naive_local();
    if local_now >= run_instant {
        return ScheduleDecision::Run;
    }

    let until_run = (run_instant - local_now)
        .to_std()
        .unwrap_or(Duration::ZERO);
    // One extra second so the next evaluation lands past the run instant.
    ScheduleDecision::WaitForRunTime(until_run + Duration::from_secs(1))
}

/// Sleep duration after a completed pass: the rest of the interval measured
/// from today's run instant, plus a second of slack.
pub fn sleep_after_run(config: &ScheduleConfig, now: DateTime<Utc>) -> Duration {
    let local = now.with_timezone(&config.timezone);
    let run_instant = local.date_naive().and_time(config.run_time);
    let elapsed = (local.naive_local() - run_instant).num_seconds().max(0);
    let interval = i64::from(config.interval_days) * 86_400;
    let remaining = (interval - elapsed + 1).max(1);
    Duration::from_secs(remaining as u64)
}

/// Sleep for `total`, waking at least once a minute to honour cancellation.
/// Returns false when cancelled before the duration elapsed.
pub async fn bounded_sleep(total: Duration, cancel: &CancellationToken) -> bool {
    let deadline = tokio::time::Instant::now() + total;
    loop {
        let now = tokio::time::Instant::now();
        if now >= deadline {
            return true;
        }
        let chunk = (deadline - now).min(MAX_SLEEP_CHUNK);
        tokio::select! {
            _ = tokio::time::sleep(chunk) => {}
            _ = cancel.cancelled() => return false,
        }
    }
}

/// Something that can execute one harvest pass.
#[async_trait]
pub trait PassRunner: Send + Sync {
    async fn run_pass(&self, force: bool) -> Result<(), HarvestError>;
}

pub struct Scheduler {
    config: ScheduleConfig,
    pipeline: Arc<dyn PassRunner>,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(
        config: ScheduleConfig,
        pipeline: Arc<dyn PassRunner>,
        clock: Arc<dyn Clock>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            pipeline,
            clock,
            cancel,
        }
    }

    pub async fn run(&self) {
        info!(
            "Stats will be updated every {} days after {}",
            self.config.interval_days, self.config.run_time
        );

        while !self.cancel.is_cancelled() {
            let now = self.clock.now();
            let sleep_for = match evaluate(&self.config, now) {
                ScheduleDecision::Run => {
                    info!("Updating");
                    match self.pipeline.run_pass(false).await {
                        Ok(()) => {}
                        Err(e) if e.is_cancelled() => {
                            warn!("Interrupt detected");
                            break;
                        }
                        Err(e) => error!("Harvest pass failed: {}", e),
                    }
                    sleep_after_run(&self.config, self.clock.now())
                }
                ScheduleDecision::WaitForRunTime(wait) => {
                    info!("Update later today");
                    wait
                }
                ScheduleDecision::OffDay { day_index } => {
                    info!(
                        "Update not today: day_index={}, interval={}",
                        day_index, self.config.interval_days
                    );
                    OFF_DAY_POLL
                }
            };

            info!("Sleeping for {}s", sleep_for.as_secs());
            if !bounded_sleep(sleep_for, &self.cancel).await {
                break;
            }
        }
    }
}
