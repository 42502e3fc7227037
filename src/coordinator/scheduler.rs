//! Market-time-aware scheduler: selects the cycle mode from the wall clock
//! in the configured market timezone and drives the coordinator on the
//! mode's tick interval.

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::coordinator::CycleCoordinator;
use crate::config::{parse_hhmm, ScheduleConfig};
use crate::domain::CollectionMode;
use crate::error::{CatalystError, Result};
use crate::persistence::RuntimeSettings;

/// Resolved schedule windows, minutes since midnight in market time.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleWindows {
    tz: Tz,
    premarket_start: u32,
    premarket_end: u32,
    regular_end: u32,
    afterhours_end: u32,
    premarket_interval: u64,
    market_interval: u64,
    afterhours_interval: u64,
    overnight_interval: u64,
}

impl ScheduleWindows {
    pub fn from_config(config: &ScheduleConfig) -> Self {
        Self {
            tz: config.timezone(),
            premarket_start: parse_hhmm(&config.premarket_start).unwrap_or(4 * 60),
            premarket_end: parse_hhmm(&config.premarket_end).unwrap_or(9 * 60 + 30),
            regular_end: parse_hhmm(&config.regular_end).unwrap_or(16 * 60),
            afterhours_end: parse_hhmm(&config.afterhours_end).unwrap_or(20 * 60),
            premarket_interval: config.premarket_interval,
            market_interval: config.market_interval,
            afterhours_interval: config.afterhours_interval,
            overnight_interval: config.overnight_interval,
        }
    }

    /// Apply the runtime-tunable keys on top of the file config.
    pub async fn refreshed(mut self, settings: &RuntimeSettings) -> Result<Self> {
        if let Some(start) =
            parse_hhmm(&settings.get_str("premarket_start", "").await?)
        {
            self.premarket_start = start;
        }
        if let Some(end) = parse_hhmm(&settings.get_str("premarket_end", "").await?) {
            self.premarket_end = end;
        }
        self.premarket_interval = settings
            .get_i64("premarket_interval", self.premarket_interval as i64)
            .await?
            .max(1) as u64;
        self.market_interval = settings
            .get_i64("market_interval", self.market_interval as i64)
            .await?
            .max(1) as u64;
        self.afterhours_interval = settings
            .get_i64("afterhours_interval", self.afterhours_interval as i64)
            .await?
            .max(1) as u64;
        Ok(self)
    }

    /// Mode for a given instant.
    pub fn mode_at(&self, now: DateTime<Utc>) -> CollectionMode {
        let local = now.with_timezone(&self.tz);
        if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return CollectionMode::Minimal;
        }
        let minutes = local.hour() * 60 + local.minute();
        if (self.premarket_start..self.premarket_end).contains(&minutes) {
            CollectionMode::Aggressive
        } else if (self.premarket_end..self.regular_end).contains(&minutes) {
            CollectionMode::Normal
        } else if (self.regular_end..self.afterhours_end).contains(&minutes) {
            CollectionMode::Light
        } else {
            CollectionMode::Minimal
        }
    }

    pub fn tick_interval(&self, mode: CollectionMode) -> Duration {
        let minutes = match mode {
            CollectionMode::Aggressive => self.premarket_interval,
            CollectionMode::Normal => self.market_interval,
            CollectionMode::Light => self.afterhours_interval,
            CollectionMode::Minimal => self.overnight_interval,
        };
        Duration::from_secs(minutes * 60)
    }
}

/// Drives cycles until shutdown. One-minute resolution: each wakeup re-reads
/// the runtime schedule config (cheap, cached) so operator reloads take
/// effect without a restart.
pub struct Scheduler {
    coordinator: Arc<CycleCoordinator>,
    settings: Arc<RuntimeSettings>,
    base: ScheduleWindows,
}

impl Scheduler {
    pub fn new(
        coordinator: Arc<CycleCoordinator>,
        settings: Arc<RuntimeSettings>,
        config: &ScheduleConfig,
    ) -> Self {
        Self {
            coordinator,
            settings,
            base: ScheduleWindows::from_config(config),
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(tz = %self.base.tz, "scheduler started");
        let mut next_due = Utc::now();
        let mut tick = tokio::time::interval(Duration::from_secs(60));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("scheduler stopping");
                        return;
                    }
                    continue;
                }
            }

            let windows = match self.base.refreshed(&self.settings).await {
                Ok(w) => w,
                Err(e) => {
                    warn!(error = %e, "failed to refresh schedule windows, using file config");
                    self.base
                }
            };
            let now = Utc::now();
            let mode = windows.mode_at(now);
            let interval = windows.tick_interval(mode);

            // A cycle stuck past 5x its tick interval is cancelled.
            self.coordinator
                .cancel_if_overdue(interval.saturating_mul(5))
                .await;

            if now < next_due {
                continue;
            }

            match self.coordinator.start_cycle(mode).await {
                Ok(cycle_id) => {
                    info!(cycle_id = %cycle_id, mode = %mode, "scheduled cycle started");
                    next_due = now + chrono::Duration::from_std(interval)
                        .unwrap_or_else(|_| chrono::Duration::minutes(30));
                }
                Err(CatalystError::Busy(cycle_id)) => {
                    // Skip the tick; the previous cycle has not terminated.
                    debug!(active = %cycle_id, "skipping tick, cycle still running");
                }
                Err(e) => {
                    warn!(error = %e, mode = %mode, "failed to start scheduled cycle");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::normalize::market_local;

    fn windows() -> ScheduleWindows {
        ScheduleWindows::from_config(&ScheduleConfig::default())
    }

    #[test]
    fn weekday_mode_windows() {
        let w = windows();
        let tz = chrono_tz::US::Eastern;
        // Wednesday 2025-01-15, market time.
        assert_eq!(
            w.mode_at(market_local(tz, 2025, 1, 15, 7, 0)),
            CollectionMode::Aggressive
        );
        assert_eq!(
            w.mode_at(market_local(tz, 2025, 1, 15, 9, 30)),
            CollectionMode::Normal
        );
        assert_eq!(
            w.mode_at(market_local(tz, 2025, 1, 15, 15, 59)),
            CollectionMode::Normal
        );
        assert_eq!(
            w.mode_at(market_local(tz, 2025, 1, 15, 16, 0)),
            CollectionMode::Light
        );
        assert_eq!(
            w.mode_at(market_local(tz, 2025, 1, 15, 21, 30)),
            CollectionMode::Minimal
        );
        assert_eq!(
            w.mode_at(market_local(tz, 2025, 1, 15, 3, 59)),
            CollectionMode::Minimal
        );
    }

    #[test]
    fn weekends_are_minimal_regardless_of_hour() {
        let w = windows();
        let tz = chrono_tz::US::Eastern;
        // Saturday 2025-01-18 at what would be pre-market.
        assert_eq!(
            w.mode_at(market_local(tz, 2025, 1, 18, 7, 0)),
            CollectionMode::Minimal
        );
    }

    #[test]
    fn tick_intervals_follow_mode() {
        let w = windows();
        assert_eq!(
            w.tick_interval(CollectionMode::Aggressive),
            Duration::from_secs(5 * 60)
        );
        assert_eq!(
            w.tick_interval(CollectionMode::Normal),
            Duration::from_secs(30 * 60)
        );
        assert_eq!(
            w.tick_interval(CollectionMode::Light),
            Duration::from_secs(60 * 60)
        );
        assert_eq!(
            w.tick_interval(CollectionMode::Minimal),
            Duration::from_secs(240 * 60)
        );
    }
}
