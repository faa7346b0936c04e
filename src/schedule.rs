// src/schedule.rs
//
// Daily occupancy reset. Every stored `total_count` is zeroed when the
// site's local wall clock reads exactly the configured hour and minute.

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Timelike, Utc};
use tracing::{debug, info};

use crate::storage::RunRecordStore;
use crate::types::ScheduleConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetSchedule {
    pub hour: u32,
    pub minute: u32,
}

impl ResetSchedule {
    pub fn from_config(config: &ScheduleConfig) -> Self {
        Self {
            hour: config.reset_hour,
            minute: config.reset_minute,
        }
    }

    /// Exact minute match only; a run starting at 00:01 does not reset.
    pub fn is_due(&self, now: &DateTime<FixedOffset>) -> bool {
        now.hour() == self.hour && now.minute() == self.minute
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    NotDue,
    Reset { records: usize },
}

/// The site's timezone as a fixed offset from UTC.
pub fn site_offset(config: &ScheduleConfig) -> Result<FixedOffset> {
    FixedOffset::east_opt(config.utc_offset_hours * 3600)
        .with_context(|| format!("Invalid UTC offset {}h", config.utc_offset_hours))
}

pub fn site_now(config: &ScheduleConfig) -> Result<DateTime<FixedOffset>> {
    Ok(Utc::now().with_timezone(&site_offset(config)?))
}

pub async fn run_scheduled_reset(
    store: &dyn RunRecordStore,
    schedule: ResetSchedule,
    now: DateTime<FixedOffset>,
) -> Result<ResetOutcome> {
    if !schedule.is_due(&now) {
        debug!(
            "Reset not due at {} (scheduled {:02}:{:02})",
            now.format("%H:%M"),
            schedule.hour,
            schedule.minute
        );
        return Ok(ResetOutcome::NotDue);
    }

    reset_now(store, now).await
}

/// Unconditional reset, for an operator or a trigger that already owns
/// the timing.
pub async fn reset_now(store: &dyn RunRecordStore, now: DateTime<FixedOffset>) -> Result<ResetOutcome> {
    let records = store
        .reset_all_totals()
        .await
        .context("Failed to reset stored totals")?;
    info!("🔄 Reset at {}: zeroed total_count on {} record(s)", now.format("%H:%M"), records);
    Ok(ResetOutcome::Reset { records })
}
