//! The time range a run reconciles.

use std::fmt;

use chrono::{DateTime, Datelike, Duration, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::error::{CalSyncError, CalSyncResult};
use crate::provider::WindowProvider;

/// Half-open range `[start, end)` of local civil time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl SyncWindow {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        SyncWindow { start, end }
    }

    /// Whether an event spanning `start..end` touches the window.
    pub fn overlaps(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        start < self.end && end > self.start
    }

    /// Window bounds as absolute instants, reading the local times in `tz`.
    pub fn to_utc(&self, tz: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
        (local_to_utc(tz, self.start), local_to_utc(tz, self.end))
    }

    /// `to_utc` rendered as RFC 3339, for query strings.
    pub fn to_rfc3339(&self, tz: Tz) -> (String, String) {
        let (start, end) = self.to_utc(tz);
        (start.to_rfc3339(), end.to_rfc3339())
    }
}

impl fmt::Display for SyncWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {}",
            self.start.format("%a %Y-%m-%d %H:%M"),
            self.end.format("%a %Y-%m-%d %H:%M")
        )
    }
}

// Local times inside a DST gap do not exist; they are read an hour later.
fn local_to_utc(tz: Tz, local: NaiveDateTime) -> DateTime<Utc> {
    tz.from_local_datetime(&local)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(local + Duration::hours(1))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| local.and_utc())
}

/// Monday of the current week at `start_hour` through Monday + `days` at
/// `end_hour`, in the configured zone.
#[derive(Debug, Clone, Copy)]
pub struct BusinessWeekWindow {
    tz: Tz,
    start: NaiveTime,
    end: NaiveTime,
    days: i64,
}

impl BusinessWeekWindow {
    pub fn new(tz: Tz, start_hour: u32, end_hour: u32, days: i64) -> CalSyncResult<Self> {
        let start = NaiveTime::from_hms_opt(start_hour, 0, 0).ok_or_else(|| {
            CalSyncError::Config(format!("window.start_hour must be 0-23, got {start_hour}"))
        })?;
        let end = NaiveTime::from_hms_opt(end_hour, 0, 0).ok_or_else(|| {
            CalSyncError::Config(format!("window.end_hour must be 0-23, got {end_hour}"))
        })?;
        if days < 0 {
            return Err(CalSyncError::Config(format!(
                "window.days must not be negative, got {days}"
            )));
        }
        if days == 0 && end <= start {
            return Err(CalSyncError::Config(
                "window is empty: end_hour must be after start_hour when days is 0".into(),
            ));
        }
        Ok(BusinessWeekWindow {
            tz,
            start,
            end,
            days,
        })
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// The window containing local time `now`.
    pub fn window_at(&self, now: NaiveDateTime) -> SyncWindow {
        let today = now.date();
        let monday = today - Duration::days(today.weekday().num_days_from_monday() as i64);
        SyncWindow {
            start: monday.and_time(self.start),
            end: (monday + Duration::days(self.days)).and_time(self.end),
        }
    }
}

impl WindowProvider for BusinessWeekWindow {
    fn current_window(&self) -> SyncWindow {
        let now = Utc::now().with_timezone(&self.tz).naive_local();
        self.window_at(now)
    }
}
