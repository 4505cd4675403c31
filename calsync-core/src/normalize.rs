//! Canonical comparison keys.
//!
//! Teams hands us naive local times, Google hands us RFC 3339 instants with
//! whatever offset it likes. Both are folded into the configured zone's civil
//! time, truncated to whole seconds, so equal meetings compare equal.

use std::cmp::Ordering;
use std::fmt;

use chrono::{NaiveDateTime, NaiveTime, SubsecRound, TimeZone};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::event::{EventTime, RawEvent};

/// The (title, local start, local end) triple two events must share to be
/// considered the same event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanonicalKey {
    pub title: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl CanonicalKey {
    pub fn new(title: &str, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        CanonicalKey {
            title: title.trim().to_string(),
            start: start.trunc_subsecs(0),
            end: end.trunc_subsecs(0),
        }
    }
}

// Chronological order keeps every walk over an index (and so every plan) stable.
impl Ord for CanonicalKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.start
            .cmp(&other.start)
            .then_with(|| self.end.cmp(&other.end))
            .then_with(|| self.title.cmp(&other.title))
    }
}

impl PartialOrd for CanonicalKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} - {})",
            self.title,
            self.start.format("%Y-%m-%dT%H:%M:%S"),
            self.end.format("%Y-%m-%dT%H:%M:%S")
        )
    }
}

/// Converts raw events into canonical keys for one fixed local zone.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    tz: Tz,
}

impl Normalizer {
    pub fn new(tz: Tz) -> Self {
        Normalizer { tz }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn key(&self, event: &RawEvent) -> CanonicalKey {
        self.key_for(&event.title, &event.start, &event.end)
    }

    pub fn key_for(&self, title: &str, start: &EventTime, end: &EventTime) -> CanonicalKey {
        CanonicalKey::new(title, self.local(start), self.local(end))
    }

    /// Local civil time for `time`, without sub-second precision.
    pub fn local(&self, time: &EventTime) -> NaiveDateTime {
        let local = match time {
            EventTime::Date(d) => d.and_time(NaiveTime::MIN),
            EventTime::Floating(dt) => *dt,
            EventTime::Absolute(dt) => dt.with_timezone(&self.tz).naive_local(),
            EventTime::Zoned { datetime, tzid } => self.from_zone(datetime, tzid),
        };
        local.trunc_subsecs(0)
    }

    /// Unknown zone names (Teams likes Windows names such as
    /// "E. South America Standard Time") are read as local civil time.
    fn from_zone(&self, datetime: &NaiveDateTime, tzid: &str) -> NaiveDateTime {
        let Ok(zone) = tzid.parse::<Tz>() else {
            return *datetime;
        };
        if zone == self.tz {
            return *datetime;
        }
        zone.from_local_datetime(datetime)
            .earliest()
            .map(|dt| dt.with_timezone(&self.tz).naive_local())
            .unwrap_or(*datetime)
    }
}
