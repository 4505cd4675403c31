//! Provider-neutral event types.
//!
//! Both collaborators convert what they fetch into `RawEvent`s; the rest of
//! the crate never sees ICS properties or Google JSON.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Which side of the sync an event was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    /// The read-only, authoritative feed (Teams ICS).
    Source,
    /// The mutable store being reconciled (Google Calendar).
    Target,
}

/// A point in time as it arrived from a feed, before normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventTime {
    /// All-day value
    Date(NaiveDate),
    /// Naive wall-clock time, already in local civil time
    Floating(NaiveDateTime),
    /// Absolute instant with the offset it was reported in
    Absolute(DateTime<FixedOffset>),
    /// Wall-clock time in a named zone (ICS `TZID=`)
    Zoned { datetime: NaiveDateTime, tzid: String },
}

impl fmt::Display for EventTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventTime::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            EventTime::Floating(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S")),
            EventTime::Absolute(dt) => write!(f, "{}", dt.to_rfc3339()),
            EventTime::Zoned { datetime, tzid } => {
                write!(f, "{} ({})", datetime.format("%Y-%m-%dT%H:%M:%S"), tzid)
            }
        }
    }
}

/// An event as fetched from either side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    pub title: String,
    pub start: EventTime,
    pub end: EventTime,
    /// Store-assigned id. Always set for target events, usually absent for source events.
    pub source_id: Option<String>,
    pub origin: Origin,
}

impl RawEvent {
    pub fn source(title: impl Into<String>, start: EventTime, end: EventTime) -> Self {
        RawEvent {
            title: title.into(),
            start,
            end,
            source_id: None,
            origin: Origin::Source,
        }
    }

    pub fn target(
        id: impl Into<String>,
        title: impl Into<String>,
        start: EventTime,
        end: EventTime,
    ) -> Self {
        RawEvent {
            title: title.into(),
            start,
            end,
            source_id: Some(id.into()),
            origin: Origin::Target,
        }
    }
}

impl fmt::Display for RawEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} - {})", self.title, self.start, self.end)
    }
}
