//! VEVENT extraction using the icalendar crate's parser.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use icalendar::{
    CalendarDateTime, DatePerhapsTime,
    parser::{Component, Property, read_calendar, unfold},
};
use tracing::warn;

use crate::error::{CalSyncError, CalSyncResult};
use crate::event::EventTime;

/// One VEVENT, unexpanded.
#[derive(Debug, Clone, PartialEq)]
pub struct IcsEvent {
    pub uid: Option<String>,
    pub summary: String,
    pub start: EventTime,
    pub end: EventTime,
    pub rrule: Option<String>,
    pub exdates: Vec<EventTime>,
    /// Set on overrides of a single occurrence of a recurring series.
    pub recurrence_id: Option<EventTime>,
}

impl IcsEvent {
    pub fn is_recurring(&self) -> bool {
        self.rrule.is_some()
    }
}

/// Parse every VEVENT in `content`.
///
/// A body that is not an iCalendar object is an error. Individual events
/// without a usable DTSTART are skipped with a warning.
pub fn parse_calendar(content: &str) -> CalSyncResult<Vec<IcsEvent>> {
    let content = content.trim_start_matches('\u{feff}');
    if !content.trim_start().starts_with("BEGIN:VCALENDAR") {
        return Err(CalSyncError::IcsParse(
            "response is not an iCalendar document".into(),
        ));
    }

    let unfolded = unfold(content);
    let calendar = read_calendar(&unfolded).map_err(CalSyncError::IcsParse)?;

    Ok(calendar
        .components
        .iter()
        .filter(|c| c.name == "VEVENT")
        .filter_map(|vevent| {
            let parsed = parse_vevent(vevent);
            if parsed.is_none() {
                warn!(
                    "Skipping malformed VEVENT {}",
                    vevent
                        .find_prop("UID")
                        .map(|p| p.val.to_string())
                        .unwrap_or_else(|| "(no UID)".into())
                );
            }
            parsed
        })
        .collect())
}

fn parse_vevent(vevent: &Component) -> Option<IcsEvent> {
    let start = to_event_time(DatePerhapsTime::try_from(vevent.find_prop("DTSTART")?).ok()?);

    let end = match vevent.find_prop("DTEND") {
        Some(prop) => to_event_time(DatePerhapsTime::try_from(prop).ok()?),
        None => implied_end(&start),
    };

    let summary = vevent
        .find_prop("SUMMARY")
        .map(|p| unescape_text(p.val.as_ref()))
        .unwrap_or_default();

    let exdates = vevent
        .properties
        .iter()
        .filter(|p| p.name == "EXDATE")
        .flat_map(parse_exdate_property)
        .collect();

    let recurrence_id = vevent
        .find_prop("RECURRENCE-ID")
        .and_then(|p| DatePerhapsTime::try_from(p).ok())
        .map(to_event_time);

    Some(IcsEvent {
        uid: vevent.find_prop("UID").map(|p| p.val.to_string()),
        summary,
        start,
        end,
        rrule: vevent.find_prop("RRULE").map(|p| p.val.to_string()),
        exdates,
        recurrence_id,
    })
}

/// RFC 5545: an all-day event without DTEND lasts one day, a timed one has
/// no duration.
fn implied_end(start: &EventTime) -> EventTime {
    match start {
        EventTime::Date(d) => EventTime::Date(*d + Duration::days(1)),
        other => other.clone(),
    }
}

fn to_event_time(dpt: DatePerhapsTime) -> EventTime {
    match dpt {
        DatePerhapsTime::Date(d) => EventTime::Date(d),
        DatePerhapsTime::DateTime(cal_dt) => match cal_dt {
            CalendarDateTime::Utc(dt) => EventTime::Absolute(dt.fixed_offset()),
            CalendarDateTime::Floating(naive) => EventTime::Floating(naive),
            CalendarDateTime::WithTimezone { date_time, tzid } => EventTime::Zoned {
                datetime: date_time,
                tzid,
            },
        },
    }
}

/// EXDATE values, honouring `TZID=`, `VALUE=DATE`, a trailing `Z` and
/// comma-separated lists.
fn parse_exdate_property(prop: &Property) -> Vec<EventTime> {
    let tzid = prop
        .params
        .iter()
        .find(|p| p.key == "TZID")
        .and_then(|p| p.val.as_ref().map(|v| v.to_string().trim_matches('"').to_string()));

    let is_date = prop
        .params
        .iter()
        .any(|p| p.key == "VALUE" && p.val.as_ref().map(|v| v.as_ref()) == Some("DATE"));

    prop.val
        .as_ref()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| {
            if is_date {
                return NaiveDate::parse_from_str(s, "%Y%m%d").ok().map(EventTime::Date);
            }
            let (naive, utc) = match s.strip_suffix('Z') {
                Some(s) => (s, true),
                None => (s, false),
            };
            let datetime = NaiveDateTime::parse_from_str(naive, "%Y%m%dT%H%M%S").ok()?;
            Some(match (&tzid, utc) {
                (_, true) => EventTime::Absolute(datetime.and_utc().fixed_offset()),
                (Some(tz), false) => EventTime::Zoned {
                    datetime,
                    tzid: tz.clone(),
                },
                (None, false) => EventTime::Floating(datetime),
            })
        })
        .collect()
}

/// Undo RFC 5545 TEXT escaping (`\,` `\;` `\\` `\n`).
fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
