//! RRULE expansion of the source feed.
//!
//! Everything happens in the configured zone's civil time: each master's
//! DTSTART is localized first and handed to the rrule crate as if it were
//! UTC, so occurrences keep their local wall-clock time across DST changes.
//! Series anchored in a different zone keep local spacing as well, which can
//! put them an hour off around that zone's own DST switch.

use std::collections::HashSet;

use chrono::{Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rrule::RRuleSet;
use tracing::{debug, warn};

use crate::error::{CalSyncError, CalSyncResult};
use crate::event::{EventTime, RawEvent};
use crate::ics::IcsEvent;
use crate::normalize::Normalizer;
use crate::window::SyncWindow;

/// Upper bound on occurrences generated per master within one window.
const MAX_OCCURRENCES: u16 = 1000;

/// Expand `events` into concrete source events overlapping `window`,
/// sorted chronologically.
///
/// Occurrences listed in EXDATE are dropped. An occurrence with a
/// RECURRENCE-ID override of the same UID is replaced by that override.
/// A master whose RRULE cannot be parsed is skipped with a warning.
pub fn expand(events: &[IcsEvent], window: &SyncWindow, normalizer: &Normalizer) -> Vec<RawEvent> {
    let overridden: HashSet<(&str, NaiveDateTime)> = events
        .iter()
        .filter_map(|e| {
            let uid = e.uid.as_deref()?;
            let recurrence_id = e.recurrence_id.as_ref()?;
            Some((uid, normalizer.local(recurrence_id)))
        })
        .collect();

    let mut out: Vec<(NaiveDateTime, NaiveDateTime, &str)> = Vec::new();

    for event in events {
        let start = normalizer.local(&event.start);
        let end = normalizer.local(&event.end).max(start);

        let Some(rule) = event.rrule.as_deref().filter(|_| event.recurrence_id.is_none()) else {
            push_if_overlapping(&mut out, window, &event.summary, start, end);
            continue;
        };

        let occurrences = match occurrences(rule, start, end - start, window, normalizer) {
            Ok(occurrences) => occurrences,
            Err(e) => {
                warn!("Skipping recurring event '{}': {}", event.summary, e);
                continue;
            }
        };

        let excluded = Exclusions::new(&event.exdates, normalizer);
        let duration = end - start;

        for occurrence in occurrences {
            if excluded.contains(occurrence) {
                continue;
            }
            if let Some(uid) = event.uid.as_deref() {
                if overridden.contains(&(uid, occurrence)) {
                    debug!("Occurrence of '{}' at {} is overridden", event.summary, occurrence);
                    continue;
                }
            }
            push_if_overlapping(&mut out, window, &event.summary, occurrence, occurrence + duration);
        }
    }

    out.sort();
    out.into_iter()
        .map(|(start, end, title)| {
            RawEvent::source(title, EventTime::Floating(start), EventTime::Floating(end))
        })
        .collect()
}

fn push_if_overlapping<'a>(
    out: &mut Vec<(NaiveDateTime, NaiveDateTime, &'a str)>,
    window: &SyncWindow,
    title: &'a str,
    start: NaiveDateTime,
    end: NaiveDateTime,
) {
    if window.overlaps(start, end) {
        out.push((start, end, title));
    }
}

/// Local start times of every occurrence that could overlap `window`.
fn occurrences(
    rule: &str,
    start: NaiveDateTime,
    duration: Duration,
    window: &SyncWindow,
    normalizer: &Normalizer,
) -> CalSyncResult<Vec<NaiveDateTime>> {
    let set = format!(
        "DTSTART:{}\nRRULE:{}",
        as_local_utc(start),
        localize_until(rule, normalizer)
    );
    let rrule_set: RRuleSet = set
        .parse()
        .map_err(|e| CalSyncError::IcsParse(format!("invalid RRULE '{}': {}", rule, e)))?;

    // after/before are exclusive; widen by a second and let the caller clip.
    let tz: rrule::Tz = Utc.into();
    let after = (window.start - duration - Duration::seconds(1))
        .and_utc()
        .with_timezone(&tz);
    let before = (window.end + Duration::seconds(1)).and_utc().with_timezone(&tz);

    let result = rrule_set.after(after).before(before).all(MAX_OCCURRENCES);
    if result.limited {
        warn!(
            "RRULE '{}' produced more than {} occurrences in the window; truncated",
            rule, MAX_OCCURRENCES
        );
    }

    Ok(result.dates.iter().map(|dt| dt.naive_utc()).collect())
}

fn as_local_utc(local: NaiveDateTime) -> String {
    format!("{}Z", local.format("%Y%m%dT%H%M%S"))
}

/// Rewrite `UNTIL=` into the same local frame as DTSTART.
///
/// UTC values are converted to local time, floating values are taken as
/// local, and date-only values run to the end of that day.
fn localize_until(rule: &str, normalizer: &Normalizer) -> String {
    rule.split(';')
        .map(|part| {
            let Some(value) = part
                .strip_prefix("UNTIL=")
                .or_else(|| part.strip_prefix("until="))
            else {
                return part.to_string();
            };
            match parse_until(value, normalizer) {
                Some(local) => format!("UNTIL={}", as_local_utc(local)),
                None => part.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join(";")
}

fn parse_until(value: &str, normalizer: &Normalizer) -> Option<NaiveDateTime> {
    if let Some(utc) = value.strip_suffix('Z') {
        let naive = NaiveDateTime::parse_from_str(utc, "%Y%m%dT%H%M%S").ok()?;
        let instant = Utc.from_utc_datetime(&naive).fixed_offset();
        return Some(normalizer.local(&EventTime::Absolute(instant)));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S") {
        return Some(naive);
    }
    NaiveDate::parse_from_str(value, "%Y%m%d")
        .ok()
        .and_then(|d| d.and_hms_opt(23, 59, 59))
}

/// EXDATE values in the local frame. A date-only EXDATE removes every
/// occurrence on that day.
struct Exclusions {
    times: HashSet<NaiveDateTime>,
    days: HashSet<NaiveDate>,
}

impl Exclusions {
    fn new(exdates: &[EventTime], normalizer: &Normalizer) -> Self {
        let mut times = HashSet::new();
        let mut days = HashSet::new();
        for exdate in exdates {
            match exdate {
                EventTime::Date(d) => {
                    days.insert(*d);
                }
                other => {
                    times.insert(normalizer.local(other));
                }
            }
        }
        Exclusions { times, days }
    }

    fn contains(&self, occurrence: NaiveDateTime) -> bool {
        self.times.contains(&occurrence) || self.days.contains(&occurrence.date())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ics::parse_calendar;

    fn naive(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    fn normalizer() -> Normalizer {
        Normalizer::new(chrono_tz::America::Sao_Paulo)
    }

    /// Monday 2024-01-01 07:00 through Friday 2024-01-12 18:00.
    fn window() -> SyncWindow {
        SyncWindow::new(naive(2024, 1, 1, 7, 0), naive(2024, 1, 12, 18, 0))
    }

    fn parse(vevents: &str) -> Vec<IcsEvent> {
        parse_calendar(&format!(
            "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:TEST\r\n{vevents}END:VCALENDAR\r\n"
        ))
        .unwrap()
    }

    fn starts(events: &[RawEvent]) -> Vec<NaiveDateTime> {
        events
            .iter()
            .map(|e| match e.start {
                EventTime::Floating(dt) => dt,
                ref other => panic!("expected floating time, got {other}"),
            })
            .collect()
    }

    #[test]
    fn test_single_events_are_clipped_to_the_window() {
        let events = parse(
            "BEGIN:VEVENT\r\nUID:in\r\nSUMMARY:Inside\r\n\
             DTSTART;TZID=America/Sao_Paulo:20240103T100000\r\n\
             DTEND;TZID=America/Sao_Paulo:20240103T110000\r\nEND:VEVENT\r\n\
             BEGIN:VEVENT\r\nUID:out\r\nSUMMARY:Outside\r\n\
             DTSTART;TZID=America/Sao_Paulo:20240120T100000\r\n\
             DTEND;TZID=America/Sao_Paulo:20240120T110000\r\nEND:VEVENT\r\n",
        );

        let expanded = expand(&events, &window(), &normalizer());
        assert_eq!(expanded.len(), 1);
        assert_eq!(expanded[0].title, "Inside");
        assert!(expanded[0].source_id.is_none());
    }

    #[test]
    fn test_utc_times_are_localized() {
        let events = parse(
            "BEGIN:VEVENT\r\nUID:utc\r\nSUMMARY:Standup\r\n\
             DTSTART:20240102T120000Z\r\nDTEND:20240102T123000Z\r\nEND:VEVENT\r\n",
        );

        let expanded = expand(&events, &window(), &normalizer());
        assert_eq!(starts(&expanded), vec![naive(2024, 1, 2, 9, 0)]);
        assert_eq!(expanded[0].end, EventTime::Floating(naive(2024, 1, 2, 9, 30)));
    }

    #[test]
    fn test_weekly_rule_expands_inside_window() {
        let events = parse(
            "BEGIN:VEVENT\r\nUID:weekly\r\nSUMMARY:Planning\r\n\
             DTSTART;TZID=America/Sao_Paulo:20231204T140000\r\n\
             DTEND;TZID=America/Sao_Paulo:20231204T150000\r\n\
             RRULE:FREQ=WEEKLY;BYDAY=MO,TH\r\nEND:VEVENT\r\n",
        );

        let expanded = expand(&events, &window(), &normalizer());
        assert_eq!(
            starts(&expanded),
            vec![
                naive(2024, 1, 1, 14, 0),
                naive(2024, 1, 4, 14, 0),
                naive(2024, 1, 8, 14, 0),
                naive(2024, 1, 11, 14, 0),
            ]
        );
    }

    #[test]
    fn test_exdates_remove_occurrences() {
        let events = parse(
            "BEGIN:VEVENT\r\nUID:daily\r\nSUMMARY:Standup\r\n\
             DTSTART;TZID=America/Sao_Paulo:20240101T090000\r\n\
             DTEND;TZID=America/Sao_Paulo:20240101T091500\r\n\
             RRULE:FREQ=DAILY;COUNT=5\r\n\
             EXDATE;TZID=America/Sao_Paulo:20240102T090000\r\n\
             EXDATE;VALUE=DATE:20240104\r\nEND:VEVENT\r\n",
        );

        let expanded = expand(&events, &window(), &normalizer());
        assert_eq!(
            starts(&expanded),
            vec![
                naive(2024, 1, 1, 9, 0),
                naive(2024, 1, 3, 9, 0),
                naive(2024, 1, 5, 9, 0),
            ]
        );
    }

    #[test]
    fn test_override_replaces_its_occurrence() {
        let events = parse(
            "BEGIN:VEVENT\r\nUID:series\r\nSUMMARY:Review\r\n\
             DTSTART;TZID=America/Sao_Paulo:20240101T100000\r\n\
             DTEND;TZID=America/Sao_Paulo:20240101T110000\r\n\
             RRULE:FREQ=DAILY;COUNT=3\r\nEND:VEVENT\r\n\
             BEGIN:VEVENT\r\nUID:series\r\nSUMMARY:Review (moved)\r\n\
             RECURRENCE-ID;TZID=America/Sao_Paulo:20240102T100000\r\n\
             DTSTART;TZID=America/Sao_Paulo:20240102T160000\r\n\
             DTEND;TZID=America/Sao_Paulo:20240102T170000\r\nEND:VEVENT\r\n",
        );

        let expanded = expand(&events, &window(), &normalizer());
        let summary: Vec<_> = expanded
            .iter()
            .map(|e| (e.title.as_str(), e.start.clone()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("Review", EventTime::Floating(naive(2024, 1, 1, 10, 0))),
                ("Review (moved)", EventTime::Floating(naive(2024, 1, 2, 16, 0))),
                ("Review", EventTime::Floating(naive(2024, 1, 3, 10, 0))),
            ]
        );
    }

    #[test]
    fn test_utc_until_is_rewritten_into_local_frame() {
        // 09:00 in Sao Paulo is 12:00Z; the last occurrence must survive.
        let events = parse(
            "BEGIN:VEVENT\r\nUID:until\r\nSUMMARY:Sync\r\n\
             DTSTART;TZID=America/Sao_Paulo:20240101T090000\r\n\
             DTEND;TZID=America/Sao_Paulo:20240101T093000\r\n\
             RRULE:FREQ=DAILY;UNTIL=20240103T120000Z\r\nEND:VEVENT\r\n",
        );

        let expanded = expand(&events, &window(), &normalizer());
        assert_eq!(expanded.len(), 3);
        assert_eq!(starts(&expanded)[2], naive(2024, 1, 3, 9, 0));
    }

    #[test]
    fn test_bad_rule_skips_only_that_master() {
        let events = parse(
            "BEGIN:VEVENT\r\nUID:bad\r\nSUMMARY:Broken\r\n\
             DTSTART;TZID=America/Sao_Paulo:20240101T090000\r\n\
             DTEND;TZID=America/Sao_Paulo:20240101T100000\r\n\
             RRULE:FREQ=SOMETIMES\r\nEND:VEVENT\r\n\
             BEGIN:VEVENT\r\nUID:good\r\nSUMMARY:Fine\r\n\
             DTSTART;TZID=America/Sao_Paulo:20240102T090000\r\n\
             DTEND;TZID=America/Sao_Paulo:20240102T100000\r\nEND:VEVENT\r\n",
        );

        let expanded = expand(&events, &window(), &normalizer());
        assert_eq!(expanded.len(), 1);
        assert_eq!(expanded[0].title, "Fine");
    }

    #[test]
    fn test_event_straddling_window_start_is_kept() {
        let events = parse(
            "BEGIN:VEVENT\r\nUID:early\r\nSUMMARY:Early\r\n\
             DTSTART;TZID=America/Sao_Paulo:20240101T063000\r\n\
             DTEND;TZID=America/Sao_Paulo:20240101T073000\r\n\
             RRULE:FREQ=WEEKLY;COUNT=1\r\nEND:VEVENT\r\n",
        );

        let expanded = expand(&events, &window(), &normalizer());
        assert_eq!(starts(&expanded), vec![naive(2024, 1, 1, 6, 30)]);
    }

    #[test]
    fn test_output_is_chronological() {
        let events = parse(
            "BEGIN:VEVENT\r\nUID:b\r\nSUMMARY:Later\r\n\
             DTSTART;TZID=America/Sao_Paulo:20240105T090000\r\n\
             DTEND;TZID=America/Sao_Paulo:20240105T100000\r\nEND:VEVENT\r\n\
             BEGIN:VEVENT\r\nUID:a\r\nSUMMARY:Sooner\r\n\
             DTSTART;TZID=America/Sao_Paulo:20240102T090000\r\n\
             DTEND;TZID=America/Sao_Paulo:20240102T100000\r\nEND:VEVENT\r\n",
        );

        let expanded = expand(&events, &window(), &normalizer());
        let titles: Vec<_> = expanded.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Sooner", "Later"]);
    }
}
