use calsync_core::{CalSyncError, CalSyncResult, EventTime, RawEvent};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use chrono_tz::Tz;

use crate::types::{EventDateTime, GoogleEvent, NewEvent};

const CANCELLED: &str = "cancelled";

/// Convert a listed event. Cancelled and id-less events yield `Ok(None)`.
pub fn from_google(event: GoogleEvent) -> CalSyncResult<Option<RawEvent>> {
    if event.status.as_deref() == Some(CANCELLED) {
        return Ok(None);
    }
    let Some(id) = event.id.filter(|id| !id.is_empty()) else {
        return Ok(None);
    };

    let start = event_time(event.start.as_ref(), &id, "start")?;
    let end = event_time(event.end.as_ref(), &id, "end")?;

    Ok(Some(RawEvent::target(
        id,
        event.summary.unwrap_or_default(),
        start,
        end,
    )))
}

fn event_time(value: Option<&EventDateTime>, id: &str, field: &str) -> CalSyncResult<EventTime> {
    let invalid = |detail: String| {
        CalSyncError::Serialization(format!("Event {} has an invalid {}: {}", id, field, detail))
    };
    let value = value.ok_or_else(|| invalid("missing".into()))?;

    if let Some(dt) = &value.date_time {
        return DateTime::parse_from_rfc3339(dt)
            .map(EventTime::Absolute)
            .map_err(|e| invalid(format!("{} ({})", dt, e)));
    }
    if let Some(d) = &value.date {
        return NaiveDate::parse_from_str(d, "%Y-%m-%d")
            .map(EventTime::Date)
            .map_err(|e| invalid(format!("{} ({})", d, e)));
    }
    Err(invalid("neither dateTime nor date".into()))
}

/// Insert body for a timed event in local wall-clock time.
pub fn new_event(title: &str, start: NaiveDateTime, end: NaiveDateTime, tz: Tz) -> NewEvent {
    let at = |dt: NaiveDateTime| EventDateTime {
        date_time: Some(dt.format("%Y-%m-%dT%H:%M:%S").to_string()),
        date: None,
        time_zone: Some(tz.name().to_string()),
    };
    NewEvent {
        summary: title.to_string(),
        start: at(start),
        end: at(end),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(json: &str) -> GoogleEvent {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_timed_event_keeps_its_offset() {
        let raw = from_google(event(
            r#"{"id":"a1","summary":"Standup",
                "start":{"dateTime":"2024-01-01T09:00:00-03:00"},
                "end":{"dateTime":"2024-01-01T09:30:00-03:00"}}"#,
        ))
        .unwrap()
        .unwrap();

        assert_eq!(raw.title, "Standup");
        assert_eq!(raw.source_id.as_deref(), Some("a1"));
        match raw.start {
            EventTime::Absolute(dt) => {
                assert_eq!(dt.to_rfc3339(), "2024-01-01T09:00:00-03:00");
            }
            other => panic!("expected absolute time, got {:?}", other),
        }
    }

    #[test]
    fn test_all_day_event_becomes_date() {
        let raw = from_google(event(
            r#"{"id":"d","summary":"Holiday",
                "start":{"date":"2024-01-02"},"end":{"date":"2024-01-03"}}"#,
        ))
        .unwrap()
        .unwrap();

        assert_eq!(
            raw.start,
            EventTime::Date(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap())
        );
    }

    #[test]
    fn test_cancelled_and_idless_events_are_skipped() {
        assert!(
            from_google(event(r#"{"id":"c","status":"cancelled"}"#))
                .unwrap()
                .is_none()
        );
        assert!(
            from_google(event(
                r#"{"summary":"x","start":{"date":"2024-01-02"},"end":{"date":"2024-01-03"}}"#
            ))
            .unwrap()
            .is_none()
        );
    }

    #[test]
    fn test_missing_summary_is_an_empty_title() {
        let raw = from_google(event(
            r#"{"id":"n","start":{"date":"2024-01-02"},"end":{"date":"2024-01-03"}}"#,
        ))
        .unwrap()
        .unwrap();
        assert_eq!(raw.title, "");
    }

    #[test]
    fn test_garbage_time_is_an_error() {
        let result = from_google(event(
            r#"{"id":"g","start":{"dateTime":"yesterday"},"end":{"dateTime":"today"}}"#,
        ));
        assert!(matches!(result, Err(CalSyncError::Serialization(_))));
    }

    #[test]
    fn test_new_event_uses_wall_clock_and_zone_name() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let body = new_event(
            "Standup",
            start,
            start + chrono::Duration::minutes(30),
            chrono_tz::America::Sao_Paulo,
        );
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["summary"], "Standup");
        assert_eq!(json["start"]["dateTime"], "2024-01-01T09:00:00");
        assert_eq!(json["end"]["dateTime"], "2024-01-01T09:30:00");
        assert_eq!(json["start"]["timeZone"], "America/Sao_Paulo");
        assert!(json["start"].get("date").is_none());
    }
}
