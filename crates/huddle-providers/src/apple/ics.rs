//! iCalendar (RFC 5545) decoding for CalDAV `calendar-data`.
//!
//! Each VEVENT becomes one [`VEvent`] item for the normalizer. Local times
//! carrying a `TZID` are resolved through the IANA database, floating times
//! are read as UTC and all-day dates start at UTC midnight.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use huddle_core::CanonicalEvent;
use icalendar::{
    Calendar, CalendarComponent, CalendarDateTime, Component, DatePerhapsTime, Event, EventLike,
    EventStatus,
};

use crate::normalize::DecodeEvent;

/// A VEVENT waiting to be decoded.
#[derive(Debug, Clone)]
pub(crate) struct VEvent(Event);

/// Splits one `calendar-data` payload into its VEVENTs.
pub(crate) fn parse_calendar_data(ics: &str) -> Result<Vec<VEvent>, String> {
    if !ics.trim_start().starts_with("BEGIN:VCALENDAR") {
        return Err("calendar-data is not a VCALENDAR".to_string());
    }
    let calendar = ics
        .parse::<Calendar>()
        .map_err(|e| format!("invalid iCalendar data: {}", e))?;

    Ok(calendar
        .iter()
        .filter_map(|component| match component {
            CalendarComponent::Event(event) => Some(VEvent(event.clone())),
            _ => None,
        })
        .collect())
}

impl DecodeEvent for VEvent {
    fn decode(self) -> Result<Option<CanonicalEvent>, String> {
        let event = self.0;
        if event.get_status() == Some(EventStatus::Cancelled) {
            return Ok(None);
        }
        if event
            .property_value("TRANSP")
            .is_some_and(|transp| transp.eq_ignore_ascii_case("TRANSPARENT"))
        {
            return Ok(None);
        }

        let start_value = event.get_start().ok_or("missing DTSTART")?;
        let all_day = matches!(start_value, DatePerhapsTime::Date(_));
        let start = to_utc(start_value)?;

        let end = match event.get_end() {
            Some(value) => to_utc(value)?,
            None => match event.property_value("DURATION") {
                Some(raw) => parse_duration(raw)
                    .and_then(|duration| start.checked_add_signed(duration))
                    .ok_or_else(|| format!("invalid DURATION `{raw}`"))?,
                None if all_day => start + Duration::days(1),
                // A timed event without end or duration occupies no time.
                None => return Ok(None),
            },
        };

        CanonicalEvent::try_new(event.get_summary().unwrap_or_default(), start, end)
            .map(Some)
            .map_err(|e| e.to_string())
    }
}

fn to_utc(value: DatePerhapsTime) -> Result<DateTime<Utc>, String> {
    match value {
        DatePerhapsTime::Date(date) => Ok(midnight(date)),
        DatePerhapsTime::DateTime(CalendarDateTime::Utc(dt)) => Ok(dt),
        DatePerhapsTime::DateTime(CalendarDateTime::Floating(naive)) => Ok(naive.and_utc()),
        DatePerhapsTime::DateTime(CalendarDateTime::WithTimezone { date_time, tzid }) => {
            in_zone(date_time, &tzid)
        }
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn in_zone(local: NaiveDateTime, tzid: &str) -> Result<DateTime<Utc>, String> {
    let tz: Tz = tzid
        .parse()
        .map_err(|_| format!("unknown TZID `{tzid}`"))?;
    tz.from_local_datetime(&local)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| format!("{local} does not exist in {tzid}"))
}

/// Parses an RFC 5545 DURATION value such as `PT1H30M`, `P1D` or `-PT15M`.
fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let (negative, rest) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw.strip_prefix('+').unwrap_or(raw)),
    };
    let rest = rest.strip_prefix('P')?;

    let mut total = Duration::zero();
    let mut number = String::new();
    let mut in_time = false;
    for c in rest.chars() {
        match c {
            '0'..='9' => number.push(c),
            'T' if number.is_empty() => in_time = true,
            unit => {
                let value: i64 = number.parse().ok()?;
                number.clear();
                let part = match (unit, in_time) {
                    ('W', false) => Duration::try_weeks(value),
                    ('D', false) => Duration::try_days(value),
                    ('H', true) => Duration::try_hours(value),
                    ('M', true) => Duration::try_minutes(value),
                    ('S', true) => Duration::try_seconds(value),
                    _ => None,
                }?;
                total = total.checked_add(&part)?;
            }
        }
    }
    if !number.is_empty() {
        return None;
    }
    Some(if negative { -total } else { total })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(body: &str) -> Result<Option<CanonicalEvent>, String> {
        let ics = format!(
            "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//Test//Test//EN\r\nBEGIN:VEVENT\r\nUID:e1@example.com\r\n{body}END:VEVENT\r\nEND:VCALENDAR\r\n"
        );
        let mut events = parse_calendar_data(&ics).unwrap();
        assert_eq!(events.len(), 1);
        events.remove(0).decode()
    }

    fn utc(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, d, h, m, 0).unwrap()
    }

    #[test]
    fn utc_event() {
        let event = single("DTSTART:20250205T100000Z\r\nDTEND:20250205T110000Z\r\nSUMMARY:Team Meeting\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(event.summary(), "Team Meeting");
        assert_eq!(event.start(), utc(5, 10, 0));
        assert_eq!(event.end(), utc(5, 11, 0));
    }

    #[test]
    fn tzid_event_resolved_to_utc() {
        let event = single(
            "DTSTART;TZID=Europe/Paris:20250205T100000\r\nDTEND;TZID=Europe/Paris:20250205T103000\r\n",
        )
        .unwrap()
        .unwrap();
        assert_eq!(event.start(), utc(5, 9, 0));
        assert_eq!(event.end(), utc(5, 9, 30));
    }

    #[test]
    fn all_day_event_starts_at_utc_midnight() {
        let event = single("DTSTART;VALUE=DATE:20250210\r\nDTEND;VALUE=DATE:20250211\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(event.start(), utc(10, 0, 0));
        assert_eq!(event.end(), utc(11, 0, 0));

        let no_end = single("DTSTART;VALUE=DATE:20250210\r\n").unwrap().unwrap();
        assert_eq!(no_end.end(), utc(11, 0, 0));
    }

    #[test]
    fn duration_instead_of_end() {
        let event = single("DTSTART:20250205T100000Z\r\nDURATION:PT1H30M\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(event.end(), utc(5, 11, 30));
    }

    #[test]
    fn out_of_range_duration_is_an_error() {
        for raw in ["P999999999999999D", "P99999999D", "P9223372036854775807W"] {
            let err = single(&format!("DTSTART:20250205T100000Z\r\nDURATION:{raw}\r\n")).unwrap_err();
            assert_eq!(err, format!("invalid DURATION `{raw}`"));
        }
        assert_eq!(parse_duration("P999999999999999D"), None);
        assert_eq!(parse_duration("P99999999999999999999D"), None);
    }

    #[test]
    fn cancelled_and_transparent_are_skipped() {
        assert_eq!(
            single("DTSTART:20250205T100000Z\r\nDTEND:20250205T110000Z\r\nSTATUS:CANCELLED\r\n"),
            Ok(None)
        );
        assert_eq!(
            single("DTSTART:20250205T100000Z\r\nDTEND:20250205T110000Z\r\nTRANSP:TRANSPARENT\r\n"),
            Ok(None)
        );
    }

    #[test]
    fn undecodable_events() {
        assert!(single("SUMMARY:No start\r\n").unwrap_err().contains("DTSTART"));
        assert!(
            single("DTSTART;TZID=Mars/Olympus:20250205T100000\r\nDTEND;TZID=Mars/Olympus:20250205T110000\r\n")
                .unwrap_err()
                .contains("TZID")
        );
        assert!(single("DTSTART:20250205T110000Z\r\nDTEND:20250205T100000Z\r\n").is_err());
    }

    #[test]
    fn duration_grammar() {
        assert_eq!(parse_duration("PT15M"), Some(Duration::minutes(15)));
        assert_eq!(parse_duration("P1DT2H"), Some(Duration::hours(26)));
        assert_eq!(parse_duration("P2W"), Some(Duration::weeks(2)));
        assert_eq!(parse_duration("-PT5M"), Some(Duration::minutes(-5)));
        assert_eq!(parse_duration("PT"), Some(Duration::zero()));
        assert_eq!(parse_duration("1H"), None);
        assert_eq!(parse_duration("P1H"), None);
        assert_eq!(parse_duration("PT5"), None);
    }

    #[test]
    fn rejects_non_calendar_payload() {
        assert!(parse_calendar_data("garbage").is_err());
    }

    #[test]
    fn non_event_components_ignored() {
        let ics = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nBEGIN:VTODO\r\nUID:t@example.com\r\nSUMMARY:Chore\r\nEND:VTODO\r\nEND:VCALENDAR\r\n";
        assert!(parse_calendar_data(ics).unwrap().is_empty());
    }
}
