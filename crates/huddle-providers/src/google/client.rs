//! Google Calendar API client.
//!
//! Low-level request building, pagination and wire types for the Calendar
//! API v3. Items are decoded one at a time so a single bad event never
//! discards the page.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use huddle_core::{CanonicalEvent, TimeWindow};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ProviderError, ProviderResult};
use crate::http::{self, HttpClient, HttpRequest, RetryPolicy};
use crate::normalize::{DecodeEvent, normalize_items};
use crate::provider::EventListing;

use super::config::GoogleConfig;

/// Pages followed before a listing is reported as malformed.
pub(super) const MAX_PAGES: usize = 100;

/// Google Calendar API client.
#[derive(Debug, Clone)]
pub(crate) struct GoogleCalendarClient {
    http: Arc<dyn HttpClient>,
    config: GoogleConfig,
    policy: RetryPolicy,
}

impl GoogleCalendarClient {
    pub(crate) fn new(http: Arc<dyn HttpClient>, config: GoogleConfig, policy: RetryPolicy) -> Self {
        Self {
            http,
            config,
            policy,
        }
    }

    /// Lists every calendar on the account's calendar list.
    pub(crate) async fn list_calendars(
        &self,
        access_token: &str,
    ) -> ProviderResult<Vec<CalendarListEntry>> {
        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let mut request = HttpRequest::get(self.config.calendar_list_url()).bearer(access_token);
            if let Some(token) = &page_token {
                request = request.query("pageToken", token);
            }

            let page: CalendarListResponse = self.fetch_json(request).await?;
            entries.extend(page.items);

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => {
                    debug!(count = entries.len(), "fetched calendar list");
                    return Ok(entries);
                }
            }
        }

        Err(unterminated_pagination())
    }

    /// Lists events of `calendar_id` over `window`, following every page.
    ///
    /// Recurring events are expanded server-side (`singleEvents=true`).
    pub(crate) async fn list_events(
        &self,
        access_token: &str,
        calendar_id: &str,
        window: &TimeWindow,
    ) -> ProviderResult<EventListing> {
        let mut listing = EventListing::default();
        let mut seen = 0usize;
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let mut request = HttpRequest::get(self.config.events_url(calendar_id))
                .bearer(access_token)
                .query("timeMin", rfc3339(window.start()))
                .query("timeMax", rfc3339(window.end()))
                .query("singleEvents", "true")
                .query("orderBy", "startTime")
                .query("maxResults", self.config.page_size.to_string());
            if let Some(token) = &page_token {
                request = request.query("pageToken", token);
            }

            let page: EventListResponse = self.fetch_json(request).await?;
            let count = page.items.len();
            let items = page.items.into_iter().map(|value| {
                serde_json::from_value::<ApiEvent>(value).map_err(|e| format!("invalid event: {}", e))
            });
            listing.extend(normalize_items(items, window), seen);
            seen += count;

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => {
                    debug!(calendar = %calendar_id, items = seen, kept = listing.events.len(), "fetched events");
                    return Ok(listing);
                }
            }
        }

        Err(unterminated_pagination())
    }

    async fn fetch_json<T: DeserializeOwned>(&self, request: HttpRequest) -> ProviderResult<T> {
        let response = http::send(self.http.as_ref(), request, self.policy)
            .await?
            .check_status()?;
        serde_json::from_str(&response.body).map_err(|e| {
            ProviderError::malformed(format!("failed to parse response: {}", e)).with_source(e)
        })
    }
}

fn unterminated_pagination() -> ProviderError {
    ProviderError::malformed(format!(
        "pagination did not terminate after {MAX_PAGES} pages"
    ))
}

fn rfc3339(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Response from the events.list endpoint.
///
/// Items stay as raw JSON until decoded individually.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventListResponse {
    #[serde(default)]
    items: Vec<serde_json::Value>,
    next_page_token: Option<String>,
}

/// A single event from the Google Calendar API.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transparency: Option<String>,
    pub start: ApiEventTime,
    pub end: ApiEventTime,
}

/// Event time from the API: either `dateTime` or an all-day `date`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEventTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl ApiEventTime {
    fn instant(&self, which: &str) -> Result<DateTime<Utc>, String> {
        match (&self.date_time, &self.date) {
            (Some(dt), _) => DateTime::parse_from_rfc3339(dt)
                .map(|parsed| parsed.with_timezone(&Utc))
                .map_err(|e| format!("invalid {which} dateTime `{dt}`: {e}")),
            (None, Some(date)) => NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .map(|d| d.and_time(chrono::NaiveTime::MIN).and_utc())
                .map_err(|e| format!("invalid {which} date `{date}`: {e}")),
            (None, None) => Err(format!("missing {which} time")),
        }
    }
}

impl ApiEvent {
    /// Encodes a canonical event in the API's wire shape.
    pub fn from_canonical(event: &CanonicalEvent) -> Self {
        Self {
            summary: Some(event.summary().to_string()),
            start: ApiEventTime {
                date_time: Some(rfc3339(event.start())),
                ..Default::default()
            },
            end: ApiEventTime {
                date_time: Some(rfc3339(event.end())),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

impl DecodeEvent for ApiEvent {
    fn decode(self) -> Result<Option<CanonicalEvent>, String> {
        if self.status.as_deref() == Some("cancelled") {
            return Ok(None);
        }
        // Events marked "free" do not block time.
        if self.transparency.as_deref() == Some("transparent") {
            return Ok(None);
        }

        let start = self.start.instant("start")?;
        let end = self.end.instant("end")?;
        CanonicalEvent::try_new(self.summary.unwrap_or_default(), start, end)
            .map(Some)
            .map_err(|e| e.to_string())
    }
}

/// Response from the calendarList endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalendarListResponse {
    #[serde(default)]
    items: Vec<CalendarListEntry>,
    next_page_token: Option<String>,
}

/// A calendar from the calendar list.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarListEntry {
    /// The calendar ID.
    pub id: String,
    /// The calendar summary (name).
    #[serde(default)]
    pub summary: String,
    /// Name override set by the user, if any.
    pub summary_override: Option<String>,
    /// Whether this is the primary calendar.
    #[serde(default)]
    pub primary: bool,
    /// The calendar timezone.
    pub time_zone: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn decode_json(json: &str) -> Result<Option<CanonicalEvent>, String> {
        serde_json::from_str::<ApiEvent>(json).unwrap().decode()
    }

    #[test]
    fn decode_timed_event_with_offset() {
        let event = decode_json(
            r#"{
                "id": "event1",
                "summary": "Standup",
                "start": {"dateTime": "2024-03-15T10:00:00+01:00"},
                "end": {"dateTime": "2024-03-15T10:15:00+01:00"},
                "status": "confirmed"
            }"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(event.summary(), "Standup");
        assert_eq!(event.start(), Utc.with_ymd_and_hms(2024, 3, 15, 9, 0, 0).unwrap());
    }

    #[test]
    fn decode_all_day_event() {
        let event = decode_json(
            r#"{
                "summary": "Offsite",
                "start": {"date": "2024-03-15"},
                "end": {"date": "2024-03-16"}
            }"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(event.start(), Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap());
        assert_eq!(event.end(), Utc.with_ymd_and_hms(2024, 3, 16, 0, 0, 0).unwrap());
    }

    #[test]
    fn decode_skips_cancelled_and_free() {
        let base = r#""start": {"dateTime": "2024-03-15T10:00:00Z"}, "end": {"dateTime": "2024-03-15T11:00:00Z"}"#;
        assert_eq!(decode_json(&format!(r#"{{"status":"cancelled",{base}}}"#)), Ok(None));
        assert_eq!(
            decode_json(&format!(r#"{{"transparency":"transparent",{base}}}"#)),
            Ok(None)
        );
    }

    #[test]
    fn decode_failures() {
        assert!(decode_json(r#"{"start": {}, "end": {"date": "2024-03-16"}}"#)
            .unwrap_err()
            .contains("missing start"));
        assert!(decode_json(
            r#"{"start": {"dateTime": "yesterday"}, "end": {"dateTime": "2024-03-15T11:00:00Z"}}"#
        )
        .is_err());
        // end before start
        assert!(decode_json(
            r#"{"start": {"dateTime": "2024-03-15T11:00:00Z"}, "end": {"dateTime": "2024-03-15T10:00:00Z"}}"#
        )
        .is_err());
    }

    #[test]
    fn canonical_round_trip() {
        let original = CanonicalEvent::try_new(
            "Design review",
            Utc.with_ymd_and_hms(2024, 3, 15, 13, 30, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 15, 14, 45, 0).unwrap(),
        )
        .unwrap();

        let wire = serde_json::to_string(&ApiEvent::from_canonical(&original)).unwrap();
        let decoded = serde_json::from_str::<ApiEvent>(&wire)
            .unwrap()
            .decode()
            .unwrap()
            .unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn sub_second_times_survive_re_encoding() {
        let wire = r#"{
            "summary": "Stand-up",
            "start": {"dateTime": "2024-03-15T10:00:00.250Z"},
            "end": {"dateTime": "2024-03-15T10:15:00.000125Z"}
        }"#;
        let decoded = serde_json::from_str::<ApiEvent>(wire)
            .unwrap()
            .decode()
            .unwrap()
            .unwrap();

        let encoded = ApiEvent::from_canonical(&decoded);
        assert_eq!(
            encoded.start.date_time.as_deref(),
            Some("2024-03-15T10:00:00.250Z")
        );
        assert_eq!(
            encoded.end.date_time.as_deref(),
            Some("2024-03-15T10:15:00.000125Z")
        );
        assert_eq!(encoded.decode().unwrap().unwrap(), decoded);
    }

    #[test]
    fn parse_calendar_list() {
        let json = r#"{
            "items": [
                {"id": "primary", "summary": "Me", "primary": true, "timeZone": "Europe/Paris"},
                {"id": "team@group.calendar.google.com", "summary": "Team"}
            ],
            "nextPageToken": "p2"
        }"#;

        let response: CalendarListResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.items.len(), 2);
        assert!(response.items[0].primary);
        assert!(!response.items[1].primary);
        assert_eq!(response.next_page_token.as_deref(), Some("p2"));
    }
}
