//! XML bodies and multistatus parsing for the CalDAV requests.

use std::io::Cursor;

use chrono::{DateTime, Utc};
use huddle_core::TimeWindow;
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, Event};

use crate::error::{ProviderError, ProviderResult};

/// DAV namespace
pub const DAV_NS: &str = "DAV:";
/// CalDAV namespace
pub const CALDAV_NS: &str = "urn:ietf:params:xml:ns:caldav";

type WriteResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// One `<d:response>` of a multistatus document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct DavResponse {
    pub href: String,
    pub display_name: Option<String>,
    pub is_calendar: bool,
    /// Component names from `supported-calendar-component-set`.
    pub components: Vec<String>,
    pub principal_href: Option<String>,
    pub home_set_href: Option<String>,
    pub calendar_data: Option<String>,
}

impl DavResponse {
    /// True for calendar collections that can hold events.
    pub fn is_event_calendar(&self) -> bool {
        self.is_calendar
            && (self.components.is_empty() || self.components.iter().any(|c| c == "VEVENT"))
    }
}

fn render(build: impl FnOnce(&mut Writer<Cursor<Vec<u8>>>) -> WriteResult) -> ProviderResult<String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    build(&mut writer).map_err(|e| {
        ProviderError::invalid_request(format!("failed to build request body: {}", e))
    })?;
    String::from_utf8(writer.into_inner().into_inner()).map_err(|e| {
        ProviderError::invalid_request(format!("request body is not UTF-8: {}", e)).with_source(e)
    })
}

fn root(name: &str) -> BytesStart<'_> {
    let mut start = BytesStart::new(name);
    start.push_attribute(("xmlns:d", DAV_NS));
    start.push_attribute(("xmlns:c", CALDAV_NS));
    start
}

/// Builds a PROPFIND body asking for `props` (prefixed `d:` or `c:`).
pub(crate) fn propfind_body(props: &[&str]) -> ProviderResult<String> {
    render(|writer| {
        writer.write_event(Event::Start(root("d:propfind")))?;
        writer.write_event(Event::Start(BytesStart::new("d:prop")))?;
        for prop in props {
            writer.write_event(Event::Empty(BytesStart::new(*prop)))?;
        }
        writer.write_event(Event::End(BytesEnd::new("d:prop")))?;
        writer.write_event(Event::End(BytesEnd::new("d:propfind")))?;
        Ok(())
    })
}

/// Builds a calendar-query REPORT body for the VEVENTs overlapping
/// `window`, asking the server to expand recurrences into instances.
pub(crate) fn calendar_query_body(window: &TimeWindow) -> ProviderResult<String> {
    let start = format_icalendar_datetime(window.start());
    let end = format_icalendar_datetime(window.end());
    let range = |name: &'static str| {
        let mut element = BytesStart::new(name);
        element.push_attribute(("start", start.as_str()));
        element.push_attribute(("end", end.as_str()));
        element
    };

    render(|writer| {
        writer.write_event(Event::Start(root("c:calendar-query")))?;
        writer.write_event(Event::Start(BytesStart::new("d:prop")))?;
        writer.write_event(Event::Empty(BytesStart::new("d:getetag")))?;
        writer.write_event(Event::Start(BytesStart::new("c:calendar-data")))?;
        writer.write_event(Event::Empty(range("c:expand")))?;
        writer.write_event(Event::End(BytesEnd::new("c:calendar-data")))?;
        writer.write_event(Event::End(BytesEnd::new("d:prop")))?;

        writer.write_event(Event::Start(BytesStart::new("c:filter")))?;
        let mut vcalendar = BytesStart::new("c:comp-filter");
        vcalendar.push_attribute(("name", "VCALENDAR"));
        writer.write_event(Event::Start(vcalendar))?;
        let mut vevent = BytesStart::new("c:comp-filter");
        vevent.push_attribute(("name", "VEVENT"));
        writer.write_event(Event::Start(vevent))?;
        writer.write_event(Event::Empty(range("c:time-range")))?;
        writer.write_event(Event::End(BytesEnd::new("c:comp-filter")))?;
        writer.write_event(Event::End(BytesEnd::new("c:comp-filter")))?;
        writer.write_event(Event::End(BytesEnd::new("c:filter")))?;

        writer.write_event(Event::End(BytesEnd::new("c:calendar-query")))?;
        Ok(())
    })
}

/// Parses a `207 Multi-Status` body.
///
/// Fails when the document is not well-formed XML or has no
/// `multistatus` root.
pub(crate) fn parse_multistatus(xml: &str) -> Result<Vec<DavResponse>, String> {
    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut responses = Vec::new();
    let mut current: Option<DavResponse> = None;
    let mut stack: Vec<String> = Vec::new();
    let mut saw_root = false;
    let mut buf = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| format!("invalid XML at byte {}: {}", reader.buffer_position(), e))?;

        match event {
            Event::Start(e) => {
                let local = element_name(&e);
                match local.as_str() {
                    "multistatus" => saw_root = true,
                    "response" => current = Some(DavResponse::default()),
                    _ => {}
                }
                if let Some(response) = current.as_mut() {
                    apply_marker(response, &stack, &local, &e);
                }
                stack.push(local);
            }
            Event::Empty(e) => {
                let local = element_name(&e);
                if let Some(response) = current.as_mut() {
                    apply_marker(response, &stack, &local, &e);
                }
            }
            Event::End(_) => {
                if stack.pop().as_deref() == Some("response")
                    && let Some(response) = current.take()
                {
                    responses.push(response);
                }
            }
            Event::Text(e) => {
                let text = e.unescape().map_err(|e| format!("invalid text: {}", e))?;
                if let Some(response) = current.as_mut() {
                    apply_text(response, &stack, &text);
                }
            }
            Event::CData(e) => {
                let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                if let Some(response) = current.as_mut() {
                    apply_text(response, &stack, &text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !saw_root {
        return Err("response is not a DAV multistatus document".to_string());
    }
    Ok(responses)
}

fn element_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.local_name().as_ref()).into_owned()
}

fn apply_marker(response: &mut DavResponse, stack: &[String], local: &str, element: &BytesStart<'_>) {
    let parent = stack.last().map(String::as_str);
    match (parent, local) {
        (Some("resourcetype"), "calendar") => response.is_calendar = true,
        (Some("supported-calendar-component-set"), "comp") => {
            if let Ok(Some(attr)) = element.try_get_attribute("name")
                && let Ok(value) = attr.unescape_value()
            {
                response.components.push(value.into_owned());
            }
        }
        _ => {}
    }
}

fn apply_text(response: &mut DavResponse, stack: &[String], text: &str) {
    let Some(element) = stack.last().map(String::as_str) else {
        return;
    };
    let parent = stack.len().checked_sub(2).map(|i| stack[i].as_str());

    match (parent, element) {
        (Some("response"), "href") => response.href.push_str(text),
        (Some("current-user-principal"), "href") => {
            response.principal_href.get_or_insert_with(String::new).push_str(text)
        }
        (Some("calendar-home-set"), "href") => {
            response.home_set_href.get_or_insert_with(String::new).push_str(text)
        }
        (_, "displayname") => response.display_name.get_or_insert_with(String::new).push_str(text),
        (_, "calendar-data") => response.calendar_data.get_or_insert_with(String::new).push_str(text),
        _ => {}
    }
}

/// Formats a UTC instant for CalDAV time-range attributes.
pub fn format_icalendar_datetime(dt: DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn propfind_body_lists_props() {
        let body = propfind_body(&["d:displayname", "d:resourcetype"]).unwrap();
        assert!(body.starts_with("<d:propfind"));
        assert!(body.contains(r#"xmlns:d="DAV:""#));
        assert!(body.contains("<d:displayname/>"));
        assert!(body.contains("<d:resourcetype/>"));
    }

    #[test]
    fn calendar_query_has_time_range_and_expand() {
        let window = TimeWindow::try_new(
            Utc.with_ymd_and_hms(2025, 2, 5, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 2, 6, 0, 0, 0).unwrap(),
        )
        .unwrap();
        let body = calendar_query_body(&window).unwrap();
        assert!(body.contains("<c:calendar-query"));
        assert!(body.contains(r#"<c:expand start="20250205T000000Z" end="20250206T000000Z"/>"#));
        assert!(body.contains(r#"<c:time-range start="20250205T000000Z" end="20250206T000000Z"/>"#));
        assert!(body.contains(r#"name="VEVENT""#));
    }

    #[test]
    fn parse_principal_and_home_set() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<d:multistatus xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">
  <d:response>
    <d:href>/</d:href>
    <d:propstat>
      <d:prop>
        <d:current-user-principal><d:href>/1234/principal/</d:href></d:current-user-principal>
        <c:calendar-home-set><d:href>https://p42-caldav.icloud.com/1234/calendars/</d:href></c:calendar-home-set>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>"#;

        let responses = parse_multistatus(xml).unwrap();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].href, "/");
        assert_eq!(responses[0].principal_href.as_deref(), Some("/1234/principal/"));
        assert_eq!(
            responses[0].home_set_href.as_deref(),
            Some("https://p42-caldav.icloud.com/1234/calendars/")
        );
    }

    #[test]
    fn parse_calendar_collections() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<d:multistatus xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">
  <d:response>
    <d:href>/1234/calendars/</d:href>
    <d:propstat><d:prop><d:resourcetype><d:collection/></d:resourcetype></d:prop></d:propstat>
  </d:response>
  <d:response>
    <d:href>/1234/calendars/home/</d:href>
    <d:propstat>
      <d:prop>
        <d:displayname>Home</d:displayname>
        <d:resourcetype><d:collection/><c:calendar/></d:resourcetype>
        <c:supported-calendar-component-set><c:comp name="VEVENT"/></c:supported-calendar-component-set>
      </d:prop>
    </d:propstat>
  </d:response>
  <d:response>
    <d:href>/1234/calendars/tasks/</d:href>
    <d:propstat>
      <d:prop>
        <d:displayname>Reminders</d:displayname>
        <d:resourcetype><d:collection/><c:calendar/></d:resourcetype>
        <c:supported-calendar-component-set><c:comp name="VTODO"/></c:supported-calendar-component-set>
      </d:prop>
    </d:propstat>
  </d:response>
</d:multistatus>"#;

        let responses = parse_multistatus(xml).unwrap();
        assert_eq!(responses.len(), 3);
        assert!(!responses[0].is_calendar);
        assert!(responses[1].is_event_calendar());
        assert_eq!(responses[1].display_name.as_deref(), Some("Home"));
        assert!(responses[2].is_calendar);
        assert!(!responses[2].is_event_calendar());
    }

    #[test]
    fn parse_calendar_data_in_cdata() {
        let xml = "<d:multistatus xmlns:d=\"DAV:\" xmlns:c=\"urn:ietf:params:xml:ns:caldav\">\
            <d:response><d:href>/cal/a.ics</d:href><d:propstat><d:prop>\
            <c:calendar-data><![CDATA[BEGIN:VCALENDAR\r\nEND:VCALENDAR]]></c:calendar-data>\
            </d:prop></d:propstat></d:response></d:multistatus>";

        let responses = parse_multistatus(xml).unwrap();
        assert_eq!(
            responses[0].calendar_data.as_deref(),
            Some("BEGIN:VCALENDAR\r\nEND:VCALENDAR")
        );
    }

    #[test]
    fn rejects_non_multistatus() {
        assert!(parse_multistatus("<html><body>Sign in</body></html>").is_err());
        assert!(parse_multistatus("<a></b>").is_err());
    }

    #[test]
    fn format_datetime() {
        let dt = Utc.with_ymd_and_hms(2025, 2, 5, 14, 30, 0).unwrap();
        assert_eq!(format_icalendar_datetime(dt), "20250205T143000Z");
    }
}
