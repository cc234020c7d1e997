//! Provider item decoding and the time-window filter.
//!
//! Each adapter has its own wire type implementing [`DecodeEvent`]. The
//! [`normalize_items`] pipeline decodes a page of items, keeps events that
//! lie strictly inside the window, and records a [`MalformedItem`] for every
//! item that fails instead of dropping the page.

use huddle_core::{CanonicalEvent, TimeWindow};
use tracing::{debug, warn};

use crate::provider::{EventListing, MalformedItem};

/// Converts a provider-native item into a [`CanonicalEvent`].
pub trait DecodeEvent {
    /// Returns `Ok(None)` when the item is intentionally skipped (cancelled,
    /// marked free) and `Err(reason)` when it cannot be decoded.
    fn decode(self) -> Result<Option<CanonicalEvent>, String>;
}

/// Items that already failed upstream (for example at the JSON or ICS
/// layer) carry their reason through.
impl<T: DecodeEvent> DecodeEvent for Result<T, String> {
    fn decode(self) -> Result<Option<CanonicalEvent>, String> {
        self.and_then(DecodeEvent::decode)
    }
}

/// Returns true if the event is retained for `window`.
///
/// Both bounds are exclusive and nothing is clipped: an event touching or
/// crossing `time_min` or `time_max` is dropped.
pub fn within_window(event: &CanonicalEvent, window: &TimeWindow) -> bool {
    window.strictly_contains(event.start(), event.end())
}

/// Decodes and filters one page of provider items.
pub fn normalize_items<I>(items: I, window: &TimeWindow) -> EventListing
where
    I: IntoIterator,
    I::Item: DecodeEvent,
{
    let mut listing = EventListing::default();
    let mut skipped = 0usize;
    let mut outside = 0usize;

    for (index, item) in items.into_iter().enumerate() {
        match item.decode() {
            Ok(Some(event)) if within_window(&event, window) => listing.events.push(event),
            Ok(Some(_)) => outside += 1,
            Ok(None) => skipped += 1,
            Err(reason) => {
                warn!(index, reason = %reason, "skipping malformed calendar item");
                listing.malformed.push(MalformedItem { index, reason });
            }
        }
    }

    debug!(
        kept = listing.events.len(),
        skipped,
        outside,
        malformed = listing.malformed.len(),
        "normalized provider items"
    );
    listing
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    struct Item(Option<(DateTime<Utc>, DateTime<Utc>)>);

    impl DecodeEvent for Item {
        fn decode(self) -> Result<Option<CanonicalEvent>, String> {
            match self.0 {
                Some((start, end)) => CanonicalEvent::try_new("busy", start, end)
                    .map(Some)
                    .map_err(|e| e.to_string()),
                None => Ok(None),
            }
        }
    }

    fn window() -> TimeWindow {
        TimeWindow::try_new(utc(2024, 1, 1, 0), utc(2024, 1, 2, 0)).unwrap()
    }

    #[test]
    fn boundary_filter() {
        let items = vec![
            // crosses time_min
            Item(Some((utc(2023, 12, 31, 23), utc(2024, 1, 1, 1)))),
            // starts exactly at time_min
            Item(Some((utc(2024, 1, 1, 0), utc(2024, 1, 1, 1)))),
            // ends exactly at time_max
            Item(Some((utc(2024, 1, 1, 23), utc(2024, 1, 2, 0)))),
            // strictly inside
            Item(Some((utc(2024, 1, 1, 9), utc(2024, 1, 1, 10)))),
            // crosses time_max
            Item(Some((utc(2024, 1, 1, 23), utc(2024, 1, 2, 1)))),
        ];

        let listing = normalize_items(items, &window());
        assert_eq!(listing.events.len(), 1);
        assert_eq!(listing.events[0].start(), utc(2024, 1, 1, 9));
        assert!(listing.is_clean());
    }

    #[test]
    fn malformed_items_do_not_drop_the_batch() {
        let items: Vec<Result<Item, String>> = vec![
            Ok(Item(Some((utc(2024, 1, 1, 9), utc(2024, 1, 1, 10))))),
            Err("missing start".to_string()),
            Ok(Item(Some((utc(2024, 1, 1, 12), utc(2024, 1, 1, 11))))),
            Ok(Item(None)),
            Ok(Item(Some((utc(2024, 1, 1, 14), utc(2024, 1, 1, 15))))),
        ];

        let listing = normalize_items(items, &window());
        assert_eq!(listing.events.len(), 2);
        assert_eq!(
            listing
                .malformed
                .iter()
                .map(|m| m.index)
                .collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(listing.malformed[0].reason, "missing start");
    }
}
