//! Timestamp helpers for Graph API values.

use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

/// `2024-05-01T19:00:00+0000`, the API's event time format.
const GRAPH_DATETIME: &[BorrowedFormatItem<'static>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second][offset_hour sign:mandatory][offset_minute]"
);

/// All-day events only carry a date.
const GRAPH_DATE: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Parse an event `start_time`/`end_time`. Date-only values resolve to
/// midnight UTC.
pub fn parse_graph_time(value: &str) -> Option<OffsetDateTime> {
    if let Ok(t) = OffsetDateTime::parse(value, GRAPH_DATETIME) {
        return Some(t);
    }
    if let Ok(t) = OffsetDateTime::parse(value, &Rfc3339) {
        return Some(t);
    }
    time::Date::parse(value, GRAPH_DATE)
        .ok()
        .map(|d| d.midnight().assume_utc())
}

pub fn unix_millis(t: OffsetDateTime) -> i64 {
    (t.unix_timestamp_nanos() / 1_000_000) as i64
}

pub fn now_millis() -> i64 {
    unix_millis(OffsetDateTime::now_utc())
}
