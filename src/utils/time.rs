//! Time utilities for local-time rule checks and overlap arithmetic

use chrono::{DateTime, Datelike, Days, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

/// Convert a UTC instant into the configured local timezone
pub fn to_local(tz: Tz, dt: DateTime<Utc>) -> DateTime<Tz> {
    dt.with_timezone(&tz)
}

/// Day of week with Monday as 0, as used by rule day filters
pub fn weekday_index(local: &DateTime<Tz>) -> u32 {
    local.weekday().num_days_from_monday()
}

/// Local midnight of `date`, falling back to UTC midnight when it doesn't exist
pub fn local_midnight(tz: Tz, date: NaiveDate) -> DateTime<Utc> {
    let naive = date.and_hms_opt(0, 0, 0).unwrap_or_default();
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

/// Latest begin time for "the next N days": local midnight of today + N + 1.
/// `None` when no horizon applies (N == 0) or the limit lies past the last
/// representable date.
pub fn event_horizon(now: DateTime<Utc>, tz: Tz, max_days_in_future: u32) -> Option<DateTime<Utc>> {
    if max_days_in_future == 0 {
        return None;
    }
    let today = to_local(tz, now).date_naive();
    let limit = today.checked_add_days(Days::new(u64::from(max_days_in_future) + 1))?;
    Some(local_midnight(tz, limit))
}

/// `begin - before` and `end + after`, both in seconds. Negative values
/// narrow the window. `None` when either bound is out of range.
pub fn widen_window(
    begin: DateTime<Utc>,
    end: DateTime<Utc>,
    before: i64,
    after: i64,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let begin = begin.checked_sub_signed(Duration::try_seconds(before)?)?;
    let end = end.checked_add_signed(Duration::try_seconds(after)?)?;
    Some((begin, end))
}

/// Overlap between an existing recording window and an event window.
///
/// Only the leading edge that falls inside the other window is considered,
/// which is what time-based binding compares against.
pub fn overlap_seconds(
    timer_begin: DateTime<Utc>,
    timer_end: DateTime<Utc>,
    begin: DateTime<Utc>,
    end: DateTime<Utc>,
) -> i64 {
    if begin <= timer_begin && timer_begin <= end {
        (end - timer_begin).num_seconds()
    } else if timer_begin <= begin && begin <= timer_end {
        (timer_end - begin).num_seconds()
    } else {
        0
    }
}

/// Compact local timestamp used in conflict descriptions
pub fn format_compact(tz: Tz, dt: DateTime<Utc>) -> String {
    to_local(tz, dt).format("%Y%m%d %H%M").to_string()
}
