//! IST (Indian Standard Time)-anchored clock and trading-date helpers.
//!
//! India Standard Time is a fixed UTC+5:30 offset with no daylight-saving
//! transitions, so a [`chrono::FixedOffset`] is sufficient — no timezone
//! database dependency is needed.

use chrono::{DateTime, FixedOffset, NaiveTime, TimeZone, Utc, Weekday};

/// The IST UTC offset, +05:30.
fn ist_offset() -> FixedOffset {
    FixedOffset::east_opt(5 * 3600 + 30 * 60).expect("IST offset is a valid fixed offset")
}

/// The current wall-clock instant, in IST.
pub fn now_ist() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&ist_offset())
}

/// Converts a broker timestamp (milliseconds since the Unix epoch, UTC) into
/// IST.
pub fn from_epoch_millis(ts_ms: i64) -> Option<DateTime<FixedOffset>> {
    Utc.timestamp_millis_opt(ts_ms)
        .single()
        .map(|dt| dt.with_timezone(&ist_offset()))
}

/// The trading date (`YYYY-MM-DD`, IST calendar date) for a given broker
/// timestamp.
///
/// This is always derived from the event's own timestamp, never from a
/// shared "current trading date" pointer — see [`crate::state::TradingDateTracker`]
/// for the separate, monotonic, process-wide pointer that is updated as a
/// side effect of this same computation.
pub fn trading_date_for(ts_ms: i64) -> Option<String> {
    from_epoch_millis(ts_ms).map(|dt| dt.format("%Y-%m-%d").to_string())
}

/// The trading date for "now", in IST.
pub fn trading_date_now() -> String {
    now_ist().format("%Y-%m-%d").to_string()
}

/// Whether the given IST instant falls within regular market hours
/// (09:15–15:30 IST, Monday–Friday).
pub fn is_market_hours(at: DateTime<FixedOffset>) -> bool {
    if matches!(at.weekday(), Weekday::Sat | Weekday::Sun) {
        return false;
    }
    let open = NaiveTime::from_hms_opt(9, 15, 0).expect("valid time");
    let close = NaiveTime::from_hms_opt(15, 30, 0).expect("valid time");
    let t = at.time();
    t >= open && t <= close
}

/// The next occurrence of 08:00 IST strictly after `from`.
///
/// If `from` is already past today's 08:00, returns tomorrow's 08:00;
/// otherwise returns today's 08:00.
pub fn next_master_data_deadline(
    from: DateTime<FixedOffset>,
    hour: u32,
) -> DateTime<FixedOffset> {
    let today_deadline = from
        .date_naive()
        .and_hms_opt(hour, 0, 0)
        .expect("valid hour")
        .and_local_timezone(*from.offset())
        .single()
        .expect("unambiguous offset for a fixed-offset timezone");

    if from >= today_deadline {
        today_deadline + chrono::Duration::days(1)
    } else {
        today_deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trading_date_for_known_timestamp() {
        // 2023-11-14T23:20:00Z == 2023-11-15T04:50:00+05:30
        let ts_ms = 1_700_000_400_000;
        assert_eq!(trading_date_for(ts_ms).as_deref(), Some("2023-11-15"));
    }

    #[test]
    fn trading_date_for_zero_is_epoch_date() {
        assert_eq!(trading_date_for(0).as_deref(), Some("1970-01-01"));
    }

    #[test]
    fn next_deadline_rolls_to_tomorrow_once_past() {
        let offset = ist_offset();
        let after_deadline = offset
            .with_ymd_and_hms(2024, 3, 1, 9, 0, 0)
            .single()
            .unwrap();
        let next = next_master_data_deadline(after_deadline, 8);
        assert_eq!(next.date_naive(), chrono::NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());
    }

    #[test]
    fn next_deadline_stays_today_if_before() {
        let offset = ist_offset();
        let before_deadline = offset
            .with_ymd_and_hms(2024, 3, 1, 7, 0, 0)
            .single()
            .unwrap();
        let next = next_master_data_deadline(before_deadline, 8);
        assert_eq!(next.date_naive(), chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    }

    #[test]
    fn market_hours_weekday_window() {
        let offset = ist_offset();
        let during = offset.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).single().unwrap(); // Monday
        let before_open = offset.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).single().unwrap();
        let weekend = offset.with_ymd_and_hms(2024, 3, 2, 10, 0, 0).single().unwrap(); // Saturday
        assert!(is_market_hours(during));
        assert!(!is_market_hours(before_open));
        assert!(!is_market_hours(weekend));
    }
}
