//! # Clarion Date and Time Conversion
//!
//! TopSpeed stores temporal values in Clarion's standard formats:
//!
//! - **DATE**: u32 day count with day 1 = 1800-12-29, i.e. an epoch of
//!   1800-12-28. Zero is the blank date.
//! - **TIME**: u32 centiseconds since midnight **plus one**, so 1 means
//!   00:00:00.00 and zero is the blank time.
//!
//! Both project to ISO-8601 text columns (`YYYY-MM-DD`, `HH:MM:SS.cc`);
//! blanks project to NULL.

use chrono::{Days, NaiveDate};

const EPOCH_YEAR: i32 = 1800;
const EPOCH_MONTH: u32 = 12;
const EPOCH_DAY: u32 = 28;

const CENTIS_PER_SECOND: u32 = 100;
const CENTIS_PER_MINUTE: u32 = 60 * CENTIS_PER_SECOND;
const CENTIS_PER_HOUR: u32 = 60 * CENTIS_PER_MINUTE;
const CENTIS_PER_DAY: u32 = 24 * CENTIS_PER_HOUR;

fn clarion_epoch() -> NaiveDate {
    // the construction is infallible for the fixed epoch constants
    NaiveDate::from_ymd_opt(EPOCH_YEAR, EPOCH_MONTH, EPOCH_DAY)
        .unwrap_or(NaiveDate::MIN)
}

/// Converts a Clarion day count to an ISO date. Zero and unrepresentable
/// counts are blank.
pub fn decode_date(days: u32) -> Option<String> {
    if days == 0 {
        return None;
    }
    clarion_epoch()
        .checked_add_days(Days::new(days as u64))
        .map(|date| date.format("%Y-%m-%d").to_string())
}

/// Converts a Clarion time (centiseconds + 1) to `HH:MM:SS.cc`. Zero and
/// values past the end of the day are blank.
pub fn decode_time(raw: u32) -> Option<String> {
    if raw == 0 {
        return None;
    }
    let centis = raw - 1;
    if centis >= CENTIS_PER_DAY {
        return None;
    }

    let hours = centis / CENTIS_PER_HOUR;
    let minutes = (centis % CENTIS_PER_HOUR) / CENTIS_PER_MINUTE;
    let seconds = (centis % CENTIS_PER_MINUTE) / CENTIS_PER_SECOND;
    let hundredths = centis % CENTIS_PER_SECOND;

    Some(format!(
        "{:02}:{:02}:{:02}.{:02}",
        hours, minutes, seconds, hundredths
    ))
}

/// Day count for a calendar date; the inverse of [`decode_date`]. Returns
/// `None` for dates at or before the epoch.
pub fn encode_date(year: i32, month: u32, day: u32) -> Option<u32> {
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let days = date.signed_duration_since(clarion_epoch()).num_days();
    if days <= 0 {
        return None;
    }
    Some(days as u32)
}

/// Clarion time value for a wall-clock time; the inverse of
/// [`decode_time`].
pub fn encode_time(hours: u32, minutes: u32, seconds: u32, hundredths: u32) -> u32 {
    hours * CENTIS_PER_HOUR
        + minutes * CENTIS_PER_MINUTE
        + seconds * CENTIS_PER_SECOND
        + hundredths
        + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_one_is_december_29_1800() {
        assert_eq!(decode_date(1).as_deref(), Some("1800-12-29"));
    }

    #[test]
    fn day_four_is_new_year_1801() {
        assert_eq!(decode_date(4).as_deref(), Some("1801-01-01"));
    }

    #[test]
    fn zero_date_is_blank() {
        assert_eq!(decode_date(0), None);
    }

    #[test]
    fn date_roundtrip() {
        let raw = encode_date(1997, 3, 15).unwrap();
        assert_eq!(decode_date(raw).as_deref(), Some("1997-03-15"));

        let raw = encode_date(2024, 2, 29).unwrap();
        assert_eq!(decode_date(raw).as_deref(), Some("2024-02-29"));
    }

    #[test]
    fn epoch_and_earlier_do_not_encode() {
        assert_eq!(encode_date(1800, 12, 28), None);
        assert_eq!(encode_date(1799, 1, 1), None);
    }

    #[test]
    fn time_one_is_midnight() {
        assert_eq!(decode_time(1).as_deref(), Some("00:00:00.00"));
    }

    #[test]
    fn zero_time_is_blank() {
        assert_eq!(decode_time(0), None);
    }

    #[test]
    fn time_roundtrip() {
        let raw = encode_time(13, 45, 30, 25);
        assert_eq!(decode_time(raw).as_deref(), Some("13:45:30.25"));
    }

    #[test]
    fn last_centisecond_of_day_decodes() {
        let raw = encode_time(23, 59, 59, 99);
        assert_eq!(decode_time(raw).as_deref(), Some("23:59:59.99"));
        // one past the end of the day is blank
        assert_eq!(decode_time(raw + 1), None);
    }
}
