//! Time primitives: capture timestamps, calendar buckets and display labels.
//!
//! Timestamps keep the offset they were written with. Calendar fields (year,
//! month, day key) are read in that offset, so a key always matches the date
//! prefix of the raw ISO-8601 string.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

pub type Timestamp = DateTime<FixedOffset>;

pub const MONTHS_FR: [&str; 12] = [
    "janvier",
    "février",
    "mars",
    "avril",
    "mai",
    "juin",
    "juillet",
    "août",
    "septembre",
    "octobre",
    "novembre",
    "décembre",
];

/// Parses an ISO-8601 capture timestamp.
///
/// Accepts RFC 3339, offset-less date-times (read as UTC) and bare dates
/// (midnight UTC). Anything else yields `None`.
pub fn parse_timestamp(raw: &str) -> Option<Timestamp> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc().fixed_offset());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(naive.and_utc().fixed_offset());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().fixed_offset())
}

/// Calendar resolution of a timeline bucket.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[default]
    Day,
    Month,
}

/// Sortable calendar bucket: `YYYY-MM-DD` for days, `YYYY-MM` for months.
///
/// Lexicographic order equals chronological order for four-digit years.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BucketKey(String);

impl BucketKey {
    pub fn of(ts: &Timestamp, granularity: Granularity) -> Self {
        match granularity {
            Granularity::Day => BucketKey(format!(
                "{:04}-{:02}-{:02}",
                ts.year(),
                ts.month(),
                ts.day()
            )),
            Granularity::Month => BucketKey(format!("{:04}-{:02}", ts.year(), ts.month())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Human label, e.g. `1 janvier 2024` or `janvier 2024`.
    pub fn label(&self) -> String {
        if let Ok(d) = NaiveDate::parse_from_str(&self.0, "%Y-%m-%d") {
            return format!("{} {} {}", d.day(), MONTHS_FR[d.month0() as usize], d.year());
        }
        if let Some((y, m)) = self.0.split_once('-')
            && let (Ok(year), Ok(month)) = (y.parse::<i32>(), m.parse::<u32>())
            && (1..=12).contains(&month)
        {
            return format_month_year(year, month - 1);
        }
        self.0.clone()
    }
}

impl std::fmt::Display for BucketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// `1 janvier 2024`
pub fn format_long_date(ts: &Timestamp) -> String {
    format!(
        "{} {} {}",
        ts.day(),
        MONTHS_FR[ts.month0() as usize],
        ts.year()
    )
}

/// `10:05`
pub fn format_clock(ts: &Timestamp) -> String {
    format!("{:02}:{:02}", ts.hour(), ts.minute())
}

/// `janvier 2024`; out-of-range months fall back to the bare year.
pub fn format_month_year(year: i32, month0: u32) -> String {
    match MONTHS_FR.get(month0 as usize) {
        Some(name) => format!("{name} {year}"),
        None => year.to_string(),
    }
}

/// Minutes since local midnight, in the timestamp's own offset.
pub fn minutes_of_day(ts: &Timestamp) -> u32 {
    ts.hour() * 60 + ts.minute()
}

#[cfg(test)]
mod tests {
    use super::{BucketKey, Granularity, format_clock, format_long_date, parse_timestamp};
    use chrono::Datelike;

    #[test]
    fn parses_rfc3339_and_keeps_offset() {
        let ts = parse_timestamp("2024-01-01T23:30:00+02:00").unwrap();
        assert_eq!(ts.day(), 1);
        assert_eq!(BucketKey::of(&ts, Granularity::Day).as_str(), "2024-01-01");
    }

    #[test]
    fn parses_naive_and_date_only_forms() {
        assert!(parse_timestamp("2023-06-10T08:15:00.123").is_some());
        assert!(parse_timestamp("2023-06-10").is_some());
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn bucket_keys_sort_chronologically() {
        let a = parse_timestamp("2023-12-31T10:00:00Z").unwrap();
        let b = parse_timestamp("2024-01-02T10:00:00Z").unwrap();
        assert!(BucketKey::of(&a, Granularity::Month) < BucketKey::of(&b, Granularity::Month));
        assert_eq!(BucketKey::of(&b, Granularity::Month).as_str(), "2024-01");
    }

    #[test]
    fn french_labels() {
        let ts = parse_timestamp("2024-08-01T09:05:00Z").unwrap();
        assert_eq!(format_long_date(&ts), "1 août 2024");
        assert_eq!(format_clock(&ts), "09:05");
        assert_eq!(BucketKey::of(&ts, Granularity::Day).label(), "1 août 2024");
        assert_eq!(BucketKey::of(&ts, Granularity::Month).label(), "août 2024");
    }
}
