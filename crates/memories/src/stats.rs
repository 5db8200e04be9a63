//! Collection statistics for the dashboard.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, NaiveDate};
use foundation::{LonLat, format_month_year, minutes_of_day, parse_timestamp};
use serde::Serialize;

use crate::{MemoryRecord, Location};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthCount {
    pub year: i32,
    pub month0: u32,
    pub label: String,
    pub count: usize,
}

/// Country / region counts produced by geo attribution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GeoCounts {
    pub countries: usize,
    pub regions: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total: usize,
    /// Share of unique moments with at least one on-time capture, rounded.
    pub punctuality_percent: u32,
    pub longest_streak: usize,
    /// Capitalized, e.g. `Mars 2024`; `-` when nothing is dated.
    pub best_month: String,
    pub best_month_count: usize,
    /// `10H05`, or `--:--` when nothing is dated.
    pub average_time: String,
    pub monthly: Vec<MonthCount>,
    pub geo: GeoCounts,
}

impl Statistics {
    pub fn compute(records: &[MemoryRecord], geo: GeoCounts) -> Self {
        let (best_month, best_month_count, monthly) = month_stats(records);
        Self {
            total: records.len(),
            punctuality_percent: punctuality_percent(records),
            longest_streak: longest_streak(records),
            best_month,
            best_month_count,
            average_time: average_time(records),
            monthly,
            geo,
        }
    }
}

/// Longest run of consecutive calendar days, read from the `date` field.
pub fn longest_streak(records: &[MemoryRecord]) -> usize {
    let days: BTreeSet<NaiveDate> = records
        .iter()
        .filter_map(|r| r.date.as_deref())
        .filter_map(|d| d.split('T').next())
        .filter_map(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        .collect();

    let mut best = 0;
    let mut run = 0;
    let mut prev: Option<NaiveDate> = None;
    for day in days {
        run = match prev {
            Some(p) if (day - p).num_days() == 1 => run + 1,
            _ => 1,
        };
        best = best.max(run);
        prev = Some(day);
    }
    best
}

fn punctuality_key(r: &MemoryRecord) -> Option<&str> {
    r.bereal_moment
        .as_deref()
        .filter(|s| !s.is_empty())
        .or_else(|| r.taken_time.as_deref().and_then(|t| t.split('T').next()))
}

pub fn punctuality_percent(records: &[MemoryRecord]) -> u32 {
    let mut moments: BTreeMap<Option<&str>, bool> = BTreeMap::new();
    for r in records {
        let on_time = moments.entry(punctuality_key(r)).or_insert(false);
        *on_time |= r.is_late == Some(false);
    }
    if moments.is_empty() {
        return 0;
    }
    let on_time = moments.values().filter(|&&v| v).count();
    ((on_time as f64 / moments.len() as f64) * 100.0).round() as u32
}

fn month_stats(records: &[MemoryRecord]) -> (String, usize, Vec<MonthCount>) {
    // First-seen order decides ties for the best month.
    let mut order: Vec<(i32, u32)> = Vec::new();
    let mut counts: BTreeMap<(i32, u32), usize> = BTreeMap::new();
    for ts in records
        .iter()
        .filter_map(|r| r.taken_time.as_deref().and_then(parse_timestamp))
    {
        let key = (ts.year(), ts.month0());
        let count = counts.entry(key).or_insert(0);
        if *count == 0 {
            order.push(key);
        }
        *count += 1;
    }

    let mut best = None;
    let mut best_count = 0;
    for key in &order {
        let count = counts.get(key).copied().unwrap_or(0);
        if count > best_count {
            best_count = count;
            best = Some(*key);
        }
    }
    let best_name = best
        .map(|(y, m)| capitalize(&format_month_year(y, m)))
        .unwrap_or_else(|| "-".to_string());

    let monthly = counts
        .into_iter()
        .map(|((year, month0), count)| MonthCount {
            year,
            month0,
            label: format_month_year(year, month0),
            count,
        })
        .collect();
    (best_name, best_count, monthly)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn average_time(records: &[MemoryRecord]) -> String {
    let minutes: Vec<u32> = records
        .iter()
        .filter_map(|r| r.taken_time.as_deref().and_then(parse_timestamp))
        .map(|ts| minutes_of_day(&ts))
        .collect();
    if minutes.is_empty() {
        return "--:--".to_string();
    }
    let avg = minutes.iter().map(|&m| m as f64).sum::<f64>() / minutes.len() as f64;
    let rounded = avg.round() as u32;
    format!("{}H{:02}", rounded / 60, rounded % 60)
}

/// Records carrying a non-zero GPS fix on both axes.
pub fn geo_points(records: &[MemoryRecord]) -> Vec<LonLat> {
    records
        .iter()
        .filter_map(|r| r.location.as_ref())
        .map(Location::components)
        .filter(|(lon, lat)| lon.is_finite() && lat.is_finite() && *lon != 0.0 && *lat != 0.0)
        .map(|(lon, lat)| LonLat::new(lon, lat))
        .collect()
}

/// Statistics memoized per collection version, with explicit invalidation.
#[derive(Debug, Default)]
pub struct StatsCache {
    entry: Option<(u64, Statistics)>,
}

impl StatsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, version: u64) -> Option<&Statistics> {
        match &self.entry {
            Some((v, stats)) if *v == version => Some(stats),
            _ => None,
        }
    }

    pub fn store(&mut self, version: u64, stats: Statistics) -> &Statistics {
        &self.entry.insert((version, stats)).1
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }

    pub fn is_empty(&self) -> bool {
        self.entry.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn records(json: &str) -> Vec<MemoryRecord> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn streak_counts_consecutive_distinct_days() {
        let recs = records(
            r#"[{"date":"2024-01-01T00:00:00Z"},{"date":"2024-01-02"},{"date":"2024-01-02"},
                {"date":"2024-01-03"},{"date":"2024-01-10"},{"date":"2024-01-11"},{}]"#,
        );
        assert_eq!(longest_streak(&recs), 3);
        assert_eq!(longest_streak(&[]), 0);
    }

    #[test]
    fn punctuality_is_per_moment() {
        let recs = records(
            r#"[{"berealMoment":"a","isLate":false},{"berealMoment":"a","isLate":true},
                {"berealMoment":"b","isLate":true},
                {"takenTime":"2024-01-05T10:00:00Z","isLate":false},
                {"takenTime":"2024-01-05T18:00:00Z","isLate":true}]"#,
        );
        // a on time, b late, 2024-01-05 on time.
        assert_eq!(punctuality_percent(&recs), 67);
        assert_eq!(punctuality_percent(&[]), 0);
    }

    #[test]
    fn best_month_tie_goes_to_first_seen() {
        let recs = records(
            r#"[{"takenTime":"2024-03-01T09:00:00Z"},{"takenTime":"2024-01-01T11:00:00Z"},
                {"takenTime":"2024-01-02T11:10:00Z"},{"takenTime":"2024-03-02T09:20:00Z"}]"#,
        );
        let stats = Statistics::compute(&recs, GeoCounts::default());
        assert_eq!(stats.best_month, "Mars 2024");
        assert_eq!(stats.best_month_count, 2);
        let labels: Vec<_> = stats.monthly.iter().map(|m| m.label.as_str()).collect();
        assert_eq!(labels, vec!["janvier 2024", "mars 2024"]);
        assert_eq!(stats.average_time, "10H08");
    }

    #[test]
    fn empty_collection_has_placeholders() {
        let stats = Statistics::compute(&[], GeoCounts::default());
        assert_eq!(stats.best_month, "-");
        assert_eq!(stats.average_time, "--:--");
        assert_eq!(stats.total, 0);
    }

    #[test]
    fn geo_points_need_both_axes() {
        let recs = records(
            r#"[{"location":{"latitude":48.8,"longitude":2.3}},
                {"location":{"latitude":0,"longitude":2.3}},
                {"location":{"latitude":"45.1","longitude":"4.8"}},{}]"#,
        );
        assert_eq!(
            geo_points(&recs),
            vec![LonLat::new(2.3, 48.8), LonLat::new(4.8, 45.1)]
        );
    }

    #[test]
    fn cache_is_keyed_by_version_and_invalidated_explicitly() {
        let mut cache = StatsCache::new();
        cache.store(3, Statistics::compute(&[], GeoCounts::default()));
        assert!(cache.get(3).is_some());
        assert!(cache.get(4).is_none());
        cache.invalidate();
        assert!(cache.get(3).is_none());
    }
}
