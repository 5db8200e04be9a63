//! Compound year / month / timing filters.
//!
//! Filtering runs on raw records (as index selections into the collection)
//! before normalization. Bonus status is always derived from the full
//! collection so a record never becomes "first of its moment" just because a
//! sibling was filtered out.

use std::collections::BTreeSet;

use chrono::Datelike;
use foundation::{BucketKey, Granularity, parse_timestamp};
use serde::{Deserialize, Serialize};

use crate::{MemoryRecord, RecordCollection};

pub const MONTH_LABELS: [&str; 12] = [
    "Jan", "Fév", "Mar", "Avr", "Mai", "Juin", "Juil", "Aoû", "Sep", "Oct", "Nov", "Déc",
];
const MONTH_SHORT: [&str; 12] = [
    "J", "F", "M", "Av", "Ma", "Jn", "Jl", "Ao", "S", "O", "N", "D",
];

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timing {
    #[default]
    All,
    OnTime,
    Late,
    Bonus,
}

impl Timing {
    pub fn label(self) -> Option<&'static str> {
        match self {
            Timing::All => None,
            Timing::OnTime => Some("BeReal"),
            Timing::Late => Some("BeLate"),
            Timing::Bonus => Some("BeBonus"),
        }
    }

    fn emoji(self) -> Option<&'static str> {
        match self {
            Timing::All => None,
            Timing::OnTime => Some("⏱️"),
            Timing::Late => Some("🐌"),
            Timing::Bonus => Some("🎁"),
        }
    }
}

/// Empty `years`/`months` mean no restriction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterState {
    pub years: BTreeSet<String>,
    pub months: BTreeSet<u32>,
    pub timing: Timing,
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the year is selected after the toggle.
    pub fn toggle_year(&mut self, year: &str) -> bool {
        if self.years.remove(year) {
            return false;
        }
        self.years.insert(year.to_string());
        true
    }

    /// Month is 0-indexed; out-of-range values are ignored.
    pub fn toggle_month(&mut self, month0: u32) -> bool {
        if month0 > 11 {
            return false;
        }
        if self.months.remove(&month0) {
            return false;
        }
        self.months.insert(month0);
        true
    }

    /// Selecting the already active option returns to [`Timing::All`].
    pub fn select_timing(&mut self, timing: Timing) {
        self.timing = if self.timing == timing { Timing::All } else { timing };
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_active(&self) -> bool {
        !self.years.is_empty() || !self.months.is_empty() || self.timing != Timing::All
    }

    /// Readable description, e.g. `2023 · Jan, Fév · BeLate`. Empty when inactive.
    pub fn summary(&self) -> String {
        self.summary_candidates()
            .into_iter()
            .next()
            .unwrap_or_default()
    }

    /// Most readable description that fits in `max_chars`, or `…`.
    pub fn compact_summary(&self, max_chars: usize) -> String {
        self.summary_candidates()
            .into_iter()
            .find(|c| !c.is_empty() && c.chars().count() <= max_chars)
            .unwrap_or_else(|| "…".to_string())
    }

    fn summary_candidates(&self) -> Vec<String> {
        let join = |parts: &[Option<&String>]| {
            parts
                .iter()
                .flatten()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(" · ")
        };
        let some = |cond: bool, s: String| cond.then_some(s);

        let has_y = !self.years.is_empty();
        let has_m = !self.months.is_empty();
        let has_t = self.timing != Timing::All;

        let y = some(has_y, self.years.iter().cloned().collect::<Vec<_>>().join(", "));
        let ys = some(
            has_y,
            self.years
                .iter()
                .map(|y| format!("'{}", y.get(2..).unwrap_or(y)))
                .collect::<Vec<_>>()
                .join(", "),
        );
        let m = some(
            has_m,
            self.months
                .iter()
                .filter_map(|&i| MONTH_LABELS.get(i as usize).copied())
                .collect::<Vec<_>>()
                .join(", "),
        );
        let ms = some(
            has_m,
            self.months
                .iter()
                .filter_map(|&i| MONTH_SHORT.get(i as usize).copied())
                .collect::<Vec<_>>()
                .join(","),
        );
        let t = self.timing.label().map(str::to_string);
        let te = self.timing.emoji().map(str::to_string);
        let (y, ys, m, ms) = (y.as_ref(), ys.as_ref(), m.as_ref(), ms.as_ref());
        let (t, te) = (t.as_ref(), te.as_ref());

        let combos: Vec<Vec<Option<&String>>> = match (has_y, has_m, has_t) {
            (true, true, true) => vec![
                vec![y, m, t],
                vec![y, m, te],
                vec![y, ms, te],
                vec![ys, m, te],
                vec![ys, ms, te],
            ],
            (true, false, true) => vec![vec![y, t], vec![y, te], vec![ys, t], vec![ys, te]],
            (false, true, true) => vec![vec![m, t], vec![m, te], vec![ms, te]],
            (true, true, false) => vec![vec![y, m], vec![y, ms], vec![ys, m], vec![ys, ms]],
            (false, false, true) => vec![vec![t], vec![te]],
            (true, false, false) => vec![vec![y], vec![ys]],
            (false, true, false) => vec![vec![m], vec![ms]],
            (false, false, false) => Vec::new(),
        };
        combos.iter().map(|parts| join(parts.as_slice())).collect()
    }
}

/// Per-record values derived once per collection version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFacts {
    pub year: Option<i32>,
    pub month0: Option<u32>,
    pub day_key: Option<BucketKey>,
    pub month_key: Option<BucketKey>,
    pub is_bonus: bool,
}

impl RecordFacts {
    pub fn has_timestamp(&self) -> bool {
        self.year.is_some()
    }

    pub fn bucket(&self, granularity: Granularity) -> Option<&BucketKey> {
        match granularity {
            Granularity::Day => self.day_key.as_ref(),
            Granularity::Month => self.month_key.as_ref(),
        }
    }
}

/// Single forward pass over the moment keys: the first record of each moment
/// is the on-time one, every later record of that moment is a bonus.
pub fn bonus_flags(records: &[MemoryRecord]) -> Vec<bool> {
    let mut seen: BTreeSet<Option<&str>> = BTreeSet::new();
    records.iter().map(|r| !seen.insert(r.moment_key())).collect()
}

pub fn derive_facts(records: &[MemoryRecord]) -> Vec<RecordFacts> {
    let bonus = bonus_flags(records);
    records
        .iter()
        .zip(bonus)
        .map(|(r, is_bonus)| {
            let ts = r.taken_time.as_deref().and_then(parse_timestamp);
            RecordFacts {
                year: ts.map(|t| t.year()),
                month0: ts.map(|t| t.month0()),
                day_key: ts.map(|t| BucketKey::of(&t, Granularity::Day)),
                month_key: ts.map(|t| BucketKey::of(&t, Granularity::Month)),
                is_bonus,
            }
        })
        .collect()
}

/// Predicate for one record. Records without a usable timestamp always pass.
pub fn matches(record: &MemoryRecord, facts: &RecordFacts, filter: &FilterState) -> bool {
    let (Some(year), Some(month0)) = (facts.year, facts.month0) else {
        return true;
    };
    if !filter.years.is_empty() && !filter.years.contains(&year.to_string()) {
        return false;
    }
    if !filter.months.is_empty() && !filter.months.contains(&month0) {
        return false;
    }
    match filter.timing {
        Timing::All => true,
        Timing::OnTime => record.is_late == Some(false) && !facts.is_bonus,
        Timing::Late => record.is_late == Some(true) && !facts.is_bonus,
        Timing::Bonus => facts.is_bonus,
    }
}

/// Filter engine with a fact cache keyed by the collection version.
///
/// Callers invalidate explicitly at every mutation site; the version key is a
/// second line that turns a forgotten invalidation into a recompute instead of
/// stale answers.
#[derive(Debug, Default)]
pub struct FilterEngine {
    cached_version: Option<u64>,
    facts: Vec<RecordFacts>,
    recomputations: u64,
}

impl FilterEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidate(&mut self) {
        self.cached_version = None;
        self.facts.clear();
    }

    pub fn is_warm_for(&self, collection: &RecordCollection) -> bool {
        self.cached_version == Some(collection.version()) && self.facts.len() == collection.len()
    }

    /// How many times facts were derived; used to observe memoization.
    pub fn recomputations(&self) -> u64 {
        self.recomputations
    }

    pub fn facts(&mut self, collection: &RecordCollection) -> &[RecordFacts] {
        if !self.is_warm_for(collection) {
            self.facts = derive_facts(collection.records());
            self.cached_version = Some(collection.version());
            self.recomputations += 1;
            tracing::trace!(
                version = collection.version(),
                records = collection.len(),
                "derived record facts"
            );
        }
        &self.facts
    }

    /// Indices of every record passing `filter`, in collection order.
    pub fn apply(&mut self, collection: &RecordCollection, filter: &FilterState) -> Vec<usize> {
        let all = collection.all_indices();
        self.refine(collection, &all, filter)
    }

    /// Narrows an existing selection; applying the same filter twice is a no-op.
    pub fn refine(
        &mut self,
        collection: &RecordCollection,
        selection: &[usize],
        filter: &FilterState,
    ) -> Vec<usize> {
        let facts = self.facts(collection);
        let records = collection.records();
        selection
            .iter()
            .copied()
            .filter(|&i| match (records.get(i), facts.get(i)) {
                (Some(r), Some(f)) => matches(r, f, filter),
                _ => false,
            })
            .collect()
    }

    /// Distinct capture years, ascending, for the year chips.
    pub fn available_years(&mut self, collection: &RecordCollection) -> Vec<String> {
        let years: BTreeSet<i32> = self.facts(collection).iter().filter_map(|f| f.year).collect();
        years.into_iter().map(|y| y.to_string()).collect()
    }
}
