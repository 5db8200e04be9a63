use catalog::MediaResolver;
use foundation::{LonLat, RecordId, format_clock, format_long_date, parse_timestamp};
use serde::Serialize;

use crate::{MemoryRecord, RecordCollection, RecordFacts, bonus_flags};

/// Map-ready view of one record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedFeature {
    pub id: RecordId,
    /// Position of the source record in the collection.
    pub index: usize,
    pub coordinates: LonLat,
    pub front: String,
    pub back: String,
    pub caption: String,
    pub raw_timestamp: Option<String>,
    pub display_date: String,
    pub display_time: String,
    pub is_late: Option<bool>,
    pub is_bonus: bool,
    pub can_be_relocated: bool,
}

fn feature<R: MediaResolver + ?Sized>(
    index: usize,
    record: &MemoryRecord,
    is_bonus: bool,
    resolver: &mut R,
) -> NormalizedFeature {
    let ts = record.taken_time.as_deref().and_then(parse_timestamp);
    NormalizedFeature {
        id: record.identity(),
        index,
        coordinates: record.coordinates(),
        front: resolver.resolve(record.front_path()),
        back: resolver.resolve(record.back_path()),
        caption: record.caption.clone().unwrap_or_default(),
        raw_timestamp: record.taken_time.clone(),
        display_date: ts.as_ref().map(format_long_date).unwrap_or_default(),
        display_time: ts.as_ref().map(format_clock).unwrap_or_default(),
        is_late: record.is_late,
        is_bonus,
        can_be_relocated: record.can_be_relocated(),
    }
}

/// Order-preserving, one feature per record, bonus computed over `records`.
pub fn normalize<R: MediaResolver + ?Sized>(
    records: &[MemoryRecord],
    resolver: &mut R,
) -> Vec<NormalizedFeature> {
    let bonus = bonus_flags(records);
    let out: Vec<_> = records
        .iter()
        .zip(bonus)
        .enumerate()
        .map(|(i, (r, is_bonus))| feature(i, r, is_bonus, resolver))
        .collect();
    let sentinel = out.iter().filter(|f| f.coordinates.is_null_island()).count();
    if sentinel > 0 {
        tracing::debug!(sentinel, total = out.len(), "records without usable coordinates");
    }
    out
}

/// Normalizes a filtered selection, taking bonus status from the facts of the
/// full collection.
pub fn normalize_selection<R: MediaResolver + ?Sized>(
    collection: &RecordCollection,
    selection: &[usize],
    facts: &[RecordFacts],
    resolver: &mut R,
) -> Vec<NormalizedFeature> {
    selection
        .iter()
        .filter_map(|&i| {
            let record = collection.get(i)?;
            let is_bonus = facts.get(i).is_some_and(|f| f.is_bonus);
            Some(feature(i, record, is_bonus, resolver))
        })
        .collect()
}
