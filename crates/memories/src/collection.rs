use foundation::{LonLat, RecordId};

use crate::MemoryRecord;

/// The session's record collection plus a content version counter.
///
/// Every mutation goes through a method that bumps `version`; derived caches
/// key themselves on it. Indices are stable between mutations and are how
/// filtered selections refer back to records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordCollection {
    records: Vec<MemoryRecord>,
    version: u64,
}

impl RecordCollection {
    pub fn new(records: Vec<MemoryRecord>) -> Self {
        Self {
            records,
            version: 1,
        }
    }

    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::from_slice(bytes)?))
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.records)
    }

    pub fn records(&self) -> &[MemoryRecord] {
        &self.records
    }

    pub fn get(&self, index: usize) -> Option<&MemoryRecord> {
        self.records.get(index)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Marks derived state stale without touching the records.
    pub fn bump(&mut self) -> u64 {
        self.version = self.version.wrapping_add(1);
        self.version
    }

    pub fn replace(&mut self, records: Vec<MemoryRecord>) {
        self.records = records;
        self.bump();
    }

    pub fn clear(&mut self) {
        self.replace(Vec::new());
    }

    pub fn position_of(&self, id: &RecordId) -> Option<usize> {
        if id.is_empty() {
            return None;
        }
        self.records.iter().position(|r| &r.identity() == id)
    }

    pub fn position_of_timestamp(&self, raw: &str) -> Option<usize> {
        self.records
            .iter()
            .position(|r| r.taken_time.as_deref() == Some(raw))
    }

    /// Finds the record by identity, then by raw capture timestamp.
    pub fn locate(&self, id: &RecordId, raw_timestamp: Option<&str>) -> Option<usize> {
        self.position_of(id)
            .or_else(|| raw_timestamp.and_then(|raw| self.position_of_timestamp(raw)))
    }

    /// Rewrites one record's location. Returns `false` for an unknown index.
    pub fn relocate(&mut self, index: usize, position: LonLat) -> bool {
        let Some(record) = self.records.get_mut(index) else {
            return false;
        };
        record.relocate(position);
        self.bump();
        true
    }

    pub fn select(&self, indices: &[usize]) -> Vec<&MemoryRecord> {
        indices.iter().filter_map(|&i| self.records.get(i)).collect()
    }

    pub fn all_indices(&self) -> Vec<usize> {
        (0..self.records.len()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collection() -> RecordCollection {
        RecordCollection::from_json_slice(
            br#"[{"uid":"a","takenTime":"2024-01-01T10:00:00Z"},
                 {"takenTime":"2024-01-02T10:00:00Z"}]"#,
        )
        .unwrap()
    }

    #[test]
    fn mutations_bump_the_version() {
        let mut c = collection();
        let v0 = c.version();
        assert!(c.relocate(1, LonLat::new(2.35, 48.85)));
        assert!(c.version() > v0);
        let v1 = c.version();
        assert!(!c.relocate(9, LonLat::new(0.0, 0.0)));
        assert_eq!(c.version(), v1);
        c.clear();
        assert!(c.version() > v1);
    }

    #[test]
    fn locate_falls_back_to_raw_timestamp() {
        let c = collection();
        assert_eq!(c.locate(&RecordId::new("a"), None), Some(0));
        assert_eq!(c.locate(&RecordId::new("2024-01-02T10:00:00Z"), None), Some(1));
        assert_eq!(
            c.locate(&RecordId::new("gone"), Some("2024-01-01T10:00:00Z")),
            Some(0)
        );
        assert_eq!(c.locate(&RecordId::new(""), None), None);
    }

    #[test]
    fn json_round_trip_keeps_order() {
        let c = collection();
        let again = RecordCollection::from_json_slice(&c.to_json_bytes().unwrap()).unwrap();
        assert_eq!(again.records(), c.records());
    }
}
