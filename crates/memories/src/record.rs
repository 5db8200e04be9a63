use foundation::{LonLat, RecordId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One entry of the imported `memories.json`.
///
/// The schema belongs to the export format, so every field is optional and
/// unknown fields are carried through `extra` untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MemoryRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub taken_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bereal_moment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_late: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub front_image: Option<ImageRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub back_image: Option<ImageRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(rename = "_relocated", skip_serializing_if = "std::ops::Not::not")]
    pub relocated: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// GPS fix as written by the exporter: numbers, numeric strings or junk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Location {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Location {
    pub fn at(position: LonLat) -> Self {
        Self {
            latitude: Some(Value::from(position.lat)),
            longitude: Some(Value::from(position.lon)),
            extra: Map::new(),
        }
    }

    /// Raw parsed components; `NaN` where a component is missing or not numeric.
    pub fn components(&self) -> (f64, f64) {
        (
            coordinate_value(self.longitude.as_ref()),
            coordinate_value(self.latitude.as_ref()),
        )
    }
}

fn coordinate_value(v: Option<&Value>) -> f64 {
    match v {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

fn non_empty(v: &Option<String>) -> Option<&str> {
    v.as_deref().filter(|s| !s.is_empty())
}

impl MemoryRecord {
    /// Groups records captured for the same moment: `berealMoment`, then
    /// `takenTime`, then `date`. Records with none of them share one group.
    pub fn moment_key(&self) -> Option<&str> {
        non_empty(&self.bereal_moment)
            .or_else(|| non_empty(&self.taken_time))
            .or_else(|| non_empty(&self.date))
    }

    /// Stable identity: `uid` when present, else the raw capture timestamp.
    pub fn identity(&self) -> RecordId {
        match self.uid.as_deref().or(self.taken_time.as_deref()) {
            Some(id) => RecordId::new(id),
            None => RecordId::new(""),
        }
    }

    /// Parsed coordinates with the `(0, 0)` sentinel for anything unusable.
    pub fn coordinates(&self) -> LonLat {
        match &self.location {
            Some(loc) => {
                let (lon, lat) = loc.components();
                LonLat::sanitized(lon, lat)
            }
            None => LonLat::NULL_ISLAND,
        }
    }

    /// Flagged as manually placed by the exporter, or still on the sentinel.
    pub fn can_be_relocated(&self) -> bool {
        self.relocated || self.coordinates().is_null_island()
    }

    /// Rewrites the location; other location fields are kept.
    pub fn relocate(&mut self, position: LonLat) {
        let extra = self
            .location
            .take()
            .map(|l| l.extra)
            .unwrap_or_default();
        let mut location = Location::at(position);
        location.extra = extra;
        self.location = Some(location);
    }

    pub fn front_path(&self) -> &str {
        self.front_image
            .as_ref()
            .and_then(|i| i.path.as_deref())
            .unwrap_or("")
    }

    pub fn back_path(&self) -> &str {
        self.back_image
            .as_ref()
            .and_then(|i| i.path.as_deref())
            .unwrap_or("")
    }
}
