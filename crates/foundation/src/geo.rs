use serde::{Deserialize, Serialize};

/// A WGS84 position in degrees, longitude first (GeoJSON order).
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct LonLat {
    pub lon: f64,
    pub lat: f64,
}

impl LonLat {
    /// Sentinel used for records without usable coordinates.
    pub const NULL_ISLAND: LonLat = LonLat { lon: 0.0, lat: 0.0 };

    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Replaces non-finite components with `0.0`, per axis.
    pub fn sanitized(lon: f64, lat: f64) -> Self {
        Self {
            lon: if lon.is_finite() { lon } else { 0.0 },
            lat: if lat.is_finite() { lat } else { 0.0 },
        }
    }

    pub fn is_null_island(&self) -> bool {
        self.lon == 0.0 && self.lat == 0.0
    }

    /// True when both components are within `epsilon` degrees of `(0, 0)`.
    pub fn near_null_island(&self, epsilon: f64) -> bool {
        self.lon.abs() < epsilon && self.lat.abs() < epsilon
    }

    pub fn is_finite(&self) -> bool {
        self.lon.is_finite() && self.lat.is_finite()
    }

    pub fn to_array(self) -> [f64; 2] {
        [self.lon, self.lat]
    }
}

impl From<[f64; 2]> for LonLat {
    fn from(v: [f64; 2]) -> Self {
        LonLat::new(v[0], v[1])
    }
}

#[cfg(test)]
mod tests {
    use super::LonLat;

    #[test]
    fn sanitized_replaces_non_finite_axes() {
        assert_eq!(LonLat::sanitized(f64::NAN, 48.0), LonLat::new(0.0, 48.0));
        assert_eq!(
            LonLat::sanitized(f64::INFINITY, f64::NAN),
            LonLat::NULL_ISLAND
        );
    }

    #[test]
    fn null_island_checks() {
        assert!(LonLat::NULL_ISLAND.is_null_island());
        assert!(LonLat::new(0.05, -0.02).near_null_island(0.1));
        assert!(!LonLat::new(0.05, -0.02).is_null_island());
        assert!(!LonLat::new(2.35, 48.85).near_null_island(0.1));
    }
}
