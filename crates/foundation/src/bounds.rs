use serde::{Deserialize, Serialize};

use crate::geo::LonLat;

/// Axis-aligned lon/lat bounding box, `[min_lon, min_lat]` to `[max_lon, max_lat]`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aabb2 {
    pub min: [f64; 2],
    pub max: [f64; 2],
}

impl Aabb2 {
    pub fn new(min: [f64; 2], max: [f64; 2]) -> Self {
        Aabb2 { min, max }
    }

    /// Builds a box from the `[min_lon, min_lat, max_lon, max_lat]` layout used by GeoJSON `bbox`.
    pub fn from_bbox(bbox: [f64; 4]) -> Self {
        Aabb2 {
            min: [bbox[0], bbox[1]],
            max: [bbox[2], bbox[3]],
        }
    }

    /// The whole world in lon/lat.
    pub fn world() -> Self {
        Aabb2::new([-180.0, -90.0], [180.0, 90.0])
    }

    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = LonLat>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut out = Aabb2::new([first.lon, first.lat], [first.lon, first.lat]);
        for p in iter {
            out.expand(p);
        }
        Some(out)
    }

    pub fn expand(&mut self, p: LonLat) {
        self.min[0] = self.min[0].min(p.lon);
        self.min[1] = self.min[1].min(p.lat);
        self.max[0] = self.max[0].max(p.lon);
        self.max[1] = self.max[1].max(p.lat);
    }

    pub fn union(&self, other: &Aabb2) -> Aabb2 {
        Aabb2 {
            min: [self.min[0].min(other.min[0]), self.min[1].min(other.min[1])],
            max: [self.max[0].max(other.max[0]), self.max[1].max(other.max[1])],
        }
    }

    /// Inclusive containment test.
    pub fn contains(&self, p: LonLat) -> bool {
        p.lon >= self.min[0] && p.lon <= self.max[0] && p.lat >= self.min[1] && p.lat <= self.max[1]
    }

    /// Exclusive containment test (points on the edge are outside).
    pub fn strictly_contains(&self, p: LonLat) -> bool {
        p.lon > self.min[0] && p.lon < self.max[0] && p.lat > self.min[1] && p.lat < self.max[1]
    }

    pub fn to_bbox(&self) -> [f64; 4] {
        [self.min[0], self.min[1], self.max[0], self.max[1]]
    }
}

#[cfg(test)]
mod tests {
    use super::Aabb2;
    use crate::geo::LonLat;

    #[test]
    fn from_points_covers_all_points() {
        let b = Aabb2::from_points([
            LonLat::new(2.0, 48.0),
            LonLat::new(-1.0, 50.0),
            LonLat::new(5.0, 43.0),
        ])
        .unwrap();
        assert_eq!(b.to_bbox(), [-1.0, 43.0, 5.0, 50.0]);
        assert!(Aabb2::from_points(std::iter::empty()).is_none());
    }

    #[test]
    fn edge_points_are_contained_but_not_strictly() {
        let b = Aabb2::from_bbox([-5.0, 41.0, 10.0, 52.0]);
        let edge = LonLat::new(-5.0, 45.0);
        assert!(b.contains(edge));
        assert!(!b.strictly_contains(edge));
        assert!(b.strictly_contains(LonLat::new(2.35, 48.85)));
        assert!(!b.contains(LonLat::new(12.5, 41.9)));
    }
}
