use std::collections::BTreeSet;

use foundation::{Aabb2, LonLat};
use serde::{Deserialize, Serialize};

use crate::{BoundaryDataset, PolygonTest};

/// Dataset locations and naming rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryConfig {
    pub world_url: String,
    pub region_url: String,
    pub world_name_keys: Vec<String>,
    pub region_name_keys: Vec<String>,
    /// Only points strictly inside this box are tested against regions.
    pub region_box: Aabb2,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            world_url: "https://raw.githubusercontent.com/datasets/geo-countries/master/data/countries.geojson".to_string(),
            region_url: "https://raw.githubusercontent.com/gregoiredavid/france-geojson/master/departements-version-simplifiee.geojson".to_string(),
            world_name_keys: vec!["ADMIN".to_string(), "name".to_string()],
            region_name_keys: vec!["nom".to_string()],
            region_box: Aabb2::from_bbox([-5.0, 41.0, 10.0, 52.0]),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Attribution {
    pub countries: BTreeSet<String>,
    pub regions: BTreeSet<String>,
    /// Number of located points submitted.
    pub points: usize,
}

impl Attribution {
    /// Countries visited; at least one whenever located points exist, even if
    /// none matched (e.g. the world dataset failed to load).
    pub fn country_count(&self) -> usize {
        if self.countries.is_empty() && self.points > 0 {
            return 1;
        }
        self.countries.len()
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }
}

/// Attributes each point to the first matching country and, inside
/// `region_box`, to the first matching region. A missing dataset contributes
/// nothing.
pub fn attribute<T: PolygonTest + ?Sized>(
    points: &[LonLat],
    world: Option<&BoundaryDataset>,
    regions: Option<&BoundaryDataset>,
    region_box: &Aabb2,
    tester: &T,
) -> Attribution {
    let mut out = Attribution {
        points: points.len(),
        ..Attribution::default()
    };
    for &p in points {
        if let Some(name) = world.and_then(|ds| ds.locate(p, tester)) {
            out.countries.insert(name.to_string());
        }
        if region_box.strictly_contains(p)
            && let Some(name) = regions.and_then(|ds| ds.locate(p, tester))
        {
            out.regions.insert(name.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::tests::square_collection;
    use crate::GeoPolygonTest;
    use geo::MultiPolygon;
    use pretty_assertions::assert_eq;
    use std::cell::Cell;

    #[derive(Default)]
    struct SpyTest {
        calls: Cell<usize>,
    }

    impl PolygonTest for SpyTest {
        fn contains(&self, shape: &MultiPolygon<f64>, point: LonLat) -> bool {
            self.calls.set(self.calls.get() + 1);
            GeoPolygonTest.contains(shape, point)
        }
    }

    fn dataset(squares: &[(&str, f64, f64, f64)]) -> BoundaryDataset {
        BoundaryDataset::from_geojson_str(
            &square_collection(squares),
            &["ADMIN".to_string(), "nom".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn points_outside_a_box_never_reach_the_polygon_test() {
        let world = dataset(&[("Far", 100.0, 50.0, 1.0), ("Near", 0.0, 0.0, 2.0)]);
        let spy = SpyTest::default();
        let out = attribute(
            &[LonLat::new(1.0, 1.0)],
            Some(&world),
            None,
            &Aabb2::from_bbox([-5.0, 41.0, 10.0, 52.0]),
            &spy,
        );
        assert_eq!(spy.calls.get(), 1);
        assert_eq!(out.countries.into_iter().collect::<Vec<_>>(), vec!["Near"]);
    }

    #[test]
    fn first_matching_country_wins_and_scanning_stops() {
        let world = dataset(&[("First", 0.0, 0.0, 5.0), ("Second", 0.0, 0.0, 5.0)]);
        let spy = SpyTest::default();
        let out = attribute(
            &[LonLat::new(1.0, 1.0)],
            Some(&world),
            None,
            &Aabb2::from_bbox([-5.0, 41.0, 10.0, 52.0]),
            &spy,
        );
        assert_eq!(spy.calls.get(), 1);
        assert!(out.countries.contains("First"));
        assert_eq!(out.countries.len(), 1);
    }

    #[test]
    fn regions_only_inside_the_coarse_box() {
        let world = dataset(&[("France", -5.0, 41.0, 15.0), ("Elsewhere", 20.0, 20.0, 5.0)]);
        let regions = dataset(&[("Paris", 2.0, 48.0, 1.0), ("Outside", 20.0, 20.0, 5.0)]);
        let out = attribute(
            &[LonLat::new(2.35, 48.85), LonLat::new(21.0, 21.0)],
            Some(&world),
            Some(&regions),
            &Aabb2::from_bbox([-5.0, 41.0, 10.0, 52.0]),
            &GeoPolygonTest,
        );
        assert_eq!(out.country_count(), 2);
        assert_eq!(out.regions.into_iter().collect::<Vec<_>>(), vec!["Paris"]);
    }

    #[test]
    fn missing_datasets_degrade_to_the_fallback_count() {
        let out = attribute(
            &[LonLat::new(2.35, 48.85)],
            None,
            None,
            &Aabb2::from_bbox([-5.0, 41.0, 10.0, 52.0]),
            &GeoPolygonTest,
        );
        assert!(out.countries.is_empty());
        assert_eq!(out.country_count(), 1);
        assert_eq!(out.region_count(), 0);

        let none = attribute(&[], None, None, &Aabb2::world(), &GeoPolygonTest);
        assert_eq!(none.country_count(), 0);
    }
}
