use foundation::{Aabb2, LonLat};
use geo::{BoundingRect, Geometry, Intersects, MultiPolygon, Point};
use geojson::GeoJson;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetError {
    Parse(String),
    NotFeatureCollection,
}

impl std::fmt::Display for DatasetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatasetError::Parse(msg) => write!(f, "invalid GeoJSON: {msg}"),
            DatasetError::NotFeatureCollection => write!(f, "expected a FeatureCollection"),
        }
    }
}

impl std::error::Error for DatasetError {}

/// Point-in-polygon primitive. Boundary points count as inside.
pub trait PolygonTest {
    fn contains(&self, shape: &MultiPolygon<f64>, point: LonLat) -> bool;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct GeoPolygonTest;

impl PolygonTest for GeoPolygonTest {
    fn contains(&self, shape: &MultiPolygon<f64>, point: LonLat) -> bool {
        shape.intersects(&Point::new(point.lon, point.lat))
    }
}

/// One named area with its bounding box computed at load time.
#[derive(Debug, Clone)]
pub struct BoundaryFeature {
    pub name: String,
    pub bbox: Aabb2,
    pub shape: MultiPolygon<f64>,
}

impl BoundaryFeature {
    pub fn new(name: impl Into<String>, shape: MultiPolygon<f64>) -> Option<Self> {
        let rect = shape.bounding_rect()?;
        Some(Self {
            name: name.into(),
            bbox: Aabb2::new([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
            shape,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct BoundaryDataset {
    features: Vec<BoundaryFeature>,
}

impl BoundaryDataset {
    pub fn new(features: Vec<BoundaryFeature>) -> Self {
        Self { features }
    }

    /// Parses a FeatureCollection, naming each area by the first non-empty
    /// string property among `name_keys`. Non-areal features are skipped.
    pub fn from_geojson_str(payload: &str, name_keys: &[String]) -> Result<Self, DatasetError> {
        let gj = payload
            .parse::<GeoJson>()
            .map_err(|e| DatasetError::Parse(e.to_string()))?;
        Self::from_geojson(gj, name_keys)
    }

    pub fn from_geojson(gj: GeoJson, name_keys: &[String]) -> Result<Self, DatasetError> {
        let GeoJson::FeatureCollection(fc) = gj else {
            return Err(DatasetError::NotFeatureCollection);
        };

        let mut features = Vec::with_capacity(fc.features.len());
        let mut skipped = 0usize;
        for feature in fc.features {
            let name = name_keys
                .iter()
                .find_map(|k| {
                    feature
                        .properties
                        .as_ref()
                        .and_then(|p| p.get(k))
                        .and_then(|v| v.as_str())
                        .filter(|s| !s.is_empty())
                })
                .unwrap_or("")
                .to_string();

            let Some(geometry) = feature.geometry else {
                skipped += 1;
                continue;
            };
            let shape: MultiPolygon<f64> = match Geometry::<f64>::try_from(geometry.value) {
                Ok(Geometry::Polygon(p)) => p.into(),
                Ok(Geometry::MultiPolygon(m)) => m,
                _ => {
                    skipped += 1;
                    continue;
                }
            };
            match BoundaryFeature::new(name, shape) {
                Some(f) => features.push(f),
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            tracing::debug!(skipped, kept = features.len(), "skipped non-areal boundary features");
        }
        Ok(Self { features })
    }

    pub fn features(&self) -> &[BoundaryFeature] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// First area containing `point`. Areas whose box excludes the point are
    /// never handed to `tester`.
    pub fn locate<T: PolygonTest + ?Sized>(&self, point: LonLat, tester: &T) -> Option<&str> {
        self.features
            .iter()
            .filter(|f| f.bbox.contains(point))
            .find(|f| tester.contains(&f.shape, point))
            .map(|f| f.name.as_str())
    }
}
