//! Headless map engine: clustered sources, a rectangular viewport and a marker
//! table, all in memory. Backs the CLI and the reconciler tests.

use std::collections::BTreeMap;

use foundation::math::mercator::{project_px, unproject_px};
use foundation::{Aabb2, LonLat};
use memories::NormalizedFeature;

use crate::cluster::{cluster_members, cluster_points, decode_cluster_id, expansion_zoom};
use crate::{Camera, ClusterSource, EngineError, MarkerOverlay, RenderedFeature, SourceOptions};

#[derive(Debug, Clone)]
struct MemorySource {
    options: SourceOptions,
    features: Vec<NormalizedFeature>,
}

impl MemorySource {
    fn points(&self) -> Vec<LonLat> {
        self.features.iter().map(|f| f.coordinates).collect()
    }
}

/// Counters observable by tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineCounters {
    pub sources_added: u64,
    pub sources_removed: u64,
    pub data_swaps: u64,
    pub markers_added: u64,
    pub markers_updated: u64,
    pub markers_removed: u64,
}

#[derive(Debug, Clone)]
pub struct InMemoryMapEngine {
    sources: BTreeMap<String, MemorySource>,
    center: LonLat,
    zoom: f64,
    max_zoom: f64,
    viewport_px: [f64; 2],
    markers: BTreeMap<u64, LonLat>,
    next_marker: u64,
    counters: EngineCounters,
    eases: Vec<(LonLat, f64)>,
}

impl Default for InMemoryMapEngine {
    fn default() -> Self {
        Self::new(LonLat::new(2.21, 46.22), 5.5, [1280.0, 800.0])
    }
}

impl InMemoryMapEngine {
    pub fn new(center: LonLat, zoom: f64, viewport_px: [f64; 2]) -> Self {
        Self {
            sources: BTreeMap::new(),
            center,
            zoom,
            max_zoom: 17.0,
            viewport_px,
            markers: BTreeMap::new(),
            next_marker: 0,
            counters: EngineCounters::default(),
            eases: Vec::new(),
        }
    }

    /// Moves the camera without recording an ease.
    pub fn jump_to(&mut self, center: LonLat, zoom: f64) {
        self.center = center;
        self.zoom = zoom.clamp(0.0, self.max_zoom);
    }

    pub fn counters(&self) -> EngineCounters {
        self.counters
    }

    pub fn eases(&self) -> &[(LonLat, f64)] {
        &self.eases
    }

    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }

    pub fn marker_positions(&self) -> Vec<LonLat> {
        self.markers.values().copied().collect()
    }

    pub fn source_len(&self, id: &str) -> Option<usize> {
        self.sources.get(id).map(|s| s.features.len())
    }

    pub fn source_options(&self, id: &str) -> Option<SourceOptions> {
        self.sources.get(id).map(|s| s.options)
    }

    /// Visible lon/lat rectangle at the current camera.
    pub fn viewport_bounds(&self) -> Aabb2 {
        let c = project_px(self.center, self.zoom);
        let [w, h] = self.viewport_px;
        let top_left = unproject_px([c[0] - w / 2.0, c[1] - h / 2.0], self.zoom);
        let bottom_right = unproject_px([c[0] + w / 2.0, c[1] + h / 2.0], self.zoom);
        Aabb2::new(
            [top_left.lon, bottom_right.lat],
            [bottom_right.lon, top_left.lat],
        )
    }

    fn source(&self, id: &str) -> Result<&MemorySource, EngineError> {
        self.sources
            .get(id)
            .ok_or_else(|| EngineError::SourceMissing(id.to_string()))
    }

    fn render_zoom(&self) -> u32 {
        self.zoom.floor().max(0.0) as u32
    }
}

impl ClusterSource for InMemoryMapEngine {
    fn has_source(&self, id: &str) -> bool {
        self.sources.contains_key(id)
    }

    fn add_source(
        &mut self,
        id: &str,
        options: SourceOptions,
        features: Vec<NormalizedFeature>,
    ) -> Result<(), EngineError> {
        if self.sources.contains_key(id) {
            return Err(EngineError::SourceExists(id.to_string()));
        }
        self.sources
            .insert(id.to_string(), MemorySource { options, features });
        self.counters.sources_added += 1;
        Ok(())
    }

    fn set_source_data(
        &mut self,
        id: &str,
        features: Vec<NormalizedFeature>,
    ) -> Result<(), EngineError> {
        let source = self
            .sources
            .get_mut(id)
            .ok_or_else(|| EngineError::SourceMissing(id.to_string()))?;
        source.features = features;
        self.counters.data_swaps += 1;
        Ok(())
    }

    fn remove_source(&mut self, id: &str) -> Result<(), EngineError> {
        self.sources
            .remove(id)
            .ok_or_else(|| EngineError::SourceMissing(id.to_string()))?;
        self.counters.sources_removed += 1;
        Ok(())
    }

    fn rendered_features(&self, id: &str) -> Vec<RenderedFeature> {
        let Ok(source) = self.source(id) else {
            return Vec::new();
        };
        let bounds = self.viewport_bounds();
        let points = source.points();
        cluster_points(
            &points,
            self.render_zoom(),
            source.options.cluster_radius_px,
            source.options.cluster_max_zoom,
        )
        .into_iter()
        .filter(|g| bounds.contains(g.position))
        .filter_map(|g| match g.cluster_id {
            Some(cluster_id) => Some(RenderedFeature::Cluster {
                cluster_id,
                position: g.position,
                count: g.members.len(),
            }),
            None => g.members.first().and_then(|&i| source.features.get(i)).map(|f| {
                RenderedFeature::Point {
                    feature: Box::new(f.clone()),
                }
            }),
        })
        .collect()
    }

    fn cluster_expansion_zoom(&self, id: &str, cluster_id: u64) -> Result<f64, EngineError> {
        let source = self.source(id)?;
        let points = source.points();
        let (_, zoom) = decode_cluster_id(cluster_id).ok_or(EngineError::UnknownCluster(cluster_id))?;
        let members = cluster_members(
            &points,
            cluster_id,
            source.options.cluster_radius_px,
            source.options.cluster_max_zoom,
        )
        .ok_or(EngineError::UnknownCluster(cluster_id))?;
        Ok(f64::from(expansion_zoom(
            &points,
            &members,
            zoom,
            source.options.cluster_radius_px,
            source.options.cluster_max_zoom,
        )))
    }

    fn cluster_leaves(
        &self,
        id: &str,
        cluster_id: u64,
    ) -> Result<Vec<NormalizedFeature>, EngineError> {
        let source = self.source(id)?;
        let members = cluster_members(
            &source.points(),
            cluster_id,
            source.options.cluster_radius_px,
            source.options.cluster_max_zoom,
        )
        .ok_or(EngineError::UnknownCluster(cluster_id))?;
        Ok(members
            .into_iter()
            .filter_map(|i| source.features.get(i).cloned())
            .collect())
    }
}

impl Camera for InMemoryMapEngine {
    fn zoom(&self) -> f64 {
        self.zoom
    }

    fn center(&self) -> LonLat {
        self.center
    }

    fn ease_to(&mut self, center: LonLat, zoom: f64) {
        self.jump_to(center, zoom);
        self.eases.push((self.center, self.zoom));
    }
}

impl MarkerOverlay for InMemoryMapEngine {
    type Marker = u64;

    fn add_marker(&mut self, feature: &RenderedFeature) -> u64 {
        let id = self.next_marker;
        self.next_marker += 1;
        self.markers.insert(id, feature.position());
        self.counters.markers_added += 1;
        id
    }

    fn update_marker(&mut self, marker: &mut u64, feature: &RenderedFeature) {
        if let Some(position) = self.markers.get_mut(marker) {
            *position = feature.position();
            self.counters.markers_updated += 1;
        }
    }

    fn remove_marker(&mut self, marker: u64) {
        if self.markers.remove(&marker).is_some() {
            self.counters.markers_removed += 1;
        }
    }
}
