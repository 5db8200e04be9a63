//! Owns the memories point source and the overlay markers drawn on top of it.
//!
//! Key properties:
//! - `set_data` either swaps data in place or rebuilds the source; the caller
//!   picks, and a swap on a missing source is an error, never a rebuild.
//! - The radius is a source construction parameter, so a radius change is
//!   always a rebuild.
//! - Each render pass touches only the features the engine reports on
//!   screen; afterwards the live markers are exactly that set.

use std::collections::{BTreeMap, BTreeSet};

use foundation::{LonLat, parse_timestamp};
use memories::NormalizedFeature;
use runtime::Frame;

use crate::{
    ClusterConfig, EngineError, MapEngine, MarkerHandle, MarkerId, RadiusPolicy, RenderedFeature,
    SourceOptions,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    SourceMissing,
    Engine(EngineError),
}

impl std::fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconcileError::SourceMissing => write!(f, "no point source to update"),
            ReconcileError::Engine(e) => write!(f, "map engine error: {e}"),
        }
    }
}

impl std::error::Error for ReconcileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReconcileError::Engine(e) => Some(e),
            ReconcileError::SourceMissing => None,
        }
    }
}

impl From<EngineError> for ReconcileError {
    fn from(e: EngineError) -> Self {
        ReconcileError::Engine(e)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DataMode {
    /// Replace the data of the existing source; viewport and markers stay.
    Swap,
    /// Tear down source and markers, then recreate with current parameters.
    Rebuild,
}

/// What a marker click should do.
#[derive(Debug, Clone, PartialEq)]
pub enum ClickOutcome {
    ZoomTo { center: LonLat, zoom: f64 },
    /// Open the photo viewer on these features, newest first.
    OpenViewer(Vec<NormalizedFeature>),
    Ignored,
}

/// Result of one render pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderPass {
    pub frame_index: u64,
    pub added: Vec<MarkerId>,
    /// Kept identities whose underlying feature changed since the last pass.
    pub updated: Vec<MarkerId>,
    pub removed: Vec<MarkerId>,
    pub live: usize,
}

pub struct ClusterReconciler<E: MapEngine> {
    engine: E,
    config: ClusterConfig,
    radius: RadiusPolicy,
    markers: BTreeMap<MarkerId, MarkerHandle<E::Marker>>,
    displayed: Vec<NormalizedFeature>,
    rebuilds: u64,
}

impl<E: MapEngine> ClusterReconciler<E> {
    pub fn new(engine: E, config: ClusterConfig) -> Self {
        let radius = RadiusPolicy::new(&config, engine.zoom());
        Self {
            engine,
            config,
            radius,
            markers: BTreeMap::new(),
            displayed: Vec::new(),
            rebuilds: 0,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn radius_px(&self) -> f64 {
        self.radius.current_px()
    }

    pub fn has_source(&self) -> bool {
        self.engine.has_source(&self.config.source_id)
    }

    pub fn displayed(&self) -> &[NormalizedFeature] {
        &self.displayed
    }

    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }

    pub fn live_ids(&self) -> Vec<MarkerId> {
        self.markers.keys().cloned().collect()
    }

    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }

    pub fn set_data(
        &mut self,
        features: Vec<NormalizedFeature>,
        mode: DataMode,
    ) -> Result<(), ReconcileError> {
        match mode {
            DataMode::Swap => {
                if !self.has_source() {
                    return Err(ReconcileError::SourceMissing);
                }
                self.engine
                    .set_source_data(&self.config.source_id, features.clone())?;
            }
            DataMode::Rebuild => self.rebuild(features.clone())?,
        }
        self.displayed = features;
        Ok(())
    }

    fn rebuild(&mut self, features: Vec<NormalizedFeature>) -> Result<(), ReconcileError> {
        self.remove_all_markers();
        let id = self.config.source_id.clone();
        if self.engine.has_source(&id) {
            self.engine.remove_source(&id)?;
        }
        let options = SourceOptions {
            cluster_radius_px: self.radius.current_px(),
            cluster_max_zoom: self.config.cluster_max_zoom,
        };
        tracing::debug!(
            source = %id,
            radius_px = options.cluster_radius_px,
            features = features.len(),
            "rebuilding point source"
        );
        self.engine.add_source(&id, options, features)?;
        self.rebuilds += 1;
        Ok(())
    }

    /// Re-evaluates the radius after a zoom; returns `true` if it rebuilt.
    pub fn on_zoom_end(&mut self) -> Result<bool, ReconcileError> {
        let zoom = self.engine.zoom();
        let previous = self.radius.clone();
        let Some(radius) = self.radius.update(&self.config, zoom) else {
            return Ok(false);
        };
        tracing::debug!(zoom, radius_px = radius, "cluster radius changed");
        let features = self.displayed.clone();
        if let Err(e) = self.set_data(features, DataMode::Rebuild) {
            // Retried on the next zoom end.
            self.radius = previous;
            return Err(e);
        }
        Ok(true)
    }

    /// Brings the live marker set in line with the engine's on-screen features.
    pub fn on_render(&mut self, frame: Frame) -> RenderPass {
        let rendered = self.engine.rendered_features(&self.config.source_id);
        let mut seen: BTreeSet<MarkerId> = BTreeSet::new();
        let mut added = Vec::new();
        let mut updated = Vec::new();

        for feature in rendered {
            let id = feature.marker_id();
            if !seen.insert(id.clone()) {
                continue;
            }
            // Cluster ids are only meaningful within one source snapshot.
            if let Some(handle) = self.markers.get_mut(&id) {
                if handle.feature != feature {
                    self.engine.update_marker(&mut handle.marker, &feature);
                    handle.feature = feature;
                    updated.push(id);
                }
                continue;
            }
            let marker = self.engine.add_marker(&feature);
            self.markers.insert(
                id.clone(),
                MarkerHandle {
                    id: id.clone(),
                    feature,
                    marker,
                },
            );
            added.push(id);
        }

        let stale: Vec<MarkerId> = self
            .markers
            .keys()
            .filter(|id| !seen.contains(*id))
            .cloned()
            .collect();
        for id in &stale {
            if let Some(handle) = self.markers.remove(id) {
                self.engine.remove_marker(handle.marker);
            }
        }

        if !added.is_empty() || !updated.is_empty() || !stale.is_empty() {
            tracing::trace!(
                frame = frame.index,
                added = added.len(),
                updated = updated.len(),
                removed = stale.len(),
                "markers reconciled"
            );
        }
        RenderPass {
            frame_index: frame.index,
            added,
            updated,
            removed: stale,
            live: self.markers.len(),
        }
    }

    pub fn on_marker_click(&mut self, id: &MarkerId) -> Result<ClickOutcome, ReconcileError> {
        let Some(handle) = self.markers.get(id) else {
            return Ok(ClickOutcome::Ignored);
        };
        match &handle.feature {
            RenderedFeature::Point { feature } => {
                Ok(ClickOutcome::OpenViewer(vec![feature.as_ref().clone()]))
            }
            RenderedFeature::Cluster {
                cluster_id,
                position,
                ..
            } => {
                let (cluster_id, position) = (*cluster_id, *position);
                let source = self.config.source_id.clone();
                let expansion = self.engine.cluster_expansion_zoom(&source, cluster_id)?;
                let null_island = position.near_null_island(self.config.null_island_epsilon);
                if expansion <= self.config.expand_max_zoom && !null_island {
                    let zoom = expansion.min(self.config.expand_max_zoom);
                    self.engine.ease_to(position, zoom);
                    return Ok(ClickOutcome::ZoomTo {
                        center: position,
                        zoom,
                    });
                }
                let mut leaves = self.engine.cluster_leaves(&source, cluster_id)?;
                sort_newest_first(&mut leaves);
                Ok(ClickOutcome::OpenViewer(leaves))
            }
        }
    }

    fn remove_all_markers(&mut self) {
        for (_, handle) in std::mem::take(&mut self.markers) {
            self.engine.remove_marker(handle.marker);
        }
    }

    /// Drops markers and the source.
    pub fn clear(&mut self) -> Result<(), ReconcileError> {
        self.remove_all_markers();
        self.displayed.clear();
        if self.has_source() {
            self.engine.remove_source(&self.config.source_id)?;
        }
        Ok(())
    }
}

/// Newest capture first; undated features last, otherwise stable.
pub fn sort_newest_first(features: &mut [NormalizedFeature]) {
    features.sort_by_cached_key(|f| {
        std::cmp::Reverse(f.raw_timestamp.as_deref().and_then(parse_timestamp))
    });
}
