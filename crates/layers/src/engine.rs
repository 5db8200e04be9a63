//! Capabilities the reconciler needs from a map renderer.

use foundation::LonLat;
use memories::NormalizedFeature;

use crate::MarkerId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    SourceMissing(String),
    SourceExists(String),
    UnknownCluster(u64),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::SourceMissing(id) => write!(f, "source '{id}' does not exist"),
            EngineError::SourceExists(id) => write!(f, "source '{id}' already exists"),
            EngineError::UnknownCluster(id) => write!(f, "unknown cluster {id}"),
        }
    }
}

impl std::error::Error for EngineError {}

/// Construction parameters of a clustered point source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceOptions {
    pub cluster_radius_px: f64,
    pub cluster_max_zoom: u32,
}

/// One entry of the on-screen feature query.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderedFeature {
    Cluster {
        cluster_id: u64,
        position: LonLat,
        count: usize,
    },
    Point {
        feature: Box<NormalizedFeature>,
    },
}

impl RenderedFeature {
    pub fn position(&self) -> LonLat {
        match self {
            RenderedFeature::Cluster { position, .. } => *position,
            RenderedFeature::Point { feature } => feature.coordinates,
        }
    }

    pub fn marker_id(&self) -> MarkerId {
        match self {
            RenderedFeature::Cluster { cluster_id, .. } => MarkerId::cluster(*cluster_id),
            RenderedFeature::Point { feature } => MarkerId::point(feature.coordinates),
        }
    }
}

/// Clustered point source.
pub trait ClusterSource {
    fn has_source(&self, id: &str) -> bool;
    /// Creates the source and its layers.
    fn add_source(
        &mut self,
        id: &str,
        options: SourceOptions,
        features: Vec<NormalizedFeature>,
    ) -> Result<(), EngineError>;
    /// Replaces the data of an existing source in place.
    fn set_source_data(
        &mut self,
        id: &str,
        features: Vec<NormalizedFeature>,
    ) -> Result<(), EngineError>;
    /// Removes the source and its layers.
    fn remove_source(&mut self, id: &str) -> Result<(), EngineError>;
    /// Features of the source currently intersecting the viewport.
    fn rendered_features(&self, id: &str) -> Vec<RenderedFeature>;
    fn cluster_expansion_zoom(&self, id: &str, cluster_id: u64) -> Result<f64, EngineError>;
    fn cluster_leaves(
        &self,
        id: &str,
        cluster_id: u64,
    ) -> Result<Vec<NormalizedFeature>, EngineError>;
}

pub trait Camera {
    fn zoom(&self) -> f64;
    fn center(&self) -> LonLat;
    fn ease_to(&mut self, center: LonLat, zoom: f64);
}

/// Overlay of host elements pinned to coordinates.
pub trait MarkerOverlay {
    type Marker;

    fn add_marker(&mut self, feature: &RenderedFeature) -> Self::Marker;
    /// Moves and relabels a live marker whose identity now names `feature`.
    fn update_marker(&mut self, marker: &mut Self::Marker, feature: &RenderedFeature);
    fn remove_marker(&mut self, marker: Self::Marker);
}

pub trait MapEngine: ClusterSource + Camera + MarkerOverlay {}

impl<T: ClusterSource + Camera + MarkerOverlay> MapEngine for T {}
