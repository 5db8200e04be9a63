use foundation::LonLat;
use serde::Serialize;

use crate::RenderedFeature;

/// Identity of an on-screen marker: `c-<cluster id>` or `p-<lon>,<lat>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct MarkerId(String);

impl MarkerId {
    pub fn cluster(cluster_id: u64) -> Self {
        Self(format!("c-{cluster_id}"))
    }

    pub fn point(position: LonLat) -> Self {
        Self(format!("p-{},{}", position.lon, position.lat))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_cluster(&self) -> bool {
        self.0.starts_with("c-")
    }
}

impl std::fmt::Display for MarkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Live marker: what it shows plus the engine's handle for it.
#[derive(Debug, Clone)]
pub struct MarkerHandle<M> {
    pub id: MarkerId,
    pub feature: RenderedFeature,
    pub marker: M,
}
