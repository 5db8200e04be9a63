use serde::{Deserialize, Serialize};

/// Clustering and click-expansion parameters of the memories layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub source_id: String,
    pub low_zoom_radius_px: f64,
    pub high_zoom_radius_px: f64,
    /// Zoom at and above which `high_zoom_radius_px` applies.
    pub high_zoom_threshold: f64,
    pub cluster_max_zoom: u32,
    /// Clusters expanding past this zoom open the viewer instead.
    pub expand_max_zoom: f64,
    pub null_island_epsilon: f64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            source_id: "bereal-src".to_string(),
            low_zoom_radius_px: 50.0,
            high_zoom_radius_px: 100.0,
            high_zoom_threshold: 14.0,
            cluster_max_zoom: 17,
            expand_max_zoom: 16.0,
            null_island_epsilon: 0.1,
        }
    }
}

impl ClusterConfig {
    pub fn radius_for_zoom(&self, zoom: f64) -> f64 {
        if zoom >= self.high_zoom_threshold {
            self.high_zoom_radius_px
        } else {
            self.low_zoom_radius_px
        }
    }
}

/// Step-function radius that only reports a change when the zoom crosses
/// the threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct RadiusPolicy {
    current_px: f64,
}

impl RadiusPolicy {
    pub fn new(config: &ClusterConfig, zoom: f64) -> Self {
        Self {
            current_px: config.radius_for_zoom(zoom),
        }
    }

    pub fn current_px(&self) -> f64 {
        self.current_px
    }

    /// New radius if `zoom` lands in the other band, else `None`.
    pub fn update(&mut self, config: &ClusterConfig, zoom: f64) -> Option<f64> {
        let next = config.radius_for_zoom(zoom);
        if next == self.current_px {
            return None;
        }
        self.current_px = next;
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radius_changes_only_when_crossing_the_threshold() {
        let cfg = ClusterConfig::default();
        let mut policy = RadiusPolicy::new(&cfg, 5.5);
        assert_eq!(policy.current_px(), 50.0);
        assert_eq!(policy.update(&cfg, 9.0), None);
        assert_eq!(policy.update(&cfg, 13.99), None);
        assert_eq!(policy.update(&cfg, 14.0), Some(100.0));
        assert_eq!(policy.update(&cfg, 16.2), None);
        assert_eq!(policy.update(&cfg, 12.0), Some(50.0));
    }
}
