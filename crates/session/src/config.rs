use std::path::Path;

use boundaries::BoundaryConfig;
use catalog::ResolverConfig;
use layers::ClusterConfig;
use serde::{Deserialize, Serialize};
use timeline::TimelineConfig;

use crate::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Trailing-edge delay before the working collection is written back.
    pub debounce_ms: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self { debounce_ms: 1_000 }
    }
}

/// Every tunable of a session. Missing sections fall back to defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub cluster: ClusterConfig,
    pub timeline: TimelineConfig,
    pub persistence: PersistenceConfig,
    pub boundaries: BoundaryConfig,
    pub resolver: ResolverConfig,
}

impl ViewerConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }
}
