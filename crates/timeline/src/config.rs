use foundation::Granularity;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    /// Step interval at speed 1.
    pub base_period_ms: u64,
    /// Selectable speed multipliers; the first one is the initial speed.
    pub speeds: Vec<u32>,
    pub granularity: Granularity,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            base_period_ms: 180,
            speeds: vec![1, 2, 4],
            granularity: Granularity::Day,
        }
    }
}

impl TimelineConfig {
    pub fn initial_speed(&self) -> u32 {
        self.speeds.first().copied().unwrap_or(1).max(1)
    }

    pub fn period_ms(&self, speed: u32) -> u64 {
        (self.base_period_ms / u64::from(speed.max(1))).max(1)
    }
}
