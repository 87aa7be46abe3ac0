use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tunables for track reconciliation.
///
/// Every field has a default, so a TOML file only needs the keys it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Maximum retained history points per track
    pub max_history: usize,
    /// Minimum movement from the last retained point before a new one is kept
    pub min_point_distance_m: f64,
    /// Minimum time since the last retained point before a new one is kept
    pub min_point_interval_ms: u64,
    /// Segments shorter than this do not feed the smoothed heading
    pub heading_min_segment_m: f64,
    /// Weight of the newest bearing in the heading moving average
    pub heading_alpha: f64,
    /// Segments scanned by the stateless heading fallback
    pub fallback_heading_segments: usize,
    /// Segments shorter than this are jitter for the fallback
    pub fallback_min_segment_m: f64,
    /// How far an anonymous point may jump and still continue a track
    pub assign_max_distance_m: f64,
    /// Assigner bookkeeping for a track is forgotten after this much silence
    pub assign_max_idle_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_history: 200,
            min_point_distance_m: 5.0,
            min_point_interval_ms: 500,
            heading_min_segment_m: 8.0,
            heading_alpha: 0.65,
            fallback_heading_segments: 3,
            fallback_min_segment_m: 1.0,
            assign_max_distance_m: 450.0,
            assign_max_idle_ms: 15_000,
        }
    }
}

impl TrackerConfig {
    /// Load config from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
        let config: TrackerConfig =
            toml::from_str(&contents).with_context(|| format!("Failed to parse {:?}", path))?;
        config
            .validate()
            .with_context(|| format!("Invalid tracker config in {:?}", path))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_history == 0 {
            bail!("max_history must be at least 1");
        }
        if !(self.heading_alpha > 0.0 && self.heading_alpha <= 1.0) {
            bail!("heading_alpha must be in (0, 1], got {}", self.heading_alpha);
        }
        if self.fallback_heading_segments == 0 {
            bail!("fallback_heading_segments must be at least 1");
        }
        for (name, value) in [
            ("min_point_distance_m", self.min_point_distance_m),
            ("heading_min_segment_m", self.heading_min_segment_m),
            ("fallback_min_segment_m", self.fallback_min_segment_m),
            ("assign_max_distance_m", self.assign_max_distance_m),
        ] {
            if !value.is_finite() || value < 0.0 {
                bail!("{} must be a non-negative number, got {}", name, value);
            }
        }
        Ok(())
    }
}
