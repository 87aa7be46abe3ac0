pub mod replay;

pub use replay::{ReplayConfig, handle_replay};

use anyhow::Result;
use dronetrack::TrackerConfig;
use std::path::Path;
use tracing::info;

/// Load tracker config from `path`, or use defaults when none is given
pub fn load_config(path: Option<&Path>) -> Result<TrackerConfig> {
    match path {
        Some(path) => {
            info!("Loading tracker config from {:?}", path);
            TrackerConfig::load(path)
        }
        None => {
            info!("No tracker config given, using defaults");
            Ok(TrackerConfig::default())
        }
    }
}
