//! dronetrack - live drone track reconciliation
//!
//! Turns a noisy stream of independently timestamped drone positions into stable
//! tracks, and keeps two cached GeoJSON views (markers and trails) that are only
//! rebuilt when something changed.

pub mod config;
pub mod geometry;
pub mod registration;
pub mod stats;
pub mod track_assigner;
pub mod track_store;
pub mod update;

pub use config::TrackerConfig;
pub use registration::{Classification, can_fly, class_letter, normalize_registration};
pub use track_assigner::TrackAssigner;
pub use track_store::{PointsCollection, Track, TrackStore, TrailsCollection, UpsertOutcome};
pub use update::{DroneFeature, DroneProperties, parse_message};
