//! Authoritative store of drone tracks.
//!
//! The store has a narrow mutation API (`upsert`, `select`, `clear`); everything
//! else is a read. Upserts only flip dirty flags, and the points/trails views are
//! rebuilt lazily on the next read, so a burst of updates between two render ticks
//! costs at most one rebuild per view.

mod projections;
mod track;

pub use projections::{
    Feature, FeatureCollection, LineStringGeometry, PointGeometry, PointProperties,
    PointsCollection, TrailProperties, TrailsCollection, generate_points, generate_trails,
};
pub use track::{HistoryPoint, Track, TrackChange};

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::config::TrackerConfig;
use crate::registration::{Classification, normalize_registration};
use crate::update::{DropReason, DroneFeature, DroneProperties};
use projections::CachedView;

/// Identity used when an update carries nothing better
pub const UNKNOWN_ID: &str = "UNKNOWN";

/// Result of a single upsert
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created { id: String },
    Updated { id: String, change: TrackChange },
    Dropped(DropReason),
}

impl UpsertOutcome {
    pub fn id(&self) -> Option<&str> {
        match self {
            UpsertOutcome::Created { id } | UpsertOutcome::Updated { id, .. } => Some(id.as_str()),
            UpsertOutcome::Dropped(_) => None,
        }
    }

    pub fn is_dropped(&self) -> bool {
        matches!(self, UpsertOutcome::Dropped(_))
    }
}

/// Resolve the stable track id for an update.
///
/// Precedence: explicit id, canonical registration, raw registration (uppercased),
/// serial, then [`UNKNOWN_ID`]. Always yields a value.
///
/// The explicit `id` is how assigner-minted ids and upstream stable keys reach the
/// store, so it outranks the registration. A feed whose `id` key means something
/// else splits one drone into several tracks; strip or rename that key before
/// upserting.
pub fn resolve_id(properties: &DroneProperties) -> String {
    if let Some(id) = properties.id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        return id.to_string();
    }
    let raw = properties.registration.as_deref();
    if let Some(canonical) = normalize_registration(raw) {
        return canonical;
    }
    if let Some(registration) = raw.map(str::trim).filter(|s| !s.is_empty()) {
        return registration.to_uppercase();
    }
    if let Some(serial) = properties.serial.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        return serial.to_string();
    }
    UNKNOWN_ID.to_string()
}

/// In-memory track store with cached projections
#[derive(Debug)]
pub struct TrackStore {
    config: TrackerConfig,
    tracks: BTreeMap<String, Track>,
    /// May name a track that does not exist
    selected_id: Option<String>,
    points: CachedView<PointsCollection>,
    trails: CachedView<TrailsCollection>,
}

impl Default for TrackStore {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl TrackStore {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: BTreeMap::new(),
            selected_id: None,
            points: CachedView::new("points"),
            trails: CachedView::new("trails"),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn upsert(&mut self, feature: &DroneFeature) -> UpsertOutcome {
        self.upsert_at(feature, Utc::now())
    }

    /// Apply one update observed at `now`.
    ///
    /// Malformed updates are dropped without touching any state.
    pub fn upsert_at(&mut self, feature: &DroneFeature, now: DateTime<Utc>) -> UpsertOutcome {
        let position = match feature.position() {
            Ok(position) => position,
            Err(reason) => {
                metrics::counter!("tracker.updates.dropped_total", "reason" => reason.as_str())
                    .increment(1);
                trace!("Dropped update: {}", reason.as_str());
                return UpsertOutcome::Dropped(reason);
            }
        };

        let id = resolve_id(&feature.properties);

        let track = match self.tracks.entry(id.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let track = Track::new(id.clone(), feature.properties.clone(), position, now, &self.config);
                debug!("New track {} ({})", id, track.classification);
                entry.insert(track);

                self.points.mark_dirty();
                self.trails.mark_dirty();
                metrics::counter!("tracker.tracks.created_total").increment(1);
                metrics::gauge!("tracker.tracks.total").set(self.tracks.len() as f64);
                return UpsertOutcome::Created { id };
            }
        };

        let change = track.apply(&feature.properties, position, now, &self.config);

        // lastSeen and properties changed, so the points view is always stale
        self.points.mark_dirty();
        // trail features carry geometry, classification and registration
        if change.reclassified
            || ((change.appended || change.registration_changed) && track.has_trail())
        {
            self.trails.mark_dirty();
        }
        if change.reclassified {
            debug!("Track {} reclassified as {}", id, track.classification);
        }

        metrics::counter!("tracker.updates.applied_total").increment(1);
        UpsertOutcome::Updated { id, change }
    }

    /// Point the selection at `id`. Dangling ids are allowed.
    pub fn select(&mut self, id: Option<String>) {
        self.selected_id = id;
    }

    pub fn selected_id(&self) -> Option<&str> {
        self.selected_id.as_deref()
    }

    /// The selected track, if the selection names one that exists
    pub fn selected(&self) -> Option<&Track> {
        self.selected_id.as_deref().and_then(|id| self.tracks.get(id))
    }

    /// Drop every track, the selection and both cached views
    pub fn clear(&mut self) {
        self.tracks.clear();
        self.selected_id = None;
        self.points.reset();
        self.trails.reset();
        metrics::gauge!("tracker.tracks.total").set(0.0);
    }

    /// Points view; same `Arc` as the previous call unless something changed
    pub fn points(&mut self) -> Arc<PointsCollection> {
        let tracks = &self.tracks;
        let config = &self.config;
        self.points
            .get_or_rebuild(|| generate_points(tracks.values(), config))
    }

    /// Trails view; same `Arc` as the previous call unless something changed
    pub fn trails(&mut self) -> Arc<TrailsCollection> {
        let tracks = &self.tracks;
        self.trails.get_or_rebuild(|| generate_trails(tracks.values()))
    }

    pub fn points_dirty(&self) -> bool {
        self.points.is_dirty()
    }

    pub fn trails_dirty(&self) -> bool {
        self.trails.is_dirty()
    }

    pub fn track(&self, id: &str) -> Option<&Track> {
        self.tracks.get(id)
    }

    /// All tracks ordered by id
    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Tracks currently classified unauthorized. Computed on every call.
    pub fn red_count(&self) -> usize {
        self.count_classified(Classification::Unauthorized)
    }

    /// Tracks currently classified authorized. Computed on every call.
    pub fn green_count(&self) -> usize {
        self.count_classified(Classification::Authorized)
    }

    fn count_classified(&self, classification: Classification) -> usize {
        self.tracks
            .values()
            .filter(|t| t.classification == classification)
            .count()
    }
}
