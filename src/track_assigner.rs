//! Identity assignment for feeds that send bare positions without a reusable key.
//!
//! Each batch is matched greedily against the tracks seen recently: points are
//! processed in arrival order and each takes the nearest unclaimed track within
//! range. This is order-dependent; two closely crossing drones can swap ids. That
//! is accepted in exchange for O(points x tracks) work with no global matching.

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, trace};

use crate::config::TrackerConfig;
use crate::geometry::{LngLat, bearing_degrees, haversine_distance};
use crate::update::DroneFeature;

#[derive(Debug, Clone, Copy)]
struct LiveTrack {
    last_position: LngLat,
    last_seen: DateTime<Utc>,
}

/// Nearest-neighbor track assigner with idle eviction
#[derive(Debug, Clone)]
pub struct TrackAssigner {
    /// Keyed by sequence number so iteration (and tie-breaking) follows mint order
    live_tracks: BTreeMap<u64, LiveTrack>,
    next_sequence: u64,
    max_distance_m: f64,
    max_idle: Duration,
}

impl Default for TrackAssigner {
    fn default() -> Self {
        Self::new(&TrackerConfig::default())
    }
}

impl TrackAssigner {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            live_tracks: BTreeMap::new(),
            next_sequence: 1,
            max_distance_m: config.assign_max_distance_m,
            max_idle: Duration::milliseconds(config.assign_max_idle_ms as i64),
        }
    }

    pub fn track_id(sequence: u64) -> String {
        format!("TRK_{}", sequence)
    }

    /// Number of tracks currently eligible for matching
    pub fn live_count(&self) -> usize {
        self.live_tracks.len()
    }

    pub fn clear(&mut self) {
        self.live_tracks.clear();
        self.next_sequence = 1;
    }

    pub fn assign(&mut self, batch: Vec<DroneFeature>) -> Vec<DroneFeature> {
        self.assign_at(batch, Utc::now())
    }

    /// Stamp every point of one batch with a track id.
    ///
    /// Points that continue a known track also get a `yaw` for the hop. Points
    /// without a usable position are left out of the result.
    pub fn assign_at(&mut self, batch: Vec<DroneFeature>, now: DateTime<Utc>) -> Vec<DroneFeature> {
        self.evict_idle(now);

        let mut claimed: HashSet<u64> = HashSet::with_capacity(batch.len());
        let mut out = Vec::with_capacity(batch.len());

        for mut feature in batch {
            let Ok(position) = feature.position() else {
                trace!("Skipping feature without a usable position");
                continue;
            };

            match self.nearest_unclaimed(position, &claimed) {
                Some((sequence, distance)) if distance <= self.max_distance_m => {
                    let Some(track) = self.live_tracks.get_mut(&sequence) else {
                        continue;
                    };
                    let yaw = bearing_degrees(track.last_position, position);
                    track.last_position = position;
                    track.last_seen = now;
                    claimed.insert(sequence);

                    feature.properties.id = Some(Self::track_id(sequence));
                    feature.properties.yaw = Some(yaw);
                }
                _ => {
                    let sequence = self.next_sequence;
                    self.next_sequence += 1;
                    self.live_tracks.insert(
                        sequence,
                        LiveTrack {
                            last_position: position,
                            last_seen: now,
                        },
                    );
                    claimed.insert(sequence);
                    metrics::counter!("assigner.tracks.minted_total").increment(1);
                    debug!("Minted {} at ({:.6}, {:.6})", Self::track_id(sequence), position.lng, position.lat);

                    // yaw becomes derivable once a second point arrives
                    feature.properties.id = Some(Self::track_id(sequence));
                }
            }

            out.push(feature);
        }

        metrics::gauge!("assigner.tracks.live").set(self.live_tracks.len() as f64);
        out
    }

    fn evict_idle(&mut self, now: DateTime<Utc>) {
        let before = self.live_tracks.len();
        let max_idle = self.max_idle;
        self.live_tracks
            .retain(|_, t| now.signed_duration_since(t.last_seen) <= max_idle);

        let evicted = before - self.live_tracks.len();
        if evicted > 0 {
            metrics::counter!("assigner.tracks.evicted_total").increment(evicted as u64);
            debug!("Evicted {} idle assigner tracks", evicted);
        }
    }

    fn nearest_unclaimed(&self, position: LngLat, claimed: &HashSet<u64>) -> Option<(u64, f64)> {
        let mut best: Option<(u64, f64)> = None;
        for (&sequence, track) in &self.live_tracks {
            if claimed.contains(&sequence) {
                continue;
            }
            let distance = haversine_distance(track.last_position, position);
            if best.is_none_or(|(_, d)| distance < d) {
                best = Some((sequence, distance));
            }
        }
        best
    }
}
