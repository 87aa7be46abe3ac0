use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::config::TrackerConfig;
use crate::geometry::{
    LngLat, bearing_degrees, blend_angles, equirectangular_distance, heading_from_history,
};
use crate::registration::{Classification, normalize_registration};
use crate::update::DroneProperties;

/// One retained position of a track. Never modified once appended.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPoint {
    pub coordinate: LngLat,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
}

/// What a single upsert did to an existing track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrackChange {
    /// A history point was appended
    pub appended: bool,
    /// Classification differs from before the update
    pub reclassified: bool,
    /// The displayed registration differs from before the update
    pub registration_changed: bool,
}

/// Persistent record of one drone
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: String,
    /// Canonical registration, `None` when the raw value failed strict validation
    pub registration: Option<String>,
    pub properties: DroneProperties,
    /// Retained positions, oldest first
    pub history: VecDeque<HistoryPoint>,
    pub classification: Classification,
    /// Smoothed heading maintained incrementally from significant segments
    pub heading: Option<f64>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub first_seen: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_seen: DateTime<Utc>,
}

impl Track {
    /// Create a track from its first update. The first point is always kept.
    pub fn new(
        id: String,
        properties: DroneProperties,
        position: LngLat,
        now: DateTime<Utc>,
        config: &TrackerConfig,
    ) -> Self {
        let mut history = VecDeque::with_capacity(config.max_history.min(16));
        history.push_back(HistoryPoint {
            coordinate: position,
            timestamp: now,
            altitude: properties.altitude,
        });

        let registration = normalize_registration(properties.registration.as_deref());
        let classification = Classification::from_identifier(properties.registration.as_deref());

        Self {
            id,
            registration,
            properties,
            history,
            classification,
            heading: None,
            first_seen: now,
            last_seen: now,
        }
    }

    /// Fold a later update into this track
    pub fn apply(
        &mut self,
        incoming: &DroneProperties,
        position: LngLat,
        now: DateTime<Utc>,
        config: &TrackerConfig,
    ) -> TrackChange {
        let mut change = TrackChange::default();
        let previous_registration = self.display_registration().to_string();

        self.properties.merge_from(incoming);

        if self.is_significant(position, now, config) {
            let previous = self.last_position();
            let point = HistoryPoint {
                coordinate: position,
                timestamp: now,
                altitude: incoming.altitude,
            };
            self.push_point(point, config.max_history);
            change.appended = true;

            if let Some(previous) = previous {
                self.update_heading(previous, position, config);
            }
        }

        // Classification follows the current identifier and may flip either way
        let raw = self.properties.registration.as_deref();
        self.registration = normalize_registration(raw);
        let classification = Classification::from_identifier(raw);
        if classification != self.classification {
            self.classification = classification;
            change.reclassified = true;
        }
        change.registration_changed = self.display_registration() != previous_registration;

        self.last_seen = now;
        change
    }

    /// Thinning predicate: keep a point only if it moved far enough, late enough
    fn is_significant(&self, position: LngLat, now: DateTime<Utc>, config: &TrackerConfig) -> bool {
        let Some(last) = self.history.back() else {
            return true;
        };
        let moved = equirectangular_distance(last.coordinate, position);
        let waited_ms = now.signed_duration_since(last.timestamp).num_milliseconds();
        moved >= config.min_point_distance_m && waited_ms >= config.min_point_interval_ms as i64
    }

    fn push_point(&mut self, point: HistoryPoint, cap: usize) {
        self.history.push_back(point);
        while self.history.len() > cap {
            self.history.pop_front();
        }
    }

    fn update_heading(&mut self, from: LngLat, to: LngLat, config: &TrackerConfig) {
        if equirectangular_distance(from, to) < config.heading_min_segment_m {
            return;
        }
        let segment = bearing_degrees(from, to);
        self.heading = Some(blend_angles(self.heading, segment, config.heading_alpha));
    }

    pub fn last_position(&self) -> Option<LngLat> {
        self.history.back().map(|p| p.coordinate)
    }

    /// Incremental heading if one exists, otherwise derived from recent history
    pub fn effective_heading(&self, config: &TrackerConfig) -> Option<f64> {
        self.heading.or_else(|| {
            heading_from_history(
                self.history.iter().rev().map(|p| p.coordinate),
                config.fallback_heading_segments,
                config.fallback_min_segment_m,
            )
        })
    }

    /// Registration to display: canonical, else raw, else the track id
    pub fn display_registration(&self) -> &str {
        self.registration
            .as_deref()
            .or(self.properties.registration.as_deref())
            .unwrap_or(&self.id)
    }

    /// Trails only show authorized drones that have actually moved
    pub fn has_trail(&self) -> bool {
        self.history.len() > 1 && self.classification.is_authorized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn props(registration: &str) -> DroneProperties {
        DroneProperties {
            registration: Some(registration.to_string()),
            ..Default::default()
        }
    }

    fn north_of(p: LngLat, meters: f64) -> LngLat {
        LngLat::new(p.lng, p.lat + meters / 111_195.0)
    }

    #[test]
    fn test_new_track_has_single_point() {
        let config = TrackerConfig::default();
        let now = Utc::now();
        let track = Track::new("SB-AB".into(), props("SB-AB"), LngLat::new(35.93, 31.95), now, &config);

        assert_eq!(track.history.len(), 1);
        assert_eq!(track.registration.as_deref(), Some("SB-AB"));
        assert_eq!(track.classification, Classification::Unauthorized);
        assert_eq!(track.first_seen, now);
        assert_eq!(track.last_seen, now);
        assert!(track.heading.is_none());
        assert!(!track.has_trail());
    }

    #[test]
    fn test_thinning_requires_distance_and_time() {
        let config = TrackerConfig::default();
        let start = Utc::now();
        let origin = LngLat::new(35.93, 31.95);
        let mut track = Track::new("T".into(), props("SB-BA"), origin, start, &config);

        // far enough but too soon
        let c = track.apply(&DroneProperties::default(), north_of(origin, 20.0), start + Duration::milliseconds(100), &config);
        assert!(!c.appended);

        // late enough but too close
        let c = track.apply(&DroneProperties::default(), north_of(origin, 2.0), start + Duration::milliseconds(900), &config);
        assert!(!c.appended);

        let c = track.apply(&DroneProperties::default(), north_of(origin, 6.0), start + Duration::milliseconds(900), &config);
        assert!(c.appended);
        assert_eq!(track.history.len(), 2);
        assert_eq!(track.last_seen, start + Duration::milliseconds(900));
    }

    #[test]
    fn test_thinning_thresholds_are_inclusive() {
        let start = Utc::now();
        let origin = LngLat::new(35.93, 31.95);
        let target = north_of(origin, 5.0);
        let config = TrackerConfig {
            min_point_distance_m: equirectangular_distance(origin, target),
            ..Default::default()
        };

        // exactly the minimum distance, one millisecond short of the interval
        let mut track = Track::new("T".into(), props("SB-BA"), origin, start, &config);
        let c = track.apply(&DroneProperties::default(), target, start + Duration::milliseconds(499), &config);
        assert!(!c.appended);

        // exactly the minimum distance and exactly the interval
        let c = track.apply(&DroneProperties::default(), target, start + Duration::milliseconds(500), &config);
        assert!(c.appended);
        assert_eq!(track.history.len(), 2);

        // a hair under the minimum distance is still thinned
        let strict = TrackerConfig {
            min_point_distance_m: config.min_point_distance_m + 1e-9,
            ..Default::default()
        };
        let mut track = Track::new("T".into(), props("SB-BA"), origin, start, &strict);
        let c = track.apply(&DroneProperties::default(), target, start + Duration::seconds(5), &strict);
        assert!(!c.appended);
        assert_eq!(track.history.len(), 1);
    }

    #[test]
    fn test_heading_only_from_long_segments() {
        let config = TrackerConfig::default();
        let start = Utc::now();
        let origin = LngLat::new(35.93, 31.95);
        let mut track = Track::new("T".into(), props("SB-BA"), origin, start, &config);

        // 6 m hop is appended but too short for a heading sample
        track.apply(&DroneProperties::default(), north_of(origin, 6.0), start + Duration::seconds(1), &config);
        assert_eq!(track.history.len(), 2);
        assert!(track.heading.is_none());
        // the fallback still sees a qualifying segment
        let fallback = track.effective_heading(&config).unwrap();
        assert!(fallback < 0.5 || fallback > 359.5, "got {fallback}");

        track.apply(&DroneProperties::default(), north_of(origin, 20.0), start + Duration::seconds(2), &config);
        let h = track.heading.unwrap();
        assert!(h < 0.5 || h > 359.5, "got {h}");
    }

    #[test]
    fn test_history_cap_drops_oldest() {
        let config = TrackerConfig {
            max_history: 5,
            ..Default::default()
        };
        let start = Utc::now();
        let origin = LngLat::new(35.93, 31.95);
        let mut track = Track::new("T".into(), props("SB-BA"), origin, start, &config);

        for i in 1..=12 {
            track.apply(
                &DroneProperties::default(),
                north_of(origin, 10.0 * i as f64),
                start + Duration::seconds(i),
                &config,
            );
        }

        assert_eq!(track.history.len(), 5);
        assert_eq!(track.history.front().unwrap().timestamp, start + Duration::seconds(8));
        assert_eq!(track.history.back().unwrap().timestamp, start + Duration::seconds(12));
        assert!(track.history.iter().zip(track.history.iter().skip(1)).all(|(a, b)| a.timestamp <= b.timestamp));
    }

    #[test]
    fn test_default_history_cap_is_200() {
        let config = TrackerConfig::default();
        let start = Utc::now();
        let origin = LngLat::new(35.93, 31.95);
        let mut track = Track::new("T".into(), props("SB-BA"), origin, start, &config);

        for i in 1..=250 {
            track.apply(
                &DroneProperties::default(),
                north_of(origin, 10.0 * i as f64),
                start + Duration::seconds(i),
                &config,
            );
        }

        assert_eq!(track.history.len(), 200);
        assert_eq!(track.history.front().unwrap().timestamp, start + Duration::seconds(51));
        assert_eq!(track.history.back().unwrap().timestamp, start + Duration::seconds(250));
    }

    #[test]
    fn test_registration_change_reported_without_reclassification() {
        let config = TrackerConfig::default();
        let now = Utc::now();
        let origin = LngLat::new(35.93, 31.95);
        let mut track = Track::new("T".into(), props("SB-BA"), origin, now, &config);

        let c = track.apply(&props("SB-BC"), origin, now, &config);
        assert!(c.registration_changed);
        assert!(!c.reclassified);
        assert_eq!(track.display_registration(), "SB-BC");

        let c = track.apply(&props("sb-bc"), origin, now, &config);
        assert!(!c.registration_changed);
    }

    #[test]
    fn test_reclassification_reported() {
        let config = TrackerConfig::default();
        let now = Utc::now();
        let origin = LngLat::new(35.93, 31.95);
        let mut track = Track::new("T".into(), props("SB-AB"), origin, now, &config);

        let c = track.apply(&props("SB-BC"), origin, now, &config);
        assert!(c.reclassified);
        assert_eq!(track.classification, Classification::Authorized);
        assert_eq!(track.registration.as_deref(), Some("SB-BC"));

        // an update without a registration keeps the current identifier
        let c = track.apply(&DroneProperties::default(), origin, now, &config);
        assert!(!c.reclassified);
        assert_eq!(track.classification, Classification::Authorized);
    }

    #[test]
    fn test_display_registration_fallbacks() {
        let config = TrackerConfig::default();
        let now = Utc::now();
        let origin = LngLat::new(35.93, 31.95);

        let raw = Track::new("SB-AA".into(), props("sb-aa"), origin, now, &config);
        assert_eq!(raw.display_registration(), "sb-aa");

        let anonymous = Track::new("TRK_1".into(), DroneProperties::default(), origin, now, &config);
        assert_eq!(anonymous.display_registration(), "TRK_1");
    }
}
