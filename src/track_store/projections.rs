//! Read views of the store as GeoJSON feature collections.
//!
//! Each view is cached behind a dirty flag. A clean read hands back the same
//! `Arc`, so consumers can skip work with `Arc::ptr_eq`; a dirty read rebuilds the
//! whole collection from the store.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::trace;

use super::track::Track;
use crate::config::TrackerConfig;
use crate::geometry::LngLat;
use crate::registration::Classification;

/// Computed keys that passthrough properties are not allowed to shadow
const RESERVED_POINT_KEYS: [&str; 8] = [
    "id",
    "registration",
    "color",
    "classification",
    "firstSeen",
    "lastSeen",
    "hdg",
    "type",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename = "FeatureCollection")]
pub struct FeatureCollection<G, P> {
    pub features: Vec<Feature<G, P>>,
}

impl<G, P> FeatureCollection<G, P> {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename = "Feature")]
pub struct Feature<G, P> {
    pub geometry: G,
    pub properties: P,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename = "Point")]
pub struct PointGeometry {
    pub coordinates: LngLat,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename = "LineString")]
pub struct LineStringGeometry {
    pub coordinates: Vec<LngLat>,
}

/// Properties of one drone marker
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PointProperties {
    pub id: String,
    pub registration: String,
    pub color: &'static str,
    pub classification: Classification,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub first_seen: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_seen: DateTime<Utc>,
    pub hdg: Option<f64>,
    /// Merged update properties (Name, pilot, altitude, unknown keys, ...)
    #[serde(flatten)]
    pub passthrough: Map<String, Value>,
}

/// Properties of one trail polyline
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrailProperties {
    pub id: String,
    pub registration: String,
    pub color: &'static str,
    pub classification: Classification,
}

pub type PointsCollection = FeatureCollection<PointGeometry, PointProperties>;
pub type TrailsCollection = FeatureCollection<LineStringGeometry, TrailProperties>;

/// One marker per track at its last known position
pub fn generate_points<'a, I>(tracks: I, config: &TrackerConfig) -> PointsCollection
where
    I: IntoIterator<Item = &'a Track>,
{
    let features = tracks
        .into_iter()
        .filter_map(|track| {
            let position = track.last_position()?;
            Some(Feature {
                geometry: PointGeometry {
                    coordinates: position,
                },
                properties: PointProperties {
                    id: track.id.clone(),
                    registration: track.display_registration().to_string(),
                    color: track.classification.color(),
                    classification: track.classification,
                    first_seen: track.first_seen,
                    last_seen: track.last_seen,
                    hdg: track.effective_heading(config),
                    passthrough: passthrough_properties(track),
                },
            })
        })
        .collect();

    FeatureCollection { features }
}

/// One polyline per authorized track with at least two retained points
pub fn generate_trails<'a, I>(tracks: I) -> TrailsCollection
where
    I: IntoIterator<Item = &'a Track>,
{
    let features = tracks
        .into_iter()
        .filter(|track| track.has_trail())
        .map(|track| Feature {
            geometry: LineStringGeometry {
                coordinates: track.history.iter().map(|p| p.coordinate).collect(),
            },
            properties: TrailProperties {
                id: track.id.clone(),
                registration: track.display_registration().to_string(),
                color: track.classification.color(),
                classification: track.classification,
            },
        })
        .collect();

    FeatureCollection { features }
}

fn passthrough_properties(track: &Track) -> Map<String, Value> {
    let mut map = match serde_json::to_value(&track.properties) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    for key in RESERVED_POINT_KEYS {
        map.remove(key);
    }
    map
}

/// A cached snapshot with its dirty flag
#[derive(Debug)]
pub(crate) struct CachedView<T> {
    name: &'static str,
    snapshot: Option<Arc<T>>,
    dirty: bool,
}

impl<T> CachedView<T> {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            snapshot: None,
            dirty: true,
        }
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty || self.snapshot.is_none()
    }

    pub(crate) fn reset(&mut self) {
        self.snapshot = None;
        self.dirty = true;
    }

    /// Cached snapshot when clean, otherwise rebuild and cache
    pub(crate) fn get_or_rebuild(&mut self, build: impl FnOnce() -> T) -> Arc<T> {
        if !self.dirty
            && let Some(snapshot) = &self.snapshot
        {
            return Arc::clone(snapshot);
        }

        let start = Instant::now();
        let snapshot = Arc::new(build());
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        metrics::histogram!("tracker.projection.rebuild_ms", "view" => self.name).record(elapsed_ms);
        trace!("Rebuilt {} projection in {:.3} ms", self.name, elapsed_ms);

        self.snapshot = Some(Arc::clone(&snapshot));
        self.dirty = false;
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::update::DroneProperties;
    use chrono::Duration;
    use serde_json::json;

    fn track(id: &str, registration: &str, points: usize) -> Track {
        let config = TrackerConfig::default();
        let start = Utc::now();
        let props = DroneProperties {
            registration: Some(registration.to_string()),
            name: Some("X1".to_string()),
            ..Default::default()
        };
        let mut t = Track::new(id.to_string(), props, LngLat::new(35.93, 31.95), start, &config);
        for i in 1..points {
            t.apply(
                &DroneProperties::default(),
                LngLat::new(35.93, 31.95 + i as f64 * 0.0002),
                start + Duration::seconds(i as i64),
                &config,
            );
        }
        t
    }

    #[test]
    fn test_points_carry_computed_and_passthrough_properties() {
        let mut t = track("SB-BA", "SB-BA", 3);
        t.properties.extra.insert("battery".into(), json!(77));
        t.properties.extra.insert("color".into(), json!("purple"));

        let fc = generate_points([&t], &TrackerConfig::default());
        assert_eq!(fc.len(), 1);
        let props = &fc.features[0].properties;
        assert_eq!(props.id, "SB-BA");
        assert_eq!(props.color, "#22c55e");
        assert_eq!(props.passthrough.get("Name"), Some(&json!("X1")));
        assert_eq!(props.passthrough.get("battery"), Some(&json!(77)));
        // computed keys win over passthrough ones
        assert!(!props.passthrough.contains_key("color"));
        assert!(props.hdg.is_some());
        assert_eq!(
            fc.features[0].geometry.coordinates,
            t.last_position().unwrap()
        );
    }

    #[test]
    fn test_trails_gated_on_length_and_authorization() {
        let moving_green = track("G", "SB-BA", 3);
        let parked_green = track("P", "SB-BC", 1);
        let moving_red = track("R", "SB-AB", 3);

        let fc = generate_trails([&moving_green, &parked_green, &moving_red]);
        assert_eq!(fc.len(), 1);
        assert_eq!(fc.features[0].properties.id, "G");
        assert_eq!(fc.features[0].geometry.coordinates.len(), 3);
    }

    #[test]
    fn test_geojson_shape() {
        let t = track("SB-BA", "SB-BA", 2);
        let points = serde_json::to_value(generate_points([&t], &TrackerConfig::default())).unwrap();
        assert_eq!(points["type"], "FeatureCollection");
        assert_eq!(points["features"][0]["type"], "Feature");
        assert_eq!(points["features"][0]["geometry"]["type"], "Point");
        assert_eq!(points["features"][0]["properties"]["classification"], "authorized");
        assert!(points["features"][0]["properties"]["firstSeen"].is_i64());

        let trails = serde_json::to_value(generate_trails([&t])).unwrap();
        assert_eq!(trails["features"][0]["geometry"]["type"], "LineString");
        assert_eq!(trails["features"][0]["geometry"]["coordinates"][0], json!([35.93, 31.95]));
    }

    #[test]
    fn test_cached_view_reuses_snapshot_until_dirty() {
        let mut view: CachedView<Vec<u32>> = CachedView::new("test");
        assert!(view.is_dirty());

        let mut builds = 0;
        let a = view.get_or_rebuild(|| {
            builds += 1;
            vec![1]
        });
        let b = view.get_or_rebuild(|| {
            builds += 1;
            vec![2]
        });
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(builds, 1);

        view.mark_dirty();
        let c = view.get_or_rebuild(|| {
            builds += 1;
            vec![3]
        });
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(*c, vec![3]);
        assert_eq!(builds, 2);
    }
}
