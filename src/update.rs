//! Inbound update events as delivered by the transport.
//!
//! An update is a GeoJSON-like feature whose geometry should be a single point and
//! whose properties carry a handful of recognized fields plus arbitrary passthrough
//! keys. Decoding is lenient: a bad field degrades to `None`, and a bad
//! geometry is kept so the store can classify the drop.

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::trace;

use crate::geometry::LngLat;

/// Why an update was dropped without touching the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    MissingGeometry,
    NotAPoint,
    MalformedCoordinates,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::MissingGeometry => "missing_geometry",
            DropReason::NotAPoint => "not_a_point",
            DropReason::MalformedCoordinates => "malformed_coordinates",
        }
    }
}

/// Property bag of an update: typed core fields plus passthrough keys
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DroneProperties {
    /// Upstream stable key, or the id minted by the track assigner
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(
        rename = "Name",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_string"
    )]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_string")]
    pub registration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_string")]
    pub serial: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_string")]
    pub pilot: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_string")]
    pub organization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_number")]
    pub altitude: Option<f64>,
    /// Server-reported heading, forwarded as-is
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_number")]
    pub yaw: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DroneProperties {
    /// Shallow merge: every field present in `incoming` overwrites ours
    pub fn merge_from(&mut self, incoming: &DroneProperties) {
        fn take<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
            if let Some(v) = value {
                *slot = Some(v.clone());
            }
        }

        take(&mut self.id, &incoming.id);
        take(&mut self.name, &incoming.name);
        take(&mut self.registration, &incoming.registration);
        take(&mut self.serial, &incoming.serial);
        take(&mut self.pilot, &incoming.pilot);
        take(&mut self.organization, &incoming.organization);
        take(&mut self.altitude, &incoming.altitude);
        take(&mut self.yaw, &incoming.yaw);
        for (key, value) in &incoming.extra {
            self.extra.insert(key.clone(), value.clone());
        }
    }
}

/// Geometry of an inbound feature. Anything but a point is unsupported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Point {
        #[serde(default)]
        coordinates: Value,
    },
    #[serde(other)]
    Unsupported,
}

/// One inbound update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroneFeature {
    #[serde(default)]
    pub geometry: Option<Geometry>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub properties: DroneProperties,
}

impl DroneFeature {
    pub fn new(position: LngLat, properties: DroneProperties) -> Self {
        Self {
            geometry: Some(Geometry::Point {
                coordinates: Value::from(vec![position.lng, position.lat]),
            }),
            properties,
        }
    }

    /// Validated position of this update, or the reason it must be dropped
    pub fn position(&self) -> Result<LngLat, DropReason> {
        let coordinates = match &self.geometry {
            None => return Err(DropReason::MissingGeometry),
            Some(Geometry::Unsupported) => return Err(DropReason::NotAPoint),
            Some(Geometry::Point { coordinates }) => coordinates,
        };

        // [lng, lat] with an optional trailing altitude
        let pair = coordinates
            .as_array()
            .filter(|c| c.len() >= 2)
            .ok_or(DropReason::MalformedCoordinates)?;
        let (Some(lng), Some(lat)) = (pair[0].as_f64(), pair[1].as_f64()) else {
            return Err(DropReason::MalformedCoordinates);
        };

        let position = LngLat::new(lng, lat);
        if !position.is_valid() {
            return Err(DropReason::MalformedCoordinates);
        }
        Ok(position)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Envelope {
    Batch { features: Vec<Value> },
    Single(Value),
}

/// Decode one transport message into its features.
///
/// Accepts `{ "features": [...] }` or a bare feature. Features that fail to decode
/// are dropped; only a message that is not JSON at all is an error.
pub fn parse_message(raw: &str) -> Result<Vec<DroneFeature>> {
    let envelope: Envelope =
        serde_json::from_str(raw).context("Transport message is not valid JSON")?;

    let values = match envelope {
        Envelope::Batch { features } => features,
        Envelope::Single(value) => vec![value],
    };

    let mut features = Vec::with_capacity(values.len());
    for value in values {
        match serde_json::from_value::<DroneFeature>(value) {
            Ok(feature) => features.push(feature),
            Err(e) => {
                metrics::counter!("tracker.updates.undecodable_total").increment(1);
                trace!("Dropping undecodable feature: {}", e);
            }
        }
    }
    Ok(features)
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Strings pass through, numbers and booleans are stringified, blanks become `None`
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

/// Numbers pass through, numeric strings are parsed, anything else is `None`
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    })
}
