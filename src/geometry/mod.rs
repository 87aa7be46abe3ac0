//! Geometry kernel: distances and bearings between (lon, lat) positions.
//!
//! All functions are pure. Bearings follow the compass convention used across the
//! crate: degrees in [0, 360), 0 = true north, increasing clockwise.

pub mod heading;

use serde::{Deserialize, Serialize};

pub use heading::{blend_angles, heading_from_history};

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A position as (longitude, latitude) in degrees.
///
/// Serializes as a GeoJSON coordinate array `[lng, lat]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

impl LngLat {
    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    /// True when both components are finite and inside the WGS84 ranges
    pub fn is_valid(&self) -> bool {
        self.lng.is_finite()
            && self.lat.is_finite()
            && (-180.0..=180.0).contains(&self.lng)
            && (-90.0..=90.0).contains(&self.lat)
    }
}

impl From<[f64; 2]> for LngLat {
    fn from([lng, lat]: [f64; 2]) -> Self {
        Self { lng, lat }
    }
}

impl From<LngLat> for [f64; 2] {
    fn from(p: LngLat) -> Self {
        [p.lng, p.lat]
    }
}

/// Calculate distance between two points using Haversine formula
pub fn haversine_distance(a: LngLat, b: LngLat) -> f64 {
    let lat1_rad = a.lat.to_radians();
    let lat2_rad = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lon = (b.lng - a.lng).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

/// Equirectangular approximation of the distance in meters.
///
/// Accurate to well under a meter for the short hops between consecutive drone
/// reports, and cheaper than haversine on the hot upsert path.
pub fn equirectangular_distance(a: LngLat, b: LngLat) -> f64 {
    let x = (b.lng - a.lng).to_radians() * ((a.lat + b.lat) / 2.0).to_radians().cos();
    let y = (b.lat - a.lat).to_radians();
    x.hypot(y) * EARTH_RADIUS_M
}

/// Initial great-circle bearing from `a` to `b` in degrees [0, 360)
pub fn bearing_degrees(a: LngLat, b: LngLat) -> f64 {
    let lat1_rad = a.lat.to_radians();
    let lat2_rad = b.lat.to_radians();
    let dlon = (b.lng - a.lng).to_radians();

    let y = dlon.sin() * lat2_rad.cos();
    let x = lat1_rad.cos() * lat2_rad.sin() - lat1_rad.sin() * lat2_rad.cos() * dlon.cos();

    normalize_degrees(y.atan2(x).to_degrees())
}

/// Wrap any angle in degrees into [0, 360)
pub fn normalize_degrees(deg: f64) -> f64 {
    let wrapped = deg.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

/// Calculate the angular difference between two headings in degrees
/// Returns the smallest angle between the two headings (0-180 degrees)
#[cfg(test)]
pub(crate) fn angular_difference(angle1: f64, angle2: f64) -> f64 {
    let diff = (angle1 - angle2).abs() % 360.0;
    if diff > 180.0 { 360.0 - diff } else { diff }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Amman
    const ORIGIN: LngLat = LngLat {
        lng: 35.93,
        lat: 31.95,
    };

    #[test]
    fn test_haversine_one_degree_latitude() {
        let d = haversine_distance(LngLat::new(0.0, 0.0), LngLat::new(0.0, 1.0));
        assert!((d - 111_195.0).abs() < 10.0, "got {d}");
    }

    #[test]
    fn test_equirectangular_close_to_haversine_for_short_hops() {
        let b = LngLat::new(ORIGIN.lng + 0.0001, ORIGIN.lat + 0.0001);
        let h = haversine_distance(ORIGIN, b);
        let e = equirectangular_distance(ORIGIN, b);
        assert!((h - e).abs() < 0.01, "haversine={h} equirect={e}");
    }

    #[test]
    fn test_bearing_cardinal_directions() {
        let north = LngLat::new(ORIGIN.lng, ORIGIN.lat + 0.01);
        let east = LngLat::new(ORIGIN.lng + 0.01, ORIGIN.lat);
        let south = LngLat::new(ORIGIN.lng, ORIGIN.lat - 0.01);
        let west = LngLat::new(ORIGIN.lng - 0.01, ORIGIN.lat);

        assert!(bearing_degrees(ORIGIN, north) < 0.001);
        assert!((bearing_degrees(ORIGIN, east) - 90.0).abs() < 0.1);
        assert!((bearing_degrees(ORIGIN, south) - 180.0).abs() < 0.001);
        assert!((bearing_degrees(ORIGIN, west) - 270.0).abs() < 0.1);
    }

    #[test]
    fn test_normalize_degrees() {
        assert_eq!(normalize_degrees(-90.0), 270.0);
        assert_eq!(normalize_degrees(720.0), 0.0);
        assert_eq!(normalize_degrees(359.5), 359.5);
        let tiny = normalize_degrees(-1e-14);
        assert!((0.0..360.0).contains(&tiny));
    }

    #[test]
    fn test_angular_difference_wraps() {
        assert_eq!(angular_difference(350.0, 10.0), 20.0);
        assert_eq!(angular_difference(90.0, 270.0), 180.0);
    }

    #[test]
    fn test_lnglat_validation() {
        assert!(ORIGIN.is_valid());
        assert!(!LngLat::new(181.0, 0.0).is_valid());
        assert!(!LngLat::new(0.0, -91.0).is_valid());
        assert!(!LngLat::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_lnglat_serializes_as_coordinate_array() {
        let json = serde_json::to_string(&LngLat::new(35.93, 31.95)).unwrap();
        assert_eq!(json, "[35.93,31.95]");
        let back: LngLat = serde_json::from_str(&json).unwrap();
        assert_eq!(back, LngLat::new(35.93, 31.95));
    }
}
