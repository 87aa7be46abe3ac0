//! Fleet-level aggregates for dashboards.
//!
//! Everything here is recomputed from the store on demand; none of it is cached.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::track_store::TrackStore;

/// Pilot name used when a track has no `pilot` property
pub const UNKNOWN_PILOT: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetStats {
    pub total_drones: usize,
    /// Authorized drones, shown as "flying" on the dashboard
    pub active_drones: usize,
    /// Sum over tracks of time since first seen, in seconds
    pub total_flight_time_secs: f64,
    pub avg_flight_time_secs: f64,
    /// Share of authorized drones, 0-100
    pub efficiency: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PilotSummary {
    pub pilot: String,
    pub flying: usize,
    pub landed: usize,
    pub total: usize,
}

pub fn fleet_stats(store: &TrackStore, now: DateTime<Utc>) -> FleetStats {
    let total_drones = store.len();
    let active_drones = store.green_count();

    let total_flight_time_secs: f64 = store
        .tracks()
        .map(|t| {
            let ms = now.signed_duration_since(t.first_seen).num_milliseconds().max(0);
            ms as f64 / 1000.0
        })
        .sum();

    let (avg_flight_time_secs, efficiency) = if total_drones > 0 {
        (
            total_flight_time_secs / total_drones as f64,
            (active_drones as f64 / total_drones as f64 * 100.0).round() as u32,
        )
    } else {
        (0.0, 0)
    };

    FleetStats {
        total_drones,
        active_drones,
        total_flight_time_secs,
        avg_flight_time_secs,
        efficiency,
    }
}

/// Per-pilot counts of authorized vs unauthorized drones, sorted by pilot
pub fn pilot_breakdown(store: &TrackStore) -> Vec<PilotSummary> {
    let mut by_pilot: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for track in store.tracks() {
        let pilot = track.properties.pilot.as_deref().unwrap_or(UNKNOWN_PILOT);
        let entry = by_pilot.entry(pilot).or_default();
        entry.1 += 1;
        if track.classification.is_authorized() {
            entry.0 += 1;
        }
    }

    by_pilot
        .into_iter()
        .map(|(pilot, (flying, total))| PilotSummary {
            pilot: pilot.to_string(),
            flying,
            landed: total - flying,
            total,
        })
        .collect()
}

/// `HH:MM:SS`, negative input clamps to zero
pub fn format_clock(seconds: f64) -> String {
    let s = seconds.max(0.0).floor() as u64;
    format!("{:02}:{:02}:{:02}", s / 3600, (s % 3600) / 60, s % 60)
}

/// `42m` under an hour, `3h 5m` otherwise
pub fn format_duration(ms: i64) -> String {
    let minutes = ms.max(0) / 60_000;
    if minutes < 60 {
        return format!("{}m", minutes);
    }
    format!("{}h {}m", minutes / 60, minutes % 60)
}
