//! Heading estimation on circular data.
//!
//! Angles are never averaged as scalars: every blend goes through (sin, cos) unit
//! vectors so that 350° and 10° average to 0° rather than 180°.

use super::{LngLat, bearing_degrees, equirectangular_distance, normalize_degrees};

/// Exponential moving average of two compass bearings.
///
/// `alpha` is the weight of the new sample. With no previous heading the new
/// bearing is returned unchanged.
pub fn blend_angles(previous: Option<f64>, new: f64, alpha: f64) -> f64 {
    let Some(prev) = previous.filter(|p| p.is_finite()) else {
        return normalize_degrees(new);
    };

    let pr = prev.to_radians();
    let nr = new.to_radians();
    let vx = (1.0 - alpha) * pr.sin() + alpha * nr.sin();
    let vy = (1.0 - alpha) * pr.cos() + alpha * nr.cos();

    normalize_degrees(vx.atan2(vy).to_degrees())
}

/// Stateless heading from the tail of a trajectory.
///
/// `newest_first` yields positions from the most recent backwards. Up to
/// `max_segments` consecutive segments are considered; segments shorter than
/// `min_segment_m` are noise and skipped. Each bearing's unit vector is weighted
/// by its segment length before summing.
pub fn heading_from_history<I>(newest_first: I, max_segments: usize, min_segment_m: f64) -> Option<f64>
where
    I: IntoIterator<Item = LngLat>,
{
    let mut positions = newest_first.into_iter();
    let mut later = positions.next()?;

    let mut vx = 0.0;
    let mut vy = 0.0;
    let mut used = 0usize;

    for earlier in positions {
        if used >= max_segments {
            break;
        }
        let length = equirectangular_distance(earlier, later);
        if length >= min_segment_m {
            let br = bearing_degrees(earlier, later).to_radians();
            vx += br.sin() * length;
            vy += br.cos() * length;
            used += 1;
        }
        later = earlier;
    }

    if used == 0 {
        return None;
    }
    Some(normalize_degrees(vx.atan2(vy).to_degrees()))
}
