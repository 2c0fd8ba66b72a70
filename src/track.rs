//! Track refinement.
//!
//! A raw GPX track is a sparse sequence of waypoints; the playback engine
//! needs a densified path with bounded inter-point spacing so per-step
//! intervals stay small. [`RefinedTrack`] inserts linearly interpolated
//! points whenever two consecutive raw points are further apart than the
//! configured interval.
//!
//! Interpolation is linear in coordinate space, not along a geodesic (an
//! acceptable approximation at the sub-10-meter scale used).

use crate::geo_utils::{haversine_distance, initial_bearing, polyline_length};
use crate::GpsPoint;

/// Default spacing bound between consecutive refined points, in meters.
pub const DEFAULT_REFINE_INTERVAL_METERS: f64 = 10.0;

/// A densified, immutable waypoint sequence derived from a raw track.
///
/// Rebuilt wholesale on every new file load; consumers hold it behind an
/// `Arc` and swap the whole track atomically.
#[derive(Debug, Clone, PartialEq)]
pub struct RefinedTrack {
    points: Vec<GpsPoint>,
}

impl RefinedTrack {
    /// An empty track (permanently non-playable).
    pub fn empty() -> Self {
        Self { points: Vec::new() }
    }

    /// Densify `raw` so consecutive points are at most `interval_meters`
    /// apart, except where an original segment was already within the
    /// interval (that pair's distance is preserved unchanged).
    ///
    /// For each original pair further apart than the interval,
    /// `floor(d / interval)` intermediate points are inserted at fractions
    /// `j * interval / d`; the original point is always appended afterwards,
    /// so the final sub-segment may be shorter than the interval (and the
    /// last interpolated point may coincide with the original when the
    /// segment length is an exact multiple).
    ///
    /// Deterministic: output order is insertion order, a pure function of
    /// the input.
    ///
    /// `interval_meters` must be positive.
    pub fn refine(raw: &[GpsPoint], interval_meters: f64) -> Self {
        debug_assert!(
            interval_meters > 0.0,
            "refine interval must be positive, got {}",
            interval_meters
        );
        let mut points = Vec::with_capacity(raw.len());
        let Some(first) = raw.first() else {
            return Self { points };
        };
        points.push(*first);

        let mut prev = *first;
        for curr in &raw[1..] {
            let distance = haversine_distance(&prev, curr);
            if distance > interval_meters {
                let delta_lat = curr.latitude - prev.latitude;
                let delta_lon = curr.longitude - prev.longitude;
                let fraction = interval_meters / distance;
                let new_points = (distance / interval_meters) as usize;

                for j in 1..=new_points {
                    points.push(GpsPoint::new(
                        prev.latitude + j as f64 * fraction * delta_lat,
                        prev.longitude + j as f64 * fraction * delta_lon,
                    ));
                }
            }
            points.push(*curr);
            prev = *curr;
        }

        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Index of the final point; 0 for empty or single-point tracks.
    pub fn last_index(&self) -> usize {
        self.points.len().saturating_sub(1)
    }

    pub fn get(&self, index: usize) -> Option<GpsPoint> {
        self.points.get(index).copied()
    }

    pub fn points(&self) -> &[GpsPoint] {
        &self.points
    }

    /// Heading at `index`: toward the next point, or from the previous
    /// point at the last index, or 0 for a single-point track.
    pub fn heading_at(&self, index: usize) -> f64 {
        if self.points.is_empty() {
            return 0.0;
        }
        let index = index.min(self.last_index());
        if index < self.last_index() {
            initial_bearing(&self.points[index], &self.points[index + 1])
        } else if index > 0 {
            initial_bearing(&self.points[index - 1], &self.points[index])
        } else {
            0.0
        }
    }

    /// Position readout for the UI: `index / (len - 1) * 100`, or 0 for
    /// tracks with at most one point.
    pub fn percent_at(&self, index: usize) -> f64 {
        if self.points.len() <= 1 {
            return 0.0;
        }
        index.min(self.last_index()) as f64 / self.last_index() as f64 * 100.0
    }

    /// Map a scrub fraction in [0, 1] onto an index (rounded, clamped).
    pub fn index_for_fraction(&self, fraction: f64) -> usize {
        if self.points.len() <= 1 {
            return 0;
        }
        let raw = (fraction.clamp(0.0, 1.0) * self.last_index() as f64).round() as usize;
        raw.min(self.last_index())
    }

    /// Total path length in meters.
    pub fn total_length_meters(&self) -> f64 {
        polyline_length(&self.points)
    }
}
