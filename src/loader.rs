//! GPX track loading.
//!
//! Thin wrapper over the `gpx` crate: a file is reduced to the ordered
//! list of track-point coordinates across all tracks and segments.
//! Everything else in the file (waypoints, routes, metadata, elevation)
//! is ignored, since the simulation core only consumes (lat, lon) pairs.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use log::info;

use crate::error::{Result, SimError};
use crate::GpsPoint;

/// Read the ordered track points of a GPX file.
///
/// Returns an error for a missing or malformed file; callers that want the
/// original "empty track" degradation map the error themselves.
pub fn load_waypoints(path: &Path) -> Result<Vec<GpsPoint>> {
    let file = File::open(path).map_err(|e| SimError::TrackLoad {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let gpx = gpx::read(BufReader::new(file)).map_err(|e| SimError::TrackLoad {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    let mut points = Vec::new();
    for track in &gpx.tracks {
        for segment in &track.segments {
            for waypoint in &segment.points {
                let p = waypoint.point();
                points.push(GpsPoint::new(p.y(), p.x()));
            }
        }
    }

    info!(
        "Parsed {} track points from {}",
        points.len(),
        path.display()
    );
    Ok(points)
}
