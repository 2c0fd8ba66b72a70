//! Geographic utility functions.
//!
//! Pure spherical-earth math shared by the refiner and both simulation
//! engines:
//! - Haversine great-circle distance
//! - Initial bearing between two points
//! - Destination point from bearing + distance (dead reckoning)
//! - Heading normalization and longitude wrapping

use crate::GpsPoint;

/// Earth radius used by the haversine distance formula, in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Earth radius used by the dead-reckoning projection, in meters.
///
/// Numerically equal to `EARTH_RADIUS_KM * 1000` but defined independently;
/// the two formulas historically carried their own constants and are kept
/// that way for behavioral parity.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two points in meters (haversine).
///
/// # Example
/// ```
/// use gpx_sim::GpsPoint;
/// use gpx_sim::geo_utils::haversine_distance;
///
/// let london = GpsPoint::new(51.5074, -0.1278);
/// let paris = GpsPoint::new(48.8566, 2.3522);
/// let d = haversine_distance(&london, &paris);
/// assert!((d / 1000.0 - 344.0).abs() < 2.0); // ~344 km
/// ```
pub fn haversine_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    let d_lat = (p2.latitude - p1.latitude).to_radians();
    let d_lon = (p2.longitude - p1.longitude).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + p1.latitude.to_radians().cos()
            * p2.latitude.to_radians().cos()
            * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c * 1000.0
}

/// Total length of a polyline in meters.
pub fn polyline_length(points: &[GpsPoint]) -> f64 {
    points
        .windows(2)
        .map(|pair| haversine_distance(&pair[0], &pair[1]))
        .sum()
}

/// Initial bearing from `p1` to `p2` in degrees, normalized to [0, 360).
///
/// Identical points yield 0 (atan2(0, 0) is defined as 0).
pub fn initial_bearing(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    let lat1 = p1.latitude.to_radians();
    let lat2 = p2.latitude.to_radians();
    let d_lon = (p2.longitude - p1.longitude).to_radians();

    let y = d_lon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lon.cos();

    normalize_heading(y.atan2(x).to_degrees())
}

/// Project a new point from `origin` along `bearing_deg` for
/// `distance_meters` on a spherical earth.
///
/// The resulting longitude is wrapped to (-180, 180].
pub fn destination_point(origin: &GpsPoint, bearing_deg: f64, distance_meters: f64) -> GpsPoint {
    let bearing = bearing_deg.to_radians();
    let lat = origin.latitude.to_radians();
    let lon = origin.longitude.to_radians();
    let angular = distance_meters / EARTH_RADIUS_M;

    let new_lat = (lat.sin() * angular.cos() + lat.cos() * angular.sin() * bearing.cos()).asin();
    let new_lon = lon
        + (bearing.sin() * angular.sin() * lat.cos())
            .atan2(angular.cos() - lat.sin() * new_lat.sin());

    GpsPoint::new(new_lat.to_degrees(), wrap_longitude(new_lon.to_degrees()))
}

/// Reduce any finite heading to [0, 360).
pub fn normalize_heading(heading_deg: f64) -> f64 {
    let normalized = heading_deg % 360.0;
    if normalized < 0.0 {
        normalized + 360.0
    } else {
        normalized
    }
}

/// Wrap a longitude into (-180, 180].
pub fn wrap_longitude(lon: f64) -> f64 {
    let mut wrapped = lon;
    while wrapped > 180.0 {
        wrapped -= 360.0;
    }
    while wrapped < -180.0 {
        wrapped += 360.0;
    }
    wrapped
}
