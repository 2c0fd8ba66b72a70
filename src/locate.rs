//! Approximate-location lookup.
//!
//! Best-effort IP geolocation used only to seed the initial map center
//! before any track or vehicle exists. The result is cached write-once for
//! the process lifetime; every failure mode (network error, timeout,
//! non-2xx status, malformed body, out-of-range coordinates) degrades to
//! the fixed default coordinate.

use std::time::Duration;

use log::{debug, warn};
use once_cell::sync::OnceCell;
use serde::Deserialize;

use crate::{GpsPoint, DEFAULT_MAP_CENTER};

const IP_GEOLOCATION_URL: &str = "https://ipapi.co/json/";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

/// Resolved at most once per process.
static APPROXIMATE_LOCATION: OnceCell<GpsPoint> = OnceCell::new();

#[derive(Debug, Deserialize)]
struct GeoApiResponse {
    latitude: f64,
    longitude: f64,
}

/// Approximate user location from IP geolocation, cached after the first
/// successful lookup. `None` when the lookup fails (and stays unresolved
/// so a later call may retry).
pub async fn approximate_location() -> Option<GpsPoint> {
    if let Some(cached) = APPROXIMATE_LOCATION.get() {
        return Some(*cached);
    }
    let fetched = fetch_location().await?;
    // First writer wins; concurrent lookups agree on whatever landed.
    let _ = APPROXIMATE_LOCATION.set(fetched);
    APPROXIMATE_LOCATION.get().copied()
}

/// Map-center seed: the approximate location, or the fixed default.
pub async fn initial_map_center() -> GpsPoint {
    match approximate_location().await {
        Some(location) => location,
        None => DEFAULT_MAP_CENTER,
    }
}

async fn fetch_location() -> Option<GpsPoint> {
    let client = reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .ok()?;

    let response = match client.get(IP_GEOLOCATION_URL).send().await {
        Ok(response) => response,
        Err(e) => {
            warn!("Approximate-location lookup failed: {}", e);
            return None;
        }
    };
    if !response.status().is_success() {
        warn!(
            "Approximate-location lookup returned {}",
            response.status()
        );
        return None;
    }

    let body: GeoApiResponse = match response.json().await {
        Ok(body) => body,
        Err(e) => {
            warn!("Malformed geolocation response: {}", e);
            return None;
        }
    };

    let point = GpsPoint::new(body.latitude, body.longitude);
    if !point.is_valid() {
        warn!("Geolocation response out of range: {:?}", point);
        return None;
    }
    debug!(
        "Approximate location: {:.3},{:.3}",
        point.latitude, point.longitude
    );
    Some(point)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_api_response() {
        let body: GeoApiResponse =
            serde_json::from_str(r#"{"ip":"1.2.3.4","latitude":51.789,"longitude":6.141,"country":"NL"}"#)
                .unwrap();
        assert_eq!(body.latitude, 51.789);
        assert_eq!(body.longitude, 6.141);
    }

    #[test]
    fn test_missing_fields_rejected() {
        let result: std::result::Result<GeoApiResponse, _> =
            serde_json::from_str(r#"{"ip":"1.2.3.4"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_default_center_is_valid() {
        assert!(DEFAULT_MAP_CENTER.is_valid());
    }
}
