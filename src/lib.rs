//! # GPX Sim
//!
//! GPX track playback and free-drive simulation for mock-location testing.
//!
//! This library provides:
//! - GPX track loading and fixed-interval track refinement
//! - Variable-interval playback along a refined track
//! - Dead-reckoning free drive with keyboard-style speed/heading control
//! - Device location injection over adb broadcasts
//!
//! ## Features
//!
//! - **`geolocate`** - Enable IP geolocation for the initial map center
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use gpx_sim::{GpsPoint, RefinedTrack};
//!
//! let raw = vec![
//!     GpsPoint::new(51.5074, -0.1278),
//!     GpsPoint::new(51.5080, -0.1290),
//!     GpsPoint::new(51.5090, -0.1300),
//! ];
//!
//! let track = RefinedTrack::refine(&raw, 10.0);
//! println!("{} refined points, {:.0} m", track.len(), track.total_length_meters());
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{OptionExt, Result, SimError};

// Geographic utilities (distance, bearing, dead reckoning)
pub mod geo_utils;

// Track refinement (fixed-interval densification of raw GPX points)
pub mod track;
pub use track::{RefinedTrack, DEFAULT_REFINE_INTERVAL_METERS};

// GPX file loading
pub mod loader;
pub use loader::load_waypoints;

// Timer and clock abstractions shared by both simulation engines
pub mod timer;
pub use timer::{Clock, StepTimer, SystemClock, TokioTimer};

// Renderer command channel (map marker, track overlay, viewport)
pub mod renderer;
pub use renderer::{RendererCommand, RendererHandle, VehiclePose};

// Device location injection over adb
pub mod bridge;
pub use bridge::{AdbBridge, LocationSink};

// Track playback engine
pub mod playback;
pub use playback::{PlaybackControls, PlaybackScheduler};

// Free-drive dead-reckoning engine
pub mod free_drive;
pub use free_drive::FreeDriveIntegrator;

// Mode coordination between playback and free drive
pub mod coordinator;
pub use coordinator::{DriveKey, DriveMode, ModeCoordinator};

// Persisted bridge settings
pub mod config;
pub use config::BridgeConfig;

// IP geolocation for the initial map center
#[cfg(feature = "geolocate")]
pub mod locate;

// ============================================================================
// Core Types
// ============================================================================

/// Fallback map center when no approximate location is available.
pub const DEFAULT_MAP_CENTER: GpsPoint = GpsPoint {
    latitude: 51.78962,
    longitude: 6.14120,
};

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use gpx_sim::GpsPoint;
/// let point = GpsPoint::new(51.5074, -0.1278); // London
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

// ============================================================================
// Tests
// ============================================================================
