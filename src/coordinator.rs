//! Mode coordinator.
//!
//! Owns both simulation engines and the mutually exclusive drive mode.
//! Exactly one mode is active at a time, and every transition stops the
//! other engine before switching: the two timers may coexist as objects,
//! but only one is ever driving the vehicle.
//!
//! The coordinator is also the funnel for UI intents: track loading,
//! transport controls, speed, zoom and free-drive key input.

use std::path::Path;
use std::sync::Arc;

use log::{info, warn};

use crate::bridge::LocationSink;
use crate::free_drive::FreeDriveIntegrator;
use crate::loader;
use crate::playback::{PlaybackControls, PlaybackScheduler};
use crate::renderer::RendererHandle;
use crate::timer::{Clock, StepTimer};
use crate::track::{RefinedTrack, DEFAULT_REFINE_INTERVAL_METERS};
use crate::GpsPoint;

/// The two mutually exclusive drive modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveMode {
    Gpx,
    FreeDrive,
}

/// Free-drive key intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveKey {
    Accelerate,
    Decelerate,
    TurnLeft,
    TurnRight,
}

/// Owning context for the whole simulation core.
pub struct ModeCoordinator {
    mode: DriveMode,
    playback: PlaybackScheduler,
    controls: Arc<PlaybackControls>,
    free_drive: FreeDriveIntegrator,
    renderer: RendererHandle,
    sink: Arc<dyn LocationSink>,
    free_drive_position_set: bool,
}

impl ModeCoordinator {
    /// Build the coordinator and both engines. Each engine gets its own
    /// timer so cancelling one never disturbs the other.
    pub fn new(
        controls: Arc<PlaybackControls>,
        playback_timer: Arc<dyn StepTimer>,
        free_drive_timer: Arc<dyn StepTimer>,
        clock: Arc<dyn Clock>,
        renderer: RendererHandle,
        sink: Arc<dyn LocationSink>,
    ) -> Self {
        let playback = PlaybackScheduler::new(
            controls.clone(),
            playback_timer,
            clock.clone(),
            renderer.clone(),
            sink.clone(),
        );
        let free_drive =
            FreeDriveIntegrator::new(free_drive_timer, clock, renderer.clone(), sink.clone());
        Self {
            mode: DriveMode::Gpx,
            playback,
            controls,
            free_drive,
            renderer,
            sink,
            free_drive_position_set: false,
        }
    }

    pub fn mode(&self) -> DriveMode {
        self.mode
    }

    pub fn playback(&self) -> &PlaybackScheduler {
        &self.playback
    }

    pub fn free_drive(&self) -> &FreeDriveIntegrator {
        &self.free_drive
    }

    // ========================================================================
    // Track loading
    // ========================================================================

    /// Load raw waypoints: stop any running session, refine, draw the
    /// track, park the marker at the start.
    pub fn load_track(&mut self, raw: &[GpsPoint]) {
        if self.playback.is_playing() {
            // Scheduler precondition: never swap the track under a live
            // session.
            self.playback.stop(false);
        }
        let track = Arc::new(RefinedTrack::refine(raw, DEFAULT_REFINE_INTERVAL_METERS));
        info!(
            "Loaded track: {} raw points, {} refined, {:.0} m",
            raw.len(),
            track.len(),
            track.total_length_meters()
        );
        self.renderer.show_track(raw.to_vec());
        self.playback.set_track(track.clone());
        if let Some(start) = track.get(0) {
            self.renderer
                .update_vehicle(start, track.heading_at(0), false, false);
        }
    }

    /// Load a GPX file; a missing or malformed file degrades to an empty
    /// (non-playable) track.
    pub fn load_track_file(&mut self, path: &Path) {
        let raw = match loader::load_waypoints(path) {
            Ok(points) => points,
            Err(e) => {
                warn!("{}", e);
                Vec::new()
            }
        };
        self.load_track(&raw);
    }

    // ========================================================================
    // Transport controls (GPX mode)
    // ========================================================================

    /// Play, restarting from the beginning when the cursor already sits at
    /// the end of the track.
    pub fn play(&mut self) {
        if self.mode != DriveMode::Gpx {
            return;
        }
        let track = self.playback.track();
        if track.is_empty() {
            return;
        }
        if !self.playback.is_playing() && self.playback.current_index() == track.last_index() {
            // Replay from the start; relocates the marker without a report.
            self.playback.stop(true);
        }
        self.playback.start();
    }

    /// Toggle pause on a running session; start when stopped.
    pub fn toggle_pause(&mut self) {
        if self.mode != DriveMode::Gpx {
            return;
        }
        if !self.playback.is_playing() {
            self.play();
        } else if self.playback.is_paused() {
            self.playback.resume();
        } else {
            self.playback.pause();
        }
    }

    pub fn stop(&mut self, reset_position: bool) {
        self.playback.stop(reset_position);
    }

    pub fn scrub(&mut self, fraction: f64) {
        if self.mode == DriveMode::Gpx {
            self.playback.scrub(fraction);
        }
    }

    pub fn set_speed(&mut self, speed_kmh: u32) {
        self.controls.set_speed(speed_kmh);
    }

    pub fn zoom(&mut self, zoom_in: bool) {
        self.renderer.zoom(zoom_in);
    }

    // ========================================================================
    // Mode transitions
    // ========================================================================

    /// Switch to free-drive mode: stop playback (cursor retained), reset
    /// the free-drive display, and show the "pick a starting point"
    /// crosshair.
    pub fn enter_free_drive(&mut self) {
        if self.mode == DriveMode::FreeDrive {
            return;
        }
        if self.playback.is_playing() {
            self.playback.stop(false);
        }
        self.mode = DriveMode::FreeDrive;
        self.free_drive.stop();
        self.free_drive_position_set = false;
        self.renderer.reset_frame();
        self.renderer.hide_vehicle();
        self.renderer.show_center_cross();
        info!("Free drive enabled, set position to start");
    }

    /// Switch back to GPX mode: stop the integrator, restore the marker
    /// from the track cursor (or the last free-drive pose when no track is
    /// loaded).
    pub fn enter_gpx_mode(&mut self) {
        if self.mode == DriveMode::Gpx {
            return;
        }
        self.mode = DriveMode::Gpx;
        self.free_drive.stop();
        self.free_drive_position_set = false;
        self.renderer.hide_center_cross();
        self.renderer.reset_frame();

        let track = self.playback.track();
        if !track.is_empty() {
            let index = self.playback.current_index();
            if let Some(point) = track.get(index) {
                self.renderer
                    .update_vehicle(point, track.heading_at(index), false, false);
            }
            self.playback.refresh_percent();
        } else if let Some(pose) = self.renderer.last_vehicle() {
            self.renderer
                .update_vehicle(pose.position, pose.heading_deg, false, false);
        }
        info!("Free drive disabled");
    }

    // ========================================================================
    // Free-drive position lifecycle
    // ========================================================================

    /// Read the map center back from the renderer and start the integrator
    /// there, carrying over the last-known heading. Aborts silently when
    /// the mode is wrong, a position is already set, or the readback fails.
    pub async fn set_free_drive_position_from_center(&mut self) {
        if self.mode != DriveMode::FreeDrive || self.free_drive_position_set {
            return;
        }
        let Some(center) = self.renderer.query_center().await else {
            return;
        };
        let heading = self
            .renderer
            .last_vehicle()
            .map(|pose| pose.heading_deg)
            .unwrap_or(0.0);
        self.free_drive.start(center, heading);
        self.free_drive_position_set = true;
        self.renderer.hide_center_cross();
        // The integrator's immediate first tick also sends the first
        // device report.
        self.renderer.update_vehicle(center, heading, true, true);
        info!("Free drive position set");
    }

    /// Drop the free-drive position: stop the integrator, forget the
    /// vehicle, and re-show the crosshair.
    pub fn clear_free_drive_position(&mut self) {
        if self.mode != DriveMode::FreeDrive || !self.free_drive_position_set {
            return;
        }
        self.free_drive.stop();
        self.free_drive_position_set = false;
        self.renderer.clear_last_vehicle();
        self.renderer.hide_vehicle();
        self.renderer.show_center_cross();
        self.renderer.reset_frame();
        info!("Free drive position cleared");
    }

    pub fn free_drive_position_set(&self) -> bool {
        self.free_drive_position_set
    }

    /// Free-drive key input; silently ignored outside free-drive mode or
    /// while the integrator is inactive.
    pub fn key(&mut self, key: DriveKey) {
        if self.mode != DriveMode::FreeDrive || !self.free_drive.is_active() {
            return;
        }
        match key {
            DriveKey::Accelerate => self.free_drive.accelerate(),
            DriveKey::Decelerate => self.free_drive.decelerate(),
            DriveKey::TurnLeft => self.free_drive.turn_left(),
            DriveKey::TurnRight => self.free_drive.turn_right(),
        }
    }

    /// Immediate scrub-style device report used by the UI slider while
    /// stopped.
    pub fn report_current_position(&self) {
        let track = self.playback.track();
        if let Some(point) = track.get(self.playback.current_index()) {
            self.sink.report(
                point.latitude,
                point.longitude,
                self.controls.speed_kmh() as i32,
            );
        }
    }
}
