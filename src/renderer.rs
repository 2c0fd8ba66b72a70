//! Renderer command channel.
//!
//! The engines never talk to a map widget directly: they emit
//! [`RendererCommand`]s over an unbounded in-order channel and a
//! renderer-adapter task (owned by whatever GUI shell embeds this crate)
//! drains the receiver and applies commands in emission order. Map-center
//! readback is a command carrying a oneshot reply.
//!
//! The handle also snapshots the last vehicle pose it forwarded, so the
//! coordinator can re-render the vehicle after a mode switch without asking
//! the renderer anything.

use std::sync::{Arc, Mutex};

use log::debug;
use tokio::sync::{mpsc, oneshot};

use crate::GpsPoint;

/// Vehicle marker pose as last forwarded to the renderer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehiclePose {
    pub position: GpsPoint,
    pub heading_deg: f64,
}

/// Commands applied by the renderer adapter, in emission order.
#[derive(Debug)]
pub enum RendererCommand {
    /// Move/orient the vehicle marker.
    UpdateVehicle {
        position: GpsPoint,
        heading_deg: f64,
        /// Rotate the map so the heading points up.
        heading_up: bool,
        /// Keep the camera centered on the vehicle.
        follow: bool,
    },
    /// Remove the vehicle marker.
    HideVehicle,
    /// Show the center crosshair ("pick a starting point").
    ShowCenterCross,
    /// Hide the center crosshair.
    HideCenterCross,
    /// Draw a loaded track as a polyline and fit the view to it.
    ShowTrack { points: Vec<GpsPoint> },
    /// Center the view on a coordinate (initial map seed).
    SetView { center: GpsPoint },
    /// Zoom one level in or out.
    Zoom { zoom_in: bool },
    /// Reset framing and rotation overrides.
    ResetFrame,
    /// Read back the current map-center coordinate; the adapter answers
    /// `None` when the renderer is not ready.
    QueryCenter {
        reply: oneshot::Sender<Option<GpsPoint>>,
    },
}

/// Sending side of the renderer channel.
#[derive(Clone)]
pub struct RendererHandle {
    tx: mpsc::UnboundedSender<RendererCommand>,
    last_vehicle: Arc<Mutex<Option<VehiclePose>>>,
}

/// Create a renderer channel: the handle goes to the engines, the receiver
/// to the renderer adapter.
pub fn channel() -> (RendererHandle, mpsc::UnboundedReceiver<RendererCommand>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        RendererHandle {
            tx,
            last_vehicle: Arc::new(Mutex::new(None)),
        },
        rx,
    )
}

impl RendererHandle {
    fn send(&self, command: RendererCommand) {
        if self.tx.send(command).is_err() {
            // Renderer adapter is gone (e.g. window closed); rendering is
            // best-effort so the engines carry on.
            debug!("Renderer channel closed, dropping command");
        }
    }

    pub fn update_vehicle(&self, position: GpsPoint, heading_deg: f64, heading_up: bool, follow: bool) {
        *self.last_vehicle.lock().unwrap() = Some(VehiclePose {
            position,
            heading_deg,
        });
        self.send(RendererCommand::UpdateVehicle {
            position,
            heading_deg,
            heading_up,
            follow,
        });
    }

    pub fn hide_vehicle(&self) {
        self.send(RendererCommand::HideVehicle);
    }

    pub fn show_center_cross(&self) {
        self.send(RendererCommand::ShowCenterCross);
    }

    pub fn hide_center_cross(&self) {
        self.send(RendererCommand::HideCenterCross);
    }

    pub fn show_track(&self, points: Vec<GpsPoint>) {
        if points.is_empty() {
            return;
        }
        self.send(RendererCommand::ShowTrack { points });
    }

    pub fn set_view(&self, center: GpsPoint) {
        self.send(RendererCommand::SetView { center });
    }

    pub fn zoom(&self, zoom_in: bool) {
        self.send(RendererCommand::Zoom { zoom_in });
    }

    pub fn reset_frame(&self) {
        self.send(RendererCommand::ResetFrame);
    }

    /// Ask the renderer adapter for the current map center.
    ///
    /// Returns `None` when the adapter is gone, not ready yet, or dropped
    /// the reply.
    pub async fn query_center(&self) -> Option<GpsPoint> {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(RendererCommand::QueryCenter { reply }).is_err() {
            return None;
        }
        rx.await.ok().flatten()
    }

    /// Last vehicle pose forwarded through this handle.
    pub fn last_vehicle(&self) -> Option<VehiclePose> {
        *self.last_vehicle.lock().unwrap()
    }

    /// Forget the last vehicle pose (free-drive "clear position").
    pub fn clear_last_vehicle(&self) {
        *self.last_vehicle.lock().unwrap() = None;
    }
}
