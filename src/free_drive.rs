//! Free-drive integrator.
//!
//! A fixed-rate dead-reckoning loop for manual driving: heading and speed
//! are adjusted through discrete key intents and integrated into position
//! on every tick. Control mutations are plain state writes that take
//! effect on the next tick; nothing recomputes synchronously.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, info};

use crate::bridge::LocationSink;
use crate::geo_utils::{destination_point, normalize_heading};
use crate::renderer::RendererHandle;
use crate::timer::{Clock, StepTimer};
use crate::GpsPoint;

/// Tick period while active.
const TICK: Duration = Duration::from_millis(100);
/// Minimum interval between device reports, in milliseconds.
const REPORT_WINDOW_MS: u64 = 800;
/// Speed change per accelerate/decelerate intent, km/h.
const SPEED_STEP_KMH: f64 = 5.0;
/// Heading change per steer intent, degrees.
const HEADING_STEP_DEG: f64 = 5.0;
/// Speed clamp bounds, km/h (negative = reverse).
const MAX_SPEED_KMH: f64 = 130.0;
const MIN_SPEED_KMH: f64 = -30.0;

/// Integrator state; owned exclusively by the integrator, dropped on stop.
struct FreeDriveState {
    active: bool,
    position: GpsPoint,
    heading_deg: f64,
    speed_kmh: f64,
    last_tick_ms: u64,
    /// `None` until the first report went out (the first tick reports
    /// immediately).
    last_report_ms: Option<u64>,
}

struct FreeDriveInner {
    state: Mutex<FreeDriveState>,
    timer: Arc<dyn StepTimer>,
    clock: Arc<dyn Clock>,
    renderer: RendererHandle,
    sink: Arc<dyn LocationSink>,
}

/// Fixed-rate dead-reckoning position integrator.
#[derive(Clone)]
pub struct FreeDriveIntegrator {
    inner: Arc<FreeDriveInner>,
}

impl FreeDriveIntegrator {
    pub fn new(
        timer: Arc<dyn StepTimer>,
        clock: Arc<dyn Clock>,
        renderer: RendererHandle,
        sink: Arc<dyn LocationSink>,
    ) -> Self {
        Self {
            inner: Arc::new(FreeDriveInner {
                state: Mutex::new(FreeDriveState {
                    active: false,
                    position: GpsPoint::new(0.0, 0.0),
                    heading_deg: 0.0,
                    speed_kmh: 0.0,
                    last_tick_ms: 0,
                    last_report_ms: None,
                }),
                timer,
                clock,
                renderer,
                sink,
            }),
        }
    }

    /// Activate at `position` with a normalized `initial_heading`, speed 0,
    /// and begin ticking immediately. No-op while already active.
    pub fn start(&self, position: GpsPoint, initial_heading_deg: f64) {
        {
            let mut state = self.inner.state.lock().unwrap();
            if state.active {
                return;
            }
            state.active = true;
            state.position = position;
            state.heading_deg = normalize_heading(initial_heading_deg);
            state.speed_kmh = 0.0;
            state.last_tick_ms = self.inner.clock.now_millis();
            state.last_report_ms = None;
        }
        info!(
            "Free drive started at {:.5},{:.5}",
            position.latitude, position.longitude
        );
        let inner = self.inner.clone();
        self.inner
            .timer
            .schedule_once(Duration::ZERO, Box::new(move || tick(&inner)));
    }

    /// Deactivate and halt ticking (confirmed: no tick runs after this
    /// returns). A subsequent `start` requires fresh inputs.
    pub fn stop(&self) {
        {
            let mut state = self.inner.state.lock().unwrap();
            if !state.active {
                return;
            }
            state.active = false;
        }
        self.inner.timer.cancel_all();
        info!("Free drive stopped");
    }

    pub fn is_active(&self) -> bool {
        self.inner.state.lock().unwrap().active
    }

    pub fn speed_kmh(&self) -> f64 {
        self.inner.state.lock().unwrap().speed_kmh
    }

    pub fn heading_deg(&self) -> f64 {
        self.inner.state.lock().unwrap().heading_deg
    }

    pub fn position(&self) -> GpsPoint {
        self.inner.state.lock().unwrap().position
    }

    pub fn accelerate(&self) {
        self.adjust_speed(SPEED_STEP_KMH);
    }

    pub fn decelerate(&self) {
        self.adjust_speed(-SPEED_STEP_KMH);
    }

    pub fn turn_left(&self) {
        self.adjust_heading(-HEADING_STEP_DEG);
    }

    pub fn turn_right(&self) {
        self.adjust_heading(HEADING_STEP_DEG);
    }

    fn adjust_speed(&self, delta: f64) {
        let mut state = self.inner.state.lock().unwrap();
        state.speed_kmh = (state.speed_kmh + delta).clamp(MIN_SPEED_KMH, MAX_SPEED_KMH);
        debug!("Free drive speed: {} km/h", state.speed_kmh);
    }

    fn adjust_heading(&self, delta: f64) {
        let mut state = self.inner.state.lock().unwrap();
        state.heading_deg = normalize_heading(state.heading_deg + delta);
        debug!("Free drive heading: {}°", state.heading_deg);
    }
}

/// One integrator tick: advance position by speed × elapsed, emit a map
/// update, and a device report at most every 800 ms. Reschedules itself at
/// the fixed rate while active.
fn tick(inner: &Arc<FreeDriveInner>) {
    let now = inner.clock.now_millis();
    let mut state = inner.state.lock().unwrap();
    if !state.active {
        return;
    }

    let elapsed_secs = now.saturating_sub(state.last_tick_ms) as f64 / 1000.0;
    state.last_tick_ms = now;

    let distance = (state.speed_kmh / 3.6) * elapsed_secs;
    if distance != 0.0 {
        state.position = destination_point(&state.position, state.heading_deg, distance);
    }

    inner
        .renderer
        .update_vehicle(state.position, state.heading_deg, true, true);

    let due = match state.last_report_ms {
        None => true,
        Some(last) => now.saturating_sub(last) >= REPORT_WINDOW_MS,
    };
    if due {
        inner.sink.report(
            state.position.latitude,
            state.position.longitude,
            state.speed_kmh.round().abs() as i32,
        );
        state.last_report_ms = Some(now);
    }
    drop(state);

    let next_inner = inner.clone();
    inner
        .timer
        .schedule_once(TICK, Box::new(move || tick(&next_inner)));
}
