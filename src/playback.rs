//! Playback scheduler.
//!
//! Walks a [`RefinedTrack`] index by index on a variable-interval timer:
//! each step computes the hop distance to the next point, reads the live
//! requested speed, derives the wait interval, emits a map update and a
//! rate-limited device report, then schedules the next step. Speed changes
//! and pause toggles take effect on the following step, not the current
//! one.
//!
//! Pause does not cancel the timer: a paused step re-fires at the last
//! computed interval without advancing the cursor until resumed.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, info};

use crate::bridge::LocationSink;
use crate::geo_utils::haversine_distance;
use crate::renderer::RendererHandle;
use crate::timer::{Clock, StepTimer};
use crate::track::RefinedTrack;

/// Minimum interval between device reports, in milliseconds.
pub(crate) const REPORT_WINDOW_MS: u64 = 800;

/// Minimum requested speed in km/h (guards the interval division).
const MIN_SPEED_KMH: u32 = 1;

/// Live playback inputs shared with the UI layer.
///
/// The scheduler reads these at each step execution, so mid-flight slider
/// moves and pause toggles apply on the subsequent tick.
pub struct PlaybackControls {
    speed_kmh: AtomicU32,
    paused: AtomicBool,
}

impl PlaybackControls {
    pub fn new(initial_speed_kmh: u32) -> Arc<Self> {
        Arc::new(Self {
            speed_kmh: AtomicU32::new(initial_speed_kmh),
            paused: AtomicBool::new(false),
        })
    }

    pub fn set_speed(&self, speed_kmh: u32) {
        self.speed_kmh.store(speed_kmh, Ordering::Release);
    }

    /// Requested speed, floored to 1 km/h.
    pub fn speed_kmh(&self) -> u32 {
        self.speed_kmh.load(Ordering::Acquire).max(MIN_SPEED_KMH)
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Release);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }
}

/// Mutable cursor over the refined track, owned by the scheduler.
struct PlaybackState {
    playing: bool,
    index: usize,
    percent: f64,
    first_report_sent: bool,
    last_report_ms: u64,
}

struct PlaybackInner {
    state: Mutex<PlaybackState>,
    track: Mutex<Arc<RefinedTrack>>,
    controls: Arc<PlaybackControls>,
    timer: Arc<dyn StepTimer>,
    clock: Arc<dyn Clock>,
    renderer: RendererHandle,
    sink: Arc<dyn LocationSink>,
}

/// Variable-interval discrete timer driving GPX playback.
#[derive(Clone)]
pub struct PlaybackScheduler {
    inner: Arc<PlaybackInner>,
}

impl PlaybackScheduler {
    pub fn new(
        controls: Arc<PlaybackControls>,
        timer: Arc<dyn StepTimer>,
        clock: Arc<dyn Clock>,
        renderer: RendererHandle,
        sink: Arc<dyn LocationSink>,
    ) -> Self {
        Self {
            inner: Arc::new(PlaybackInner {
                state: Mutex::new(PlaybackState {
                    playing: false,
                    index: 0,
                    percent: 0.0,
                    first_report_sent: false,
                    last_report_ms: 0,
                }),
                track: Mutex::new(Arc::new(RefinedTrack::empty())),
                controls,
                timer,
                clock,
                renderer,
                sink,
            }),
        }
    }

    /// Replace the track and reset the cursor to the start.
    ///
    /// Precondition: any active session was stopped first; the mode
    /// coordinator enforces this before loading a new file.
    pub fn set_track(&self, track: Arc<RefinedTrack>) {
        *self.inner.track.lock().unwrap() = track;
        let mut state = self.inner.state.lock().unwrap();
        state.index = 0;
        state.percent = 0.0;
        state.first_report_sent = false;
    }

    /// Snapshot of the current track.
    pub fn track(&self) -> Arc<RefinedTrack> {
        self.inner.track.lock().unwrap().clone()
    }

    /// Begin playing from the current cursor. No-op while already playing
    /// or on an empty track.
    pub fn start(&self) {
        let track = self.track();
        if track.is_empty() {
            debug!("Play requested on empty track, ignoring");
            return;
        }
        {
            let mut state = self.inner.state.lock().unwrap();
            if state.playing {
                return;
            }
            state.playing = true;
            state.first_report_sent = false;
        }
        self.inner.controls.set_paused(false);
        info!(
            "Starting playback: {} points, {:.0} m",
            track.len(),
            track.total_length_meters()
        );
        let inner = self.inner.clone();
        self.inner
            .timer
            .schedule_once(Duration::ZERO, Box::new(move || step(&inner)));
    }

    /// Stop playback, cancelling any pending step (confirmed: no step runs
    /// after this returns). With `reset_position`, the cursor returns to
    /// the start and the marker is relocated there.
    pub fn stop(&self, reset_position: bool) {
        self.inner.timer.cancel_all();
        let track = self.track();
        let mut state = self.inner.state.lock().unwrap();
        state.playing = false;
        state.first_report_sent = false;
        self.inner.controls.set_paused(false);
        if reset_position {
            state.index = 0;
            state.percent = 0.0;
            if let Some(start) = track.get(0) {
                self.inner
                    .renderer
                    .update_vehicle(start, track.heading_at(0), false, false);
            }
        }
        info!("Playback stopped (reset: {})", reset_position);
    }

    /// Pause without cancelling the scheduled timer; paused ticks keep
    /// firing at the last computed interval but do not advance the cursor.
    pub fn pause(&self) {
        self.inner.controls.set_paused(true);
    }

    pub fn resume(&self) {
        self.inner.controls.set_paused(false);
    }

    /// Jump the cursor to a fraction of the track. Accepted only while
    /// stopped; relocates the marker and reports the fix immediately at
    /// the current requested speed.
    pub fn scrub(&self, fraction: f64) {
        let track = self.track();
        if track.is_empty() {
            return;
        }
        let mut state = self.inner.state.lock().unwrap();
        if state.playing {
            return;
        }
        let index = track.index_for_fraction(fraction);
        state.index = index;
        state.percent = track.percent_at(index);
        drop(state);

        if let Some(point) = track.get(index) {
            self.inner
                .renderer
                .update_vehicle(point, track.heading_at(index), false, false);
            let speed = self.inner.controls.speed_kmh();
            self.inner
                .sink
                .report(point.latitude, point.longitude, speed as i32);
        }
    }

    pub fn is_playing(&self) -> bool {
        self.inner.state.lock().unwrap().playing
    }

    pub fn is_paused(&self) -> bool {
        self.inner.controls.is_paused()
    }

    /// Snapshot of the cursor index.
    pub fn current_index(&self) -> usize {
        self.inner.state.lock().unwrap().index
    }

    /// Snapshot of the position readout in percent.
    pub fn progress_percent(&self) -> f64 {
        self.inner.state.lock().unwrap().percent
    }

    /// Recompute the percent readout from the cursor (after mode switches).
    pub(crate) fn refresh_percent(&self) {
        let track = self.track();
        let mut state = self.inner.state.lock().unwrap();
        state.percent = track.percent_at(state.index);
    }
}

/// One scheduler step. Executed by the timer; reschedules itself until the
/// cursor reaches the final index or playback is stopped externally.
fn step(inner: &Arc<PlaybackInner>) {
    let track = inner.track.lock().unwrap().clone();
    let mut state = inner.state.lock().unwrap();

    if !state.playing {
        return;
    }
    if track.is_empty() || state.index >= track.last_index() {
        info!("Playback finished at index {}", state.index);
        state.playing = false;
        state.first_report_sent = false;
        inner.controls.set_paused(false);
        return;
    }

    let (Some(current), Some(next)) = (track.get(state.index), track.get(state.index + 1)) else {
        return;
    };
    let distance = haversine_distance(&current, &next);
    let speed_kmh = inner.controls.speed_kmh();
    let interval_ms = ((distance / (speed_kmh as f64 / 3.6)) * 1000.0) as u64;

    inner
        .renderer
        .update_vehicle(current, track.heading_at(state.index), false, false);

    let now = inner.clock.now_millis();
    if !state.first_report_sent || now.saturating_sub(state.last_report_ms) > REPORT_WINDOW_MS {
        inner
            .sink
            .report(current.latitude, current.longitude, speed_kmh as i32);
        state.first_report_sent = true;
        state.last_report_ms = now;
    }

    if !inner.controls.is_paused() {
        state.index += 1;
    }
    state.percent = track.percent_at(state.index);
    drop(state);

    let next_inner = inner.clone();
    inner.timer.schedule_once(
        Duration::from_millis(interval_ms),
        Box::new(move || step(&next_inner)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::testing::RecordingSink;
    use crate::renderer;
    use crate::timer::{ManualClock, ManualTimer};
    use crate::track::DEFAULT_REFINE_INTERVAL_METERS;
    use crate::GpsPoint;

    struct Fixture {
        scheduler: PlaybackScheduler,
        controls: Arc<PlaybackControls>,
        timer: Arc<ManualTimer>,
        clock: Arc<ManualClock>,
        sink: Arc<RecordingSink>,
        rx: tokio::sync::mpsc::UnboundedReceiver<renderer::RendererCommand>,
    }

    fn fixture(speed_kmh: u32) -> Fixture {
        let _ = env_logger::builder().is_test(true).try_init();
        let controls = PlaybackControls::new(speed_kmh);
        let timer = Arc::new(ManualTimer::new());
        let clock = Arc::new(ManualClock::new());
        let sink = RecordingSink::new();
        let (handle, rx) = renderer::channel();
        let scheduler = PlaybackScheduler::new(
            controls.clone(),
            timer.clone(),
            clock.clone(),
            handle,
            sink.clone(),
        );
        Fixture {
            scheduler,
            controls,
            timer,
            clock,
            sink,
            rx,
        }
    }

    fn three_point_track() -> Arc<RefinedTrack> {
        // Two hops of ~5.56 m each, under the refine interval.
        let raw = [
            GpsPoint::new(0.0, 0.0),
            GpsPoint::new(0.00005, 0.0),
            GpsPoint::new(0.0001, 0.0),
        ];
        Arc::new(RefinedTrack::refine(&raw, DEFAULT_REFINE_INTERVAL_METERS))
    }

    #[test]
    fn test_start_on_empty_track_is_noop() {
        let f = fixture(60);
        f.scheduler.start();
        assert!(!f.scheduler.is_playing());
        assert_eq!(f.timer.pending_count(), 0);
    }

    #[test]
    fn test_first_step_scheduled_immediately() {
        let f = fixture(60);
        f.scheduler.set_track(three_point_track());
        f.scheduler.start();
        assert!(f.scheduler.is_playing());
        assert_eq!(f.timer.next_delay(), Some(Duration::ZERO));
    }

    #[test]
    fn test_step_interval_matches_distance_over_speed() {
        let f = fixture(36); // 36 km/h = 10 m/s
        let track = three_point_track();
        let hop = haversine_distance(&track.get(0).unwrap(), &track.get(1).unwrap());
        f.scheduler.set_track(track);
        f.scheduler.start();

        f.timer.fire_next();
        let expected_ms = ((hop / 10.0) * 1000.0) as u64;
        assert_eq!(
            f.timer.next_delay(),
            Some(Duration::from_millis(expected_ms))
        );
    }

    #[test]
    fn test_runs_to_completion_and_stops() {
        let f = fixture(60);
        f.scheduler.set_track(three_point_track());
        f.scheduler.start();

        let mut fired = 0;
        while f.timer.fire_next().is_some() {
            fired += 1;
            assert!(fired < 10, "playback never terminated");
        }
        // index 0, index 1, then the terminal step at index 2.
        assert_eq!(fired, 3);
        assert!(!f.scheduler.is_playing());
        assert_eq!(f.scheduler.current_index(), 2);
        assert_eq!(f.scheduler.progress_percent(), 100.0);
    }

    #[test]
    fn test_paused_ticks_do_not_advance() {
        let f = fixture(60);
        f.scheduler.set_track(three_point_track());
        f.scheduler.start();
        f.timer.fire_next();
        assert_eq!(f.scheduler.current_index(), 1);

        f.scheduler.pause();
        for _ in 0..5 {
            // Paused ticks keep re-firing but the cursor stays put.
            assert!(f.timer.fire_next().is_some());
            assert_eq!(f.scheduler.current_index(), 1);
            assert!(f.scheduler.is_playing());
        }

        f.scheduler.resume();
        f.timer.fire_next();
        assert_eq!(f.scheduler.current_index(), 2);
    }

    #[test]
    fn test_speed_change_applies_on_next_step() {
        let f = fixture(36);
        let track = three_point_track();
        let hop = haversine_distance(&track.get(0).unwrap(), &track.get(1).unwrap());
        f.scheduler.set_track(track);
        f.scheduler.start();
        f.timer.fire_next();

        // Halving the speed doubles the next interval; the already
        // scheduled one is unchanged.
        f.controls.set_speed(18);
        let slow_ms = ((hop / 5.0) * 1000.0) as u64;
        assert_ne!(f.timer.next_delay(), Some(Duration::from_millis(slow_ms)));
        f.timer.fire_next();
        assert_eq!(f.timer.next_delay(), Some(Duration::from_millis(slow_ms)));
    }

    #[test]
    fn test_zero_speed_floored_to_one() {
        let f = fixture(0);
        assert_eq!(f.controls.speed_kmh(), 1);
        f.scheduler.set_track(three_point_track());
        f.scheduler.start();
        // Must not divide by zero.
        f.timer.fire_next();
        assert!(f.timer.next_delay().unwrap() > Duration::ZERO);
    }

    #[test]
    fn test_report_rate_limiting() {
        let f = fixture(60);
        f.scheduler.set_track(three_point_track());
        f.scheduler.start();

        // First step reports immediately.
        f.timer.fire_next();
        assert_eq!(f.sink.count(), 1);

        // Re-fire within the 800 ms window (paused so the track lasts).
        f.scheduler.pause();
        for _ in 0..7 {
            f.clock.advance(100);
            f.timer.fire_next();
        }
        assert_eq!(f.sink.count(), 1);

        // Crossing the window re-arms the report.
        f.clock.advance(200);
        f.timer.fire_next();
        assert_eq!(f.sink.count(), 2);
    }

    #[test]
    fn test_stop_cancels_pending_and_resets() {
        let f = fixture(60);
        f.scheduler.set_track(three_point_track());
        f.scheduler.start();
        f.timer.fire_next();
        assert_eq!(f.scheduler.current_index(), 1);

        f.scheduler.stop(true);
        assert!(!f.scheduler.is_playing());
        assert_eq!(f.timer.pending_count(), 0);
        assert!(f.timer.cancel_count() >= 1);
        assert_eq!(f.scheduler.current_index(), 0);
        assert_eq!(f.scheduler.progress_percent(), 0.0);
    }

    #[test]
    fn test_stop_without_reset_keeps_cursor() {
        let f = fixture(60);
        f.scheduler.set_track(three_point_track());
        f.scheduler.start();
        f.timer.fire_next();
        f.scheduler.stop(false);
        assert_eq!(f.scheduler.current_index(), 1);
    }

    #[test]
    fn test_scrub_maps_fraction_and_reports() {
        let mut f = fixture(60);
        f.scheduler.set_track(three_point_track());
        f.scheduler.scrub(1.0);
        assert_eq!(f.scheduler.current_index(), 2);
        assert_eq!(f.scheduler.progress_percent(), 100.0);
        assert_eq!(f.sink.count(), 1);
        assert_eq!(f.sink.reports.lock().unwrap()[0].2, 60);
        assert!(matches!(
            f.rx.try_recv().unwrap(),
            renderer::RendererCommand::UpdateVehicle { .. }
        ));

        // Scrub is ignored mid-session.
        f.scheduler.start();
        f.scheduler.scrub(0.0);
        assert_eq!(f.scheduler.current_index(), 2);
    }

    #[test]
    fn test_single_point_track_finishes_immediately() {
        let f = fixture(60);
        f.scheduler
            .set_track(Arc::new(RefinedTrack::refine(&[GpsPoint::new(1.0, 2.0)], 10.0)));
        f.scheduler.start();
        f.timer.fire_next();
        assert!(!f.scheduler.is_playing());
        assert_eq!(f.scheduler.progress_percent(), 0.0);
    }

    #[test]
    fn test_full_playback_simulated_duration() {
        // ~1 km track at 36 km/h: the per-hop intervals must sum to about
        // track_length / 10 m/s.
        let f = fixture(36);
        let raw = [GpsPoint::new(0.0, 0.0), GpsPoint::new(0.009, 0.0)];
        let track = Arc::new(RefinedTrack::refine(&raw, DEFAULT_REFINE_INTERVAL_METERS));
        let length = track.total_length_meters();
        f.scheduler.set_track(track);
        f.scheduler.start();

        let mut total = Duration::ZERO;
        while let Some(delay) = f.timer.fire_next() {
            total += delay;
        }
        assert!(!f.scheduler.is_playing());

        let expected_secs = length / 10.0;
        let total_secs = total.as_secs_f64();
        assert!(
            (total_secs - expected_secs).abs() < 0.2,
            "simulated {} s, expected {} s",
            total_secs,
            expected_secs
        );
    }
}
