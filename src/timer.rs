//! Scheduling and clock abstractions for the simulation engines.
//!
//! The playback scheduler reschedules itself with a freshly computed delay
//! on every step, and the free-drive integrator ticks at a fixed rate. Both
//! are expressed against [`StepTimer`] (`schedule_once` + `cancel_all`) so
//! the engines never touch a concrete timer primitive and tests can drive
//! steps by hand.
//!
//! [`Clock`] plays the same role for wall-clock reads (report rate-limit
//! windows, integration elapsed time).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

/// A scheduled unit of work.
pub type StepFn = Box<dyn FnOnce() + Send + 'static>;

/// One-shot timer abstraction.
///
/// `cancel_all` is confirmed: once it returns, no previously scheduled step
/// will execute. Because of that guarantee it must not be called from
/// within a step callback.
pub trait StepTimer: Send + Sync + 'static {
    /// Run `step` once after `delay`.
    fn schedule_once(&self, delay: Duration, step: StepFn);

    /// Cancel every pending step, waiting out any step currently executing.
    fn cancel_all(&self);
}

/// Monotonic millisecond clock.
pub trait Clock: Send + Sync + 'static {
    fn now_millis(&self) -> u64;
}

// ============================================================================
// Production implementations
// ============================================================================

/// [`StepTimer`] backed by tokio tasks.
///
/// Scheduled steps capture the timer epoch; `cancel_all` takes the run
/// lock and then bumps the epoch, so a step that already started finishes
/// first and everything scheduled before the bump, including a successor
/// the in-flight step queued, sees the stale epoch and becomes a no-op.
/// Task handles are additionally aborted to release their sleeps early.
#[derive(Clone)]
pub struct TokioTimer {
    shared: Arc<TimerShared>,
}

struct TimerShared {
    epoch: AtomicU64,
    run_lock: Mutex<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl TokioTimer {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(TimerShared {
                epoch: AtomicU64::new(0),
                run_lock: Mutex::new(()),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }
}

impl Default for TokioTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl StepTimer for TokioTimer {
    fn schedule_once(&self, delay: Duration, step: StepFn) {
        let shared = self.shared.clone();
        let scheduled_epoch = shared.epoch.load(Ordering::Acquire);

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _guard = shared.run_lock.lock().unwrap();
            if shared.epoch.load(Ordering::Acquire) == scheduled_epoch {
                step();
            }
        });

        let mut tasks = self.shared.tasks.lock().unwrap();
        tasks.retain(|h| !h.is_finished());
        tasks.push(handle);
    }

    fn cancel_all(&self) {
        // Take the run lock before bumping the epoch: an in-flight step
        // finishes first, and any successor it scheduled carries the
        // pre-bump epoch and becomes a no-op.
        let guard = self.shared.run_lock.lock().unwrap();
        self.shared.epoch.fetch_add(1, Ordering::AcqRel);
        drop(guard);
        let mut tasks = self.shared.tasks.lock().unwrap();
        for handle in tasks.drain(..) {
            handle.abort();
        }
    }
}

/// [`Clock`] reading monotonic milliseconds since construction.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

// ============================================================================
// Test implementations
// ============================================================================

/// Manually driven timer: scheduled steps queue up until the test fires
/// them, recording each requested delay.
#[cfg(test)]
pub(crate) struct ManualTimer {
    pending: Mutex<Vec<(Duration, StepFn)>>,
    cancelled: AtomicU64,
}

#[cfg(test)]
impl ManualTimer {
    pub(crate) fn new() -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
            cancelled: AtomicU64::new(0),
        }
    }

    /// Number of steps waiting to fire.
    pub(crate) fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Delay requested for the next pending step.
    pub(crate) fn next_delay(&self) -> Option<Duration> {
        self.pending.lock().unwrap().first().map(|(d, _)| *d)
    }

    /// Fire the next pending step, returning its scheduled delay.
    pub(crate) fn fire_next(&self) -> Option<Duration> {
        let next = {
            let mut pending = self.pending.lock().unwrap();
            if pending.is_empty() {
                None
            } else {
                Some(pending.remove(0))
            }
        };
        next.map(|(delay, step)| {
            step();
            delay
        })
    }

    /// How many times `cancel_all` was called.
    pub(crate) fn cancel_count(&self) -> u64 {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
impl StepTimer for ManualTimer {
    fn schedule_once(&self, delay: Duration, step: StepFn) {
        self.pending.lock().unwrap().push((delay, step));
    }

    fn cancel_all(&self) {
        self.cancelled.fetch_add(1, Ordering::SeqCst);
        self.pending.lock().unwrap().clear();
    }
}

/// Manually advanced clock for rate-limit and integration tests.
#[cfg(test)]
pub(crate) struct ManualClock {
    millis: AtomicU64,
}

#[cfg(test)]
impl ManualClock {
    pub(crate) fn new() -> Self {
        Self {
            millis: AtomicU64::new(0),
        }
    }

    pub(crate) fn advance(&self, millis: u64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_manual_timer_fires_in_order() {
        let timer = ManualTimer::new();
        let fired = Arc::new(AtomicUsize::new(0));

        for i in 1..=3 {
            let fired = fired.clone();
            timer.schedule_once(
                Duration::from_millis(i * 100),
                Box::new(move || {
                    fired.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }

        assert_eq!(timer.pending_count(), 3);
        assert_eq!(timer.fire_next(), Some(Duration::from_millis(100)));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        timer.cancel_all();
        assert_eq!(timer.pending_count(), 0);
        assert_eq!(timer.fire_next(), None);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_tokio_timer_runs_step() {
        let timer = TokioTimer::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = fired.clone();

        timer.schedule_once(
            Duration::from_millis(5),
            Box::new(move || {
                fired2.fetch_add(1, Ordering::SeqCst);
            }),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_all_stops_rescheduling_chain() {
        // A step that queues its own successor, the way both engines do.
        fn chain(timer: TokioTimer, fired: Arc<AtomicUsize>) {
            let t = timer.clone();
            let f = fired.clone();
            timer.schedule_once(
                Duration::from_millis(1),
                Box::new(move || {
                    f.fetch_add(1, Ordering::SeqCst);
                    chain(t, f);
                }),
            );
        }

        let timer = TokioTimer::new();
        let fired = Arc::new(AtomicUsize::new(0));
        chain(timer.clone(), fired.clone());
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Cancel from off the runtime while steps are in flight. Once it
        // returns, no step may run again, not even a successor scheduled
        // by a step that was executing during the cancel.
        let timer2 = timer.clone();
        tokio::task::spawn_blocking(move || timer2.cancel_all())
            .await
            .unwrap();
        let after_cancel = fired.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), after_cancel);
    }

    #[tokio::test]
    async fn test_tokio_timer_cancel_all_is_confirmed() {
        let timer = TokioTimer::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = fired.clone();

        timer.schedule_once(
            Duration::from_millis(20),
            Box::new(move || {
                fired2.fetch_add(1, Ordering::SeqCst);
            }),
        );
        timer.cancel_all();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
