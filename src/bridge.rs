//! ADB device bridge.
//!
//! Forwards simulated fixes to a mock-location receiver on a connected
//! Android device as broadcast intents. Every report is fire-and-forget:
//! the process is spawned on a detached task, success and failure are only
//! logged, and a slow or hanging `adb` must never stall a scheduling timer.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::process::Command;

/// Android package hosting the mock-location receiver.
const TARGET_PACKAGE: &str = "org.nitri.gpxplayer";
const LOCATION_ACTION: &str = "org.nitri.gpxplayer.ACTION_SET_LOCATION";

/// Sink for simulated location reports.
///
/// Implementations must not block the caller; the engines invoke this from
/// their timer steps.
pub trait LocationSink: Send + Sync + 'static {
    /// Best-effort report of a fix with an integer speed in km/h.
    fn report(&self, latitude: f64, longitude: f64, speed_kmh: i32);
}

/// [`LocationSink`] that shells out to `adb`.
pub struct AdbBridge {
    adb_path: PathBuf,
}

impl AdbBridge {
    pub fn new(adb_path: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            adb_path: adb_path.into(),
        })
    }

    pub fn adb_path(&self) -> &Path {
        &self.adb_path
    }

    /// Launch the companion app on the device, fire-and-forget.
    pub fn launch_app(&self) {
        let program = self.adb_path.clone();
        let args = vec![
            "shell".to_string(),
            "am".to_string(),
            "start".to_string(),
            "-n".to_string(),
            format!("{}/.MainActivity", TARGET_PACKAGE),
        ];
        spawn_detached(program, args, "app launch");
    }
}

impl LocationSink for AdbBridge {
    fn report(&self, latitude: f64, longitude: f64, speed_kmh: i32) {
        let program = self.adb_path.clone();
        let args = vec![
            "shell".to_string(),
            "am".to_string(),
            "broadcast".to_string(),
            "-n".to_string(),
            format!("{}/.MockLocationReceiver", TARGET_PACKAGE),
            "-a".to_string(),
            LOCATION_ACTION.to_string(),
            "-d".to_string(),
            format!("geo:{},{}", latitude, longitude),
            "--ei".to_string(),
            "speed".to_string(),
            speed_kmh.to_string(),
        ];
        debug!(
            "Sending geo intent: {},{} at {} km/h",
            latitude, longitude, speed_kmh
        );
        spawn_detached(program, args, "geo intent");
    }
}

/// Run `program args..` on a detached tokio task, logging the outcome.
///
/// Degrades to a logged no-op outside a tokio runtime.
fn spawn_detached(program: PathBuf, args: Vec<String>, what: &'static str) {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        warn!("No async runtime available, dropping {}", what);
        return;
    };
    handle.spawn(async move {
        match Command::new(&program).args(&args).output().await {
            Ok(output) if output.status.success() => {
                debug!("Sent {}, exit code 0", what);
            }
            Ok(output) => {
                warn!(
                    "{} via {:?} exited with {}: {}",
                    what,
                    program,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }
            Err(e) => {
                warn!("Failed to spawn {:?} for {}: {}", program, what, e);
            }
        }
    });
    info!("Dispatched {}", what);
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingSink;
    use super::*;

    #[test]
    fn test_report_outside_runtime_is_noop() {
        // Spawn failure path: no runtime here, must not panic.
        let bridge = AdbBridge::new("/nonexistent/adb");
        bridge.report(51.0, 6.0, 30);
        bridge.launch_app();
    }

    #[tokio::test]
    async fn test_report_with_missing_binary_is_swallowed() {
        let bridge = AdbBridge::new("/nonexistent/adb");
        bridge.report(51.0, 6.0, 30);
        // Give the detached task a moment to fail quietly.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    #[test]
    fn test_recording_sink() {
        let sink = RecordingSink::new();
        sink.report(1.0, 2.0, 3);
        assert_eq!(sink.count(), 1);
        assert_eq!(sink.reports.lock().unwrap()[0], (1.0, 2.0, 3));
    }
}
