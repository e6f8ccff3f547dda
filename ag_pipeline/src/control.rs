//! ABOUTME: Control: the per-pipeline shared state a Manager, Puller, Detector,
//! ABOUTME: Pusher, and Clip-writer all observe or mutate across task boundaries.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::RwLock;
use std::time::SystemTime;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlStatus {
    Starting,
    Running,
    Stopping,
    Stopped,
    Error,
}

impl std::fmt::Display for ControlStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ControlStatus::Starting => "starting",
            ControlStatus::Running => "running",
            ControlStatus::Stopping => "stopping",
            ControlStatus::Stopped => "stopped",
            ControlStatus::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// Immutable-after-start configuration plus the mutable, cross-task fields
/// every worker in a pipeline observes. Workers take an `Arc<Control>` and
/// only the subset of methods they need; the Manager owns the handle and
/// removes it from the registry on teardown.
pub struct Control {
    pub code: String,
    pub behavior_code: String,
    pub input_stream_url: String,
    pub push_enabled: bool,
    pub push_stream_url: Option<String>,
    pub start_time: SystemTime,

    width: AtomicU32,
    height: AtomicU32,
    input_fps: RwLock<f64>,
    observed_fps: RwLock<f64>,
    status: RwLock<ControlStatus>,
    error: RwLock<Option<String>>,

    /// Graceful shutdown signal, raised by `cancel` or by the Manager on
    /// worker death.
    pub stop: CancellationToken,
    /// Faulted signal, raised by a worker before it exits on a fatal error.
    pub error_signal: CancellationToken,

    /// Detector/Clip-writer handshake flags (§3 BehaviorState). These live
    /// on the Control rather than inside the Detector-owned BehaviorState
    /// bag because the Clip-writer task, not just the Detector, must clear
    /// them on termination -- a genuinely cross-task handoff needs atomics,
    /// not a structure that's supposed to stay single-owner.
    pub clip_in_progress: AtomicBool,
    pub clip_writer_active: AtomicBool,
}

impl Control {
    pub fn new(
        code: impl Into<String>,
        behavior_code: impl Into<String>,
        input_stream_url: impl Into<String>,
        push_enabled: bool,
        push_stream_url: Option<String>,
    ) -> Self {
        Self {
            code: code.into(),
            behavior_code: behavior_code.into(),
            input_stream_url: input_stream_url.into(),
            push_enabled,
            push_stream_url,
            start_time: SystemTime::now(),
            width: AtomicU32::new(0),
            height: AtomicU32::new(0),
            input_fps: RwLock::new(0.0),
            observed_fps: RwLock::new(0.0),
            status: RwLock::new(ControlStatus::Starting),
            error: RwLock::new(None),
            stop: CancellationToken::new(),
            error_signal: CancellationToken::new(),
            clip_in_progress: AtomicBool::new(false),
            clip_writer_active: AtomicBool::new(false),
        }
    }

    pub fn width(&self) -> u32 {
        self.width.load(Ordering::Acquire)
    }

    pub fn height(&self) -> u32 {
        self.height.load(Ordering::Acquire)
    }

    pub fn input_fps(&self) -> f64 {
        *self.input_fps.read().expect("input_fps lock poisoned")
    }

    pub fn observed_fps(&self) -> f64 {
        *self.observed_fps.read().expect("observed_fps lock poisoned")
    }

    pub fn status(&self) -> ControlStatus {
        *self.status.read().expect("status lock poisoned")
    }

    pub fn set_status(&self, status: ControlStatus) {
        *self.status.write().expect("status lock poisoned") = status;
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.read().expect("error lock poisoned").clone()
    }

    /// Publish the stream dimensions and measured input FPS once the Puller
    /// has resolved them. Defaulting to 25.0 for a non-positive FPS report
    /// happens at the call site, matching the source's own fallback.
    pub fn publish_stream_properties(&self, width: u32, height: u32, input_fps: f64) {
        self.width.store(width, Ordering::Release);
        self.height.store(height, Ordering::Release);
        *self.input_fps.write().expect("input_fps lock poisoned") = input_fps;
    }

    pub fn set_observed_fps(&self, fps: f64) {
        *self.observed_fps.write().expect("observed_fps lock poisoned") = fps;
    }

    /// Mark the Control faulted: records the message, raises the error
    /// signal, and transitions status to `Error`. Idempotent.
    pub fn fault(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(code = %self.code, error = %message, "control faulted");
        *self.error.write().expect("error lock poisoned") = Some(message);
        self.set_status(ControlStatus::Error);
        self.error_signal.cancel();
    }

    pub fn is_stopping(&self) -> bool {
        self.stop.is_cancelled() || self.error_signal.is_cancelled()
    }

    pub fn uptime_seconds(&self) -> f64 {
        self.start_time
            .elapsed()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

/// A point-in-time copy of a Control's observable fields, safe to hand out
/// without holding any lock on the live Control.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlSnapshot {
    pub code: String,
    #[serde(rename = "behaviorCode")]
    pub behavior_code: String,
    #[serde(rename = "streamUrl")]
    pub stream_url: String,
    #[serde(rename = "pushStream")]
    pub push_stream: bool,
    #[serde(rename = "pushStreamUrl")]
    pub push_stream_url: Option<String>,
    #[serde(rename = "checkFps")]
    pub check_fps: f64,
    pub status: String,
    pub uptime: f64,
    pub error: Option<String>,
    pub width: u32,
    pub height: u32,
    #[serde(rename = "inputFps")]
    pub input_fps: f64,
}

impl ControlSnapshot {
    pub fn from_control(control: &Control) -> Self {
        Self {
            code: control.code.clone(),
            behavior_code: control.behavior_code.clone(),
            stream_url: control.input_stream_url.clone(),
            push_stream: control.push_enabled,
            push_stream_url: control.push_stream_url.clone(),
            check_fps: control.observed_fps(),
            status: control.status().to_string(),
            uptime: control.uptime_seconds(),
            error: control.error_message(),
            width: control.width(),
            height: control.height(),
            input_fps: control.input_fps(),
        }
    }

    /// The synthesized snapshot returned for an unknown code: `status`
    /// always answers with a snapshot, never an error (§4.1).
    pub fn inactive(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            behavior_code: String::new(),
            stream_url: String::new(),
            push_stream: false,
            push_stream_url: None,
            check_fps: 0.0,
            status: ControlStatus::Stopped.to_string(),
            uptime: 0.0,
            error: None,
            width: 0,
            height: 0,
            input_fps: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_control_starts_in_starting_state() {
        let control = Control::new("cam1", "ZHOUJIERUQIN", "rtsp://x", false, None);
        assert_eq!(control.status(), ControlStatus::Starting);
        assert!(!control.is_stopping());
    }

    #[test]
    fn publish_stream_properties_updates_atomics() {
        let control = Control::new("cam1", "ZHOUJIERUQIN", "rtsp://x", false, None);
        control.publish_stream_properties(1920, 1080, 25.0);
        assert_eq!(control.width(), 1920);
        assert_eq!(control.height(), 1080);
        assert_eq!(control.input_fps(), 25.0);
    }

    #[test]
    fn fault_raises_error_signal_and_sets_status() {
        let control = Control::new("cam1", "ZHOUJIERUQIN", "rtsp://x", false, None);
        control.fault("ffmpeg exited");
        assert_eq!(control.status(), ControlStatus::Error);
        assert_eq!(control.error_message().as_deref(), Some("ffmpeg exited"));
        assert!(control.error_signal.is_cancelled());
        assert!(control.is_stopping());
    }

    #[test]
    fn inactive_snapshot_never_errors_for_unknown_code() {
        let snapshot = ControlSnapshot::inactive("missing");
        assert_eq!(snapshot.code, "missing");
        assert_eq!(snapshot.status, "stopped");
    }
}
