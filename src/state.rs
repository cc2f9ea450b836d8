//! Shared state guarded by the status mutex, and the snapshot assembled from it.

use std::time::SystemTime;

use crate::heartbeat::HeartbeatState;
use crate::shutter::ShutterStatus;

/// Everything read by `status()` and written by the two monitor loops and
/// the command surface. Guarded by `Supervisor`'s `status_mutex`.
#[derive(Debug, Clone)]
pub struct SharedState {
    /// Side a's last known status.
    pub shutter_a: ShutterStatus,
    /// Side b's last known status.
    pub shutter_b: ShutterStatus,
    /// When `shutter_a`/`shutter_b` were last updated.
    pub status_time: SystemTime,
    /// Last known heartbeat watchdog state.
    pub heartbeat: HeartbeatState,
    /// When `heartbeat` was last updated.
    pub heartbeat_time: SystemTime,
    /// Whether engineering mode is active.
    pub engineering_mode: bool,
    /// Whether the pre-movement siren is enabled.
    pub siren_enabled: bool,
}

impl Default for SharedState {
    fn default() -> Self {
        Self {
            shutter_a: ShutterStatus::default(),
            shutter_b: ShutterStatus::default(),
            status_time: SystemTime::now(),
            heartbeat: HeartbeatState::default(),
            heartbeat_time: SystemTime::now(),
            engineering_mode: false,
            siren_enabled: false,
        }
    }
}

/// Status of one side, as exposed to callers.
#[derive(Debug, Clone, PartialEq)]
pub struct SideSnapshot {
    /// Decoded controller status.
    pub status: ShutterStatus,
    /// Configured display label.
    pub label: String,
    /// Belt-tension reading, if a sensor is bound to this side.
    pub belt_tensioned: Option<bool>,
}

/// A point-in-time read of the whole dome, returned by `status()`.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    /// When this snapshot was assembled.
    pub timestamp: SystemTime,
    /// Side a.
    pub side_a: SideSnapshot,
    /// Side b.
    pub side_b: SideSnapshot,
    /// Both sides closed.
    pub closed: bool,
    /// Engineering mode flag.
    pub engineering_mode: bool,
    /// When the heartbeat state was last updated.
    pub heartbeat_time: SystemTime,
    /// Heartbeat watchdog state.
    pub heartbeat: HeartbeatState,
    /// Human label for `heartbeat`.
    pub heartbeat_label: String,
    /// Seconds remaining, if `heartbeat` is `Active`.
    pub heartbeat_remaining: Option<f64>,
    /// Whether the pre-movement siren is enabled.
    pub siren_enabled: bool,
}

/// Render a [`HeartbeatState`] as the display string used in a snapshot.
pub fn heartbeat_label(state: HeartbeatState) -> String {
    match state {
        HeartbeatState::Unavailable => "unavailable".to_string(),
        HeartbeatState::Disabled => "disabled".to_string(),
        HeartbeatState::Active { .. } => "active".to_string(),
        HeartbeatState::TrippedClosing => "closing".to_string(),
        HeartbeatState::TrippedIdle => "tripped".to_string(),
    }
}
