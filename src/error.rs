//! Error and outcome types for the dome supervisor.
//!
//! `CommandOutcome` is not a Rust error type — it is the flat status code
//! returned across the RPC boundary for every command, success included.
//! `SerialError`, `ConfigError`, and `BeltSensorError` are conventional
//! `thiserror` leaf errors for the layers that can actually fail.

use thiserror::Error;

/// Outcome of a command issued through the RPC surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The command completed as requested.
    Succeeded,
    /// The command ran but did not reach its target (timeout, belt slack,
    /// accumulated write failures, or a predicate that never became true).
    Failed,
    /// The command mutex was already held by another in-flight command.
    Blocked,
    /// The heartbeat monitor has already tripped and settled (`TrippedIdle`).
    HeartbeatTimedOut,
    /// The heartbeat monitor is mid-close (`TrippedClosing`).
    HeartbeatCloseInProgress,
    /// The heartbeat monitor link has never reported in (`Unavailable`).
    HeartbeatUnavailable,
    /// The requested heartbeat timeout is outside `[0, 120)` seconds.
    HeartbeatInvalidTimeout,
    /// Engineering mode is active; movement and arming are refused.
    EngineeringModeActive,
    /// Engineering mode cannot be enabled while the heartbeat is armed.
    EngineeringModeRequiresHeartbeatDisabled,
    /// The caller's IP address is not in the control-IP allowlist.
    InvalidControlIP,
}

impl std::fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// Errors from a serial link.
#[derive(Debug, Error)]
pub enum SerialError {
    /// A write did not transfer exactly one byte, or failed outright.
    #[error("write failed")]
    Write,
    /// A read returned no byte within the configured timeout.
    #[error("read timed out")]
    ReadTimeout,
    /// The link has no open port (a reconnect is in progress or pending).
    #[error("serial link disconnected")]
    Disconnected,
}

/// Errors from loading and validating the configuration document.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read from disk.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path that failed to read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The file was read but is not valid JSON for this shape.
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// Path that failed to parse.
        path: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
    /// The document parsed but failed semantic validation.
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

/// Errors from the injected belt-tension sensor oracle.
#[derive(Debug, Error, Clone)]
pub enum BeltSensorError {
    /// The sensor service did not respond or returned an error.
    #[error("belt sensor '{sensor}' unavailable: {detail}")]
    Unavailable {
        /// Configured sensor name.
        sensor: String,
        /// Human-readable detail from the sensor service.
        detail: String,
    },
}
