//! JSON configuration loading and validation.
//!
//! A typed error, a free `load_config` function, and a `validate()` method
//! for cross-field invariants that `serde` alone can't express.

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::shutter::Side;

/// Log level for the CLI binary's tracing setup. Not read by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace-level verbosity.
    Trace,
    /// Debug-level verbosity.
    Debug,
    /// Info-level verbosity (default).
    Info,
    /// Warning-level verbosity.
    Warn,
    /// Error-level verbosity.
    Error,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

fn default_command_delay() -> f64 {
    0.5
}

fn default_step_command_delay() -> f64 {
    2.0
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

/// Immutable configuration document, read once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Device path for the shutter controller link (e.g. `/dev/ttyUSB0`).
    pub shutter_port: String,
    /// Baud rate for the shutter controller link.
    #[serde(default = "default_baud")]
    pub shutter_baud: u32,
    /// Device path for the heartbeat monitor link.
    pub heartbeat_port: String,
    /// Baud rate for the heartbeat monitor link.
    #[serde(default = "default_baud")]
    pub heartbeat_baud: u32,
    /// Read timeout for both links, in seconds.
    pub read_timeout: f64,
    /// Inter-step delay for ordinary (full-speed) movement, in seconds.
    #[serde(default = "default_command_delay")]
    pub command_delay: f64,
    /// Inter-step delay for the slow-open ramp and stepped moves, in seconds.
    #[serde(default = "default_step_command_delay")]
    pub step_command_delay: f64,
    /// Full-travel timeout budget, in seconds.
    pub shutter_timeout: f64,
    /// Whether the shutter controller is a legacy unit (affects decoding and
    /// idle-read tolerance).
    #[serde(default)]
    pub has_legacy_controller: bool,
    /// Whether a bumper guard relay reset should be issued before movement.
    #[serde(default)]
    pub has_bumper_guard: bool,
    /// Number of slow-ramp steps before full-speed opening; 0 disables the ramp.
    #[serde(default)]
    pub slow_open_steps: u32,
    /// Human name → ordered side string (e.g. `"east"` → `"a"`, `"both"` → `"ab"`).
    pub sides: HashMap<String, String>,
    /// Side character → display label (keys `"a"`, `"b"`).
    pub side_labels: HashMap<String, String>,
    /// Whether the external CLI caller reverses side order on close.
    #[serde(default)]
    pub invert_on_close: bool,
    /// Side character → belt-tension sensor name, if a sensor is bound.
    #[serde(default)]
    pub belt_sensors: HashMap<String, String>,
    /// IP addresses allowed to issue movement commands.
    pub control_ips: Vec<IpAddr>,
    /// Service name used only for log context.
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// Log verbosity used only by the CLI binary.
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,
}

fn default_baud() -> u32 {
    9600
}

fn default_service_name() -> String {
    "domed".to_string()
}

impl Config {
    /// Validate cross-field invariants not expressible in `serde` alone.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.read_timeout <= 0.0 {
            return Err(ConfigError::Validation(
                "read_timeout must be positive".into(),
            ));
        }
        if self.shutter_timeout <= 0.0 {
            return Err(ConfigError::Validation(
                "shutter_timeout must be positive".into(),
            ));
        }
        for (name, chars) in &self.sides {
            if chars.is_empty() || chars.len() > 2 {
                return Err(ConfigError::Validation(format!(
                    "sides.{name} must be 1 or 2 characters"
                )));
            }
            if !chars.chars().all(|c| c == 'a' || c == 'b') {
                return Err(ConfigError::Validation(format!(
                    "sides.{name} must be drawn from {{a,b}}, got {chars:?}"
                )));
            }
        }
        for key in self.side_labels.keys().chain(self.belt_sensors.keys()) {
            if key != "a" && key != "b" {
                return Err(ConfigError::Validation(format!(
                    "side key {key:?} must be \"a\" or \"b\""
                )));
            }
        }
        Ok(())
    }

    /// Resolve a `sides` argument (a human name or a raw `a`/`b`/`ab` string)
    /// into the ordered list of sides to move.
    pub fn resolve_sides(&self, sides: &str) -> Option<Vec<Side>> {
        let raw = self
            .sides
            .get(sides)
            .map(String::as_str)
            .unwrap_or(sides);
        if raw.is_empty() || raw.len() > 2 {
            return None;
        }
        raw.chars().map(Side::from_char).collect()
    }

    /// Display label for a side, falling back to its letter.
    pub fn label_for(&self, side: Side) -> String {
        self.side_labels
            .get(side.as_str())
            .cloned()
            .unwrap_or_else(|| side.as_str().to_string())
    }

    /// Belt-tension sensor name bound to a side, if any.
    pub fn belt_sensor_for(&self, side: Side) -> Option<&str> {
        self.belt_sensors.get(side.as_str()).map(String::as_str)
    }

    /// Whether `ip` is permitted to issue movement commands.
    pub fn is_authorized_ip(&self, ip: IpAddr) -> bool {
        self.control_ips.contains(&ip)
    }
}

/// Load and validate the configuration document at `path`.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let config: Config = serde_json::from_str(&raw).map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        source: e,
    })?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> String {
        r#"{
            "shutter_port": "/dev/ttyUSB0",
            "heartbeat_port": "/dev/ttyUSB1",
            "read_timeout": 1.0,
            "shutter_timeout": 120.0,
            "sides": {"east": "a", "west": "b", "both": "ab"},
            "side_labels": {"a": "East", "b": "West"},
            "control_ips": ["127.0.0.1"]
        }"#
        .to_string()
    }

    #[test]
    fn loads_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dome.json");
        std::fs::write(&path, sample_json()).unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.command_delay, 0.5);
        assert_eq!(config.step_command_delay, 2.0);
        assert_eq!(config.shutter_baud, 9600);
        assert!(!config.has_legacy_controller);
    }

    #[test]
    fn resolves_named_and_raw_sides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dome.json");
        std::fs::write(&path, sample_json()).unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.resolve_sides("east"), Some(vec![Side::A]));
        assert_eq!(config.resolve_sides("both"), Some(vec![Side::A, Side::B]));
        assert_eq!(config.resolve_sides("ba"), Some(vec![Side::B, Side::A]));
        assert_eq!(config.resolve_sides("c"), None);
    }

    #[test]
    fn rejects_non_positive_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dome.json");
        let mut bad: serde_json::Value = serde_json::from_str(&sample_json()).unwrap();
        bad["read_timeout"] = serde_json::json!(0.0);
        std::fs::write(&path, bad.to_string()).unwrap();
        assert!(matches!(
            load_config(&path),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn control_ip_allowlist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dome.json");
        std::fs::write(&path, sample_json()).unwrap();
        let config = load_config(&path).unwrap();
        assert!(config.is_authorized_ip("127.0.0.1".parse().unwrap()));
        assert!(!config.is_authorized_ip("10.0.0.1".parse().unwrap()));
    }
}
