//! Supervisory core for an Astrohaven-family observatory dome controller.
//!
//! Reconstructs shutter state from a terse byte-oriented controller
//! protocol, drives multi-step open/close movements against overlapping
//! termination conditions (timeout, operator stop, heartbeat trip, belt
//! slack), and multiplexes a heartbeat watchdog link that can force an
//! emergency close. See [`supervisor::Supervisor`] for the command surface.

pub mod belt;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod logging;
pub mod movement;
pub mod serial;
pub mod shutter;
pub mod state;
pub mod supervisor;
pub mod testing;

pub use config::{load_config, Config};
pub use error::{BeltSensorError, CommandOutcome, ConfigError, SerialError};
pub use state::StatusSnapshot;
pub use supervisor::Supervisor;
