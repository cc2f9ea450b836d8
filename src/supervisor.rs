//! Owns component lifecycles and exposes the command surface.

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;

use crate::belt::BeltSensor;
use crate::config::Config;
use crate::error::{BeltSensorError, CommandOutcome, SerialError};
use crate::heartbeat::{self, decode_heartbeat_byte, HeartbeatState};
use crate::logging::LogSink;
use crate::movement::{self, MovementContext, Target, TerminationPredicate};
use crate::serial::SerialLink;
use crate::shutter::{decode_status_byte, DecodeEvent, ShutterStatus, Side};
use crate::state::{heartbeat_label, SharedState, SideSnapshot, StatusSnapshot};

/// Upper bound, in seconds, below which arming requests are accepted.
const MAX_ARMING_SECONDS: i32 = heartbeat::ARMING_BOUND_SECONDS.end;

fn side_label(sides: &[Side], config: &Config) -> String {
    match sides {
        [only] => config.label_for(*only),
        _ => "both".to_string(),
    }
}

/// Supervisory core: serial links, shared status, and the RPC command surface.
pub struct Supervisor {
    config: Config,
    shutter_link: Arc<SerialLink>,
    heartbeat_link: Arc<SerialLink>,
    state: Arc<Mutex<SharedState>>,
    command_mutex: Arc<Mutex<()>>,
    force_stopped: Arc<AtomicBool>,
    log: Arc<dyn LogSink>,
    belt_sensor: Arc<dyn BeltSensor>,
}

impl Supervisor {
    /// Build a supervisor over already-constructed links. Does not spawn the
    /// monitor threads; call [`Supervisor::spawn_monitors`] once ready.
    pub fn new(
        config: Config,
        shutter_link: Arc<SerialLink>,
        heartbeat_link: Arc<SerialLink>,
        log: Arc<dyn LogSink>,
        belt_sensor: Arc<dyn BeltSensor>,
    ) -> Self {
        Self {
            config,
            shutter_link,
            heartbeat_link,
            state: Arc::new(Mutex::new(SharedState::default())),
            command_mutex: Arc::new(Mutex::new(())),
            force_stopped: Arc::new(AtomicBool::new(false)),
            log,
            belt_sensor,
        }
    }

    /// Spawn the shutter and heartbeat monitor threads.
    pub fn spawn_monitors(&self) -> (JoinHandle<()>, JoinHandle<()>) {
        let shutter_handle = spawn_shutter_monitor(
            self.shutter_link.clone(),
            self.state.clone(),
            self.config.has_legacy_controller,
            self.log.clone(),
        );
        let heartbeat_handle = spawn_heartbeat_monitor(
            self.heartbeat_link.clone(),
            self.shutter_link.clone(),
            self.state.clone(),
            self.config.has_legacy_controller,
            Duration::from_secs_f64(self.config.command_delay),
            self.log.clone(),
        );
        (shutter_handle, heartbeat_handle)
    }

    fn side_status(&self, side: Side) -> ShutterStatus {
        let s = self.state.lock();
        match side {
            Side::A => s.shutter_a,
            Side::B => s.shutter_b,
        }
    }

    /// Assemble a status snapshot. Fails only if a configured belt sensor is
    /// unreachable.
    pub fn status(&self) -> Result<StatusSnapshot, BeltSensorError> {
        let state = self.state.lock();
        let belt_tensioned = |side: Side| -> Result<Option<bool>, BeltSensorError> {
            if self.config.belt_sensor_for(side).is_some() {
                Ok(Some(self.belt_sensor.belt_tensioned(side)?))
            } else {
                Ok(None)
            }
        };
        let side_a = SideSnapshot {
            status: state.shutter_a,
            label: self.config.label_for(Side::A),
            belt_tensioned: belt_tensioned(Side::A)?,
        };
        let side_b = SideSnapshot {
            status: state.shutter_b,
            label: self.config.label_for(Side::B),
            belt_tensioned: belt_tensioned(Side::B)?,
        };
        let heartbeat_remaining = match state.heartbeat {
            HeartbeatState::Active { remaining } => Some(remaining),
            _ => None,
        };
        Ok(StatusSnapshot {
            timestamp: SystemTime::now(),
            closed: side_a.status == ShutterStatus::Closed && side_b.status == ShutterStatus::Closed,
            engineering_mode: state.engineering_mode,
            heartbeat_time: state.heartbeat_time,
            heartbeat: state.heartbeat,
            heartbeat_label: heartbeat_label(state.heartbeat),
            heartbeat_remaining,
            siren_enabled: state.siren_enabled,
            side_a,
            side_b,
        })
    }

    fn precheck_movement(&self, caller_ip: IpAddr) -> Option<CommandOutcome> {
        if !self.config.is_authorized_ip(caller_ip) {
            return Some(CommandOutcome::InvalidControlIP);
        }
        let state = self.state.lock();
        if state.engineering_mode {
            return Some(CommandOutcome::EngineeringModeActive);
        }
        match state.heartbeat {
            HeartbeatState::TrippedClosing => Some(CommandOutcome::HeartbeatCloseInProgress),
            HeartbeatState::TrippedIdle => Some(CommandOutcome::HeartbeatTimedOut),
            _ => None,
        }
    }

    fn run_move(
        &self,
        side: Side,
        cmd_byte: u8,
        predicate: &mut TerminationPredicate<'_>,
        step_delay: Duration,
        timeout: Duration,
        siren: bool,
    ) -> movement::MoveResult {
        let state = self.state.clone();
        let read_status = || match side {
            Side::A => state.lock().shutter_a,
            Side::B => state.lock().shutter_b,
        };
        let state_for_hb = self.state.clone();
        let read_heartbeat = move || state_for_hb.lock().heartbeat;
        let siren_enabled = self.state.lock().siren_enabled;
        let ctx = MovementContext {
            heartbeat_link: &self.heartbeat_link,
            force_stopped: &self.force_stopped,
            read_heartbeat: &read_heartbeat,
            has_bumper_guard: self.config.has_bumper_guard,
            siren_enabled,
            log: self.log.as_ref(),
        };
        movement::move_shutter(&self.shutter_link, cmd_byte, read_status, predicate, step_delay, timeout, siren, &ctx)
    }

    fn belt_sensor_for(&self, side: Side) -> Option<&dyn BeltSensor> {
        self.config
            .belt_sensor_for(side)
            .map(|_| self.belt_sensor.as_ref())
    }

    fn open_one_side(&self, side: Side, steps: u32) -> bool {
        if self.side_status(side) == ShutterStatus::Open {
            return true;
        }
        let belt = self.belt_sensor_for(side);
        let step_delay = Duration::from_secs_f64(self.config.step_command_delay);
        let full_delay = Duration::from_secs_f64(self.config.command_delay);

        if steps > 0 {
            let mut predicate = TerminationPredicate::bounded(side, Target::Open, steps, belt);
            let result = self.run_move(side, side.open_byte(), &mut predicate, step_delay, Duration::ZERO, false);
            if predicate.belt_slack_detected() {
                self.log.warn("open", &format!("{} shutter belt is slack", self.config.label_for(side)));
                return false;
            }
            return result.predicate_satisfied();
        }

        if self.config.slow_open_steps > 0 {
            let mut ramp = TerminationPredicate::bounded(side, Target::Open, self.config.slow_open_steps, belt);
            let ramp_result = self.run_move(side, side.open_byte(), &mut ramp, step_delay, Duration::ZERO, true);
            if ramp.belt_slack_detected() {
                self.log.warn("open", &format!("{} shutter belt is slack", self.config.label_for(side)));
                return false;
            }
            if !ramp_result.predicate_satisfied() {
                return false;
            }
        }

        let mut full = TerminationPredicate::unbounded(side, Target::Open, belt);
        let siren = self.config.slow_open_steps == 0;
        let timeout = Duration::from_secs_f64(self.config.shutter_timeout);
        let result = self.run_move(side, side.open_byte(), &mut full, full_delay, timeout, siren);
        if full.belt_slack_detected() {
            self.log.warn("open", &format!("{} shutter belt is slack", self.config.label_for(side)));
            return false;
        }
        result.predicate_satisfied()
    }

    fn close_one_side(&self, side: Side, steps: u32) -> bool {
        if self.side_status(side) == ShutterStatus::Closed {
            return true;
        }
        let step_delay = Duration::from_secs_f64(self.config.step_command_delay);
        let full_delay = Duration::from_secs_f64(self.config.command_delay);
        if steps > 0 {
            let mut predicate = TerminationPredicate::bounded(side, Target::Closed, steps, None);
            let result = self.run_move(side, side.close_byte(), &mut predicate, step_delay, Duration::ZERO, false);
            return result.predicate_satisfied();
        }
        let mut predicate = TerminationPredicate::unbounded(side, Target::Closed, None);
        let timeout = Duration::from_secs_f64(self.config.shutter_timeout);
        let result = self.run_move(side, side.close_byte(), &mut predicate, full_delay, timeout, false);
        result.predicate_satisfied()
    }

    /// Open the requested sides in the order given.
    pub fn open_shutters(&self, caller_ip: IpAddr, sides: &str, steps: u32) -> CommandOutcome {
        if let Some(blocked) = self.precheck_movement(caller_ip) {
            return blocked;
        }
        let Some(_guard) = self.command_mutex.try_lock() else {
            return CommandOutcome::Blocked;
        };
        let Some(side_list) = self.config.resolve_sides(sides) else {
            return CommandOutcome::Failed;
        };

        self.log
            .info("open", &format!("Opening {} shutter{}", side_label(&side_list, &self.config), if side_list.len() > 1 { "s" } else { "" }));

        let mut ok = true;
        for side in &side_list {
            if !self.open_one_side(*side, steps) {
                ok = false;
            }
        }

        if ok {
            self.log.info("open", "Open complete");
            CommandOutcome::Succeeded
        } else {
            self.log.error("open", "Failed to open dome");
            CommandOutcome::Failed
        }
    }

    /// Close the requested sides in the order given.
    pub fn close_shutters(&self, caller_ip: IpAddr, sides: &str, steps: u32) -> CommandOutcome {
        if let Some(blocked) = self.precheck_movement(caller_ip) {
            return blocked;
        }
        let Some(_guard) = self.command_mutex.try_lock() else {
            return CommandOutcome::Blocked;
        };
        let Some(side_list) = self.config.resolve_sides(sides) else {
            return CommandOutcome::Failed;
        };

        self.log
            .info("close", &format!("Closing {} shutter{}", side_label(&side_list, &self.config), if side_list.len() > 1 { "s" } else { "" }));

        let mut ok = true;
        for side in &side_list {
            if !self.close_one_side(*side, steps) {
                ok = false;
            }
        }

        if ok {
            self.log.info("close", "Close complete");
            CommandOutcome::Succeeded
        } else {
            self.log.error("close", "Failed to close dome");
            CommandOutcome::Failed
        }
    }

    /// Request an immediate stop. Blocks until any in-flight movement has
    /// observed the stop flag. Refused while the heartbeat monitor is
    /// mid-emergency-close: that movement is not interruptible this way.
    pub fn stop(&self) -> CommandOutcome {
        if self.state.lock().heartbeat == HeartbeatState::TrippedClosing {
            return CommandOutcome::HeartbeatCloseInProgress;
        }
        self.force_stopped.store(true, Ordering::SeqCst);
        let _guard = self.command_mutex.lock();
        drop(_guard);
        self.force_stopped.store(false, Ordering::SeqCst);
        CommandOutcome::Succeeded
    }

    /// Toggle engineering mode.
    pub fn set_engineering_mode(&self, enabled: bool) -> CommandOutcome {
        let Some(_guard) = self.command_mutex.try_lock() else {
            return CommandOutcome::Blocked;
        };
        let mut state = self.state.lock();
        match state.heartbeat {
            HeartbeatState::TrippedClosing => return CommandOutcome::HeartbeatCloseInProgress,
            HeartbeatState::Active { .. } => return CommandOutcome::EngineeringModeRequiresHeartbeatDisabled,
            _ => {}
        }
        state.engineering_mode = enabled;
        self.log.info(
            "engineering",
            if enabled { "engineering mode enabled" } else { "engineering mode disabled" },
        );
        CommandOutcome::Succeeded
    }

    /// Arm or disarm the heartbeat watchdog.
    pub fn set_heartbeat_timer(&self, timeout_seconds: i32) -> CommandOutcome {
        {
            let state = self.state.lock();
            if state.engineering_mode {
                return CommandOutcome::EngineeringModeActive;
            }
            match state.heartbeat {
                HeartbeatState::Unavailable => return CommandOutcome::HeartbeatUnavailable,
                HeartbeatState::TrippedClosing => return CommandOutcome::HeartbeatCloseInProgress,
                HeartbeatState::TrippedIdle if timeout_seconds != 0 => return CommandOutcome::HeartbeatTimedOut,
                _ => {}
            }
        }
        if !(0..MAX_ARMING_SECONDS).contains(&timeout_seconds) {
            return CommandOutcome::HeartbeatInvalidTimeout;
        }
        let byte = heartbeat::encode_arming_byte(timeout_seconds);
        match self.heartbeat_link.write_byte(byte) {
            Ok(()) => CommandOutcome::Succeeded,
            Err(_) => CommandOutcome::Failed,
        }
    }

    /// Toggle the pre-movement siren. Always succeeds.
    pub fn set_heartbeat_siren(&self, enabled: bool) -> CommandOutcome {
        self.state.lock().siren_enabled = enabled;
        CommandOutcome::Succeeded
    }
}

fn spawn_shutter_monitor(
    link: Arc<SerialLink>,
    state: Arc<Mutex<SharedState>>,
    legacy: bool,
    log: Arc<dyn LogSink>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match link.read_byte() {
            Ok(byte) => {
                let mut s = state.lock();
                let (next, event) = decode_status_byte(byte, legacy, (s.shutter_a, s.shutter_b));
                s.shutter_a = next.0;
                s.shutter_b = next.1;
                s.status_time = SystemTime::now();
                drop(s);
                match event {
                    DecodeEvent::Updated => {}
                    DecodeEvent::BumperReset => log.info("shutter", "Bumper guard relay reset"),
                    DecodeEvent::Unknown(b) => log.warn("shutter", &format!("unknown status byte {b:#04x}")),
                }
            }
            Err(SerialError::ReadTimeout) => {
                if !legacy {
                    log.warn("shutter", "status read timed out");
                }
            }
            Err(_) => unreachable!("SerialLink::read_byte only returns Ok or ReadTimeout"),
        }
    })
}

fn spawn_heartbeat_monitor(
    heartbeat_link: Arc<SerialLink>,
    shutter_link: Arc<SerialLink>,
    state: Arc<Mutex<SharedState>>,
    legacy: bool,
    command_delay: Duration,
    log: Arc<dyn LogSink>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match heartbeat_link.read_byte() {
            Ok(byte) => {
                let decoded = decode_heartbeat_byte(byte);
                let mut s = state.lock();
                let previous = s.heartbeat;
                if decoded != previous {
                    match decoded {
                        HeartbeatState::TrippedClosing => {
                            s.shutter_a = ShutterStatus::HeartbeatMonitorForceClosing;
                            s.shutter_b = ShutterStatus::HeartbeatMonitorForceClosing;
                            s.status_time = SystemTime::now();
                            log.error("heartbeat", "closing dome");
                        }
                        HeartbeatState::TrippedIdle => log.info("heartbeat", "finished closing dome"),
                        HeartbeatState::Disabled => log.info("heartbeat", "heartbeat disabled"),
                        HeartbeatState::Active { remaining } => {
                            log.info("heartbeat", &format!("heartbeat active, {remaining}s remaining"));
                        }
                        HeartbeatState::Unavailable => {}
                    }
                }
                s.heartbeat = decoded;
                s.heartbeat_time = SystemTime::now();
                drop(s);

                if legacy && decoded == HeartbeatState::TrippedIdle && previous != HeartbeatState::TrippedIdle {
                    if let Err(e) = shutter_link.write_byte(b'A') {
                        log.warn("heartbeat", &format!("recovery write 'A' failed: {e}"));
                    }
                    thread::sleep(command_delay);
                    if let Err(e) = shutter_link.write_byte(b'B') {
                        log.warn("heartbeat", &format!("recovery write 'B' failed: {e}"));
                    }
                    thread::sleep(command_delay);
                }
            }
            Err(SerialError::ReadTimeout) => {}
            Err(_) => unreachable!("SerialLink::read_byte only returns Ok or ReadTimeout"),
        }
    })
}
