//! The movement driver: drives a single shutter side through a timed
//! sequence of single-byte commands until a termination condition fires.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::belt::BeltSensor;
use crate::heartbeat::{HeartbeatState, SIREN_BYTE};
use crate::logging::LogSink;
use crate::serial::SerialLink;
use crate::shutter::{ShutterStatus, Side};

/// What a side's movement is trying to reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Drive until the side reports `Open`.
    Open,
    /// Drive until the side reports `Closed`.
    Closed,
}

/// Stateful termination condition for one side's movement.
///
/// Built fresh per side per movement rather than as a closure reused across
/// a `for side in sides` loop, so each side's step count and belt-slack flag
/// cannot bleed into the next side's.
pub struct TerminationPredicate<'a> {
    side: Side,
    target: Target,
    max_steps: Option<u32>,
    belt_sensor: Option<&'a dyn BeltSensor>,
    belt_slack_detected: bool,
}

impl<'a> TerminationPredicate<'a> {
    /// A predicate with no step cap, relying solely on reaching `target` or
    /// the caller's wall-clock timeout.
    pub fn unbounded(side: Side, target: Target, belt_sensor: Option<&'a dyn BeltSensor>) -> Self {
        Self {
            side,
            target,
            max_steps: None,
            belt_sensor,
            belt_slack_detected: false,
        }
    }

    /// A predicate that also terminates once `max_steps` commands have been sent.
    pub fn bounded(side: Side, target: Target, max_steps: u32, belt_sensor: Option<&'a dyn BeltSensor>) -> Self {
        Self {
            side,
            target,
            max_steps: Some(max_steps),
            belt_sensor,
            belt_slack_detected: false,
        }
    }

    /// Whether a bound belt sensor reported slack during the last `evaluate`.
    pub fn belt_slack_detected(&self) -> bool {
        self.belt_slack_detected
    }

    /// Evaluate against the current step count and freshly read status.
    /// Belt-slack checks only apply when opening; closing never consults the
    /// sensor.
    pub fn evaluate(&mut self, step_count: u32, current: ShutterStatus) -> bool {
        if self.target == Target::Open {
            if let Some(sensor) = self.belt_sensor {
                if let Ok(false) = sensor.belt_tensioned(self.side) {
                    self.belt_slack_detected = true;
                    return true;
                }
            }
        }
        let reached = match self.target {
            Target::Open => current == ShutterStatus::Open,
            Target::Closed => current == ShutterStatus::Closed,
        };
        if reached {
            return true;
        }
        matches!(self.max_steps, Some(max) if step_count >= max)
    }
}

/// Everything `move_shutter` needs beyond the command link and the predicate:
/// the heartbeat link and state, the cooperative stop flag, and the sinks
/// the loop must not own itself.
pub struct MovementContext<'a> {
    /// Heartbeat monitor link, used to write the pre-movement siren byte.
    pub heartbeat_link: &'a SerialLink,
    /// Set by `stop()`; polled once per loop iteration.
    pub force_stopped: &'a AtomicBool,
    /// Reads the current heartbeat state without blocking on the monitor.
    pub read_heartbeat: &'a dyn Fn() -> HeartbeatState,
    /// Whether this dome has a bumper guard relay to reset before movement.
    pub has_bumper_guard: bool,
    /// Whether the pre-movement siren is currently enabled.
    pub siren_enabled: bool,
    /// Log sink for movement-loop events.
    pub log: &'a dyn LogSink,
}

/// Why `move_shutter` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveResult {
    /// The termination predicate became true: target reached, step cap hit,
    /// or (when opening) belt slack detected.
    PredicateSatisfied,
    /// `force_stopped` was observed set.
    Stopped,
    /// The heartbeat monitor tripped mid-movement.
    HeartbeatTripped,
    /// `timeout` elapsed with the predicate still false.
    TimedOut,
}

impl MoveResult {
    /// Matches the literal "true iff the predicate returned true" contract.
    pub fn predicate_satisfied(self) -> bool {
        matches!(self, MoveResult::PredicateSatisfied)
    }
}

/// Drive `link` with repeated `cmd_byte` writes, spaced `step_delay` apart,
/// until `predicate` is satisfied, a stop or heartbeat trip is observed, or
/// `timeout` (if non-zero) elapses.
///
/// `read_status` re-reads the side's current status under the status mutex
/// each iteration; `predicate` is evaluated against the fresh value.
pub fn move_shutter(
    link: &SerialLink,
    cmd_byte: u8,
    mut read_status: impl FnMut() -> ShutterStatus,
    predicate: &mut TerminationPredicate<'_>,
    step_delay: Duration,
    timeout: Duration,
    siren: bool,
    ctx: &MovementContext<'_>,
) -> MoveResult {
    if ctx.has_bumper_guard {
        if let Err(e) = link.write_byte(b'R') {
            ctx.log.warn("movement", &format!("bumper guard reset failed: {e}"));
        }
        std::thread::sleep(step_delay);
    }

    if siren && ctx.siren_enabled {
        if let Err(e) = ctx.heartbeat_link.write_byte(SIREN_BYTE) {
            ctx.log.warn("movement", &format!("siren write failed: {e}"));
        }
        std::thread::sleep(Duration::from_secs(5));
    }

    let start = Instant::now();
    let mut step_count: u32 = 0;

    loop {
        if let Err(e) = link.write_byte(cmd_byte) {
            ctx.log.warn("movement", &format!("command write failed: {e}"));
        }
        step_count += 1;
        std::thread::sleep(step_delay);

        if ctx.force_stopped.load(Ordering::SeqCst) {
            return MoveResult::Stopped;
        }
        if (ctx.read_heartbeat)().is_tripped() {
            return MoveResult::HeartbeatTripped;
        }
        if predicate.evaluate(step_count, read_status()) {
            return MoveResult::PredicateSatisfied;
        }
        if !timeout.is_zero() && start.elapsed() > timeout {
            return MoveResult::TimedOut;
        }
    }
}
