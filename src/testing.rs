//! In-process test doubles shared by unit tests and the `tests/` integration
//! suite.
//!
//! Deliberately not `#[cfg(test)]`-gated: integration tests link against the
//! compiled library, where `cfg(test)` items from the library's own crate
//! are invisible. Costs a little production binary size in exchange for one
//! set of doubles shared by both test layers.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::BeltSensorError;
use crate::logging::LogSink;
use crate::serial::SerialPortIo;
use crate::shutter::Side;

/// Severity recorded by [`RecordingLogSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// See [`LogSink::info`].
    Info,
    /// See [`LogSink::warn`].
    Warn,
    /// See [`LogSink::error`].
    Error,
}

/// A [`LogSink`] that records every call instead of emitting to `tracing`.
#[derive(Debug, Default, Clone)]
pub struct RecordingLogSink {
    events: Arc<Mutex<Vec<(Level, String, String)>>>,
}

impl RecordingLogSink {
    /// A fresh, empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All events recorded so far, oldest first.
    pub fn events(&self) -> Vec<(Level, String, String)> {
        self.events.lock().clone()
    }

    /// Whether any recorded message at or above `level`'s tag contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.events.lock().iter().any(|(_, _, msg)| msg.contains(needle))
    }
}

impl LogSink for RecordingLogSink {
    fn info(&self, tag: &str, message: &str) {
        self.events.lock().push((Level::Info, tag.to_string(), message.to_string()));
    }

    fn warn(&self, tag: &str, message: &str) {
        self.events.lock().push((Level::Warn, tag.to_string(), message.to_string()));
    }

    fn error(&self, tag: &str, message: &str) {
        self.events.lock().push((Level::Error, tag.to_string(), message.to_string()));
    }
}

/// Shared byte queues backing a pair of cloned [`MockSerialPort`] handles.
#[derive(Debug, Default)]
struct MockLinkState {
    /// Bytes queued as if emitted by the controller, consumed by reads.
    inbound: VecDeque<u8>,
    /// Bytes written by the core, in order, for test assertions.
    outbound: Vec<u8>,
    /// When set, the next read (after draining `inbound`) fails with this.
    read_error: Option<io::ErrorKind>,
    /// When set, every write fails with this.
    write_error: Option<io::ErrorKind>,
}

/// An in-memory [`SerialPortIo`] double. Cloning shares the same underlying
/// queues, mirroring the production split-handle design over one fd.
#[derive(Clone)]
pub struct MockSerialPort {
    state: Arc<Mutex<MockLinkState>>,
}

impl Default for MockSerialPort {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockLinkState::default())),
        }
    }
}

impl MockSerialPort {
    /// A fresh mock port with no queued bytes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes to be returned by subsequent reads, in order.
    pub fn push_inbound(&self, bytes: &[u8]) {
        self.state.lock().inbound.extend(bytes.iter().copied());
    }

    /// Every byte written by the core so far, in order.
    pub fn outbound(&self) -> Vec<u8> {
        self.state.lock().outbound.clone()
    }

    /// Make the next read past the queued bytes fail with `kind`.
    pub fn fail_reads_with(&self, kind: io::ErrorKind) {
        self.state.lock().read_error = Some(kind);
    }

    /// Make every subsequent write fail with `kind`.
    pub fn fail_writes_with(&self, kind: io::ErrorKind) {
        self.state.lock().write_error = Some(kind);
    }
}

impl SerialPortIo for MockSerialPort {
    fn read_byte(&mut self, timeout: Duration) -> io::Result<u8> {
        {
            let mut state = self.state.lock();
            if let Some(byte) = state.inbound.pop_front() {
                return Ok(byte);
            }
        }
        // Mimic a real port's blocking read timeout so monitor-loop tests
        // advance at a realistic cadence instead of busy-spinning.
        std::thread::sleep(timeout);
        let state = self.state.lock();
        match state.read_error {
            Some(kind) => Err(io::Error::from(kind)),
            None => Err(io::Error::from(io::ErrorKind::TimedOut)),
        }
    }

    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        let mut state = self.state.lock();
        if let Some(kind) = state.write_error {
            return Err(io::Error::from(kind));
        }
        state.outbound.push(byte);
        Ok(())
    }

    fn try_clone_io(&self) -> io::Result<Box<dyn SerialPortIo>> {
        Ok(Box::new(self.clone()))
    }
}

/// A [`crate::belt::BeltSensor`] double returning a fixed answer per side.
#[derive(Debug, Default, Clone)]
pub struct FixedBeltSensor {
    tensioned: Arc<Mutex<std::collections::HashMap<Side, bool>>>,
}

impl FixedBeltSensor {
    /// A sensor reporting no slack on any side by default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the reported tension state for `side`.
    pub fn set(&self, side: Side, tensioned: bool) {
        self.tensioned.lock().insert(side, tensioned);
    }
}

impl crate::belt::BeltSensor for FixedBeltSensor {
    fn belt_tensioned(&self, side: Side) -> Result<bool, BeltSensorError> {
        Ok(*self.tensioned.lock().get(&side).unwrap_or(&true))
    }
}

/// A [`crate::belt::BeltSensor`] double that always reports unavailable.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingBeltSensor;

impl crate::belt::BeltSensor for FailingBeltSensor {
    fn belt_tensioned(&self, _side: Side) -> Result<bool, BeltSensorError> {
        Err(BeltSensorError::Unavailable {
            sensor: "mock".to_string(),
            detail: "sensor service unreachable".to_string(),
        })
    }
}
