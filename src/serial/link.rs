//! Reconnect-on-error wrapper around a [`super::SerialPortIo`] handle.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::SerialError;
use crate::logging::LogSink;

use super::SerialPortIo;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// A function that opens a fresh port handle, used by the reconnect loop.
pub type PortOpener = Box<dyn Fn() -> io::Result<Box<dyn SerialPortIo>> + Send + Sync>;

/// A blocking byte-oriented serial link with independent reader/writer
/// handles and automatic reconnection.
///
/// The reader and writer each hold their own `parking_lot::Mutex` around
/// their own cloned handle over the same underlying port, so a blocking read
/// never delays a write (see the concurrency notes on shared serial
/// resources).
pub struct SerialLink {
    label: String,
    opener: PortOpener,
    reader: Mutex<Option<Box<dyn SerialPortIo>>>,
    writer: Mutex<Option<Box<dyn SerialPortIo>>>,
    read_timeout: Duration,
    ever_connected: AtomicBool,
    error_logged_this_episode: AtomicBool,
    log: Arc<dyn LogSink>,
}

impl SerialLink {
    /// Construct a link with no open handle; the first `read_byte` or an
    /// explicit `connect()` call performs the initial open.
    pub fn new(label: impl Into<String>, read_timeout: Duration, opener: PortOpener, log: Arc<dyn LogSink>) -> Self {
        Self {
            label: label.into(),
            opener,
            reader: Mutex::new(None),
            writer: Mutex::new(None),
            read_timeout,
            ever_connected: AtomicBool::new(false),
            error_logged_this_episode: AtomicBool::new(false),
            log,
        }
    }

    /// Block until the link has a live port handle, retrying every 5 seconds.
    pub fn connect(&self) {
        loop {
            match (self.opener)() {
                Ok(mut port) => {
                    if let Err(e) = port.clear_buffers() {
                        self.log_episode_error(&e.to_string());
                        thread::sleep(RECONNECT_DELAY);
                        continue;
                    }
                    match port.try_clone_io() {
                        Ok(writer_half) => {
                            *self.reader.lock() = Some(port);
                            *self.writer.lock() = Some(writer_half);
                            let verb = if self.ever_connected.swap(true, Ordering::SeqCst) {
                                "Restored"
                            } else {
                                "Established"
                            };
                            self.log.info("serial", &format!("{verb} serial link {}", self.label));
                            self.error_logged_this_episode.store(false, Ordering::SeqCst);
                            return;
                        }
                        Err(e) => {
                            self.log_episode_error(&e.to_string());
                        }
                    }
                }
                Err(e) => {
                    self.log_episode_error(&e.to_string());
                }
            }
            thread::sleep(RECONNECT_DELAY);
        }
    }

    fn log_episode_error(&self, detail: &str) {
        if !self.error_logged_this_episode.swap(true, Ordering::SeqCst) {
            self.log
                .error("serial", &format!("serial link {} unavailable: {detail}", self.label));
        }
    }

    fn invalidate(&self) {
        *self.reader.lock() = None;
        *self.writer.lock() = None;
    }

    /// Block up to the configured read timeout for one byte.
    ///
    /// A read timeout is returned as `Err(SerialError::ReadTimeout)` and does
    /// not invalidate the link; only a genuine I/O error triggers the
    /// reconnect loop.
    pub fn read_byte(&self) -> Result<u8, SerialError> {
        loop {
            let needs_connect = self.reader.lock().is_none();
            if needs_connect {
                self.connect();
            }
            let mut guard = self.reader.lock();
            let port = match guard.as_mut() {
                Some(p) => p,
                None => continue,
            };
            match port.read_byte(self.read_timeout) {
                Ok(byte) => return Ok(byte),
                Err(e) if e.kind() == io::ErrorKind::TimedOut => return Err(SerialError::ReadTimeout),
                Err(e) => {
                    drop(guard);
                    self.invalidate();
                    self.log_episode_error(&e.to_string());
                }
            }
        }
    }

    /// Write exactly one byte. Fails fast: never blocks on reconnection.
    pub fn write_byte(&self, byte: u8) -> Result<(), SerialError> {
        let mut guard = self.writer.lock();
        match guard.as_mut() {
            Some(port) => match port.write_byte(byte) {
                Ok(()) => Ok(()),
                Err(_) => {
                    *guard = None;
                    Err(SerialError::Write)
                }
            },
            None => Err(SerialError::Disconnected),
        }
    }
}
