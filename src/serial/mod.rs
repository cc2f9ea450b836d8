//! Serial link abstraction: blocking byte I/O with a reconnect-on-error loop.

mod link;
mod port;

pub use link::{PortOpener, SerialLink};
pub use port::PortIo;

use std::io;
use std::time::Duration;

/// Minimal byte-oriented I/O surface a [`SerialLink`] needs from a port
/// handle. Implemented in production over a `serialport::SerialPort` trait
/// object, and in tests over an in-memory double ([`crate::testing::MockSerialPort`]).
pub trait SerialPortIo: Send {
    /// Block up to `timeout` for exactly one byte.
    fn read_byte(&mut self, timeout: Duration) -> io::Result<u8>;
    /// Write exactly one byte.
    fn write_byte(&mut self, byte: u8) -> io::Result<()>;
    /// Produce an independent handle over the same underlying port, so reads
    /// and writes can proceed through separate mutexes without serializing
    /// against each other.
    fn try_clone_io(&self) -> io::Result<Box<dyn SerialPortIo>>;
    /// Discard any bytes already sitting in the OS driver's input/output
    /// buffers. Called once right after a successful (re)open, before the
    /// first read, so stale bytes from before a reconnect are never mistaken
    /// for freshly emitted status. A no-op by default.
    fn clear_buffers(&mut self) -> io::Result<()> {
        Ok(())
    }
}
