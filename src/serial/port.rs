//! Production adapter from the `serialport` crate onto [`super::SerialPortIo`].

use std::io::{self, Read, Write};
use std::time::Duration;

use super::SerialPortIo;

/// Wraps a boxed `serialport::SerialPort` trait object.
pub struct PortIo(Box<dyn serialport::SerialPort>);

impl PortIo {
    /// Open `path` at `baud` with the given per-read timeout.
    pub fn open(path: &str, baud: u32, timeout: Duration) -> io::Result<Self> {
        let port = serialport::new(path, baud)
            .timeout(timeout)
            .open()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(Self(port))
    }
}

impl SerialPortIo for PortIo {
    fn read_byte(&mut self, _timeout: Duration) -> io::Result<u8> {
        let mut buf = [0u8; 1];
        self.0.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        self.0.write_all(&[byte])?;
        self.0.flush()
    }

    fn try_clone_io(&self) -> io::Result<Box<dyn SerialPortIo>> {
        let cloned = self
            .0
            .try_clone()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(Box::new(PortIo(cloned)))
    }

    fn clear_buffers(&mut self) -> io::Result<()> {
        self.0
            .clear(serialport::ClearBuffer::All)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}
