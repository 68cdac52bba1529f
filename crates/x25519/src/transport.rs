//! Frame transport between the client and the device.
//!
//! The client only talks to the device through the [`Transport`] trait.
//! [`FramedPort`] is a transport over any byte stream implementing [`Port`],
//! such as the socket exposed by the device emulator.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use crate::command::{CommandDescriptor, RequestId};
use crate::error::TransportError;
use crate::frame::FrameHeader;

/// Delivers whole frames to and from the device.
pub trait Transport {
    /// Write one complete frame. Blocks until the frame is handed off.
    fn write(&mut self, frame: &[u8]) -> Result<(), TransportError>;

    /// Read the response frame `expected` carrying request id `id`.
    ///
    /// Returns the whole frame, header byte included, and its decoded header.
    fn read_frame(
        &mut self,
        expected: &CommandDescriptor,
        id: RequestId,
    ) -> Result<(Vec<u8>, FrameHeader), TransportError>;

    /// Set the read timeout. `None` waits forever.
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), TransportError>;

    /// Release the connection.
    fn close(&mut self) -> Result<(), TransportError>;
}

/// A byte stream with an adjustable read timeout.
///
/// An expired timeout must surface as `TimedOut` or `WouldBlock`; a zero-byte
/// read means the device hung up.
pub trait Port: Read + Write {
    /// Set the read timeout. `None` waits forever.
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()>;

    /// Shut the stream down.
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Port for TcpStream {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }

    fn close(&mut self) -> io::Result<()> {
        self.shutdown(Shutdown::Both)
    }
}

/// [`Transport`] speaking the framing protocol over a [`Port`].
#[derive(Debug)]
pub struct FramedPort<P> {
    port: P,
}

impl<P: Port> FramedPort<P> {
    /// Wrap an open port.
    pub fn new(port: P) -> Self {
        Self { port }
    }

    /// Borrow the underlying port.
    pub fn get_ref(&self) -> &P {
        &self.port
    }

    /// Unwrap the underlying port.
    pub fn into_inner(self) -> P {
        self.port
    }

    fn read_header(&mut self) -> Result<u8, TransportError> {
        let mut byte = [0u8; 1];
        loop {
            match self.port.read(&mut byte) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(_) => return Ok(byte[0]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(map_read_error(e)),
            }
        }
    }

    fn read_data(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        self.port.read_exact(buf).map_err(map_read_error)
    }
}

impl<P: Port> Transport for FramedPort<P> {
    fn write(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        tracing::trace!(
            "tx header {:#04x}, {} bytes",
            frame.first().copied().unwrap_or_default(),
            frame.len()
        );
        self.port.write_all(frame)?;
        self.port.flush()?;
        Ok(())
    }

    fn read_frame(
        &mut self,
        expected: &CommandDescriptor,
        id: RequestId,
    ) -> Result<(Vec<u8>, FrameHeader), TransportError> {
        let byte = self.read_header()?;
        let header = FrameHeader::parse(byte)?;
        tracing::trace!("rx header {:#04x}: {:?}", byte, header);

        // Consume the whole announced frame before judging it, so a rejected
        // frame never leaves its data bytes in front of the next header.
        let mut frame = vec![0u8; 1 + header.cmd_len.byte_len()];
        frame[0] = byte;
        self.read_data(&mut frame[1..])?;

        if header.response_not_ok {
            return Err(TransportError::ResponseNotOk);
        }

        if let Err(e) = header.check(expected, id) {
            tracing::debug!("Discarded {} byte frame: {}", frame.len(), e);
            return Err(e);
        }

        if frame[1] != expected.code() {
            return Err(TransportError::UnexpectedCode {
                expected: expected.code(),
                got: frame[1],
            });
        }

        Ok((frame, header))
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), TransportError> {
        Port::set_read_timeout(&mut self.port, timeout)?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.port.flush()?;
        self.port.close()?;
        Ok(())
    }
}

fn map_read_error(err: io::Error) -> TransportError {
    match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TransportError::Timeout,
        io::ErrorKind::UnexpectedEof => TransportError::Closed,
        _ => TransportError::Io(err),
    }
}
