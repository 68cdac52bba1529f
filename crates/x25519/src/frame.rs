//! Fixed length command frames.
//!
//! # Frame Format
//!
//! Each frame consists of:
//! - 1 byte: header
//! - 1 byte: command or response code
//! - N bytes: payload, zero filled up to the length class
//!
//! # Header Byte
//!
//! ```text
//!   7    6 5    4 3     2      1 0
//! +----+------+-------+------+------+
//! | 0  |  id  | endp  | !ok  | len  |
//! +----+------+-------+------+------+
//! ```
//!
//! The not-OK bit is only ever set by the device on responses.

use crate::command::{CmdLen, CommandDescriptor, Endpoint, RequestId};
use crate::error::TransportError;

const RESERVED_BIT: u8 = 0x80;
const NOT_OK_BIT: u8 = 0x04;

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Request id.
    pub id: u8,
    /// Raw endpoint bits.
    pub endpoint: u8,
    /// Set by the device when it could not handle the frame.
    pub response_not_ok: bool,
    /// Data length class.
    pub cmd_len: CmdLen,
}

impl FrameHeader {
    /// Header for a frame described by `desc` carrying request id `id`.
    pub fn for_command(desc: &CommandDescriptor, id: RequestId) -> Self {
        Self {
            id: id.get(),
            endpoint: desc.endpoint().bits(),
            response_not_ok: false,
            cmd_len: desc.cmd_len(),
        }
    }

    /// Encode into the header byte.
    pub fn to_byte(self) -> u8 {
        let mut byte = (self.id & 0x03) << 5;
        byte |= (self.endpoint & 0x03) << 3;
        if self.response_not_ok {
            byte |= NOT_OK_BIT;
        }
        byte | self.cmd_len.bits()
    }

    /// Decode a header byte.
    pub fn parse(byte: u8) -> Result<Self, TransportError> {
        if byte & RESERVED_BIT != 0 {
            return Err(TransportError::ReservedBitSet(byte));
        }

        Ok(Self {
            id: (byte >> 5) & 0x03,
            endpoint: (byte >> 3) & 0x03,
            response_not_ok: byte & NOT_OK_BIT != 0,
            cmd_len: CmdLen::from_bits(byte),
        })
    }

    /// Decoded endpoint, if the bits name one.
    pub fn endpoint(&self) -> Option<Endpoint> {
        Endpoint::from_bits(self.endpoint)
    }

    /// Check that this header announces the frame `expected` with id `id`.
    pub fn check(&self, expected: &CommandDescriptor, id: RequestId) -> Result<(), TransportError> {
        if self.cmd_len != expected.cmd_len() {
            return Err(TransportError::UnexpectedLength {
                expected: expected.cmd_len().byte_len(),
                got: self.cmd_len.byte_len(),
            });
        }
        if self.endpoint != expected.endpoint().bits() {
            return Err(TransportError::UnexpectedEndpoint {
                expected: expected.endpoint().bits(),
                got: self.endpoint,
            });
        }
        if self.id != id.get() {
            return Err(TransportError::UnexpectedFrameId {
                expected: id.get(),
                got: self.id,
            });
        }
        Ok(())
    }
}

/// Allocate a zeroed frame for `desc` with header and code bytes stamped.
pub fn new_frame(desc: &CommandDescriptor, id: RequestId) -> Vec<u8> {
    let mut frame = vec![0u8; desc.frame_len()];
    frame[0] = FrameHeader::for_command(desc, id).to_byte();
    frame[1] = desc.code();
    frame
}
