//! Command descriptors and the versioned command table of the device app.
//!
//! Every protocol operation is a fixed pair of request and response
//! descriptors. A [`CommandTable`] bundles the pairs together with the field
//! widths and the domain hash of one protocol revision, so the client never
//! hard-codes a revision.

use crate::error::{Result, X25519Error};
use crate::kdf::{blake2s_256, DIGEST_SIZE, PEER_KEY_SIZE, USER_SECRET_SIZE};

/// Size of the name/version record returned by the identity query.
pub const NAME_VERSION_SIZE: usize = 12;

/// Size of a public key or shared secret returned by the device.
pub const KEY_SIZE: usize = 32;

/// Data length class encoded in the two low bits of a frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmdLen {
    /// 1 data byte.
    Len1 = 0,
    /// 4 data bytes.
    Len4 = 1,
    /// 32 data bytes.
    Len32 = 2,
    /// 128 data bytes.
    Len128 = 3,
}

impl CmdLen {
    /// Decode from the two header bits.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => CmdLen::Len1,
            1 => CmdLen::Len4,
            2 => CmdLen::Len32,
            _ => CmdLen::Len128,
        }
    }

    /// The two header bits.
    #[inline]
    pub fn bits(self) -> u8 {
        self as u8
    }

    /// Number of data bytes following the header byte.
    #[inline]
    pub const fn byte_len(self) -> usize {
        match self {
            CmdLen::Len1 => 1,
            CmdLen::Len4 => 4,
            CmdLen::Len32 => 32,
            CmdLen::Len128 => 128,
        }
    }
}

/// Destination of a frame on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Device firmware.
    Firmware = 2,
    /// The loaded device app.
    App = 3,
}

impl Endpoint {
    /// Decode from the two header bits. Values without an endpoint yield `None`.
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits & 0x03 {
            2 => Some(Endpoint::Firmware),
            3 => Some(Endpoint::App),
            _ => None,
        }
    }

    /// The two header bits.
    #[inline]
    pub fn bits(self) -> u8 {
        self as u8
    }
}

/// Status byte leading the payload of most responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Command succeeded.
    Ok,
    /// Request frame had the wrong length for the command.
    WrongCmdLen,
    /// The user did not touch the device in time.
    TouchTimeout,
    /// Any other status byte.
    Other(u8),
}

impl Status {
    /// Decode a raw status byte.
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0 => Status::Ok,
            1 => Status::WrongCmdLen,
            2 => Status::TouchTimeout,
            other => Status::Other(other),
        }
    }

    /// The raw status byte.
    pub fn code(self) -> u8 {
        match self {
            Status::Ok => 0,
            Status::WrongCmdLen => 1,
            Status::TouchTimeout => 2,
            Status::Other(code) => code,
        }
    }

    /// Check for [`Status::Ok`].
    #[inline]
    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }
}

/// Frame id correlating a request with its response.
///
/// The id occupies two header bits, so valid values are `0..=3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u8);

impl RequestId {
    /// Largest id the frame header can carry.
    pub const MAX: u8 = 3;

    /// Id used by this client unless configured otherwise.
    pub const DEFAULT: RequestId = RequestId(2);

    /// Create a request id, rejecting values outside `0..=3`.
    pub fn new(id: u8) -> Result<Self> {
        if id > Self::MAX {
            return Err(X25519Error::InvalidRequestId(id));
        }
        Ok(Self(id))
    }

    /// The raw id.
    #[inline]
    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Describes one protocol message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandDescriptor {
    code: u8,
    name: &'static str,
    len: CmdLen,
    endpoint: Endpoint,
    has_status_byte: bool,
    bounded_wait: bool,
}

impl CommandDescriptor {
    /// An app command or response that carries a status byte and uses the
    /// transport's default wait.
    pub const fn new(code: u8, name: &'static str, len: CmdLen) -> Self {
        Self {
            code,
            name,
            len,
            endpoint: Endpoint::App,
            has_status_byte: true,
            bounded_wait: false,
        }
    }

    /// Mark a response as having no status byte.
    pub const fn without_status_byte(mut self) -> Self {
        self.has_status_byte = false;
        self
    }

    /// Mark a response as read under the short identity timeout.
    pub const fn with_bounded_wait(mut self) -> Self {
        self.bounded_wait = true;
        self
    }

    /// Opcode.
    #[inline]
    pub fn code(&self) -> u8 {
        self.code
    }

    /// Name used in diagnostics.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Length class.
    #[inline]
    pub fn cmd_len(&self) -> CmdLen {
        self.len
    }

    /// Destination endpoint.
    #[inline]
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    /// Whether a response frame carries a status byte after the opcode.
    #[inline]
    pub fn has_status_byte(&self) -> bool {
        self.has_status_byte
    }

    /// Whether the response is read under the bounded identity timeout.
    #[inline]
    pub fn bounded_wait(&self) -> bool {
        self.bounded_wait
    }

    /// Total frame length: header byte plus data bytes.
    #[inline]
    pub fn frame_len(&self) -> usize {
        1 + self.len.byte_len()
    }

    /// Room for payload after the header and opcode bytes.
    #[inline]
    pub fn max_payload(&self) -> usize {
        self.frame_len() - 2
    }

    /// Bytes a response hands back to the caller: everything after the
    /// header, the opcode, and the status byte if present.
    #[inline]
    pub fn result_len(&self) -> usize {
        self.max_payload() - usize::from(self.has_status_byte)
    }
}

impl std::fmt::Display for CommandDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

/// Request and response descriptors of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandPair {
    /// Outgoing command.
    pub request: CommandDescriptor,
    /// Expected answer.
    pub response: CommandDescriptor,
}

/// One revision of the device app protocol.
///
/// Built once and handed to the client; never mutated afterwards.
#[derive(Debug, Clone, Copy)]
pub struct CommandTable {
    /// Revision identifier, used in configuration.
    pub revision: &'static str,
    /// Identity query.
    pub name_version: CommandPair,
    /// Public key retrieval.
    pub public_key: CommandPair,
    /// Key agreement.
    pub ecdh: CommandPair,
    /// Width of the on-wire domain field.
    pub domain_width: usize,
    /// Hash used to fold domains wider than `domain_width`.
    pub domain_hash: fn(&[u8]) -> [u8; DIGEST_SIZE],
}

impl CommandTable {
    /// The X25519 app protocol with a combined 32 byte domain and 32 byte
    /// user secret, domains folded with BLAKE2s-256.
    pub const TKEY_X25519_V1: CommandTable = CommandTable {
        revision: "tkey-x25519-v1",
        name_version: CommandPair {
            request: CommandDescriptor::new(0x01, "cmdGetNameVersion", CmdLen::Len1),
            response: CommandDescriptor::new(0x02, "rspGetNameVersion", CmdLen::Len32)
                .without_status_byte()
                .with_bounded_wait(),
        },
        public_key: CommandPair {
            request: CommandDescriptor::new(0x03, "cmdGetPubKey", CmdLen::Len128),
            response: CommandDescriptor::new(0x04, "rspGetPubKey", CmdLen::Len128),
        },
        ecdh: CommandPair {
            request: CommandDescriptor::new(0x05, "cmdDoECDH", CmdLen::Len128),
            response: CommandDescriptor::new(0x06, "rspDoECDH", CmdLen::Len128),
        },
        domain_width: DIGEST_SIZE,
        domain_hash: blake2s_256,
    };

    /// Revisions known to this crate.
    pub const KNOWN: &'static [CommandTable] = &[Self::TKEY_X25519_V1];

    /// Look up a known revision by identifier.
    pub fn by_revision(revision: &str) -> Option<CommandTable> {
        Self::KNOWN.iter().find(|t| t.revision == revision).copied()
    }

    /// Length of a public key request payload.
    #[inline]
    pub fn key_parameters_len(&self) -> usize {
        self.domain_width + USER_SECRET_SIZE + 1
    }

    /// Check the table for internal consistency.
    pub fn validate(&self) -> Result<()> {
        let pairs = [
            ("name_version", &self.name_version),
            ("public_key", &self.public_key),
            ("ecdh", &self.ecdh),
        ];

        let mut seen: Vec<u8> = Vec::with_capacity(pairs.len() * 2);
        for (label, pair) in pairs.iter() {
            if pair.request.code() == pair.response.code() {
                return Err(X25519Error::InvalidCommandTable(format!(
                    "{} request and response share opcode {:#04x}",
                    label,
                    pair.request.code()
                )));
            }
            for code in [pair.request.code(), pair.response.code()] {
                if seen.contains(&code) {
                    return Err(X25519Error::InvalidCommandTable(format!(
                        "opcode {:#04x} used more than once",
                        code
                    )));
                }
                seen.push(code);
            }
        }

        // Folded domains are a digest, so the field must be exactly one digest wide.
        if self.domain_width != DIGEST_SIZE {
            return Err(X25519Error::InvalidCommandTable(format!(
                "domain width {} does not match the {} byte digest",
                self.domain_width, DIGEST_SIZE
            )));
        }

        let needs = [
            (&self.public_key.request, self.key_parameters_len()),
            (
                &self.ecdh.request,
                self.key_parameters_len() + PEER_KEY_SIZE,
            ),
        ];
        for (desc, len) in needs {
            if desc.max_payload() < len {
                return Err(X25519Error::InvalidCommandTable(format!(
                    "{} carries {} payload bytes, needs {}",
                    desc.name(),
                    desc.max_payload(),
                    len
                )));
            }
        }

        let returns = [
            (&self.name_version.response, NAME_VERSION_SIZE),
            (&self.public_key.response, KEY_SIZE),
            (&self.ecdh.response, KEY_SIZE),
        ];
        for (desc, len) in returns {
            if desc.result_len() < len {
                return Err(X25519Error::InvalidCommandTable(format!(
                    "{} returns {} bytes, needs {}",
                    desc.name(),
                    desc.result_len(),
                    len
                )));
            }
        }

        Ok(())
    }
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::TKEY_X25519_V1
    }
}
