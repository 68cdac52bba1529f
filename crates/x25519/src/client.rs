//! Client for the X25519 device app.
//!
//! Every operation writes exactly one request frame and reads exactly one
//! response frame. The client owns its transport, so calls on one connection
//! are serialised by `&mut self`.

use std::time::Duration;

use crate::command::{
    CommandDescriptor, CommandTable, RequestId, Status, KEY_SIZE, NAME_VERSION_SIZE,
};
use crate::config::{check_identity_timeout, ClientConfig};
use crate::error::{Result, X25519Error};
use crate::frame::new_frame;
use crate::kdf::{
    is_all_zero, key_agreement_parameters, key_parameters, PEER_KEY_SIZE, USER_SECRET_SIZE,
};
use crate::transport::Transport;

/// Read timeout for the identity query.
///
/// A device in firmware mode, or running another app, never answers the
/// identity query, so the read must not wait forever.
pub const DEFAULT_IDENTITY_TIMEOUT: Duration = Duration::from_secs(2);

/// Name and version reported by the device app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameVersion {
    /// First four character name field.
    pub name0: String,
    /// Second four character name field.
    pub name1: String,
    /// App version.
    pub version: u32,
}

impl NameVersion {
    /// Decode the 12 byte record: two 4 byte names, then a little-endian version.
    pub fn unpack(raw: &[u8]) -> Result<Self> {
        if raw.len() < NAME_VERSION_SIZE {
            return Err(X25519Error::UnexpectedResponseLength {
                expected: NAME_VERSION_SIZE,
                got: raw.len(),
            });
        }

        let name = |bytes: &[u8]| bytes.iter().map(|&b| char::from(b)).collect::<String>();
        Ok(Self {
            name0: name(&raw[0..4]),
            name1: name(&raw[4..8]),
            version: u32::from_le_bytes([raw[8], raw[9], raw[10], raw[11]]),
        })
    }
}

impl std::fmt::Display for NameVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{} {}", self.name0, self.name1, self.version)
    }
}

/// X25519 shared secret computed by the device. Never all zero.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedSecret([u8; KEY_SIZE]);

impl SharedSecret {
    /// Borrow the secret bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Take the secret bytes.
    pub fn into_bytes(self) -> [u8; KEY_SIZE] {
        self.0
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedSecret([REDACTED])")
    }
}

/// A connection to the X25519 device app.
#[derive(Debug)]
pub struct Client<T> {
    transport: T,
    table: CommandTable,
    request_id: RequestId,
    identity_timeout: Duration,
}

impl<T: Transport> Client<T> {
    /// Talk to the device app over `transport` using the default protocol
    /// revision and request id.
    pub fn open(transport: T) -> Self {
        Self {
            transport,
            table: CommandTable::default(),
            request_id: RequestId::DEFAULT,
            identity_timeout: DEFAULT_IDENTITY_TIMEOUT,
        }
    }

    /// Create a client for a specific protocol revision and request id.
    ///
    /// # Errors
    ///
    /// Returns [`X25519Error::InvalidCommandTable`] if `table` is inconsistent.
    pub fn new(transport: T, table: CommandTable, request_id: RequestId) -> Result<Self> {
        table.validate()?;
        Ok(Self {
            transport,
            table,
            request_id,
            identity_timeout: DEFAULT_IDENTITY_TIMEOUT,
        })
    }

    /// Create a client from configuration.
    pub fn with_config(transport: T, config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        let client = Self::new(transport, config.command_table()?, config.request_id()?)?;
        client.with_identity_timeout(config.identity_timeout())
    }

    /// Replace the identity query timeout.
    ///
    /// # Errors
    ///
    /// Returns [`X25519Error::Config`] unless `timeout` lies between one and
    /// sixty seconds, the same bound [`ClientConfig::validate`] enforces.
    pub fn with_identity_timeout(mut self, timeout: Duration) -> Result<Self> {
        check_identity_timeout(timeout)?;
        self.identity_timeout = timeout;
        Ok(self)
    }

    /// The protocol revision in use.
    pub fn table(&self) -> &CommandTable {
        &self.table
    }

    /// The request id stamped on every frame.
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Borrow the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Give back the transport without closing it.
    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Close the connection to the device.
    pub fn close(mut self) -> Result<()> {
        self.transport.close().map_err(X25519Error::TransportClose)
    }

    /// Get the name and version of the running device app.
    ///
    /// The read is bounded by the identity timeout so this returns an error
    /// instead of hanging when the device runs another app or is in firmware
    /// mode.
    pub fn get_name_version(&mut self) -> Result<NameVersion> {
        let pair = self.table.name_version;
        let rx = self.send_command(&pair.request, &[], &pair.response)?;
        NameVersion::unpack(&rx)
    }

    /// Get the X25519 public key the device derives for `domain`,
    /// `user_secret` and `require_touch`.
    ///
    /// Domains longer than the domain field are hashed first, so any string
    /// is accepted. `user_secret` must be high-entropy random data.
    /// `require_touch` makes the device demand a touch before each key
    /// agreement with this key.
    pub fn get_public_key(
        &mut self,
        domain: &str,
        user_secret: &[u8; USER_SECRET_SIZE],
        require_touch: bool,
    ) -> Result<[u8; KEY_SIZE]> {
        let payload = key_parameters(&self.table, domain, user_secret, require_touch);

        let pair = self.table.public_key;
        let rx = self.send_command(&pair.request, &payload, &pair.response)?;
        leading_key(&rx)
    }

    /// Run X25519 between the derived private key and `peer_public_key`.
    ///
    /// # Errors
    ///
    /// Returns [`X25519Error::DegenerateSharedSecret`] when the device
    /// returns an all-zero result, which a small order peer key forces
    /// regardless of the private key.
    pub fn compute_shared_secret(
        &mut self,
        domain: &str,
        user_secret: &[u8; USER_SECRET_SIZE],
        require_touch: bool,
        peer_public_key: &[u8; PEER_KEY_SIZE],
    ) -> Result<SharedSecret> {
        let payload = key_agreement_parameters(
            &self.table,
            domain,
            user_secret,
            require_touch,
            peer_public_key,
        );

        let pair = self.table.ecdh;
        let rx = self.send_command(&pair.request, &payload, &pair.response)?;
        let secret = leading_key(&rx)?;

        if is_all_zero(&secret) {
            tracing::warn!("Device returned an all-zero shared secret, rejecting peer key");
            return Err(X25519Error::DegenerateSharedSecret);
        }

        Ok(SharedSecret(secret))
    }

    /// Send `payload` as command `cmd` and return the body of the `rsp` frame.
    ///
    /// The body is everything after the response code, minus the status byte
    /// when `rsp` carries one. Responses flagged for a bounded wait are read
    /// under the identity timeout, and the timeout is cleared again whether
    /// or not the exchange succeeded.
    pub fn send_command(
        &mut self,
        cmd: &CommandDescriptor,
        payload: &[u8],
        rsp: &CommandDescriptor,
    ) -> Result<Vec<u8>> {
        let max = cmd.max_payload();
        if payload.len() > max {
            return Err(X25519Error::OversizedPayload {
                len: payload.len(),
                max,
                overflow: payload.len() - max,
            });
        }

        if !rsp.bounded_wait() {
            return self.exchange(cmd, payload, rsp);
        }

        self.transport
            .set_read_timeout(Some(self.identity_timeout))
            .map_err(X25519Error::SetReadTimeout)?;

        let result = self.exchange(cmd, payload, rsp);
        let restored = self.transport.set_read_timeout(None);

        match (result, restored) {
            (Ok(rx), Ok(())) => Ok(rx),
            (Ok(_), Err(e)) => Err(X25519Error::SetReadTimeout(e)),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(restore_err)) => {
                tracing::warn!(
                    "Failed to clear read timeout after {}: {}",
                    cmd.name(),
                    restore_err
                );
                Err(e)
            }
        }
    }

    fn exchange(
        &mut self,
        cmd: &CommandDescriptor,
        payload: &[u8],
        rsp: &CommandDescriptor,
    ) -> Result<Vec<u8>> {
        let mut tx = new_frame(cmd, self.request_id);
        tx[2..2 + payload.len()].copy_from_slice(payload);

        tracing::debug!(
            "Sending {} ({} payload bytes, id {})",
            cmd.name(),
            payload.len(),
            self.request_id.get()
        );
        self.transport
            .write(&tx)
            .map_err(X25519Error::TransportWrite)?;

        let (rx, _) = self
            .transport
            .read_frame(rsp, self.request_id)
            .map_err(X25519Error::TransportRead)?;

        if rx.len() != rsp.frame_len() {
            return Err(X25519Error::UnexpectedResponseLength {
                expected: rsp.frame_len(),
                got: rx.len(),
            });
        }

        if !rsp.has_status_byte() {
            tracing::debug!("Received {}", rsp.name());
            return Ok(rx[2..].to_vec());
        }

        let status = Status::from_byte(rx[2]);
        tracing::debug!("Received {} (status {})", rsp.name(), status.code());
        if !status.is_ok() {
            return Err(X25519Error::DeviceStatus { status });
        }

        Ok(rx[3..].to_vec())
    }
}

/// First key sized chunk of a response body.
fn leading_key(body: &[u8]) -> Result<[u8; KEY_SIZE]> {
    body.get(..KEY_SIZE)
        .and_then(|key| key.try_into().ok())
        .ok_or(X25519Error::UnexpectedResponseLength {
            expected: KEY_SIZE,
            got: body.len(),
        })
}
