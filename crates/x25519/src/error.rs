//! Error types for the X25519 device app client.

use thiserror::Error;

use crate::command::Status;
use crate::config::ConfigError;

/// Errors raised by a [`Transport`](crate::transport::Transport).
#[derive(Debug, Error)]
pub enum TransportError {
    /// Underlying I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// No frame arrived before the read timeout expired.
    #[error("read timed out")]
    Timeout,

    /// The device closed the connection.
    #[error("connection closed by device")]
    Closed,

    /// Bit 7 of the frame header must be zero.
    #[error("reserved bit set in frame header {0:#04x}")]
    ReservedBitSet(u8),

    /// The device flagged the response frame as not OK.
    #[error("response frame header signals not OK")]
    ResponseNotOk,

    /// The response frame has a different length class than expected.
    #[error("unexpected frame length: expected {expected} bytes, got {got}")]
    UnexpectedLength {
        /// Expected data length in bytes.
        expected: usize,
        /// Data length announced by the header.
        got: usize,
    },

    /// The response frame comes from another endpoint.
    #[error("unexpected endpoint: expected {expected}, got {got}")]
    UnexpectedEndpoint {
        /// Expected endpoint value.
        expected: u8,
        /// Endpoint value in the header.
        got: u8,
    },

    /// The response frame carries another request id.
    #[error("unexpected frame id: expected {expected}, got {got}")]
    UnexpectedFrameId {
        /// Request id of the outstanding command.
        expected: u8,
        /// Id in the header.
        got: u8,
    },

    /// The response opcode does not match the expected response.
    #[error("unexpected response code: expected {expected:#04x}, got {got:#04x}")]
    UnexpectedCode {
        /// Expected response opcode.
        expected: u8,
        /// Opcode echoed by the device.
        got: u8,
    },
}

/// Client error type covering all failure modes of the device app protocol.
#[derive(Debug, Error)]
pub enum X25519Error {
    // Caller misuse
    /// Payload does not fit in the request frame.
    #[error("payload too large: {len} bytes exceeds maximum of {max} bytes by {overflow}")]
    OversizedPayload {
        /// Payload length.
        len: usize,
        /// Room available after the header and opcode bytes.
        max: usize,
        /// Number of bytes over the limit.
        overflow: usize,
    },

    /// Domain bytes are not valid UTF-8.
    #[error("invalid domain string: {0}")]
    InvalidDomainString(#[from] std::str::Utf8Error),

    /// Request id outside the two-bit header field.
    #[error("request id must be between 0 and 3, got {0}")]
    InvalidRequestId(u8),

    /// A command table failed validation.
    #[error("invalid command table: {0}")]
    InvalidCommandTable(String),

    /// Client configuration failed validation.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    // Transport
    /// Writing the request frame failed.
    #[error("write failed: {0}")]
    TransportWrite(#[source] TransportError),

    /// Reading the response frame failed or timed out.
    #[error("read frame failed: {0}")]
    TransportRead(#[source] TransportError),

    /// Closing the connection failed.
    #[error("close failed: {0}")]
    TransportClose(#[source] TransportError),

    /// Changing the read timeout failed.
    #[error("set read timeout failed: {0}")]
    SetReadTimeout(#[source] TransportError),

    // Device
    /// The device app answered with a non-OK status byte.
    #[error("response status not OK, code: {}", .status.code())]
    DeviceStatus {
        /// Status reported by the device.
        status: Status,
    },

    /// A response frame was too short to hold the expected result.
    #[error("unexpected response length: expected at least {expected} bytes, got {got}")]
    UnexpectedResponseLength {
        /// Minimum number of bytes needed.
        expected: usize,
        /// Bytes available.
        got: usize,
    },

    // Security
    /// The shared secret is all zero, caused by a small order peer key.
    #[error("result is all-zero due to small order point in input")]
    DegenerateSharedSecret,
}

impl X25519Error {
    /// Raw status byte for [`X25519Error::DeviceStatus`].
    pub fn status_code(&self) -> Option<u8> {
        match self {
            X25519Error::DeviceStatus { status } => Some(status.code()),
            _ => None,
        }
    }

    /// Whether the error is a read that ran out of time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, X25519Error::TransportRead(TransportError::Timeout))
    }
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, X25519Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oversized_payload_display() {
        let err = X25519Error::OversizedPayload {
            len: 130,
            max: 127,
            overflow: 3,
        };
        assert_eq!(
            err.to_string(),
            "payload too large: 130 bytes exceeds maximum of 127 bytes by 3"
        );
    }

    #[test]
    fn test_device_status_display() {
        let err = X25519Error::DeviceStatus {
            status: Status::TouchTimeout,
        };
        assert_eq!(err.to_string(), "response status not OK, code: 2");
        assert_eq!(err.status_code(), Some(2));
    }

    #[test]
    fn test_unknown_status_keeps_raw_code() {
        let err = X25519Error::DeviceStatus {
            status: Status::from_byte(0x7f),
        };
        assert_eq!(err.status_code(), Some(0x7f));
    }

    #[test]
    fn test_degenerate_display() {
        let err = X25519Error::DegenerateSharedSecret;
        assert_eq!(
            err.to_string(),
            "result is all-zero due to small order point in input"
        );
        assert_eq!(err.status_code(), None);
    }

    #[test]
    fn test_transport_read_wraps_cause() {
        use std::error::Error as _;

        let err = X25519Error::TransportRead(TransportError::Timeout);
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "read frame failed: read timed out");
        assert!(err.source().is_some());
    }

    #[test]
    fn test_closed_is_not_timeout() {
        let err = X25519Error::TransportRead(TransportError::Closed);
        assert!(!err.is_timeout());
        assert_eq!(err.to_string(), "read frame failed: connection closed by device");
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        let err: TransportError = io_err.into();
        assert!(matches!(err, TransportError::Io(_)));
    }

    #[test]
    fn test_from_utf8_error() {
        let bytes = vec![0xff, 0xfe];
        let utf8_err = std::str::from_utf8(&bytes).unwrap_err();
        let err: X25519Error = utf8_err.into();
        assert!(matches!(err, X25519Error::InvalidDomainString(_)));
    }

    #[test]
    fn test_from_config_error() {
        let err: X25519Error = ConfigError::InvalidRequestId(9).into();
        assert_eq!(
            err.to_string(),
            "invalid configuration: request_id must be between 0 and 3, got 9"
        );
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<X25519Error>();
        assert_send_sync::<TransportError>();
    }
}
