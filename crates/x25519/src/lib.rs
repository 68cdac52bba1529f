//! # TKey X25519 Client
//!
//! Client for the X25519 device app running on a Tillitis TKey. The device
//! app derives an X25519 key pair from its per-app secret, a domain string,
//! a user secret and a touch requirement flag, and performs Diffie-Hellman
//! without ever exporting the private key.
//!
//! ## Overview
//!
//! - **Command Table**: the opcodes, frame sizes and field widths of one
//!   protocol revision, as a single immutable value
//! - **Client**: one request frame out, one response frame in, status byte
//!   interpretation, bounded wait for the identity query
//! - **Key Parameters**: domain folding and payload layout for key derivation
//! - **Transport**: the [`Transport`] trait and [`FramedPort`], a transport
//!   over any byte stream with a read timeout
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  get_name_version / get_public_key /    │
//! │  compute_shared_secret                  │
//! ├─────────────────────────────────────────┤
//! │  Key parameters (domain, secret, touch) │  BLAKE2s domain folding
//! ├─────────────────────────────────────────┤
//! │  send_command (status, bounded wait)    │
//! ├─────────────────────────────────────────┤
//! │  Frames (header, code, payload)         │  1 + 1/4/32/128 bytes
//! ├─────────────────────────────────────────┤
//! │  Transport (serial, emulator socket)    │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::net::TcpStream;
//! use tkey_x25519::{Client, FramedPort};
//!
//! let stream = TcpStream::connect("127.0.0.1:4444")?;
//! let mut client = Client::open(FramedPort::new(stream));
//!
//! let nv = client.get_name_version()?;
//! println!("device app: {}", nv);
//!
//! let user_secret = [0x42u8; 32];
//! let public_key = client.get_public_key("age", &user_secret, false)?;
//! let shared = client.compute_shared_secret("age", &user_secret, false, &public_key)?;
//! assert_eq!(shared.as_bytes().len(), 32);
//!
//! client.close()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Modules
//!
//! - [`client`]: the device app client
//! - [`command`]: command descriptors and protocol revisions
//! - [`config`]: TOML configuration
//! - [`frame`]: frame header encoding
//! - [`kdf`]: key derivation parameters
//! - [`transport`]: frame transports
//! - [`error`]: error types

pub mod client;
pub mod command;
pub mod config;
pub mod error;
pub mod frame;
pub mod kdf;
pub mod transport;

pub use client::{Client, NameVersion, SharedSecret, DEFAULT_IDENTITY_TIMEOUT};
pub use command::{
    CmdLen, CommandDescriptor, CommandPair, CommandTable, Endpoint, RequestId, Status, KEY_SIZE,
};
pub use config::{ClientConfig, ConfigError};
pub use error::{Result, TransportError, X25519Error};
pub use frame::{new_frame, FrameHeader};
pub use kdf::{
    blake2s_256, domain_from_bytes, fold_domain, key_parameters, PEER_KEY_SIZE, USER_SECRET_SIZE,
};
pub use transport::{FramedPort, Port, Transport};
