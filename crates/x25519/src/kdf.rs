//! Key derivation parameters sent to the device app.
//!
//! The device derives its X25519 private key as
//! `blake2s(CDI, domain, user_secret, require_touch)`, where CDI is the
//! per-app secret of the device. The bytes produced here must match what the
//! device expects bit for bit: a different domain field silently yields an
//! unrelated key.

use blake2::{Blake2s256, Digest};

use crate::command::CommandTable;
use crate::error::Result;

/// Output size of the domain hash.
pub const DIGEST_SIZE: usize = 32;

/// Size of the caller supplied user secret.
pub const USER_SECRET_SIZE: usize = 32;

/// Size of the counter-party X25519 public key.
pub const PEER_KEY_SIZE: usize = 32;

/// BLAKE2s with a 256 bit digest.
pub fn blake2s_256(bytes: &[u8]) -> [u8; DIGEST_SIZE] {
    Blake2s256::digest(bytes).into()
}

/// Interpret raw domain bytes as UTF-8.
///
/// The client operations take `&str`, which is UTF-8 by construction. Callers
/// holding a domain as raw bytes, such as one read from a file or an argument
/// vector, pass it through here first; malformed input fails with
/// [`X25519Error::InvalidDomainString`](crate::error::X25519Error::InvalidDomainString).
///
/// ```
/// use tkey_x25519::{domain_from_bytes, X25519Error};
///
/// assert_eq!(domain_from_bytes(b"ssh").unwrap(), "ssh");
/// assert!(matches!(
///     domain_from_bytes(&[0x66, 0xff]),
///     Err(X25519Error::InvalidDomainString(_))
/// ));
/// ```
pub fn domain_from_bytes(bytes: &[u8]) -> Result<&str> {
    Ok(std::str::from_utf8(bytes)?)
}

/// Fold a domain string into the fixed width domain field.
///
/// Domains longer than the field are replaced by their hash; shorter ones are
/// copied left aligned and zero padded.
pub fn fold_domain(table: &CommandTable, domain: &str) -> Vec<u8> {
    let raw = domain.as_bytes();
    if raw.len() > table.domain_width {
        return (table.domain_hash)(raw).to_vec();
    }

    let mut field = vec![0u8; table.domain_width];
    field[..raw.len()].copy_from_slice(raw);
    field
}

/// Payload of a public key request: folded domain, user secret, touch flag.
pub fn key_parameters(
    table: &CommandTable,
    domain: &str,
    user_secret: &[u8; USER_SECRET_SIZE],
    require_touch: bool,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(table.key_parameters_len() + PEER_KEY_SIZE);
    buf.extend_from_slice(&fold_domain(table, domain));
    buf.extend_from_slice(user_secret);
    buf.push(u8::from(require_touch));
    buf
}

/// Payload of a key agreement request: the key parameters followed by the
/// peer's public key.
pub fn key_agreement_parameters(
    table: &CommandTable,
    domain: &str,
    user_secret: &[u8; USER_SECRET_SIZE],
    require_touch: bool,
    peer_public_key: &[u8; PEER_KEY_SIZE],
) -> Vec<u8> {
    let mut buf = key_parameters(table, domain, user_secret, require_touch);
    buf.extend_from_slice(peer_public_key);
    buf
}

/// Whether every byte is zero. Runs over the whole slice regardless of content.
pub fn is_all_zero(bytes: &[u8]) -> bool {
    bytes.iter().fold(0u8, |acc, b| acc | b) == 0
}
