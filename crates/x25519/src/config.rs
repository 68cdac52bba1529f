//! Client configuration.
//!
//! Configuration is TOML. The default path is
//! `~/.config/tkey-x25519/config.toml`; a missing file yields defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::command::{CommandTable, RequestId};

/// Bounds for the identity query timeout, in seconds.
const IDENTITY_TIMEOUT_RANGE: std::ops::RangeInclusive<u64> = 1..=60;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("request_id must be between 0 and 3, got {0}")]
    InvalidRequestId(u8),

    #[error("identity_timeout_secs must be between 1 and 60 seconds, got {0}")]
    InvalidIdentityTimeout(u64),

    #[error("unknown protocol revision: {0}")]
    UnknownRevision(String),
}

/// Settings for a [`Client`](crate::client::Client).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Frame id used for every request.
    pub request_id: u8,

    /// Read timeout in seconds for the identity query.
    pub identity_timeout_secs: u64,

    /// Protocol revision of the device app.
    pub revision: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_id: RequestId::DEFAULT.get(),
            identity_timeout_secs: 2,
            revision: CommandTable::TKEY_X25519_V1.revision.to_string(),
        }
    }
}

/// Reject identity query timeouts outside 1 to 60 whole seconds.
///
/// A zero timeout is refused by `TcpStream::set_read_timeout`, so it must be
/// caught before the first identity query.
pub(crate) fn check_identity_timeout(timeout: Duration) -> Result<(), ConfigError> {
    let min = Duration::from_secs(*IDENTITY_TIMEOUT_RANGE.start());
    let max = Duration::from_secs(*IDENTITY_TIMEOUT_RANGE.end());
    if timeout < min || timeout > max {
        return Err(ConfigError::InvalidIdentityTimeout(timeout.as_secs()));
    }
    Ok(())
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tkey-x25519")
        .join("config.toml")
}

impl ClientConfig {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported variables:
    /// - TKEY_X25519_REQUEST_ID: frame id (0-3)
    /// - TKEY_X25519_IDENTITY_TIMEOUT: identity query timeout in seconds
    ///
    /// Values that do not parse are ignored with a warning.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("TKEY_X25519_REQUEST_ID") {
            match value.parse::<u8>() {
                Ok(id) => {
                    tracing::info!("Overriding request_id from environment: {}", id);
                    self.request_id = id;
                }
                Err(_) if value.is_empty() => {}
                Err(e) => tracing::warn!("Ignoring TKEY_X25519_REQUEST_ID={:?}: {}", value, e),
            }
        }

        if let Ok(value) = std::env::var("TKEY_X25519_IDENTITY_TIMEOUT") {
            match value.parse::<u64>() {
                Ok(secs) => {
                    tracing::info!("Overriding identity_timeout_secs from environment: {}", secs);
                    self.identity_timeout_secs = secs;
                }
                Err(_) if value.is_empty() => {}
                Err(e) => {
                    tracing::warn!("Ignoring TKEY_X25519_IDENTITY_TIMEOUT={:?}: {}", value, e)
                }
            }
        }
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if RequestId::new(self.request_id).is_err() {
            return Err(ConfigError::InvalidRequestId(self.request_id));
        }

        check_identity_timeout(self.identity_timeout())?;

        if CommandTable::by_revision(&self.revision).is_none() {
            return Err(ConfigError::UnknownRevision(self.revision.clone()));
        }

        Ok(())
    }

    /// The validated request id.
    pub fn request_id(&self) -> Result<RequestId, ConfigError> {
        RequestId::new(self.request_id).map_err(|_| ConfigError::InvalidRequestId(self.request_id))
    }

    /// The identity query timeout.
    pub fn identity_timeout(&self) -> Duration {
        Duration::from_secs(self.identity_timeout_secs)
    }

    /// The command table of the configured revision.
    pub fn command_table(&self) -> Result<CommandTable, ConfigError> {
        CommandTable::by_revision(&self.revision)
            .ok_or_else(|| ConfigError::UnknownRevision(self.revision.clone()))
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.request_id, 2);
        assert_eq!(config.identity_timeout_secs, 2);
        assert_eq!(config.revision, "tkey-x25519-v1");
        config.validate().unwrap();
    }

    #[test]
    fn test_from_toml_empty() {
        let config = ClientConfig::from_toml("").unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn test_from_toml_partial() {
        let config = ClientConfig::from_toml("request_id = 1\n").unwrap();
        assert_eq!(config.request_id, 1);
        assert_eq!(config.identity_timeout_secs, 2);
        assert_eq!(config.request_id().unwrap().get(), 1);
    }

    #[test]
    fn test_from_toml_invalid_syntax() {
        let err = ClientConfig::from_toml("request_id = ").unwrap_err();
        assert!(err.to_string().contains("Invalid TOML configuration"));
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = ClientConfig {
            request_id: 3,
            identity_timeout_secs: 5,
            revision: "tkey-x25519-v1".to_string(),
        };
        let parsed = ClientConfig::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_validate_request_id() {
        let config = ClientConfig {
            request_id: 4,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidRequestId(4)));
        assert_eq!(config.request_id(), Err(ConfigError::InvalidRequestId(4)));
    }

    #[test]
    fn test_validate_identity_timeout() {
        for secs in [0, 61] {
            let config = ClientConfig {
                identity_timeout_secs: secs,
                ..Default::default()
            };
            assert_eq!(
                config.validate(),
                Err(ConfigError::InvalidIdentityTimeout(secs))
            );
        }
    }

    #[test]
    fn test_check_identity_timeout_bounds() {
        assert!(check_identity_timeout(Duration::from_secs(1)).is_ok());
        assert!(check_identity_timeout(Duration::from_secs(60)).is_ok());
        assert_eq!(
            check_identity_timeout(Duration::ZERO),
            Err(ConfigError::InvalidIdentityTimeout(0))
        );
        assert_eq!(
            check_identity_timeout(Duration::from_millis(500)),
            Err(ConfigError::InvalidIdentityTimeout(0))
        );
        assert_eq!(
            check_identity_timeout(Duration::from_millis(60_001)),
            Err(ConfigError::InvalidIdentityTimeout(60))
        );
    }

    #[test]
    fn test_validate_revision() {
        let config = ClientConfig {
            revision: "tkey-x25519-v9".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::UnknownRevision("tkey-x25519-v9".to_string()))
        );
        assert!(config.command_table().is_err());
    }

    #[test]
    fn test_identity_timeout_duration() {
        assert_eq!(
            ClientConfig::default().identity_timeout(),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = ClientConfig::load(dir.path().join("missing.toml")).unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn test_load_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "identity_timeout_secs = 10\n").unwrap();

        let config = ClientConfig::load(&path).unwrap();
        assert_eq!(config.identity_timeout_secs, 10);
    }

    #[test]
    fn test_load_invalid_file_names_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "request_id = \"two\"\n").unwrap();

        let err = ClientConfig::load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("config.toml"));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.ends_with("tkey-x25519/config.toml"));
    }

    #[test]
    #[serial]
    fn test_env_override_request_id() {
        std::env::set_var("TKEY_X25519_REQUEST_ID", "1");

        let mut config = ClientConfig::default();
        config.apply_env_overrides();
        assert_eq!(config.request_id, 1);

        std::env::remove_var("TKEY_X25519_REQUEST_ID");
    }

    #[test]
    #[serial]
    fn test_env_override_identity_timeout() {
        std::env::set_var("TKEY_X25519_IDENTITY_TIMEOUT", "7");

        let mut config = ClientConfig::default();
        config.apply_env_overrides();
        assert_eq!(config.identity_timeout_secs, 7);

        std::env::remove_var("TKEY_X25519_IDENTITY_TIMEOUT");
    }

    #[test]
    #[serial]
    fn test_env_override_unparsable_is_ignored() {
        std::env::set_var("TKEY_X25519_REQUEST_ID", "two");
        std::env::set_var("TKEY_X25519_IDENTITY_TIMEOUT", "");

        let mut config = ClientConfig::default();
        config.apply_env_overrides();
        assert_eq!(config, ClientConfig::default());

        std::env::remove_var("TKEY_X25519_REQUEST_ID");
        std::env::remove_var("TKEY_X25519_IDENTITY_TIMEOUT");
    }
}
