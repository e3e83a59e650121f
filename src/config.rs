//! Client configuration parsed from environment variables.

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use std::path::PathBuf;
use std::time::Duration;

use crate::store::StoreKey;

pub const DEFAULT_BASE_URL: &str = "https://smartdt.azurewebsites.net";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 100;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: String, value: String },
    #[error("no home directory available for the credential store; set SMARTDT_STORE_DIR")]
    NoStoreDir,
    #[error("SMARTDT_STORE_BACKEND=file requires SMARTDT_STORE_KEY")]
    MissingStoreKey,
    #[error("SMARTDT_STORE_KEY must be 64 hex characters")]
    InvalidStoreKey,
}

/// Where the credential record is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StoreBackend {
    /// Platform keychain.
    #[default]
    Keychain,
    /// AES-GCM sealed files under `store_dir`.
    EncryptedFile(StoreKey),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub store_backend: StoreBackend,
    /// Only read by the encrypted file backend.
    pub store_dir: PathBuf,
}

impl ClientConfig {
    /// Build typed client config from environment variables.
    ///
    /// Optional:
    /// - `SMARTDT_BASE_URL`: backend root, default `https://smartdt.azurewebsites.net`
    /// - `SMARTDT_REQUEST_TIMEOUT_SECS`: default 100
    /// - `SMARTDT_CONNECT_TIMEOUT_SECS`: default 10
    /// - `SMARTDT_STORE_BACKEND`: `keychain` (default) or `file`
    /// - `SMARTDT_STORE_KEY`: 64 hex chars, required for the `file` backend
    /// - `SMARTDT_STORE_DIR`: credential directory, default under the platform data dir
    ///
    /// # Errors
    ///
    /// Returns an error if a timeout is not a whole number of seconds, the
    /// backend is unknown, the file backend has no usable key, or no store
    /// directory can be determined.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = normalize_base_url(
            &std::env::var("SMARTDT_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
        );
        let request_secs = env_parse_u64("SMARTDT_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?;
        let connect_secs = env_parse_u64("SMARTDT_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS)?;
        let store_backend = store_backend_from_env()?;
        let store_dir = match std::env::var_os("SMARTDT_STORE_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => default_store_dir().ok_or(ConfigError::NoStoreDir)?,
        };

        Ok(Self {
            base_url,
            request_timeout: Duration::from_secs(request_secs),
            connect_timeout: Duration::from_secs(connect_secs),
            store_backend,
            store_dir,
        })
    }

    /// Config pointing at `base_url` with default timeouts. Used by tests and
    /// embedders that manage their own store location.
    #[must_use]
    pub fn with_base_url(base_url: &str, store_dir: PathBuf) -> Self {
        Self {
            base_url: normalize_base_url(base_url),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            store_backend: StoreBackend::Keychain,
            store_dir,
        }
    }
}

fn normalize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

fn env_parse_u64(key: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::Invalid { var: key.to_string(), value: raw }),
        Err(_) => Ok(default),
    }
}

fn store_backend_from_env() -> Result<StoreBackend, ConfigError> {
    let raw = std::env::var("SMARTDT_STORE_BACKEND").unwrap_or_default();
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "keychain" => Ok(StoreBackend::Keychain),
        "file" => {
            let key = std::env::var("SMARTDT_STORE_KEY").map_err(|_| ConfigError::MissingStoreKey)?;
            StoreKey::from_hex(&key).map(StoreBackend::EncryptedFile).ok_or(ConfigError::InvalidStoreKey)
        }
        _ => Err(ConfigError::Invalid { var: "SMARTDT_STORE_BACKEND".to_string(), value: raw }),
    }
}

fn default_store_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("net", "smartdt", "smartdt").map(|dirs| dirs.data_dir().join("credentials"))
}
