//! Configuration management for EaaS components
//!
//! Each role has one immutable configuration value, built at startup and
//! handed to the components that need it.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use url::Url;

const ENV_PREFIX: &str = "EAAS_";

/// Entropy client (monitor) configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// URL of the peer's entropy endpoint
    #[serde(default = "default_peer_url")]
    pub peer_url: String,

    /// Pool level to maintain, in bits
    #[serde(default = "default_minimum_entropy_bits")]
    pub minimum_entropy_bits: u32,

    /// Poll interval in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Peer request timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Kernel entropy device
    #[serde(default = "default_device_path")]
    pub device_path: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            peer_url: default_peer_url(),
            minimum_entropy_bits: default_minimum_entropy_bits(),
            poll_interval_ms: default_poll_interval_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            device_path: default_device_path(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from `EAAS_*` environment variables
    pub fn from_env() -> Result<Self> {
        let config: Self = envy::prefixed(ENV_PREFIX)
            .from_env()
            .map_err(|e| Error::Config(format!("Failed to parse environment variables: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file, with `EAAS_*` environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let config: Self = load_layered(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.peer_url()?;

        if self.minimum_entropy_bits == 0 {
            return Err(Error::Config("minimum_entropy_bits must be > 0".to_string()));
        }

        if self.poll_interval_ms == 0 {
            return Err(Error::Config("poll_interval_ms must be > 0".to_string()));
        }

        if self.request_timeout_ms == 0 {
            return Err(Error::Config("request_timeout_ms must be > 0".to_string()));
        }

        if self.device_path.is_empty() {
            return Err(Error::Config("device_path cannot be empty".to_string()));
        }

        Ok(())
    }

    /// Parsed peer URL
    pub fn peer_url(&self) -> Result<Url> {
        let url = Url::parse(&self.peer_url)
            .map_err(|e| Error::Config(format!("Invalid peer_url '{}': {}", self.peer_url, e)))?;

        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(Error::Config(format!(
                "peer_url must use http or https, got '{}'",
                other
            ))),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Entropy server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Bind address for HTTP server
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Device random bytes are read from
    #[serde(default = "default_device_path")]
    pub device_path: String,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// Time allowed for in-flight requests to drain on shutdown
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            device_path: default_device_path(),
            connection_timeout_ms: default_connection_timeout_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from `EAAS_*` environment variables
    pub fn from_env() -> Result<Self> {
        let config: Self = envy::prefixed(ENV_PREFIX)
            .from_env()
            .map_err(|e| Error::Config(format!("Failed to parse environment variables: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file, with `EAAS_*` environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let config: Self = load_layered(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.listen_address()?;

        if self.device_path.is_empty() {
            return Err(Error::Config("device_path cannot be empty".to_string()));
        }

        if self.connection_timeout_ms == 0 {
            return Err(Error::Config("connection_timeout_ms must be > 0".to_string()));
        }

        Ok(())
    }

    /// Parsed listen address
    pub fn listen_address(&self) -> Result<SocketAddr> {
        self.listen_address.parse().map_err(|e| {
            Error::Config(format!("Invalid listen_address '{}': {}", self.listen_address, e))
        })
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

fn load_layered<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let settings = config::Config::builder()
        .add_source(config::File::from(path))
        .add_source(config::Environment::with_prefix("EAAS").try_parsing(true))
        .build()?;
    Ok(settings.try_deserialize()?)
}

// Default value functions
fn default_peer_url() -> String {
    "http://127.0.0.1:8080/entropy".to_string()
}

fn default_minimum_entropy_bits() -> u32 {
    crate::DEFAULT_MINIMUM_ENTROPY_BITS
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_device_path() -> String {
    crate::device::DEFAULT_DEVICE_PATH.to_string()
}

fn default_listen_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_connection_timeout_ms() -> u64 {
    2000
}

fn default_shutdown_grace_ms() -> u64 {
    5000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_defaults() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.minimum_entropy_bits, 1200);
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.peer_url().unwrap().path(), "/entropy");
        assert_eq!(config.device_path, "/dev/random");
    }

    #[test]
    fn test_client_config_validation() {
        let config = ClientConfig {
            peer_url: "ftp://example.com/entropy".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = ClientConfig {
            peer_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ClientConfig {
            minimum_entropy_bits: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ClientConfig {
            poll_interval_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_server_config_validation() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.listen_address().unwrap().port(), 8080);
        assert_eq!(config.connection_timeout(), Duration::from_secs(2));

        let config = ServerConfig {
            listen_address: "localhost".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_client_config_from_file() {
        let path = std::env::temp_dir().join(format!("eaas-client-{}.yaml", std::process::id()));
        std::fs::write(
            &path,
            "peer_url: \"https://entropy.example.com/entropy\"\nminimum_entropy_bits: 2048\n",
        )
        .unwrap();

        let config = ClientConfig::from_file(&path).unwrap();
        assert_eq!(config.peer_url, "https://entropy.example.com/entropy");
        assert_eq!(config.minimum_entropy_bits, 2048);
        assert_eq!(config.poll_interval_ms, 1000);

        std::fs::remove_file(&path).unwrap();
    }
}
