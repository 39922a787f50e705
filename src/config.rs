//! # Configuration Management
//!
//! Centralized configuration for the MRIM server, the redirector and the SOCKS5 gateway.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()` / `from_toml()`
//! - Environment variables (`MRIM_*`) via `from_env()` or `with_env_overrides()`
//! - Direct instantiation with defaults
//!
//! ## Security Considerations
//! - The payload cap bounds how much a client can make the server buffer per frame
//! - Idle timeouts release connections that stop talking mid-frame

use crate::error::{ProtocolError, Result};
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Default cap on a single MRIM payload (1 MB)
pub const MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

/// Default MRIM listen port
pub const DEFAULT_MRIM_PORT: u16 = 2041;

/// Default redirector listen port
pub const DEFAULT_REDIRECTOR_PORT: u16 = 2042;

/// Searches allowed per session before the limiter refuses
pub const DEFAULT_SEARCH_QUOTA: u32 = 25;

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct GatewayConfig {
    /// Listener configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// MRIM session behaviour
    #[serde(default)]
    pub mrim: MrimConfig,

    /// SOCKS5 gateway policy
    #[serde(default)]
    pub socks: SocksConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl GatewayConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Defaults overridden by environment variables
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides()
    }

    /// Apply `MRIM_*` environment variables on top of this configuration.
    ///
    /// Variables that are present but do not parse are configuration errors.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(key: &str, raw: String) -> Result<T> {
            raw.trim()
                .parse::<T>()
                .map_err(|_| ProtocolError::ConfigError(format!("Invalid value for {key}: '{raw}'")))
        }

        if let Some(addr) = lookup("MRIM_LISTEN_ADDRESS") {
            self.server.mrim_address = addr;
        }
        if let Some(addr) = lookup("MRIM_REDIRECTOR_ADDRESS") {
            self.server.redirector_address = addr;
        }
        if let Some(addr) = lookup("MRIM_SOCKS_ADDRESS") {
            self.server.socks_address = addr;
        }
        if let Some(host) = lookup("MRIM_ADVERTISED_HOST") {
            self.server.advertised_host = host;
        }
        if let Some(raw) = lookup("MRIM_IDLE_TIMEOUT_MS") {
            self.server.idle_timeout = Duration::from_millis(parsed("MRIM_IDLE_TIMEOUT_MS", raw)?);
        }
        if let Some(raw) = lookup("MRIM_MAX_CONNECTIONS") {
            self.server.max_connections = parsed("MRIM_MAX_CONNECTIONS", raw)?;
        }
        if let Some(raw) = lookup("MRIM_PING_PERIOD_SECS") {
            self.mrim.ping_period_secs = parsed("MRIM_PING_PERIOD_SECS", raw)?;
        }
        if let Some(raw) = lookup("MRIM_SEARCH_QUOTA") {
            self.mrim.search_quota = parsed("MRIM_SEARCH_QUOTA", raw)?;
        }
        if let Some(raw) = lookup("MRIM_SEARCH_WINDOW_MS") {
            self.mrim.search_refill_window =
                Duration::from_millis(parsed("MRIM_SEARCH_WINDOW_MS", raw)?);
        }
        if let Some(raw) = lookup("MRIM_LOG_LEVEL") {
            self.logging.log_level = parsed("MRIM_LOG_LEVEL", raw)?;
        }
        if let Some(raw) = lookup("MRIM_LOG_JSON") {
            self.logging.json_format = parsed("MRIM_LOG_JSON", raw)?;
        }

        Ok(self)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        errors.extend(self.server.validate());
        errors.extend(self.mrim.validate());
        errors.extend(self.socks.validate());
        errors.extend(self.logging.validate());

        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Listener configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// MRIM listen address
    pub mrim_address: String,

    /// Redirector listen address
    pub redirector_address: String,

    /// SOCKS5 gateway listen address
    pub socks_address: String,

    /// Host name the redirector hands out to clients
    pub advertised_host: String,

    /// Close a connection after this long without inbound data
    #[serde(with = "duration_serde")]
    pub idle_timeout: Duration,

    /// Timeout for graceful server shutdown
    #[serde(with = "duration_serde")]
    pub shutdown_timeout: Duration,

    /// Maximum number of concurrent connections per listener
    pub max_connections: usize,

    /// Largest MRIM payload accepted, in bytes
    pub max_payload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            mrim_address: format!("0.0.0.0:{DEFAULT_MRIM_PORT}"),
            redirector_address: format!("0.0.0.0:{DEFAULT_REDIRECTOR_PORT}"),
            socks_address: String::from("0.0.0.0:1080"),
            advertised_host: String::from("127.0.0.1"),
            idle_timeout: timeout::IDLE_TIMEOUT,
            shutdown_timeout: timeout::SHUTDOWN_TIMEOUT,
            max_connections: 1000,
            max_payload_size: MAX_PAYLOAD_SIZE,
        }
    }
}

fn check_address(errors: &mut Vec<String>, name: &str, address: &str) {
    if address.is_empty() {
        errors.push(format!("{name} address cannot be empty"));
    } else if address.parse::<SocketAddr>().is_err() {
        errors.push(format!(
            "Invalid {name} address format: '{address}' (expected format: '0.0.0.0:2041')"
        ));
    }
}

impl ServerConfig {
    /// Validate listener configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        check_address(&mut errors, "MRIM", &self.mrim_address);
        check_address(&mut errors, "redirector", &self.redirector_address);
        check_address(&mut errors, "SOCKS", &self.socks_address);

        if self.advertised_host.trim().is_empty() {
            errors.push("Advertised host cannot be empty".to_string());
        }

        if self.idle_timeout.as_millis() < 100 {
            errors.push("Idle timeout too short (minimum: 100ms)".to_string());
        } else if self.idle_timeout.as_secs() > 3600 {
            errors.push("Idle timeout too long (maximum: 1 hour)".to_string());
        }

        if self.shutdown_timeout.as_secs() < 1 {
            errors.push("Shutdown timeout too short (minimum: 1s)".to_string());
        } else if self.shutdown_timeout.as_secs() > 60 {
            errors.push("Shutdown timeout too long (maximum: 60s)".to_string());
        }

        if self.max_connections == 0 {
            errors.push("Max connections must be greater than 0".to_string());
        } else if self.max_connections > 100_000 {
            errors.push(format!(
                "Max connections very high: {} (ensure system resources can support this)",
                self.max_connections
            ));
        }

        if self.max_payload_size < 1024 {
            errors.push("Max payload size too small (minimum: 1 KB)".to_string());
        } else if self.max_payload_size > 16 * 1024 * 1024 {
            errors.push(format!(
                "Max payload size too large: {} bytes (maximum: 16 MB)",
                self.max_payload_size
            ));
        }

        errors
    }
}

/// MRIM session behaviour
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MrimConfig {
    /// Seconds between client pings, announced in HELLO_ACK
    pub ping_period_secs: u32,

    /// Searches allowed per window
    pub search_quota: u32,

    /// Window after which an exhausted quota refills
    #[serde(with = "duration_serde")]
    pub search_refill_window: Duration,

    /// Rows returned by one directory search
    pub max_search_rows: u32,
}

impl Default for MrimConfig {
    fn default() -> Self {
        Self {
            ping_period_secs: timeout::PING_PERIOD.as_secs() as u32,
            search_quota: DEFAULT_SEARCH_QUOTA,
            search_refill_window: timeout::SEARCH_REFILL_WINDOW,
            max_search_rows: 50,
        }
    }
}

impl MrimConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.ping_period_secs == 0 {
            errors.push("Ping period must be greater than 0".to_string());
        }
        if self.search_quota == 0 {
            errors.push("Search quota must be greater than 0".to_string());
        }
        if self.search_refill_window.as_millis() < 100 {
            errors.push("Search refill window too short (minimum: 100ms)".to_string());
        }
        if self.max_search_rows == 0 || self.max_search_rows > 500 {
            errors.push(format!(
                "Max search rows out of range: {} (valid range: 1-500)",
                self.max_search_rows
            ));
        }

        errors
    }
}

/// SOCKS5 gateway policy
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SocksConfig {
    /// Destination port spliced into the MRIM handler
    pub mrim_port: u16,

    /// Destination port spliced into the redirector
    pub redirector_port: u16,

    /// Time allowed to finish the SOCKS negotiation
    #[serde(with = "duration_serde")]
    pub negotiation_timeout: Duration,
}

impl Default for SocksConfig {
    fn default() -> Self {
        Self {
            mrim_port: DEFAULT_MRIM_PORT,
            redirector_port: DEFAULT_REDIRECTOR_PORT,
            negotiation_timeout: Duration::from_secs(10),
        }
    }
}

impl SocksConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.mrim_port == 0 || self.redirector_port == 0 {
            errors.push("SOCKS destination ports must be non-zero".to_string());
        }
        if self.mrim_port == self.redirector_port {
            errors.push(format!(
                "MRIM and redirector destination ports must differ (both {})",
                self.mrim_port
            ));
        }
        if self.negotiation_timeout.as_millis() < 100 {
            errors.push("SOCKS negotiation timeout too short (minimum: 100ms)".to_string());
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,

    /// Whether to print the event target
    #[serde(default)]
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("mrim-gateway"),
            log_level: Level::INFO,
            json_format: false,
            with_target: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        level.as_str().to_lowercase().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("MRIM_LISTEN_ADDRESS", "127.0.0.1:3041"),
            ("MRIM_SEARCH_QUOTA", "5"),
            ("MRIM_LOG_LEVEL", "debug"),
        ]
        .into_iter()
        .collect();

        let config = GatewayConfig::default()
            .with_overrides_from(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.server.mrim_address, "127.0.0.1:3041");
        assert_eq!(config.mrim.search_quota, 5);
        assert_eq!(config.logging.log_level, Level::DEBUG);
    }

    #[test]
    fn test_bad_env_value_is_an_error() {
        let result = GatewayConfig::default().with_overrides_from(|k| {
            (k == "MRIM_MAX_CONNECTIONS").then(|| "many".to_string())
        });
        assert!(matches!(result, Err(ProtocolError::ConfigError(_))));
    }
}
