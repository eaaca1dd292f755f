//! Server configuration.
//!
//! Configuration is layered, later sources winning:
//! - Built-in defaults (`RELAY_HOST` / `RELAY_PORT` feed the host and port defaults)
//! - TOML configuration file
//! - Environment variables `RELAY__<SECTION>__<KEY>`, e.g. `RELAY__RELAY__INBOX_CAPACITY=16`

use anyhow::{Context, Result};
use relay_core::RelayConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file locations, searched in order.
const CONFIG_PATHS: [&str; 3] = [
    "relay.toml",
    "/etc/relay/relay.toml",
    "~/.config/relay/relay.toml",
];

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Message distribution settings.
    #[serde(default)]
    pub relay: RelaySection,

    /// Transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Admin HTTP endpoint.
    #[serde(default)]
    pub admin: AdminConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Message distribution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaySection {
    /// Messages that may wait for the distributor before `send` blocks.
    #[serde(default = "default_inbound_capacity")]
    pub inbound_capacity: usize,

    /// Messages held per client before deliveries are dropped.
    #[serde(default = "default_inbox_capacity")]
    pub inbox_capacity: usize,

    /// Long-poll deadline in milliseconds.
    #[serde(default = "default_wait_timeout")]
    pub wait_timeout_ms: u64,
}

/// Which transport the server listens with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Length-prefixed frames over raw TCP.
    Tcp,
    /// Frames inside binary WebSocket messages.
    Websocket,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Transport to listen with.
    #[serde(default = "default_transport_kind")]
    pub kind: TransportKind,

    /// Maximum inbound frame size in bytes.
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
}

/// Admin HTTP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Serve `/health` and `/stats`.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Admin port.
    #[serde(default = "default_admin_port")]
    pub port: u16,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,

    /// How often service statistics are published, in milliseconds.
    #[serde(default = "default_report_interval")]
    pub report_interval_ms: u64,
}

// Default value functions
fn default_host() -> String {
    std::env::var("RELAY_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn default_port() -> u16 {
    std::env::var("RELAY_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(1234)
}

fn default_true() -> bool {
    true
}

fn default_inbound_capacity() -> usize {
    10
}

fn default_inbox_capacity() -> usize {
    5
}

fn default_wait_timeout() -> u64 {
    5_000 // 5 seconds
}

fn default_transport_kind() -> TransportKind {
    TransportKind::Tcp
}

fn default_max_frame_size() -> usize {
    64 * 1024 // 64 KB
}

fn default_admin_port() -> u16 {
    8081
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_report_interval() -> u64 {
    1_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            relay: RelaySection::default(),
            transport: TransportConfig::default(),
            admin: AdminConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            inbound_capacity: default_inbound_capacity(),
            inbox_capacity: default_inbox_capacity(),
            wait_timeout_ms: default_wait_timeout(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: default_transport_kind(),
            max_frame_size: default_max_frame_size(),
        }
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_admin_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
            report_interval_ms: default_report_interval(),
        }
    }
}

impl Config {
    /// Load configuration.
    ///
    /// Uses `path` if given, otherwise the first existing default location,
    /// then applies `RELAY__*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` does not exist or a source cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => {
                anyhow::ensure!(path.exists(), "Config file not found: {}", path.display());
                Some(path.to_path_buf())
            }
            None => Self::find_default_file(),
        };

        let mut builder = config::Config::builder();
        if let Some(file) = &file {
            tracing::info!("Loading configuration from {}", file.display());
            builder = builder.add_source(
                config::File::from(file.as_path()).format(config::FileFormat::Toml),
            );
        }
        builder = builder.add_source(
            config::Environment::with_prefix("RELAY")
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }

    fn find_default_file() -> Option<PathBuf> {
        CONFIG_PATHS
            .iter()
            .map(|path| PathBuf::from(shellexpand::tilde(path).as_ref()))
            .find(|path| path.exists())
    }

    /// Load configuration from a specific file, without environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        Self::socket_addr(&self.host, self.port)
    }

    /// Get the admin endpoint address.
    ///
    /// # Errors
    ///
    /// Returns an error if host and admin port do not form a socket address.
    pub fn admin_addr(&self) -> Result<SocketAddr> {
        Self::socket_addr(&self.host, self.admin.port)
    }

    fn socket_addr(host: &str, port: u16) -> Result<SocketAddr> {
        format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("Invalid host:port {}:{}", host, port))
    }

    /// Settings for the chat service.
    #[must_use]
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            inbound_capacity: self.relay.inbound_capacity,
            inbox_capacity: self.relay.inbox_capacity,
            wait_timeout: Duration::from_millis(self.relay.wait_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.relay.inbox_capacity, 5);
        assert_eq!(config.relay.inbound_capacity, 10);
        assert_eq!(config.transport.kind, TransportKind::Tcp);
        assert!(config.admin.enabled);
    }

    #[test]
    fn test_relay_config_conversion() {
        let relay = Config::default().relay_config();
        assert_eq!(relay.wait_timeout, Duration::from_secs(5));
        assert_eq!(relay.inbox_capacity, 5);
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            host = "0.0.0.0"
            port = 9000

            [relay]
            inbox_capacity = 32
            wait_timeout_ms = 250

            [transport]
            kind = "websocket"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.relay.inbox_capacity, 32);
        assert_eq!(config.relay.inbound_capacity, 10);
        assert_eq!(config.transport.kind, TransportKind::Websocket);
        assert_eq!(config.bind_addr().unwrap().port(), 9000);
        assert_eq!(
            config.relay_config().wait_timeout,
            Duration::from_millis(250)
        );
    }

    #[test]
    fn test_invalid_bind_addr() {
        let config = Config {
            host: "not a host".to_string(),
            ..Config::default()
        };
        assert!(config.bind_addr().is_err());
    }

    #[test]
    fn test_load_missing_file() {
        assert!(Config::load(Some(Path::new("/nonexistent/relay.toml"))).is_err());
    }
}
