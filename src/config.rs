//! FlockFS Configuration
//!
//! Configuration structures for a FlockFS peer, loaded from a TOML file.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Main FlockFS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlockConfig {
    /// Node-specific configuration
    pub node: NodeConfig,

    /// Peer discovery configuration
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Global lease configuration
    #[serde(default)]
    pub lease: LeaseConfig,

    /// Network timeout configuration
    #[serde(default)]
    pub network: NetworkConfig,

    /// HTTP API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Node-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Human-readable node name (defaults to the hostname)
    #[serde(default = "default_node_id")]
    pub id: String,

    /// Address to bind for peer-to-peer control connections
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Advertised address other peers connect to (host:port).
    /// Falls back to `bind_address` when unset.
    #[serde(default)]
    pub advertise_address: Option<String>,

    /// Data directory for the snapshot and lease state
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Peer discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Enable UDP broadcast discovery
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// UDP port announcements are broadcast to and received on
    #[serde(default = "default_discovery_port")]
    pub port: u16,

    /// Seconds between presence announcements
    #[serde(default = "default_announce_interval")]
    pub announce_interval_secs: u64,

    /// A peer unseen for `announce_interval * stale_factor` is dropped
    #[serde(default = "default_stale_factor")]
    pub stale_factor: u32,

    /// Seconds to wait for discovery before the startup sync runs
    #[serde(default = "default_startup_grace")]
    pub startup_grace_secs: u64,

    /// Static peer addresses seeded into the registry at startup
    #[serde(default)]
    pub seed_peers: Vec<String>,
}

/// Global lease configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseConfig {
    /// Seconds between expiry checks of the local lease record
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,

    /// Seconds after acquisition at which a lease is considered expired
    #[serde(default = "default_lease_expiration")]
    pub expiration_secs: u64,
}

/// Network timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Per-request timeout in seconds (covers snapshot transfers)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// HTTP API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Enable HTTP API
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// HTTP API bind address
    #[serde(default = "default_api_address")]
    pub bind_address: String,

    /// Enable CORS
    #[serde(default)]
    pub cors_enabled: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_node_id() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "flockfs-node".to_string())
}

fn default_bind_address() -> String {
    "0.0.0.0:6000".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/flockfs")
}

fn default_discovery_port() -> u16 {
    5000
}

fn default_announce_interval() -> u64 {
    5
}

fn default_stale_factor() -> u32 {
    3
}

fn default_startup_grace() -> u64 {
    3
}

fn default_cleanup_interval() -> u64 {
    60
}

fn default_lease_expiration() -> u64 {
    300
}

fn default_connect_timeout() -> u64 {
    3
}

fn default_request_timeout() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_api_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_discovery_port(),
            announce_interval_secs: default_announce_interval(),
            stale_factor: default_stale_factor(),
            startup_grace_secs: default_startup_grace(),
            seed_peers: Vec::new(),
        }
    }
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_secs: default_cleanup_interval(),
            expiration_secs: default_lease_expiration(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: default_api_address(),
            cors_enabled: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl FlockConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: FlockConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: FlockConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.node.id.is_empty() {
            return Err(Error::Config("node.id cannot be empty".into()));
        }

        if self.node.bind_address.is_empty() {
            return Err(Error::Config("node.bind_address cannot be empty".into()));
        }

        let advertise = self.advertise_addr()?;
        if self.discovery.enabled && advertise.ip().is_unspecified() {
            return Err(Error::Config(
                "node.advertise_address must be a routable address when discovery is enabled"
                    .into(),
            ));
        }

        if self.discovery.announce_interval_secs == 0 {
            return Err(Error::Config(
                "discovery.announce_interval_secs must be at least 1".into(),
            ));
        }

        if self.discovery.stale_factor == 0 {
            return Err(Error::Config(
                "discovery.stale_factor must be at least 1".into(),
            ));
        }

        if self.lease.cleanup_interval_secs == 0 {
            return Err(Error::Config(
                "lease.cleanup_interval_secs must be at least 1".into(),
            ));
        }

        for peer in &self.discovery.seed_peers {
            peer.parse::<SocketAddr>().map_err(|_| {
                Error::Config(format!("invalid seed peer address: {}", peer))
            })?;
        }

        Ok(())
    }

    /// Get the advertised address (or bind address if not set)
    pub fn advertise_address(&self) -> &str {
        self.node
            .advertise_address
            .as_deref()
            .unwrap_or(&self.node.bind_address)
    }

    /// Get the advertised address as a socket address
    pub fn advertise_addr(&self) -> Result<SocketAddr> {
        self.advertise_address().parse().map_err(|_| {
            Error::Config(format!(
                "invalid advertise address: {}",
                self.advertise_address()
            ))
        })
    }

    /// Get the seed peers as socket addresses, skipping our own
    pub fn seed_peer_addrs(&self) -> Vec<SocketAddr> {
        let own = self.advertise_addr().ok();
        self.discovery
            .seed_peers
            .iter()
            .filter_map(|p| p.parse().ok())
            .filter(|addr| Some(*addr) != own)
            .collect()
    }

    /// Get the announce interval as Duration
    pub fn announce_interval(&self) -> Duration {
        Duration::from_secs(self.discovery.announce_interval_secs)
    }

    /// Window after which an unseen peer is dropped from the registry
    pub fn peer_stale_after(&self) -> Duration {
        self.announce_interval() * self.discovery.stale_factor
    }

    /// Get the discovery grace period as Duration
    pub fn startup_grace(&self) -> Duration {
        Duration::from_secs(self.discovery.startup_grace_secs)
    }

    /// Get the lease cleanup interval as Duration
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.lease.cleanup_interval_secs)
    }

    /// Get the lease expiration window as Duration
    pub fn lease_expiration(&self) -> Duration {
        Duration::from_secs(self.lease.expiration_secs)
    }

    /// Get the connect timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.network.connect_timeout_secs)
    }

    /// Get the request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.network.request_timeout_secs)
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &PathBuf {
        &self.node.data_dir
    }

    /// Path of the persisted snapshot
    pub fn snapshot_path(&self) -> PathBuf {
        self.node.data_dir.join("snapshot.bin")
    }

    /// Path of the persisted lease record
    pub fn lease_path(&self) -> PathBuf {
        self.node.data_dir.join("lease.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let toml = r#"
[node]
id = "peer-1"
bind_address = "0.0.0.0:6000"
advertise_address = "10.0.0.5:6000"
data_dir = "/var/lib/flockfs"

[discovery]
port = 5000
announce_interval_secs = 5
seed_peers = ["10.0.0.6:6000"]

[lease]
expiration_secs = 300
"#;

        let config = FlockConfig::from_str(toml).unwrap();
        assert_eq!(config.node.id, "peer-1");
        assert_eq!(config.advertise_address(), "10.0.0.5:6000");
        assert_eq!(config.discovery.port, 5000);
        assert_eq!(config.lease.expiration_secs, 300);
        assert_eq!(config.lease.cleanup_interval_secs, 60); // default
        assert_eq!(config.seed_peer_addrs().len(), 1);
        assert_eq!(config.peer_stale_after(), Duration::from_secs(15));
    }

    #[test]
    fn test_unroutable_advertise_rejected() {
        let toml = r#"
[node]
id = "peer-1"
bind_address = "0.0.0.0:6000"
"#;

        // Discovery is on by default, so an unspecified advertise IP is an error
        assert!(FlockConfig::from_str(toml).is_err());
    }

    #[test]
    fn test_discovery_disabled_allows_wildcard_bind() {
        let toml = r#"
[node]
id = "peer-1"
bind_address = "0.0.0.0:6000"

[discovery]
enabled = false
"#;

        let config = FlockConfig::from_str(toml).unwrap();
        assert!(!config.discovery.enabled);
    }

    #[test]
    fn test_seed_peers_skip_self() {
        let toml = r#"
[node]
id = "peer-1"
bind_address = "0.0.0.0:6000"
advertise_address = "10.0.0.5:6000"

[discovery]
seed_peers = ["10.0.0.5:6000", "10.0.0.6:6000"]
"#;

        let config = FlockConfig::from_str(toml).unwrap();
        assert_eq!(config.seed_peer_addrs(), vec!["10.0.0.6:6000".parse().unwrap()]);
    }

    #[test]
    fn test_invalid_seed_peer_rejected() {
        let toml = r#"
[node]
id = "peer-1"
bind_address = "0.0.0.0:6000"
advertise_address = "10.0.0.5:6000"

[discovery]
seed_peers = ["not-an-address"]
"#;

        assert!(FlockConfig::from_str(toml).is_err());
    }
}
