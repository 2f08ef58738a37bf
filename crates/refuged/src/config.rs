//! Daemon configuration.
//!
//! Values are layered, lowest precedence first:
//! 1. Built-in defaults
//! 2. TOML file (`$REFUGE_CONFIG`, else `<config dir>/refuge/config.toml` if present)
//! 3. Environment (`REFUGE_SOCKET`, `REFUGE_MAX_CLIENTS`)
//! 4. Command-line ports (`-p tcp <port>`, `-p udp <port>`)

use std::env;
use std::fmt;
use std::net::{IpAddr, Ipv6Addr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use refuge_protocol::{DEFAULT_SOCKET_PATH, SOCKET_ENV};

/// Default registry capacity per transport
pub const DEFAULT_MAX_CLIENTS: usize = 5;

/// Default identity accepted by `authenticateme`
pub const DEFAULT_ADMIN_IDENTITY: &str = "ubuntu";

/// Environment variable naming the TOML config file
pub const CONFIG_ENV: &str = "REFUGE_CONFIG";

/// Environment variable overriding the registry capacity
pub const MAX_CLIENTS_ENV: &str = "REFUGE_MAX_CLIENTS";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {error}")]
    Read { path: PathBuf, error: String },

    #[error("Invalid config file {path}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid value for {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },

    #[error("Unknown protocol '{0}' (expected tcp or udp)")]
    UnknownProtocol(String),

    #[error("Invalid port '{0}'")]
    InvalidPort(String),

    #[error("Port option needs a protocol and a port")]
    IncompletePort,

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Port Options
// ============================================================================

/// Transport named by a `-p` option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Tcp,
    Udp,
}

impl FromStr for Transport {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            other => Err(ConfigError::UnknownProtocol(other.to_string())),
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => f.write_str("tcp"),
            Self::Udp => f.write_str("udp"),
        }
    }
}

/// One `-p <protocol> <port>` option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortSpec {
    pub transport: Transport,
    pub port: u16,
}

impl PortSpec {
    /// Parses a flat list of `protocol port` pairs as collected from the CLI.
    pub fn from_pairs<S: AsRef<str>>(values: &[S]) -> Result<Vec<Self>, ConfigError> {
        let chunks = values.chunks(2);
        let mut specs = Vec::with_capacity(chunks.len());

        for chunk in chunks {
            let [transport, port] = chunk else {
                return Err(ConfigError::IncompletePort);
            };
            let transport = transport.as_ref().parse::<Transport>()?;
            let port = port
                .as_ref()
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidPort(port.as_ref().to_string()))?;
            specs.push(Self { transport, port });
        }

        Ok(specs)
    }
}

// ============================================================================
// Daemon Config
// ============================================================================

/// Complete daemon configuration. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Address both network sockets bind to (`::` falls back to `0.0.0.0`)
    pub bind_address: IpAddr,

    /// TCP port, `None` for an OS-assigned port
    pub tcp_port: Option<u16>,

    /// UDP port, `None` for an OS-assigned port
    pub udp_port: Option<u16>,

    /// Path of the Unix control socket
    pub control_socket: PathBuf,

    /// Capacity of each registry list
    pub max_clients: usize,

    /// Identity accepted by `authenticateme` and UDP `update`
    pub admin_identity: String,

    /// Event log file
    pub event_log: PathBuf,

    /// Where the bound ports are published
    pub ports_file: PathBuf,

    /// Seconds between sensor samples
    pub sensor_interval_secs: u64,

    /// Temperature above which a sensor raises an alert
    pub temperature_threshold: f64,

    /// Lower bound of the power-outage delay in seconds
    pub outage_min_secs: u64,

    /// Upper bound of the power-outage delay in seconds
    pub outage_max_secs: u64,

    /// UDP peers silent for longer than this are dropped before broadcasts
    pub udp_peer_ttl_secs: Option<u64>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            tcp_port: None,
            udp_port: None,
            control_socket: PathBuf::from(DEFAULT_SOCKET_PATH),
            max_clients: DEFAULT_MAX_CLIENTS,
            admin_identity: DEFAULT_ADMIN_IDENTITY.to_string(),
            event_log: default_event_log_path(),
            ports_file: refuge_protocol::default_ports_path(),
            sensor_interval_secs: 30,
            temperature_threshold: 38.0,
            outage_min_secs: 300,
            outage_max_secs: 600,
            udp_peer_ttl_secs: None,
        }
    }
}

impl DaemonConfig {
    /// Loads defaults, then the config file, then the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match config_file_path() {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(|name| env::var(name).ok())?;
        Ok(config)
    }

    /// Reads a TOML file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Applies environment overrides using `lookup` to read variables.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(socket) = lookup(SOCKET_ENV) {
            self.control_socket = PathBuf::from(socket);
        }
        if let Some(value) = lookup(MAX_CLIENTS_ENV) {
            self.max_clients = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                name: MAX_CLIENTS_ENV,
                value,
            })?;
        }
        Ok(())
    }

    /// Applies `-p` options in order; a later option for the same transport wins.
    pub fn apply_ports(&mut self, specs: &[PortSpec]) {
        for spec in specs {
            match spec.transport {
                Transport::Tcp => self.tcp_port = Some(spec.port),
                Transport::Udp => self.udp_port = Some(spec.port),
            }
        }
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_clients == 0 {
            return Err(ConfigError::Invalid("max_clients must be at least 1".into()));
        }
        if self.outage_min_secs > self.outage_max_secs {
            return Err(ConfigError::Invalid(format!(
                "outage_min_secs ({}) exceeds outage_max_secs ({})",
                self.outage_min_secs, self.outage_max_secs
            )));
        }
        if self.sensor_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "sensor_interval_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn sensor_interval(&self) -> Duration {
        Duration::from_secs(self.sensor_interval_secs)
    }

    pub fn outage_window(&self) -> (Duration, Duration) {
        (
            Duration::from_secs(self.outage_min_secs),
            Duration::from_secs(self.outage_max_secs),
        )
    }

    pub fn udp_peer_ttl(&self) -> Option<Duration> {
        self.udp_peer_ttl_secs.map(Duration::from_secs)
    }
}

/// Returns `$HOME/.refuge/refuge.log`, or a path under `/tmp` without a home.
pub fn default_event_log_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".refuge")
        .join("refuge.log")
}

/// Returns the config file to read, if any.
fn config_file_path() -> Option<PathBuf> {
    if let Ok(path) = env::var(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir()
        .map(|dir| dir.join("refuge").join("config.toml"))
        .filter(|path| path.exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = DaemonConfig::default();
        assert_eq!(config.max_clients, 5);
        assert_eq!(config.admin_identity, "ubuntu");
        assert_eq!(config.control_socket, PathBuf::from("/tmp/refuge.sock"));
        assert_eq!(config.tcp_port, None);
        assert!(config.event_log.ends_with(".refuge/refuge.log"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_port_pairs_any_order() {
        let specs = PortSpec::from_pairs(&["udp", "9001", "tcp", "9000"]).unwrap();
        let mut config = DaemonConfig::default();
        config.apply_ports(&specs);

        assert_eq!(config.tcp_port, Some(9000));
        assert_eq!(config.udp_port, Some(9001));
    }

    #[test]
    fn test_port_last_occurrence_wins() {
        let specs = PortSpec::from_pairs(&["tcp", "9000", "tcp", "9100"]).unwrap();
        let mut config = DaemonConfig::default();
        config.apply_ports(&specs);

        assert_eq!(config.tcp_port, Some(9100));
        assert_eq!(config.udp_port, None);
    }

    #[test]
    fn test_port_pair_errors() {
        assert!(matches!(
            PortSpec::from_pairs(&["sctp", "9000"]),
            Err(ConfigError::UnknownProtocol(_))
        ));
        assert!(matches!(
            PortSpec::from_pairs(&["tcp", "http"]),
            Err(ConfigError::InvalidPort(_))
        ));
        assert!(matches!(
            PortSpec::from_pairs(&["tcp", "70000"]),
            Err(ConfigError::InvalidPort(_))
        ));
        assert!(matches!(
            PortSpec::from_pairs(&["tcp"]),
            Err(ConfigError::IncompletePort)
        ));
    }

    #[test]
    fn test_toml_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "max_clients = 8\nadmin_identity = \"warden\"\nbind_address = \"127.0.0.1\"\nudp_peer_ttl_secs = 60\n",
        )
        .unwrap();

        let config = DaemonConfig::from_file(&path).unwrap();
        assert_eq!(config.max_clients, 8);
        assert_eq!(config.admin_identity, "warden");
        assert_eq!(config.bind_address, "127.0.0.1".parse::<IpAddr>().unwrap());
        assert_eq!(config.udp_peer_ttl(), Some(Duration::from_secs(60)));
        assert_eq!(config.sensor_interval_secs, 30);
    }

    #[test]
    fn test_toml_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "max_clients = \"many\"").unwrap();

        assert!(matches!(
            DaemonConfig::from_file(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            (SOCKET_ENV, "/run/refuge/control.sock"),
            (MAX_CLIENTS_ENV, "12"),
        ]
        .into_iter()
        .collect();

        let mut config = DaemonConfig::default();
        config
            .apply_env(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.control_socket, PathBuf::from("/run/refuge/control.sock"));
        assert_eq!(config.max_clients, 12);
    }

    #[test]
    fn test_env_invalid_max_clients() {
        let mut config = DaemonConfig::default();
        let result = config.apply_env(|name| (name == MAX_CLIENTS_ENV).then(|| "lots".to_string()));
        assert!(matches!(result, Err(ConfigError::InvalidEnv { .. })));
    }

    #[test]
    fn test_validate_rejects() {
        let config = DaemonConfig {
            max_clients: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = DaemonConfig {
            outage_min_secs: 700,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
