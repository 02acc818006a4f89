//! JSON server configuration.
//!
//! ```json
//! { "listen": { "tcp": { "address": "127.0.0.1", "port": 8080 } },
//!   "max_connections": 128, "log_level": "info" }
//! ```
//!
//! or, for a local-domain socket in the abstract namespace,
//!
//! ```json
//! { "listen": { "local": { "path": "plexer", "abstract": true } } }
//! ```

use std::fs;
use std::net::{AddrParseError, IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use plexer_net::EndpointAddress;
use serde::Deserialize;
use thiserror::Error;
use tracing::Level;

pub const DEFAULT_ADDRESS: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_MAX_CONNECTIONS: usize = 128;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("can't read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config json: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    #[error("{address:?} is not an ip address ({source}), did you give a hostname instead?")]
    InvalidAddress {
        address: String,
        #[source]
        source: AddrParseError,
    },

    #[error("local socket path must not be empty")]
    EmptyLocalPath,

    #[error("max_connections must be at least 1")]
    NoConnections,

    #[error("invalid log level {level:?}: {source}")]
    InvalidLogLevel {
        level: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ConfigError {
    pub fn io<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    pub fn invalid_address<S: ToString>(address: S, source: AddrParseError) -> Self {
        Self::InvalidAddress { address: address.to_string(), source }
    }

    pub fn invalid_log_level<S: ToString, E>(level: S, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::InvalidLogLevel { level: level.to_string(), source: source.into() }
    }
}

/// Where the server listens.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum ListenConfig {
    Tcp {
        #[serde(default = "default_address")]
        address: String,
        #[serde(default = "default_port")]
        port: u16,
    },
    Local {
        path: String,
        #[serde(rename = "abstract", default)]
        is_abstract: bool,
    },
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self::Tcp { address: default_address(), port: default_port() }
    }
}

fn default_address() -> String {
    DEFAULT_ADDRESS.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub listen: ListenConfig,
    pub max_connections: usize,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { listen: ListenConfig::default(), max_connections: DEFAULT_MAX_CONNECTIONS, log_level: "info".to_string() }
    }
}

impl ServerConfig {
    /// Parses and validates a configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        Self::from_json_str(&json)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.endpoint_address()?;
        self.log_level()?;
        if self.max_connections == 0 {
            return Err(ConfigError::NoConnections);
        }
        Ok(())
    }

    pub fn endpoint_address(&self) -> Result<EndpointAddress, ConfigError> {
        match &self.listen {
            ListenConfig::Tcp { address, port } => {
                let ip = IpAddr::from_str(address).map_err(|e| ConfigError::invalid_address(address, e))?;
                Ok(EndpointAddress::tcp(SocketAddr::new(ip, *port)))
            }
            ListenConfig::Local { path, is_abstract } => {
                if path.is_empty() {
                    return Err(ConfigError::EmptyLocalPath);
                }
                Ok(EndpointAddress::local(path, *is_abstract))
            }
        }
    }

    pub fn log_level(&self) -> Result<Level, ConfigError> {
        Level::from_str(self.log_level.trim()).map_err(|e| ConfigError::invalid_log_level(&self.log_level, e))
    }
}
