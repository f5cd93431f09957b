//! Node configuration: TOML file, then environment, then command line.
use serde::Deserialize;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::ConfigError;
use crate::net::Framing;

pub const DEFAULT_PORT: u16 = 8888;
/// Largest single read, kept at the legacy buffer size minus its terminator.
pub const DEFAULT_READ_CHUNK: usize = 1023;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub port: u16,
    pub bind: Ipv4Addr,
    pub username: String,
    pub framing: Framing,
    pub read_chunk: usize,
    pub connect_timeout_ms: Option<u64>,
    pub read_timeout_ms: Option<u64>,
    pub write_timeout_ms: Option<u64>,
    pub max_peers: Option<usize>,
    pub log: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: Ipv4Addr::UNSPECIFIED,
            username: default_username(),
            framing: Framing::Raw,
            read_chunk: DEFAULT_READ_CHUNK,
            connect_timeout_ms: None,
            read_timeout_ms: None,
            write_timeout_ms: None,
            max_peers: None,
            log: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), file: None }
    }
}

fn default_username() -> String {
    let name = whoami::username();
    if name.trim().is_empty() { "Anonymous".to_string() } else { name }
}

impl NodeConfig {
    /// Load from `path` when given, otherwise start from defaults, then apply
    /// `MESHCHAT_*` environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                info!(config_path = %path.display(), "loading configuration");
                Self::from_file(path)?
            }
            None => Self::default(),
        };
        let config = config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    fn apply_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("MESHCHAT_PORT") {
            if let Ok(port) = v.parse::<u16>() {
                self.port = port;
            }
        }
        if let Ok(v) = std::env::var("MESHCHAT_USERNAME") {
            if !v.trim().is_empty() {
                self.username = v;
            }
        }
        if let Ok(v) = std::env::var("MESHCHAT_LOG") {
            self.log.level = v;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.read_chunk == 0 {
            return Err(ConfigError::Invalid("read_chunk must be at least 1 byte".into()));
        }
        if self.max_peers == Some(0) {
            return Err(ConfigError::Invalid("max_peers must be positive when set".into()));
        }
        for (name, value) in [
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("read_timeout_ms", self.read_timeout_ms),
            ("write_timeout_ms", self.write_timeout_ms),
        ] {
            if value == Some(0) {
                return Err(ConfigError::Invalid(format!("{} must be positive when set", name)));
            }
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.bind, self.port))
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms.map(Duration::from_millis)
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout_ms.map(Duration::from_millis)
    }
}
