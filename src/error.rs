//! Error types, one enum per failure category.
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Failures that abort node startup.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to bind to {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },
    #[error("failed to start {what} thread: {source}")]
    Spawn { what: &'static str, source: io::Error },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Failure of a single outbound connection attempt. Nothing is registered.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("invalid address format: {0}")]
    InvalidAddress(String),
    #[error("failed to connect to {addr}: {source}")]
    Io { addr: SocketAddr, source: io::Error },
    #[error("node is shutting down")]
    Stopped,
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("peer limit of {limit} reached")]
    Full { limit: usize },
}

/// Malformed user input. Reported back, never changes state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("Usage: {0}")]
    Usage(&'static str),
    #[error("Invalid port number: {0}")]
    InvalidPort(String),
    #[error("Unknown command: {0}. Type /help for available commands.")]
    Unknown(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse {}: {source}", .path.display())]
    Parse { path: PathBuf, source: toml::de::Error },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
