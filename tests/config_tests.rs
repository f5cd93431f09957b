use meshchat::config::{DEFAULT_PORT, DEFAULT_READ_CHUNK};
use meshchat::{ConfigError, Framing, NodeConfig};
use std::io::Write;
use std::net::Ipv4Addr;
use std::time::Duration;

#[test]
fn test_defaults_match_legacy_node() {
    let config = NodeConfig::default();
    assert_eq!(config.port, DEFAULT_PORT);
    assert_eq!(config.port, 8888);
    assert_eq!(config.bind, Ipv4Addr::UNSPECIFIED);
    assert_eq!(config.framing, Framing::Raw);
    assert_eq!(config.read_chunk, DEFAULT_READ_CHUNK);
    assert!(config.connect_timeout().is_none());
    assert!(config.read_timeout().is_none());
    assert!(config.max_peers.is_none());
    assert!(!config.username.is_empty());
    assert_eq!(config.log.level, "info");
}

#[test]
fn test_load_from_toml_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
port = 9001
bind = "127.0.0.1"
username = "alice"
framing = "lines"
connect_timeout_ms = 1500
max_peers = 16

[log]
level = "debug"
"#
    )
    .unwrap();

    let config = NodeConfig::from_file(file.path()).unwrap();
    assert_eq!(config.port, 9001);
    assert_eq!(config.bind, Ipv4Addr::LOCALHOST);
    assert_eq!(config.username, "alice");
    assert_eq!(config.framing, Framing::Lines);
    assert_eq!(config.connect_timeout(), Some(Duration::from_millis(1500)));
    assert_eq!(config.max_peers, Some(16));
    assert_eq!(config.log.level, "debug");
    // Unset keys keep their defaults.
    assert_eq!(config.read_chunk, DEFAULT_READ_CHUNK);
    assert_eq!(config.listen_addr().to_string(), "127.0.0.1:9001");
}

#[test]
fn test_parse_errors_name_the_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "port = \"not a number\"").unwrap();
    let err = NodeConfig::from_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().contains(&file.path().display().to_string()));
}

#[test]
fn test_missing_file_is_a_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = NodeConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}

#[test]
fn test_validation_rejects_zero_values() {
    let zero_chunk = NodeConfig { read_chunk: 0, ..NodeConfig::default() };
    assert!(matches!(zero_chunk.validate(), Err(ConfigError::Invalid(_))));

    let zero_cap = NodeConfig { max_peers: Some(0), ..NodeConfig::default() };
    assert!(zero_cap.validate().is_err());

    let zero_timeout = NodeConfig { read_timeout_ms: Some(0), ..NodeConfig::default() };
    let err = zero_timeout.validate().unwrap_err();
    assert!(err.to_string().contains("read_timeout_ms"));

    assert!(NodeConfig::default().validate().is_ok());
}
