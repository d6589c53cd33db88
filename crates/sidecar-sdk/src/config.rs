//! SDK configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SdkError;

/// Default socket path exposed by the agent
pub const DEFAULT_SOCKET_PATH: &str = "/var/run/sidecar-agent/sdk.sock";

/// Default capacity of the outbound message buffer
pub const DEFAULT_MAX_BUFFERED_MSGS: usize = 10;

/// Configuration for an [`AgentClient`](crate::AgentClient)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Identifier for the connected application, carried by every outbound
    /// frame
    pub name: String,

    /// Path to the local stream socket exposed by the agent
    pub socket_path: PathBuf,

    /// Maximum number of messages buffered while the agent is unreachable;
    /// the oldest are dropped under sustained overflow
    pub max_buffered_msgs: usize,

    /// Fixed delay between connect attempts. The agent is expected to appear
    /// quickly, so retries are frequent and never back off exponentially.
    #[serde(with = "duration_millis")]
    pub retry_backoff: Duration,

    /// How long to wait for the agent's version announcement before firing
    /// the "started" status callback anyway (agents < 1.8.0 never announce)
    #[serde(with = "duration_millis")]
    pub handshake_timeout: Duration,

    /// Bound on joining each background task during `stop`
    #[serde(with = "duration_millis")]
    pub join_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            max_buffered_msgs: DEFAULT_MAX_BUFFERED_MSGS,
            retry_backoff: Duration::from_millis(200),
            handshake_timeout: Duration::from_secs(1),
            join_timeout: Duration::from_secs(2),
        }
    }
}

impl ClientConfig {
    /// Create a configuration with the given application name and defaults
    /// for everything else
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the socket path
    pub fn with_socket_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.socket_path = path.into();
        self
    }

    /// Set the outbound buffer capacity
    pub fn with_max_buffered_msgs(mut self, capacity: usize) -> Self {
        self.max_buffered_msgs = capacity;
        self
    }
}

/// Load a configuration from a TOML file
pub fn load_config(path: &Path) -> Result<ClientConfig, SdkError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| SdkError::InvalidArgument(format!("Failed to read config: {}", e)))?;
    let config: ClientConfig = toml::from_str(&content)
        .map_err(|e| SdkError::InvalidArgument(format!("Invalid config: {}", e)))?;
    Ok(config)
}

/// Helper module for Duration serialization as milliseconds
mod duration_millis {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::new("testapp");
        assert_eq!(config.name, "testapp");
        assert_eq!(config.socket_path, PathBuf::from(DEFAULT_SOCKET_PATH));
        assert_eq!(config.max_buffered_msgs, DEFAULT_MAX_BUFFERED_MSGS);
        assert_eq!(config.retry_backoff, Duration::from_millis(200));
        assert_eq!(config.handshake_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = ClientConfig::new("testapp")
            .with_socket_path("/tmp/agent.sock")
            .with_max_buffered_msgs(32);
        let toml = toml::to_string(&config).unwrap();
        let parsed: ClientConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.name, "testapp");
        assert_eq!(parsed.socket_path, PathBuf::from("/tmp/agent.sock"));
        assert_eq!(parsed.max_buffered_msgs, 32);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed: ClientConfig = toml::from_str(r#"name = "app""#).unwrap();
        assert_eq!(parsed.name, "app");
        assert_eq!(parsed.retry_backoff, Duration::from_millis(200));
    }
}
