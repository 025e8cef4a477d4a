//! Configuration for the mcwire client

use crate::McwireError;
use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub client: ClientConfig,
}

/// Client configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server addresses (`host:port`); keys are spread across them in order
    pub servers: Vec<String>,

    /// Timeout for establishing a connection in milliseconds (0 = no timeout)
    pub connect_timeout_ms: u64,

    /// Timeout for one request/reply round trip in milliseconds (0 = no timeout)
    pub io_timeout_ms: u64,

    /// Read buffer size per connection (bytes)
    pub read_buffer_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            servers: vec!["127.0.0.1:11211".to_string()],
            connect_timeout_ms: 1000,
            io_timeout_ms: 1000,
            read_buffer_size: 8192,
        }
    }
}

impl ClientConfig {
    pub fn connect_timeout(&self) -> Option<Duration> {
        (self.connect_timeout_ms > 0).then(|| Duration::from_millis(self.connect_timeout_ms))
    }

    pub fn io_timeout(&self) -> Option<Duration> {
        (self.io_timeout_ms > 0).then(|| Duration::from_millis(self.io_timeout_ms))
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| McwireError::Config(format!("Failed to read config file: {e}")))?;

        toml::from_str(&contents)
            .map_err(|e| McwireError::Config(format!("Failed to parse config: {e}")))
    }

    /// Load configuration from environment variables or use defaults
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(servers) = var("MCWIRE_SERVERS") {
            let servers: Vec<String> = servers
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
            if !servers.is_empty() {
                config.client.servers = servers;
            }
        }

        if let Some(ms) = var("MCWIRE_IO_TIMEOUT_MS")
            && let Ok(n) = ms.parse()
        {
            config.client.io_timeout_ms = n;
        }

        if let Some(ms) = var("MCWIRE_CONNECT_TIMEOUT_MS")
            && let Ok(n) = ms.parse()
        {
            config.client.connect_timeout_ms = n;
        }

        config
    }
}
