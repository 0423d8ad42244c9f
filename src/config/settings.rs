use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::transport::BackoffConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub transport: TransportConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    /// WebSocket endpoint of the chat broker
    #[serde(default = "default_url")]
    pub url: String,
    /// Heartbeat interval in seconds (client sends ping)
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: u64,
    /// Optional cap on how long gated calls wait for readiness, in
    /// milliseconds. Unset means wait indefinitely.
    #[serde(default)]
    pub connect_timeout_ms: Option<u64>,
    /// Initial reconnect delay in milliseconds
    #[serde(default = "default_backoff_initial_delay_ms")]
    pub backoff_initial_delay_ms: u64,
    /// Maximum reconnect delay in milliseconds
    #[serde(default = "default_backoff_max_delay_ms")]
    pub backoff_max_delay_ms: u64,
}

fn default_url() -> String {
    "ws://localhost:8080/ws".to_string()
}

fn default_heartbeat_interval() -> u64 {
    30 // 30 seconds
}

fn default_backoff_initial_delay_ms() -> u64 {
    100
}

fn default_backoff_max_delay_ms() -> u64 {
    30_000 // 30 seconds
}

impl TransportConfig {
    /// Readiness wait limit for gated calls, if configured.
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    /// Reconnect delay policy derived from the backoff fields.
    pub fn backoff(&self) -> BackoffConfig {
        BackoffConfig {
            initial_delay: Duration::from_millis(self.backoff_initial_delay_ms),
            max_delay: Duration::from_millis(self.backoff_max_delay_ms),
            ..BackoffConfig::default()
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            // Start with default values
            .set_default("transport.url", "ws://localhost:8080/ws")?
            .set_default("transport.heartbeat_interval", 30)?
            .set_default("transport.backoff_initial_delay_ms", 100)?
            .set_default("transport.backoff_max_delay_ms", 30_000)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables
            // TRANSPORT_URL, TRANSPORT_HEARTBEAT_INTERVAL, etc.
            .add_source(
                Environment::default()
                    .separator("_")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            heartbeat_interval: default_heartbeat_interval(),
            connect_timeout_ms: None,
            backoff_initial_delay_ms: default_backoff_initial_delay_ms(),
            backoff_max_delay_ms: default_backoff_max_delay_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let transport = TransportConfig::default();
        assert_eq!(transport.url, "ws://localhost:8080/ws");
        assert_eq!(transport.heartbeat_interval, 30);
        assert!(transport.connect_timeout().is_none());
    }

    #[test]
    fn test_backoff_derived_from_fields() {
        let transport = TransportConfig {
            backoff_initial_delay_ms: 50,
            backoff_max_delay_ms: 1_000,
            ..TransportConfig::default()
        };

        let backoff = transport.backoff();
        assert_eq!(backoff.initial_delay, Duration::from_millis(50));
        assert_eq!(backoff.max_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_connect_timeout_conversion() {
        let transport = TransportConfig {
            connect_timeout_ms: Some(250),
            ..TransportConfig::default()
        };
        assert_eq!(transport.connect_timeout(), Some(Duration::from_millis(250)));
    }
}
