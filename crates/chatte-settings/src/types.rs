//! Settings types.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatSettings {
    /// HTTP / WebSocket listener.
    pub server: ServerSettings,
    /// Routing hub and liveness policy.
    pub hub: HubSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl ChatSettings {
    /// Reject values the server cannot run with.
    ///
    /// A sweep interval longer than half the inactivity timeout is allowed but
    /// logged, since it stretches the worst-case detection latency.
    pub fn validate(&self) -> Result<()> {
        let hub = &self.hub;
        if hub.inbound_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "hub.inboundCapacity must be > 0".into(),
            ));
        }
        if hub.sweep_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "hub.sweepIntervalMs must be > 0".into(),
            ));
        }
        if hub.inactivity_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "hub.inactivityTimeoutMs must be > 0".into(),
            ));
        }
        if hub.dispatch_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "hub.dispatchTimeoutMs must be > 0".into(),
            ));
        }
        if self.server.max_connections == 0 {
            return Err(SettingsError::InvalidValue(
                "server.maxConnections must be > 0".into(),
            ));
        }
        if hub.sweep_interval_ms > hub.inactivity_timeout_ms / 2 {
            tracing::warn!(
                sweep_interval_ms = hub.sweep_interval_ms,
                inactivity_timeout_ms = hub.inactivity_timeout_ms,
                "sweep interval exceeds half the inactivity timeout"
            );
        }
        Ok(())
    }
}

/// Listener settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` picks a free port).
    pub port: u16,
    /// Maximum concurrently registered connections.
    pub max_connections: usize,
    /// Largest accepted inbound WebSocket message in bytes.
    pub max_message_size: usize,
    /// Origins allowed to open `/websock`. Empty accepts any origin.
    pub allowed_origins: Vec<String>,
    /// Directory of static assets served for non-API paths.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub static_dir: Option<PathBuf>,
    /// How long shutdown waits for tasks before giving up, in milliseconds.
    pub shutdown_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_connections: 1024,
            max_message_size: 64 * 1024,
            allowed_origins: Vec::new(),
            static_dir: None,
            shutdown_timeout_ms: 10_000,
        }
    }
}

impl ServerSettings {
    /// `host:port` string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Shutdown drain timeout.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Routing hub settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HubSettings {
    /// Capacity of the shared inbound channel. Readers wait when it is full.
    pub inbound_capacity: usize,
    /// Time without a decoded inbound message before a connection is stopped.
    pub inactivity_timeout_ms: u64,
    /// Interval between registry sweeps.
    pub sweep_interval_ms: u64,
    /// Upper bound on a single mailbox hand-off.
    pub dispatch_timeout_ms: u64,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            inbound_capacity: 10,
            inactivity_timeout_ms: 200_000,
            sweep_interval_ms: 100_000,
            dispatch_timeout_ms: 5_000,
        }
    }
}

impl HubSettings {
    /// Inactivity threshold.
    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_millis(self.inactivity_timeout_ms)
    }

    /// Sweep interval.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Mailbox hand-off bound.
    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset (e.g. `info`,
    /// `chatte_server=debug`).
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}
