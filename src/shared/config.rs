use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::connection::Endpoint;
use crate::errors::{AppError, AppResult};

/// Main configuration structure for live-toasts
///
/// Contains the live connection settings, the notification queue policy and
/// logging options.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Live connection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionConfig {
    pub url: String,
    #[serde(default = "default_protocols")]
    pub protocols: Vec<String>,
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
    #[serde(default = "default_reconnect_multiplier")]
    pub reconnect_multiplier: f64,
    #[serde(default = "default_reconnect_jitter")]
    pub reconnect_jitter: f64,
    /// Absent means retry forever
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_reconnect_attempts: Option<u32>,
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
}

/// Notification queue policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueConfig {
    #[serde(default = "default_max_active")]
    pub max_active: usize,
    #[serde(default = "default_ttl_ms")]
    pub default_ttl_ms: u64,
    /// Absent means error notifications stay until dismissed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_ttl_ms: Option<u64>,
    #[serde(default = "default_dedupe_active")]
    pub dedupe_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

fn default_protocols() -> Vec<String> {
    vec!["toasts.v1".to_string()]
}

fn default_reconnect_base_delay_ms() -> u64 {
    500
}

fn default_reconnect_max_delay_ms() -> u64 {
    30_000
}

fn default_reconnect_multiplier() -> f64 {
    2.0
}

fn default_reconnect_jitter() -> f64 {
    0.1
}

fn default_max_frame_bytes() -> usize {
    1024 * 1024
}

fn default_handshake_timeout_ms() -> u64 {
    5_000
}

fn default_max_active() -> usize {
    5
}

fn default_ttl_ms() -> u64 {
    5_000
}

fn default_dedupe_active() -> bool {
    true
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: "tcp://127.0.0.1:7878".to_string(),
            protocols: default_protocols(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            reconnect_multiplier: default_reconnect_multiplier(),
            reconnect_jitter: default_reconnect_jitter(),
            max_reconnect_attempts: None,
            max_frame_bytes: default_max_frame_bytes(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_active: default_max_active(),
            default_ttl_ms: default_ttl_ms(),
            error_ttl_ms: None,
            dedupe_active: default_dedupe_active(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl QueueConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    pub fn error_ttl(&self) -> Option<Duration> {
        self.error_ttl_ms.map(Duration::from_millis)
    }
}

impl ConnectionConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

impl Config {
    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> AppResult<()> {
        let conn = &self.connection;
        Endpoint::parse(&conn.url)?;
        if conn.reconnect_base_delay_ms == 0 {
            return Err(AppError::invalid_value("connection.reconnect_base_delay_ms", 0));
        }
        if conn.reconnect_base_delay_ms > conn.reconnect_max_delay_ms {
            return Err(AppError::invalid_value(
                "connection.reconnect_max_delay_ms",
                format!(
                    "{} is below reconnect_base_delay_ms ({})",
                    conn.reconnect_max_delay_ms, conn.reconnect_base_delay_ms
                ),
            ));
        }
        if conn.reconnect_multiplier < 1.0 {
            return Err(AppError::invalid_value(
                "connection.reconnect_multiplier",
                conn.reconnect_multiplier,
            ));
        }
        if !(0.0..=1.0).contains(&conn.reconnect_jitter) {
            return Err(AppError::invalid_value("connection.reconnect_jitter", conn.reconnect_jitter));
        }
        if conn.max_frame_bytes == 0 {
            return Err(AppError::invalid_value("connection.max_frame_bytes", 0));
        }
        if self.queue.max_active == 0 {
            return Err(AppError::invalid_value("queue.max_active", 0));
        }
        Ok(())
    }
}
