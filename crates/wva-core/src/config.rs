//! Client configuration.
//!
//! A [`DeviceConfig`] describes one WVA device: where to reach its web
//! services and event channel, and how the client buffers and recovers the
//! event stream. It is usually read from a JSON file; every field has a
//! default so a file only needs to name what differs.

use crate::model::BufferPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Errors that can occur while loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// The configuration file was not found.
    NotFound(String),
    /// Failed to read the configuration file.
    ReadError(String),
    /// Configuration data is invalid.
    InvalidData(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NotFound(path) => write!(f, "Configuration not found: {}", path),
            ConfigError::ReadError(msg) => write!(f, "Read error: {}", msg),
            ConfigError::InvalidData(msg) => write!(f, "Invalid data: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Default event channel port.
pub const DEFAULT_EVENT_PORT: u16 = 5000;
/// Default delay before reconnecting after the device closed the event channel.
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 15_000;
/// Default capacity of the queue between the socket reader and the dispatcher.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;
/// Default length at which an unterminated frame is discarded.
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 500;

/// Settings for one WVA device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceConfig {
    /// Device host name or IP address.
    pub hostname: String,

    /// TCP port of the event channel.
    pub event_port: u16,

    /// Use HTTPS for web service calls.
    pub use_https: bool,

    /// Accept self-signed certificates (devices ship with one).
    pub accept_invalid_certs: bool,

    /// Basic auth user name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Basic auth password (never serialized back out).
    #[serde(skip_serializing)]
    pub password: Option<String>,

    /// Delay before reconnecting after a remote close, in milliseconds.
    pub reconnect_delay_ms: u64,

    /// Frames buffered between the reader and the dispatcher.
    pub queue_capacity: usize,

    /// Unterminated frames longer than this are discarded.
    pub max_frame_length: usize,

    /// Buffer policy requested for new subscriptions.
    pub subscription_buffer: BufferPolicy,

    /// Buffer policy requested for new alarms.
    pub alarm_buffer: BufferPolicy,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            hostname: "localhost".to_string(),
            event_port: DEFAULT_EVENT_PORT,
            use_https: false,
            accept_invalid_certs: true,
            username: None,
            password: None,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            subscription_buffer: BufferPolicy::Queue,
            alarm_buffer: BufferPolicy::Queue,
        }
    }
}

impl DeviceConfig {
    /// Configuration for a host with every other setting defaulted.
    pub fn for_host(hostname: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            ..Default::default()
        }
    }

    /// Parse configuration from a JSON document.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| ConfigError::InvalidData(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::NotFound(path.display().to_string()),
            _ => ConfigError::ReadError(e.to_string()),
        })?;
        Self::from_json(&text)
    }

    /// Reject settings the client cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hostname.is_empty() {
            return Err(ConfigError::InvalidData("hostname must not be empty".into()));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidData("queueCapacity must be at least 1".into()));
        }
        if self.max_frame_length == 0 {
            return Err(ConfigError::InvalidData("maxFrameLength must be at least 1".into()));
        }
        Ok(())
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}
