//! Web service message types.
//!
//! This module defines the JSON bodies exchanged with the device's web
//! services:
//! - Requests: subscription, alarm, event channel and CAN bus configuration,
//!   LED state, device time
//! - Responses: resource listings, LED/button state, device time
//!
//! Request bodies are serialized with serde; listings are decoded by
//! [`resource_names`] because their key depends on the resource listed.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use wva_core::path::{last_segment, vehicle_data};
use wva_core::{AlarmConfig, AlarmType, BufferPolicy, SubscriptionConfig};

use crate::event::DecodeError;

// ============================================================================
// Subscriptions and alarms
// ============================================================================

/// Body of `PUT subscriptions/<short name>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    pub subscription: SubscriptionParams,
}

/// Parameters of one subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionParams {
    pub uri: String,
    /// Seconds between updates.
    pub interval: u32,
    pub buffer: BufferPolicy,
}

impl From<&SubscriptionConfig> for SubscriptionRequest {
    fn from(config: &SubscriptionConfig) -> Self {
        Self {
            subscription: SubscriptionParams {
                uri: vehicle_data(&config.endpoint),
                interval: config.interval_seconds,
                buffer: config.buffer,
            },
        }
    }
}

/// Body of `PUT alarms/<short name>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmRequest {
    pub alarm: AlarmParams,
}

/// Parameters of one alarm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmParams {
    pub uri: String,
    #[serde(rename = "type")]
    pub alarm_type: AlarmType,
    pub threshold: f64,
    /// Minimum seconds between two alarms.
    pub interval: u32,
    pub buffer: BufferPolicy,
}

impl From<&AlarmConfig> for AlarmRequest {
    fn from(config: &AlarmConfig) -> Self {
        Self {
            alarm: AlarmParams {
                uri: vehicle_data(&config.endpoint),
                alarm_type: config.alarm_type,
                threshold: config.threshold,
                interval: config.min_interval_seconds,
                buffer: config.buffer,
            },
        }
    }
}

// ============================================================================
// Device configuration
// ============================================================================

/// On/off switch as spelled by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Switch {
    On,
    Off,
}

impl From<bool> for Switch {
    fn from(on: bool) -> Self {
        if on {
            Switch::On
        } else {
            Switch::Off
        }
    }
}

impl From<Switch> for bool {
    fn from(switch: Switch) -> Self {
        switch == Switch::On
    }
}

/// Body of `PUT config/ws_events/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventChannelConfigRequest {
    pub ws_events: EventChannelSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventChannelSettings {
    pub enable: Switch,
    pub port: u16,
}

impl EventChannelConfigRequest {
    pub fn enable(port: u16) -> Self {
        Self {
            ws_events: EventChannelSettings {
                enable: Switch::On,
                port,
            },
        }
    }
}

/// Body of `PUT config/canbus/1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanbusConfigRequest {
    pub canbus: CanbusSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanbusSettings {
    pub enable: Switch,
    /// Baud rate of the CAN interface.
    pub rate: u32,
}

impl CanbusConfigRequest {
    pub fn enable(rate: u32) -> Self {
        Self {
            canbus: CanbusSettings {
                enable: Switch::On,
                rate,
            },
        }
    }
}

// ============================================================================
// Hardware
// ============================================================================

/// LED state, both the `GET hw/leds/<name>` response and the `PUT` body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedState {
    pub led: Switch,
}

/// Button position as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ButtonPosition {
    Up,
    Down,
}

/// Response of `GET hw/buttons/<name>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonState {
    pub button: ButtonPosition,
}

/// Device clock, both the `GET hw/time/` response and the `PUT` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceTime {
    /// ISO 8601 timestamp.
    pub time: String,
}

// ============================================================================
// Listings
// ============================================================================

/// Extract resource names from a listing like `{"data": ["vehicle/data/EngineSpeed", ...]}`.
///
/// Each entry is a URI; the name is its final segment. Non-string entries
/// are skipped.
pub fn resource_names(listing: &Value, key: &str) -> Result<Vec<String>, DecodeError> {
    let uris = listing
        .get(key)
        .ok_or_else(|| DecodeError::MissingField(key.to_string()))?
        .as_array()
        .ok_or_else(|| DecodeError::WrongType {
            field: key.to_string(),
            expected: "an array",
        })?;

    Ok(uris
        .iter()
        .filter_map(Value::as_str)
        .map(|uri| last_segment(uri).to_string())
        .filter(|name| !name.is_empty())
        .collect())
}
