//! WVA data model types.
//!
//! These types represent the values exchanged with a WVA device:
//! - Vehicle responses (a value and the time the device sampled it)
//! - Events pushed over the event channel for subscriptions and alarms
//! - Subscription and alarm configurations sent to the device

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Suffix appended to an endpoint name to form its subscription short name.
pub const SUBSCRIPTION_SUFFIX: &str = "~sub";

/// A single sampled value of a vehicle endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleResponse {
    /// The sampled value
    pub value: f64,

    /// When the device sampled the value (UTC)
    pub time: DateTime<Utc>,
}

impl VehicleResponse {
    pub fn new(value: f64, time: DateTime<Utc>) -> Self {
        Self { value, time }
    }
}

/// Parse an ISO 8601 timestamp as sent by the device.
///
/// Real devices send timestamps without fractional seconds, simulators
/// usually include milliseconds. Both forms are accepted, with or without
/// an explicit offset (a missing offset is read as UTC).
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(time) = DateTime::parse_from_rfc3339(text) {
        return Some(time.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Format a timestamp the way the device expects it (second precision, `Z`).
pub fn format_timestamp(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Which kind of registration produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Subscription,
    Alarm,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Subscription => "subscription",
            EventKind::Alarm => "alarm",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded message from the event channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Subscription or alarm
    pub kind: EventKind,

    /// Endpoint name (final segment of the event URI)
    pub endpoint: String,

    /// Server-visible name of the subscription or alarm that fired
    pub short_name: String,

    /// When the device emitted the event
    pub sent_at: DateTime<Utc>,

    /// The endpoint value carried by the event
    pub response: VehicleResponse,
}

/// Condition under which an alarm fires.
///
/// - `Above`: the value rises above the threshold (e.g. engine speed over 4500)
/// - `Below`: the value falls below the threshold
/// - `Change`: the value changes at all (e.g. a gear change)
/// - `Delta`: the value moves by more than the threshold between readings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlarmType {
    Above,
    Below,
    Change,
    Delta,
}

impl AlarmType {
    pub const ALL: [AlarmType; 4] = [
        AlarmType::Above,
        AlarmType::Below,
        AlarmType::Change,
        AlarmType::Delta,
    ];

    /// The string used by the device web services for this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            AlarmType::Above => "above",
            AlarmType::Below => "below",
            AlarmType::Change => "change",
            AlarmType::Delta => "delta",
        }
    }
}

impl fmt::Display for AlarmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string names no alarm type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownAlarmType(pub String);

impl fmt::Display for UnknownAlarmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown alarm type: {}", self.0)
    }
}

impl std::error::Error for UnknownAlarmType {}

impl FromStr for AlarmType {
    type Err = UnknownAlarmType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AlarmType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownAlarmType(s.to_string()))
    }
}

/// What the device does with events while the event channel is down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BufferPolicy {
    /// Queue events and deliver them once a client reconnects.
    #[default]
    Queue,
    /// Drop events nobody is connected to receive.
    Discard,
}

impl BufferPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            BufferPolicy::Queue => "queue",
            BufferPolicy::Discard => "discard",
        }
    }
}

/// Short name of the subscription for an endpoint.
pub fn subscription_short_name(endpoint: &str) -> String {
    format!("{endpoint}{SUBSCRIPTION_SUFFIX}")
}

/// Short name of an alarm of the given type on an endpoint.
pub fn alarm_short_name(endpoint: &str, alarm_type: AlarmType) -> String {
    format!("{endpoint}~{}", alarm_type.as_str())
}

/// Periodic subscription to one endpoint.
///
/// The device holds at most one subscription per endpoint; sending a new one
/// under the same short name replaces the old one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionConfig {
    pub endpoint: String,
    pub interval_seconds: u32,
    pub buffer: BufferPolicy,
}

impl SubscriptionConfig {
    pub fn new(endpoint: &str, interval_seconds: u32) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            interval_seconds,
            buffer: BufferPolicy::default(),
        }
    }

    pub fn with_buffer(mut self, buffer: BufferPolicy) -> Self {
        self.buffer = buffer;
        self
    }

    pub fn short_name(&self) -> String {
        subscription_short_name(&self.endpoint)
    }
}

/// Conditional alarm on one endpoint. At most one per `(endpoint, type)`.
#[derive(Debug, Clone, PartialEq)]
pub struct AlarmConfig {
    pub endpoint: String,
    pub alarm_type: AlarmType,
    /// Meaning depends on `alarm_type`; ignored by `Change`.
    pub threshold: f64,
    /// Minimum number of seconds between two alarms of this type.
    pub min_interval_seconds: u32,
    pub buffer: BufferPolicy,
}

impl AlarmConfig {
    pub fn new(
        endpoint: &str,
        alarm_type: AlarmType,
        threshold: f64,
        min_interval_seconds: u32,
    ) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            alarm_type,
            threshold,
            min_interval_seconds,
            buffer: BufferPolicy::default(),
        }
    }

    pub fn with_buffer(mut self, buffer: BufferPolicy) -> Self {
        self.buffer = buffer;
        self
    }

    pub fn short_name(&self) -> String {
        alarm_short_name(&self.endpoint, self.alarm_type)
    }
}
