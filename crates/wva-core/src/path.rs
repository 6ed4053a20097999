//! Device resource paths.
//!
//! WVA web service resources are slash-separated paths relative to the
//! `/ws/` root, like "vehicle/data/EngineSpeed". Listings returned by the
//! device contain full URIs whose final segment is the resource name.

/// Vehicle data endpoints.
pub const VEHICLE_BASE: &str = "vehicle/data/";
/// Engine control units.
pub const ECU_BASE: &str = "vehicle/ecus/";
/// Server-side subscriptions.
pub const SUBSCRIPTION_BASE: &str = "subscriptions/";
/// Server-side alarms.
pub const ALARM_BASE: &str = "alarms/";
/// Device LEDs.
pub const LED_BASE: &str = "hw/leds/";
/// Device buttons.
pub const BUTTON_BASE: &str = "hw/buttons/";
/// Device clock.
pub const TIME_BASE: &str = "hw/time/";
/// Event channel configuration.
pub const WS_EVENTS_CONFIG: &str = "config/ws_events/";
/// CAN bus interface configuration.
pub const CANBUS_CONFIG: &str = "config/canbus/1";

/// Return the final segment of a URI ("/ws/vehicle/data/EngineSpeed" -> "EngineSpeed").
///
/// A URI without any '/' is returned whole.
pub fn last_segment(uri: &str) -> &str {
    match uri.rfind('/') {
        Some(i) => &uri[i + 1..],
        None => uri,
    }
}

/// Resource path of a vehicle data endpoint.
pub fn vehicle_data(endpoint: &str) -> String {
    format!("{VEHICLE_BASE}{endpoint}")
}

/// Resource path of a subscription.
pub fn subscription(short_name: &str) -> String {
    format!("{SUBSCRIPTION_BASE}{short_name}")
}

/// Resource path of an alarm.
pub fn alarm(short_name: &str) -> String {
    format!("{ALARM_BASE}{short_name}")
}

/// Resource path of an ECU, or of one of its endpoints.
pub fn ecu(name: &str, endpoint: Option<&str>) -> String {
    match endpoint {
        Some(endpoint) => format!("{ECU_BASE}{name}/{endpoint}"),
        None => format!("{ECU_BASE}{name}"),
    }
}

/// Resource path of an LED.
pub fn led(name: &str) -> String {
    format!("{LED_BASE}{name}")
}

/// Resource path of a button.
pub fn button(name: &str) -> String {
    format!("{BUTTON_BASE}{name}")
}
