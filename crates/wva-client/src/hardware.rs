//! Device hardware: LEDs, buttons and the clock.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use wva_core::{format_timestamp, parse_timestamp, path};
use wva_protocol::{resource_names, ButtonPosition, ButtonState, DeviceTime, LedState};

use crate::error::WvaError;
use crate::pending::Pending;
use crate::transport::{self, Transport};

#[derive(Clone)]
pub struct Hardware {
    transport: Arc<dyn Transport>,
    leds: Arc<RwLock<HashSet<String>>>,
    buttons: Arc<RwLock<HashSet<String>>>,
}

impl Hardware {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            leds: Arc::default(),
            buttons: Arc::default(),
        }
    }

    /// Learn the LED names.
    pub fn initialize_leds(&self) -> Pending<HashSet<String>> {
        self.initialize_names(path::LED_BASE, "leds", self.leds.clone())
    }

    /// Learn the button names.
    pub fn initialize_buttons(&self) -> Pending<HashSet<String>> {
        self.initialize_names(path::BUTTON_BASE, "buttons", self.buttons.clone())
    }

    pub fn led_names(&self) -> HashSet<String> {
        self.leds.read().clone()
    }

    pub fn button_names(&self) -> HashSet<String> {
        self.buttons.read().clone()
    }

    /// Whether an LED is lit.
    pub fn led_state(&self, name: &str) -> Result<Pending<bool>, WvaError> {
        check(&self.leds, name)?;

        let transport = self.transport.clone();
        let resource = path::led(name);
        Ok(Pending::spawn(async move {
            let body = transport::get_json(transport.as_ref(), &resource).await?;
            let state: LedState =
                serde_json::from_value(body).map_err(|e| WvaError::unexpected(&resource, e))?;
            Ok(state.led.into())
        }))
    }

    /// Switch an LED on or off. Resolves with the state that was set.
    pub fn set_led(&self, name: &str, on: bool) -> Result<Pending<bool>, WvaError> {
        check(&self.leds, name)?;

        let transport = self.transport.clone();
        let resource = path::led(name);
        Ok(Pending::spawn(async move {
            transport::put(transport.as_ref(), &resource, &LedState { led: on.into() }).await?;
            Ok(on)
        }))
    }

    /// Whether a button is held down.
    pub fn button_pressed(&self, name: &str) -> Result<Pending<bool>, WvaError> {
        check(&self.buttons, name)?;

        let transport = self.transport.clone();
        let resource = path::button(name);
        Ok(Pending::spawn(async move {
            let body = transport::get_json(transport.as_ref(), &resource).await?;
            let state: ButtonState =
                serde_json::from_value(body).map_err(|e| WvaError::unexpected(&resource, e))?;
            Ok(state.button == ButtonPosition::Down)
        }))
    }

    /// The device clock.
    pub fn time(&self) -> Pending<DateTime<Utc>> {
        let transport = self.transport.clone();
        Pending::spawn(async move {
            let body = transport::get_json(transport.as_ref(), path::TIME_BASE).await?;
            let time: DeviceTime =
                serde_json::from_value(body).map_err(|e| WvaError::unexpected(path::TIME_BASE, e))?;
            parse_timestamp(&time.time).ok_or_else(|| {
                WvaError::unexpected(path::TIME_BASE, format!("bad time '{}'", time.time))
            })
        })
    }

    /// Set the device clock, to the second. Resolves with the time sent.
    pub fn set_time(&self, time: DateTime<Utc>) -> Pending<DateTime<Utc>> {
        let transport = self.transport.clone();
        Pending::spawn(async move {
            let body = DeviceTime {
                time: format_timestamp(&time),
            };
            transport::put(transport.as_ref(), path::TIME_BASE, &body).await?;
            Ok(time)
        })
    }

    fn initialize_names(
        &self,
        resource: &'static str,
        key: &'static str,
        names: Arc<RwLock<HashSet<String>>>,
    ) -> Pending<HashSet<String>> {
        let transport = self.transport.clone();
        Pending::spawn(async move {
            let listing = transport::get_json(transport.as_ref(), resource).await?;
            let fresh: HashSet<String> = resource_names(&listing, key)
                .map_err(|e| WvaError::unexpected(resource, e))?
                .into_iter()
                .collect();
            *names.write() = fresh.clone();
            Ok(fresh)
        })
    }
}

fn check(names: &RwLock<HashSet<String>>, name: &str) -> Result<(), WvaError> {
    if names.read().contains(name) {
        Ok(())
    } else {
        Err(WvaError::EndpointUnknown(name.to_string()))
    }
}
