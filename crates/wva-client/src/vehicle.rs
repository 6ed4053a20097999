//! Vehicle data: endpoints, subscriptions and alarms.
//!
//! [`Vehicle`] keeps the endpoint cache and the listener registry the
//! dispatch task works with, and configures subscriptions and alarms on the
//! device. Operations check the endpoint name before anything is sent; a
//! name the device never advertised fails immediately with
//! [`WvaError::EndpointUnknown`]. The request itself runs in the background
//! and reports through the returned [`Pending`] handle.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};

use wva_core::{
    alarm_short_name, path, subscription_short_name, AlarmConfig, AlarmType, BufferPolicy,
    EndpointRegistry, SubscriptionConfig, VehicleResponse,
};
use wva_protocol::{decode_vehicle_response, resource_names, AlarmRequest, SubscriptionRequest};

use crate::dispatch;
use crate::error::WvaError;
use crate::listeners::{ListenerRegistry, SharedListener};
use crate::pending::Pending;
use crate::transport::{self, Transport};

/// Subscription and alarm manager for one device.
///
/// Cheap to clone; clones share the caches.
#[derive(Clone)]
pub struct Vehicle {
    transport: Arc<dyn Transport>,
    endpoints: Arc<EndpointRegistry>,
    listeners: Arc<ListenerRegistry>,
    subscription_buffer: BufferPolicy,
    alarm_buffer: BufferPolicy,
}

impl Vehicle {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            endpoints: Arc::new(EndpointRegistry::new()),
            listeners: Arc::new(ListenerRegistry::new()),
            subscription_buffer: BufferPolicy::default(),
            alarm_buffer: BufferPolicy::default(),
        }
    }

    /// Buffer policies sent with new subscriptions and alarms.
    pub fn with_buffers(mut self, subscription: BufferPolicy, alarm: BufferPolicy) -> Self {
        self.subscription_buffer = subscription;
        self.alarm_buffer = alarm;
        self
    }

    pub fn endpoint_registry(&self) -> &Arc<EndpointRegistry> {
        &self.endpoints
    }

    pub fn listener_registry(&self) -> &Arc<ListenerRegistry> {
        &self.listeners
    }

    /// Ask the device which endpoints it has and replace the cache with them.
    ///
    /// Every cached value is reset.
    pub fn initialize(&self) -> Pending<HashSet<String>> {
        let transport = self.transport.clone();
        let endpoints = self.endpoints.clone();

        Pending::spawn(async move {
            let listing = transport::get_json(transport.as_ref(), path::VEHICLE_BASE).await?;
            let names = resource_names(&listing, "data")
                .map_err(|e| WvaError::unexpected(path::VEHICLE_BASE, e))?;

            endpoints.initialize(names.iter().cloned());
            info!("Device advertises {} vehicle endpoints", endpoints.len());
            Ok(names.into_iter().collect())
        })
    }

    /// Snapshot of the known endpoint names.
    pub fn endpoints(&self) -> HashSet<String> {
        self.endpoints.endpoints()
    }

    pub fn is_known(&self, endpoint: &str) -> bool {
        self.endpoints.contains(endpoint)
    }

    fn check_endpoint(&self, endpoint: &str) -> Result<(), WvaError> {
        if self.endpoints.contains(endpoint) {
            Ok(())
        } else {
            Err(WvaError::EndpointUnknown(endpoint.to_string()))
        }
    }

    /// Last value received for an endpoint.
    pub fn get_cached(&self, endpoint: &str) -> Option<VehicleResponse> {
        self.endpoints.get(endpoint)
    }

    /// Store a value as if the device had pushed it and notify the
    /// endpoint's subscription listener.
    ///
    /// Returns false, changing nothing, if the endpoint is unknown.
    pub fn update_cached(&self, endpoint: &str, response: VehicleResponse) -> bool {
        if !self.endpoints.update(endpoint, response) {
            return false;
        }
        dispatch::notify(&self.listeners, &subscription_short_name(endpoint), endpoint, &response);
        true
    }

    /// Read an endpoint's current value from the device and cache it.
    pub fn fetch_new(&self, endpoint: &str) -> Result<Pending<VehicleResponse>, WvaError> {
        self.check_endpoint(endpoint)?;

        let transport = self.transport.clone();
        let endpoints = self.endpoints.clone();
        let endpoint = endpoint.to_string();
        Ok(Pending::spawn(async move {
            let resource = path::vehicle_data(&endpoint);
            let body = transport::get_json(transport.as_ref(), &resource).await?;
            let value = body
                .get(&endpoint)
                .ok_or_else(|| WvaError::unexpected(&resource, format!("missing '{}'", endpoint)))?;
            let response =
                decode_vehicle_response(value).map_err(|e| WvaError::unexpected(&resource, e))?;

            endpoints.update(&endpoint, response);
            Ok(response)
        }))
    }

    /// Subscribe to periodic updates of an endpoint.
    ///
    /// Once the device accepts, `listener` is registered under
    /// `<endpoint>~sub`, replacing any previous one. Subscribing again
    /// replaces the subscription on the device.
    pub fn subscribe(
        &self,
        endpoint: &str,
        interval_seconds: u32,
        listener: Option<SharedListener>,
    ) -> Result<Pending<()>, WvaError> {
        let config = SubscriptionConfig::new(endpoint, interval_seconds)
            .with_buffer(self.subscription_buffer);
        self.subscribe_with(config, listener)
    }

    pub fn subscribe_with(
        &self,
        config: SubscriptionConfig,
        listener: Option<SharedListener>,
    ) -> Result<Pending<()>, WvaError> {
        self.check_endpoint(&config.endpoint)?;

        let transport = self.transport.clone();
        let listeners = self.listeners.clone();
        Ok(Pending::spawn(async move {
            let short_name = config.short_name();
            let resource = path::subscription(&short_name);
            let body = SubscriptionRequest::from(&config);
            transport::put(transport.as_ref(), &resource, &body).await?;

            debug!("Subscribed to {} every {}s", config.endpoint, config.interval_seconds);
            if let Some(listener) = listener {
                listeners.insert(short_name, listener);
            }
            Ok(())
        }))
    }

    /// Delete the subscription for an endpoint, and its listener if
    /// `remove_listener` is set.
    ///
    /// The listener is only removed once the device accepts the delete.
    pub fn unsubscribe(&self, endpoint: &str, remove_listener: bool) -> Pending<()> {
        let short_name = subscription_short_name(endpoint);
        self.delete_registration(short_name, path::subscription, remove_listener)
    }

    /// Create an alarm on an endpoint.
    ///
    /// Once the device accepts, `listener` is registered under
    /// `<endpoint>~<type>`, replacing any previous one.
    pub fn create_alarm(
        &self,
        endpoint: &str,
        alarm_type: AlarmType,
        min_interval_seconds: u32,
        threshold: f64,
        listener: Option<SharedListener>,
    ) -> Result<Pending<()>, WvaError> {
        let config = AlarmConfig::new(endpoint, alarm_type, threshold, min_interval_seconds)
            .with_buffer(self.alarm_buffer);
        self.create_alarm_with(config, listener)
    }

    pub fn create_alarm_with(
        &self,
        config: AlarmConfig,
        listener: Option<SharedListener>,
    ) -> Result<Pending<()>, WvaError> {
        self.check_endpoint(&config.endpoint)?;

        let transport = self.transport.clone();
        let listeners = self.listeners.clone();
        Ok(Pending::spawn(async move {
            let short_name = config.short_name();
            let resource = path::alarm(&short_name);
            transport::put(transport.as_ref(), &resource, &AlarmRequest::from(&config)).await?;

            debug!(
                "Alarm {} {} {} set on {}",
                short_name, config.alarm_type, config.threshold, config.endpoint
            );
            if let Some(listener) = listener {
                listeners.insert(short_name, listener);
            }
            Ok(())
        }))
    }

    /// Delete an alarm, and its listener if `remove_listener` is set.
    pub fn delete_alarm(
        &self,
        endpoint: &str,
        alarm_type: AlarmType,
        remove_listener: bool,
    ) -> Pending<()> {
        let short_name = alarm_short_name(endpoint, alarm_type);
        self.delete_registration(short_name, path::alarm, remove_listener)
    }

    /// Forget every listener.
    ///
    /// Subscriptions and alarms stay configured on the device and keep
    /// updating the endpoint cache; their values just reach nobody.
    pub fn remove_all_listeners(&self) {
        self.listeners.clear();
    }

    fn delete_registration(
        &self,
        short_name: String,
        resource: fn(&str) -> String,
        remove_listener: bool,
    ) -> Pending<()> {
        let transport = self.transport.clone();
        let listeners = self.listeners.clone();

        Pending::spawn(async move {
            transport::delete(transport.as_ref(), &resource(&short_name)).await?;
            debug!("Deleted {}", short_name);
            if remove_listener {
                listeners.remove(&short_name);
            }
            Ok(())
        })
    }
}

impl std::fmt::Debug for Vehicle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vehicle")
            .field("endpoints", &self.endpoints.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
