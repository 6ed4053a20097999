//! One WVA device.
//!
//! [`Device`] wires the pieces together: the web service transport, the
//! vehicle/ECU/hardware views that use it, and the event channel plus
//! dispatch task that feed pushed values into the vehicle caches.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tracing::info;

use wva_core::{path, AlarmType, DeviceConfig, VehicleResponse};
use wva_protocol::{CanbusConfigRequest, EventChannelConfigRequest, Frame};

use crate::connection::{
    socket_address, ConnectionObserver, ConnectionState, EventChannel, ReconnectObserver,
};
use crate::dispatch::Dispatcher;
use crate::ecu::Ecu;
use crate::error::WvaError;
use crate::hardware::Hardware;
use crate::listeners::SharedListener;
use crate::pending::Pending;
use crate::transport::{self, Transport};
use crate::vehicle::Vehicle;

/// Event channel and the dispatch task draining it.
struct DataStream {
    channel: EventChannel,
    dispatcher: Dispatcher,
}

impl DataStream {
    fn stop(&self) {
        self.channel.stop();
        self.dispatcher.stop();
    }
}

/// Client for one WVA device.
pub struct Device {
    config: DeviceConfig,
    transport: Arc<dyn Transport>,
    vehicle: Vehicle,
    ecu: Ecu,
    hardware: Hardware,
    stream: Mutex<Option<DataStream>>,
}

impl Device {
    /// Device reached over HTTP(S) as described by `config`.
    #[cfg(feature = "http-transport")]
    pub fn new(config: DeviceConfig) -> Result<Self, crate::transport::TransportError> {
        let transport = Arc::new(crate::transport::HttpTransport::new(&config)?);
        Ok(Self::with_transport(config, transport))
    }

    pub fn with_transport(config: DeviceConfig, transport: Arc<dyn Transport>) -> Self {
        let vehicle = Vehicle::new(transport.clone())
            .with_buffers(config.subscription_buffer, config.alarm_buffer);
        Self {
            ecu: Ecu::new(transport.clone()),
            hardware: Hardware::new(transport.clone()),
            vehicle,
            transport,
            config,
            stream: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn vehicle(&self) -> &Vehicle {
        &self.vehicle
    }

    pub fn ecu(&self) -> &Ecu {
        &self.ecu
    }

    pub fn hardware(&self) -> &Hardware {
        &self.hardware
    }

    /// Open the event channel and start dispatching what arrives on it.
    ///
    /// `port` defaults to the configured event port and `observer` to a
    /// [`ReconnectObserver`] using the configured reconnect delay. Any
    /// stream already open is stopped first. Must be called inside a Tokio
    /// runtime.
    pub fn connect_data_stream(
        &self,
        port: Option<u16>,
        observer: Option<Arc<dyn ConnectionObserver>>,
    ) {
        let addr = socket_address(&self.config.hostname, port.unwrap_or(self.config.event_port));
        info!("Opening event channel to {}", addr);
        self.open_stream(|observer, frames| EventChannel::new(addr, observer, frames), observer);
    }

    /// Use a connection that is already open as the event channel.
    pub fn attach_data_stream(
        &self,
        stream: TcpStream,
        observer: Option<Arc<dyn ConnectionObserver>>,
    ) {
        self.open_stream(
            |observer, frames| EventChannel::from_stream(stream, observer, frames),
            observer,
        );
    }

    fn open_stream<F>(&self, channel: F, observer: Option<Arc<dyn ConnectionObserver>>)
    where
        F: FnOnce(Arc<dyn ConnectionObserver>, mpsc::Sender<Frame>) -> EventChannel,
    {
        let observer: Arc<dyn ConnectionObserver> = match observer {
            Some(observer) => observer,
            None => Arc::new(ReconnectObserver::new(self.config.reconnect_delay())),
        };
        let (frames_tx, frames_rx) = mpsc::channel(self.config.queue_capacity.max(1));

        let mut stream = self.stream.lock();
        if let Some(old) = stream.take() {
            old.stop();
        }

        let dispatcher = Dispatcher::spawn(
            frames_rx,
            self.vehicle.endpoint_registry().clone(),
            self.vehicle.listener_registry().clone(),
        );
        let channel =
            channel(observer, frames_tx).with_max_frame_length(self.config.max_frame_length);
        channel.start();
        *stream = Some(DataStream { channel, dispatcher });
    }

    /// Close the event channel and stop dispatching.
    ///
    /// Subscriptions and alarms stay configured on the device.
    pub fn disconnect_data_stream(&self) {
        if let Some(stream) = self.stream.lock().take() {
            stream.stop();
            info!("Event channel to {} closed", stream.channel.addr());
        }
    }

    /// True when no event channel task is running.
    pub fn is_data_stream_disconnected(&self) -> bool {
        self.stream
            .lock()
            .as_ref()
            .map_or(true, |stream| stream.channel.is_stopped())
    }

    /// Watch the event channel's state, if one was opened.
    pub fn connection_state(&self) -> Option<watch::Receiver<ConnectionState>> {
        self.stream.lock().as_ref().map(|stream| stream.channel.subscribe_state())
    }

    /// Enable the event channel on the device and set its port.
    pub fn configure_port(&self, port: u16) -> Pending<u16> {
        let transport = self.transport.clone();
        Pending::spawn(async move {
            let body = EventChannelConfigRequest::enable(port);
            transport::put(transport.as_ref(), path::WS_EVENTS_CONFIG, &body).await?;
            Ok(port)
        })
    }

    /// Enable the CAN bus interface at the given baud rate.
    pub fn configure_baud_rate(&self, rate: u32) -> Pending<u32> {
        let transport = self.transport.clone();
        Pending::spawn(async move {
            let body = CanbusConfigRequest::enable(rate);
            transport::put(transport.as_ref(), path::CANBUS_CONFIG, &body).await?;
            Ok(rate)
        })
    }

    /// Learn which vehicle endpoints the device has.
    pub fn fetch_subscribable(&self) -> Pending<HashSet<String>> {
        self.vehicle.initialize()
    }

    pub fn subscribe(
        &self,
        endpoint: &str,
        interval_seconds: u32,
        listener: Option<SharedListener>,
    ) -> Result<Pending<()>, WvaError> {
        self.vehicle.subscribe(endpoint, interval_seconds, listener)
    }

    pub fn unsubscribe(&self, endpoint: &str, remove_listener: bool) -> Pending<()> {
        self.vehicle.unsubscribe(endpoint, remove_listener)
    }

    pub fn add_alarm(
        &self,
        endpoint: &str,
        alarm_type: AlarmType,
        min_interval_seconds: u32,
        threshold: f64,
        listener: Option<SharedListener>,
    ) -> Result<Pending<()>, WvaError> {
        self.vehicle
            .create_alarm(endpoint, alarm_type, min_interval_seconds, threshold, listener)
    }

    pub fn remove_alarm(
        &self,
        endpoint: &str,
        alarm_type: AlarmType,
        remove_listener: bool,
    ) -> Pending<()> {
        self.vehicle.delete_alarm(endpoint, alarm_type, remove_listener)
    }

    /// Last value received for an endpoint.
    pub fn last_received(&self, endpoint: &str) -> Option<VehicleResponse> {
        self.vehicle.get_cached(endpoint)
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        if let Some(stream) = self.stream.get_mut().take() {
            stream.stop();
        }
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("hostname", &self.config.hostname)
            .field("vehicle", &self.vehicle)
            .field("connected", &!self.is_data_stream_disconnected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;
    use serde_json::json;

    #[tokio::test]
    async fn test_configure_port_and_baud_rate() {
        let transport = Arc::new(MockTransport::new());
        let device = Device::with_transport(DeviceConfig::for_host("127.0.0.1"), transport.clone());

        assert_eq!(device.configure_port(5001).await.unwrap(), 5001);
        assert_eq!(device.configure_baud_rate(500_000).await.unwrap(), 500_000);

        let requests = transport.requests();
        assert_eq!(requests[0].path, "config/ws_events/");
        assert_eq!(requests[0].body, Some(json!({"ws_events": {"enable": "on", "port": 5001}})));
        assert_eq!(requests[1].path, "config/canbus/1");
        assert_eq!(requests[1].body, Some(json!({"canbus": {"enable": "on", "rate": 500000}})));
    }

    #[tokio::test]
    async fn test_disconnected_until_connected() {
        let config = DeviceConfig::for_host("127.0.0.1");
        let device = Device::with_transport(config, Arc::new(MockTransport::new()));
        assert!(device.is_data_stream_disconnected());
        assert!(device.connection_state().is_none());
        device.disconnect_data_stream();
        assert!(device.is_data_stream_disconnected());
    }

    #[tokio::test]
    async fn test_buffers_follow_config() {
        let transport = Arc::new(MockTransport::new());
        transport.on_get("vehicle/data/", json!({"data": ["vehicle/data/EngineSpeed"]}));
        let config = DeviceConfig {
            subscription_buffer: wva_core::BufferPolicy::Discard,
            ..DeviceConfig::for_host("127.0.0.1")
        };
        let device = Device::with_transport(config, transport.clone());

        device.fetch_subscribable().await.unwrap();
        device.subscribe("EngineSpeed", 1, None).unwrap().await.unwrap();
        let request = transport.requests().pop().unwrap();
        assert_eq!(request.body.unwrap()["subscription"]["buffer"], "discard");
    }
}
