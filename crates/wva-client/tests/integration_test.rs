//! Integration tests for the WVA client.
//!
//! A `TcpListener` on localhost plays the device's event channel and a
//! scripted transport answers the web service calls.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

use wva_client::{
    listener, ConnectionError, ConnectionObserver, ConnectionState, Device, Method, Recovery,
    Request, Response, ResponseKind, Transport, TransportError, WvaError,
};
use wva_core::{AlarmType, DeviceConfig, VehicleResponse};

const WAIT: Duration = Duration::from_secs(3);

/// Answers the vehicle listing and accepts every write.
#[derive(Default)]
struct ScriptedTransport {
    failures: Mutex<HashMap<(Method, String), u16>>,
    requests: Mutex<Vec<Request>>,
}

impl ScriptedTransport {
    fn fail(&self, method: Method, path: &str, status: u16) {
        self.failures.lock().insert((method, path.to_string()), status);
    }

    fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn request(&self, request: Request) -> Result<Response, TransportError> {
        self.requests.lock().push(request.clone());
        if let Some(status) = self.failures.lock().get(&(request.method, request.path.clone())) {
            return Err(TransportError::Status {
                status: *status,
                body: "error".to_string(),
            });
        }

        match (request.method, request.path.as_str(), request.expect) {
            (Method::Get, "vehicle/data/", ResponseKind::Json) => Ok(Response::Json(json!({
                "data": [
                    "vehicle/data/EngineSpeed",
                    "vehicle/data/VehicleSpeed",
                    "vehicle/data/baz"
                ]
            }))),
            (Method::Get, path, _) => Err(TransportError::Status {
                status: 404,
                body: path.to_string(),
            }),
            _ => Ok(Response::Raw(String::new())),
        }
    }
}

/// Counts lifecycle callbacks and reconnects after a short delay.
#[derive(Default)]
struct CountingObserver {
    connected: AtomicUsize,
    remote_closes: AtomicUsize,
    failed: AtomicUsize,
    errors: AtomicUsize,
}

impl ConnectionObserver for CountingObserver {
    fn on_connected(&self) {
        self.connected.fetch_add(1, Ordering::SeqCst);
    }

    fn on_error(&self, _error: &ConnectionError) -> Recovery {
        self.errors.fetch_add(1, Ordering::SeqCst);
        Recovery::Stop
    }

    fn on_remote_close(&self) -> Recovery {
        self.remote_closes.fetch_add(1, Ordering::SeqCst);
        Recovery::ReconnectAfter(Duration::from_millis(100))
    }

    fn on_failed_connection(&self, _error: &ConnectionError) -> Recovery {
        self.failed.fetch_add(1, Ordering::SeqCst);
        Recovery::Stop
    }
}

fn event(kind: &str, endpoint: &str, short_name: &str, value: f64) -> String {
    let mut inner = json!({
        "uri": format!("vehicle/data/{endpoint}"),
        "timestamp": "2024-01-17T10:00:00Z",
        "short_name": short_name,
    });
    inner[endpoint] = json!({"value": value, "timestamp": "2024-01-17T10:00:00.250Z"});
    let mut message = json!({});
    message[kind] = inner;
    format!("{message}\r\n")
}

/// Recording listener: forwards every update to a channel.
fn recorder() -> (wva_client::SharedListener, mpsc::UnboundedReceiver<(String, VehicleResponse)>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let listener = listener(move |endpoint, response| {
        let _ = tx.send((endpoint.to_string(), *response));
    });
    (listener, rx)
}

/// Let in-flight frames settle, then check nothing reached the listener.
async fn assert_no_update(updates: &mut mpsc::UnboundedReceiver<(String, VehicleResponse)>) {
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(updates.try_recv().is_err());
}

async fn device_with_listener() -> (Arc<ScriptedTransport>, Device, TcpListener) {
    let events = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let config = DeviceConfig {
        event_port: events.local_addr().unwrap().port(),
        reconnect_delay_ms: 100,
        ..DeviceConfig::for_host("127.0.0.1")
    };
    let transport = Arc::new(ScriptedTransport::default());
    let device = Device::with_transport(config, transport.clone());
    device.fetch_subscribable().await.unwrap();
    (transport, device, events)
}

async fn accept(events: &TcpListener) -> TcpStream {
    timeout(WAIT, events.accept()).await.expect("no connection").unwrap().0
}

#[tokio::test]
async fn test_subscription_delivered_exactly_once() {
    let (_, device, events) = device_with_listener().await;
    let (listener, mut updates) = recorder();
    device.subscribe("baz", 10, Some(listener)).unwrap().await.unwrap();

    device.connect_data_stream(None, None);
    let mut socket = accept(&events).await;
    socket.write_all(event("data", "baz", "baz~sub", 4.3).as_bytes()).await.unwrap();

    let (endpoint, response) = timeout(WAIT, updates.recv()).await.unwrap().unwrap();
    assert_eq!(endpoint, "baz");
    assert_eq!(response.value, 4.3);
    assert_eq!(device.last_received("baz"), Some(response));
    assert_no_update(&mut updates).await;
}

#[tokio::test]
async fn test_no_delivery_after_unsubscribe() {
    let (_, device, events) = device_with_listener().await;
    let (listener, mut updates) = recorder();
    device.subscribe("EngineSpeed", 1, Some(listener)).unwrap().await.unwrap();
    device.connect_data_stream(None, None);
    let mut socket = accept(&events).await;

    socket
        .write_all(event("data", "EngineSpeed", "EngineSpeed~sub", 1000.0).as_bytes())
        .await
        .unwrap();
    timeout(WAIT, updates.recv()).await.unwrap().unwrap();

    device.unsubscribe("EngineSpeed", true).await.unwrap();
    socket
        .write_all(event("data", "EngineSpeed", "EngineSpeed~sub", 2000.0).as_bytes())
        .await
        .unwrap();

    assert_no_update(&mut updates).await;
    // The value is still cached.
    assert_eq!(device.last_received("EngineSpeed").unwrap().value, 2000.0);
}

#[tokio::test]
async fn test_resubscribe_replaces_listener() {
    let (_, device, events) = device_with_listener().await;
    let (first, mut first_updates) = recorder();
    let (second, mut second_updates) = recorder();
    device.subscribe("VehicleSpeed", 10, Some(first)).unwrap().await.unwrap();
    device.subscribe("VehicleSpeed", 5, Some(second)).unwrap().await.unwrap();
    assert_eq!(device.vehicle().listener_registry().len(), 1);

    device.connect_data_stream(None, None);
    let mut socket = accept(&events).await;
    socket
        .write_all(event("data", "VehicleSpeed", "VehicleSpeed~sub", 88.0).as_bytes())
        .await
        .unwrap();

    assert_eq!(timeout(WAIT, second_updates.recv()).await.unwrap().unwrap().1.value, 88.0);
    assert!(first_updates.try_recv().is_err());
}

#[tokio::test]
async fn test_alarm_routed_by_short_name() {
    let (_, device, events) = device_with_listener().await;
    let (sub, mut sub_updates) = recorder();
    let (alarm, mut alarm_updates) = recorder();
    device.subscribe("EngineSpeed", 10, Some(sub)).unwrap().await.unwrap();
    device
        .add_alarm("EngineSpeed", AlarmType::Above, 0, 4500.0, Some(alarm))
        .unwrap()
        .await
        .unwrap();

    device.connect_data_stream(None, None);
    let mut socket = accept(&events).await;
    socket
        .write_all(event("alarm", "EngineSpeed", "EngineSpeed~above", 4700.0).as_bytes())
        .await
        .unwrap();

    assert_eq!(timeout(WAIT, alarm_updates.recv()).await.unwrap().unwrap().1.value, 4700.0);
    assert_no_update(&mut sub_updates).await;
}

#[tokio::test]
async fn test_split_and_noisy_stream() {
    let (_, device, events) = device_with_listener().await;
    let (listener, mut updates) = recorder();
    device.subscribe("baz", 1, Some(listener)).unwrap().await.unwrap();
    device.connect_data_stream(None, None);
    let mut socket = accept(&events).await;

    let message = event("data", "baz", "baz~sub", 7.0);
    let (head, tail) = message.split_at(message.len() / 2);
    socket.write_all(b"\"tail of an earlier message\"}\r\n").await.unwrap();
    socket.write_all(head.as_bytes()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    socket.write_all(tail.as_bytes()).await.unwrap();
    socket.write_all(b"{\"unrelated\": true}\r\n").await.unwrap();
    socket.write_all(event("data", "baz", "baz~sub", 8.0).as_bytes()).await.unwrap();

    assert_eq!(timeout(WAIT, updates.recv()).await.unwrap().unwrap().1.value, 7.0);
    assert_eq!(timeout(WAIT, updates.recv()).await.unwrap().unwrap().1.value, 8.0);
}

#[tokio::test]
async fn test_unknown_endpoint_rejected_before_any_request() {
    let (transport, device, _events) = device_with_listener().await;
    let before = transport.request_count();

    let err = device.subscribe("Odometer", 10, None).unwrap_err();
    assert!(matches!(err, WvaError::EndpointUnknown(ref name) if name == "Odometer"));
    assert!(device
        .add_alarm("Odometer", AlarmType::Below, 0, 1.0, None)
        .is_err());
    assert_eq!(transport.request_count(), before);
}

#[tokio::test]
async fn test_configuration_failure_reported_through_callback() {
    let (transport, device, _events) = device_with_listener().await;
    transport.fail(Method::Put, "subscriptions/EngineSpeed~sub", 500);
    let (listener, _) = recorder();

    let (tx, rx) = tokio::sync::oneshot::channel();
    device
        .subscribe("EngineSpeed", 10, Some(listener))
        .unwrap()
        .on_complete(move |result| {
            let _ = tx.send(result);
        });

    let result = timeout(WAIT, rx).await.unwrap().unwrap();
    assert!(matches!(result, Err(WvaError::ConfigurationFailed { .. })));
    assert!(device.vehicle().listener_registry().is_empty());
}

#[tokio::test]
async fn test_remove_all_listeners_keeps_cache_and_device_state() {
    let (transport, device, events) = device_with_listener().await;
    let (listener, mut updates) = recorder();
    device.subscribe("baz", 1, Some(listener)).unwrap().await.unwrap();
    device.connect_data_stream(None, None);
    let mut socket = accept(&events).await;
    socket.write_all(event("data", "baz", "baz~sub", 1.5).as_bytes()).await.unwrap();
    timeout(WAIT, updates.recv()).await.unwrap().unwrap();

    let before = transport.request_count();
    device.vehicle().remove_all_listeners();
    assert_eq!(device.last_received("baz").unwrap().value, 1.5);
    assert_eq!(transport.request_count(), before);

    // The device keeps pushing; values are cached but reach no listener.
    socket.write_all(event("data", "baz", "baz~sub", 2.5).as_bytes()).await.unwrap();
    assert_no_update(&mut updates).await;
    assert_eq!(device.last_received("baz").unwrap().value, 2.5);
}

#[tokio::test]
async fn test_remote_close_reconnects_once_per_close() {
    let (_, device, events) = device_with_listener().await;
    let observer = Arc::new(CountingObserver::default());
    device.connect_data_stream(None, Some(observer.clone()));

    let first = accept(&events).await;
    drop(first);
    let second = accept(&events).await;
    assert!(timeout(Duration::from_millis(300), events.accept()).await.is_err());
    assert_eq!(observer.remote_closes.load(Ordering::SeqCst), 1);
    assert_eq!(observer.connected.load(Ordering::SeqCst), 2);

    // Close again with nobody listening: the reconnect fails and is not retried.
    drop(events);
    drop(second);
    let mut state = device.connection_state().unwrap();
    timeout(WAIT, state.wait_for(|s| *s == ConnectionState::Failed))
        .await
        .unwrap()
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(observer.remote_closes.load(Ordering::SeqCst), 2);
    assert_eq!(observer.failed.load(Ordering::SeqCst), 1);
    assert_eq!(observer.errors.load(Ordering::SeqCst), 0);
    assert!(device.is_data_stream_disconnected());
}

#[tokio::test]
async fn test_default_observer_reconnects_after_configured_delay() {
    let events = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let config = DeviceConfig {
        event_port: events.local_addr().unwrap().port(),
        reconnect_delay_ms: 400,
        ..DeviceConfig::for_host("127.0.0.1")
    };
    let device = Device::with_transport(config, Arc::new(ScriptedTransport::default()));
    device.fetch_subscribable().await.unwrap();
    let (listener, mut updates) = recorder();
    device.subscribe("baz", 1, Some(listener)).unwrap().await.unwrap();
    device.connect_data_stream(None, None);

    let first = accept(&events).await;
    let closed_at = tokio::time::Instant::now();
    drop(first);

    assert!(timeout(Duration::from_millis(150), events.accept()).await.is_err());
    let mut second = accept(&events).await;
    assert!(closed_at.elapsed() >= Duration::from_millis(400));
    assert!(timeout(Duration::from_millis(800), events.accept()).await.is_err());

    let mut state = device.connection_state().unwrap();
    timeout(WAIT, state.wait_for(|s| *s == ConnectionState::Connected))
        .await
        .unwrap()
        .unwrap();
    second.write_all(event("data", "baz", "baz~sub", 7.0).as_bytes()).await.unwrap();
    assert_eq!(timeout(WAIT, updates.recv()).await.unwrap().unwrap().1.value, 7.0);
}

#[tokio::test]
async fn test_failed_connection_is_not_retried() {
    let events = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = events.local_addr().unwrap().port();
    drop(events);

    let config = DeviceConfig::for_host("127.0.0.1");
    let device = Device::with_transport(config, Arc::new(ScriptedTransport::default()));
    let observer = Arc::new(CountingObserver::default());
    device.connect_data_stream(Some(port), Some(observer.clone()));

    let mut state = device.connection_state().unwrap();
    timeout(WAIT, state.wait_for(|s| *s == ConnectionState::Failed))
        .await
        .unwrap()
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(observer.failed.load(Ordering::SeqCst), 1);
    assert_eq!(observer.connected.load(Ordering::SeqCst), 0);
    assert_eq!(observer.remote_closes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_disconnect_closes_socket() {
    let (_, device, events) = device_with_listener().await;
    let observer = Arc::new(CountingObserver::default());
    device.connect_data_stream(None, Some(observer.clone()));
    let mut socket = accept(&events).await;
    assert!(!device.is_data_stream_disconnected());

    device.disconnect_data_stream();

    let mut buf = [0u8; 8];
    assert_eq!(timeout(WAIT, socket.read(&mut buf)).await.unwrap().unwrap(), 0);
    assert!(device.is_data_stream_disconnected());
    // A local disconnect does not trigger the reconnect policy.
    assert!(timeout(Duration::from_millis(300), events.accept()).await.is_err());
    assert_eq!(observer.remote_closes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_attach_open_connection() {
    let (_, device, events) = device_with_listener().await;
    let (listener, mut updates) = recorder();
    device.subscribe("baz", 1, Some(listener)).unwrap().await.unwrap();

    let client = TcpStream::connect(events.local_addr().unwrap()).await.unwrap();
    let mut socket = accept(&events).await;
    device.attach_data_stream(client, None);

    socket.write_all(event("data", "baz", "baz~sub", 9.0).as_bytes()).await.unwrap();
    assert_eq!(timeout(WAIT, updates.recv()).await.unwrap().unwrap().1.value, 9.0);
}
