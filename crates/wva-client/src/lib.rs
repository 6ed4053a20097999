//! Tokio client for WVA vehicle telematics devices.
//!
//! A WVA device exposes vehicle data two ways: web services for
//! configuration and ad-hoc reads, and a TCP event channel on which it
//! pushes the values of every subscription and alarm. This crate provides:
//! - [`EventChannel`]: the event channel connection and its reconnect policy
//! - [`Dispatcher`]: routes pushed values to the endpoint cache and listeners
//! - [`Vehicle`], [`Ecu`], [`Hardware`]: web service operations
//! - [`Device`]: all of the above for one device
//!
//! ```no_run
//! use wva_client::{listener, Device};
//! use wva_core::DeviceConfig;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let device = Device::new(DeviceConfig::for_host("192.168.100.1"))?;
//! device.fetch_subscribable().await?;
//! device.connect_data_stream(None, None);
//! device
//!     .subscribe("EngineSpeed", 10, Some(listener(|endpoint, response| {
//!         println!("{endpoint} = {}", response.value);
//!     })))?
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod device;
pub mod dispatch;
pub mod ecu;
pub mod error;
pub mod hardware;
pub mod listeners;
pub mod pending;
pub mod transport;
pub mod vehicle;

pub use connection::{
    ConnectionError, ConnectionObserver, ConnectionState, EventChannel, ReconnectObserver, Recovery,
};
pub use device::Device;
pub use dispatch::{Dispatched, Dispatcher};
pub use ecu::Ecu;
pub use error::WvaError;
pub use hardware::Hardware;
pub use listeners::{listener, ListenerRegistry, SharedListener, VehicleListener};
pub use pending::Pending;
pub use transport::{Method, Request, Response, ResponseKind, Transport, TransportError};
pub use vehicle::Vehicle;

#[cfg(feature = "http-transport")]
pub use transport::HttpTransport;
