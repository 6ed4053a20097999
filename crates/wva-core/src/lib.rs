//! # wva-core
//!
//! Core data model and endpoint cache for a WVA telemetry device.
//!
//! This crate provides:
//! - Data model types (VehicleResponse, Event, AlarmType, subscription and alarm configs)
//! - URI helpers for device resources
//! - The endpoint registry holding the last value of every known endpoint
//! - Client configuration
//!
//! This crate is runtime-agnostic and contains no async code.

pub mod config;
pub mod model;
pub mod path;
pub mod store;

pub use config::{ConfigError, DeviceConfig};
pub use model::*;
pub use store::EndpointRegistry;
