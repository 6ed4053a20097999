//! Endpoint registry.
//!
//! The registry is the authoritative set of endpoint names the device
//! advertised, together with the last value received for each of them.
//! Endpoints must be declared by [`EndpointRegistry::initialize`] before they
//! can be updated; updates for unknown names are rejected.

use crate::model::VehicleResponse;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

/// Thread-safe cache of known endpoints and their last values.
///
/// All methods take `&self`; share it behind an `Arc` between the dispatch
/// task and callers.
#[derive(Debug, Default)]
pub struct EndpointRegistry {
    /// Endpoint name -> last received value (None until the first update)
    endpoints: RwLock<HashMap<String, Option<VehicleResponse>>>,
}

impl EndpointRegistry {
    /// Create an empty registry. Nothing can be updated until it is initialized.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the set of known endpoints. Every cached value is reset.
    pub fn initialize<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fresh: HashMap<String, Option<VehicleResponse>> =
            names.into_iter().map(|name| (name.into(), None)).collect();
        *self.endpoints.write() = fresh;
    }

    /// Check whether an endpoint is known.
    pub fn contains(&self, name: &str) -> bool {
        self.endpoints.read().contains_key(name)
    }

    /// Store a new value for a known endpoint.
    ///
    /// Returns false, without inserting anything, if the endpoint is unknown.
    pub fn update(&self, name: &str, response: VehicleResponse) -> bool {
        match self.endpoints.write().get_mut(name) {
            Some(slot) => {
                *slot = Some(response);
                true
            }
            None => false,
        }
    }

    /// Last value received for an endpoint, if it is known and has one.
    pub fn get(&self, name: &str) -> Option<VehicleResponse> {
        self.endpoints.read().get(name).copied().flatten()
    }

    /// Snapshot of all known endpoint names.
    pub fn endpoints(&self) -> HashSet<String> {
        self.endpoints.read().keys().cloned().collect()
    }

    /// Number of known endpoints.
    pub fn len(&self) -> usize {
        self.endpoints.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn response(value: f64) -> VehicleResponse {
        VehicleResponse::new(value, Utc.with_ymd_and_hms(2024, 1, 17, 10, 0, 0).unwrap())
    }

    #[test]
    fn test_empty_registry() {
        let registry = EndpointRegistry::new();
        assert!(registry.is_empty());
        assert!(!registry.contains("EngineSpeed"));
        assert!(registry.get("EngineSpeed").is_none());
    }

    #[test]
    fn test_initialize_and_update() {
        let registry = EndpointRegistry::new();
        registry.initialize(["EngineSpeed", "VehicleSpeed"]);

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("EngineSpeed"));
        assert!(registry.get("EngineSpeed").is_none());

        assert!(registry.update("EngineSpeed", response(2500.0)));
        assert_eq!(registry.get("EngineSpeed").unwrap().value, 2500.0);
        assert!(registry.get("VehicleSpeed").is_none());
    }

    #[test]
    fn test_update_unknown_endpoint_is_rejected() {
        let registry = EndpointRegistry::new();
        registry.initialize(["EngineSpeed"]);

        assert!(!registry.update("X", response(1.0)));
        assert!(!registry.contains("X"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_reinitialize_resets_values() {
        let registry = EndpointRegistry::new();
        registry.initialize(["EngineSpeed", "VehicleSpeed"]);
        registry.update("EngineSpeed", response(2500.0));

        registry.initialize(["EngineSpeed", "FuelLevel"]);

        assert!(registry.get("EngineSpeed").is_none());
        assert!(!registry.contains("VehicleSpeed"));
        assert_eq!(
            registry.endpoints(),
            ["EngineSpeed", "FuelLevel"].into_iter().map(String::from).collect()
        );
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let registry = Arc::new(EndpointRegistry::new());
        let names: Vec<String> = (0..8).map(|i| format!("ep{i}")).collect();
        registry.initialize(names.clone());

        let handles: Vec<_> = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for n in 0..100 {
                        assert!(registry.update(&name, response((i * 1000 + n) as f64)));
                        let _ = registry.get(&name);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        for i in 0..8 {
            let last = registry.get(&format!("ep{i}")).unwrap();
            assert_eq!(last.value, (i * 1000 + 99) as f64);
        }
    }
}
