//! Listener registry.
//!
//! Maps subscription and alarm short names (`EngineSpeed~sub`,
//! `EngineSpeed~above`, ...) to the callbacks that receive their values.

use std::sync::Arc;

use dashmap::DashMap;
use wva_core::VehicleResponse;

/// Receives values pushed for one subscription or alarm.
///
/// Called from the dispatch task; implementations should return quickly.
pub trait VehicleListener: Send + Sync {
    fn on_update(&self, endpoint: &str, response: &VehicleResponse);
}

impl<F> VehicleListener for F
where
    F: Fn(&str, &VehicleResponse) + Send + Sync,
{
    fn on_update(&self, endpoint: &str, response: &VehicleResponse) {
        self(endpoint, response)
    }
}

pub type SharedListener = Arc<dyn VehicleListener>;

/// Wrap a closure as a [`SharedListener`].
pub fn listener<F>(f: F) -> SharedListener
where
    F: Fn(&str, &VehicleResponse) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Thread-safe map of short name to listener.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: DashMap<String, SharedListener>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener, returning the one it replaced.
    pub fn insert(
        &self,
        short_name: impl Into<String>,
        listener: SharedListener,
    ) -> Option<SharedListener> {
        self.listeners.insert(short_name.into(), listener)
    }

    pub fn remove(&self, short_name: &str) -> Option<SharedListener> {
        self.listeners.remove(short_name).map(|(_, listener)| listener)
    }

    /// Listener for a short name. The map is not locked once this returns.
    pub fn get(&self, short_name: &str) -> Option<SharedListener> {
        self.listeners.get(short_name).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, short_name: &str) -> bool {
        self.listeners.contains_key(short_name)
    }

    pub fn clear(&self) {
        self.listeners.clear();
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn short_names(&self) -> Vec<String> {
        self.listeners.iter().map(|entry| entry.key().clone()).collect()
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("short_names", &self.short_names())
            .finish()
    }
}
