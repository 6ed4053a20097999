//! ECU data cache.
//!
//! The device lists the vehicle's ECUs under `vehicle/ecus/`, each with a set
//! of descriptive endpoints (VIN, part number, ...). Values are plain
//! strings and are only read on request.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use wva_core::path;
use wva_protocol::resource_names;

use crate::error::WvaError;
use crate::pending::Pending;
use crate::transport::{self, Transport};

type EcuMap = HashMap<String, HashMap<String, String>>;

#[derive(Clone)]
pub struct Ecu {
    transport: Arc<dyn Transport>,
    ecus: Arc<RwLock<EcuMap>>,
}

impl Ecu {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            ecus: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Learn the ECU names. ECUs already known keep their cached endpoints.
    pub fn initialize(&self) -> Pending<HashSet<String>> {
        let transport = self.transport.clone();
        let ecus = self.ecus.clone();

        Pending::spawn(async move {
            let listing = transport::get_json(transport.as_ref(), path::ECU_BASE).await?;
            let names = resource_names(&listing, "ecus")
                .map_err(|e| WvaError::unexpected(path::ECU_BASE, e))?;

            let mut ecus = ecus.write();
            for name in &names {
                ecus.entry(name.clone()).or_default();
            }
            debug!("Device reports {} ECUs", names.len());
            Ok(names.into_iter().collect())
        })
    }

    /// Learn the endpoint names of one ECU.
    pub fn define_endpoints(&self, ecu: &str) -> Result<Pending<HashSet<String>>, WvaError> {
        self.check_ecu(ecu)?;

        let transport = self.transport.clone();
        let ecus = self.ecus.clone();
        let ecu = ecu.to_string();
        Ok(Pending::spawn(async move {
            let resource = path::ecu(&ecu, None);
            let listing = transport::get_json(transport.as_ref(), &resource).await?;
            let names =
                resource_names(&listing, &ecu).map_err(|e| WvaError::unexpected(&resource, e))?;

            if let Some(endpoints) = ecus.write().get_mut(&ecu) {
                for name in &names {
                    endpoints.entry(name.clone()).or_default();
                }
            }
            Ok(names.into_iter().collect())
        }))
    }

    /// Read every known endpoint of an ECU. Fails as a whole if any read fails.
    pub fn fetch_all(&self, ecu: &str) -> Result<Pending<HashMap<String, String>>, WvaError> {
        let names = self
            .cached_endpoints(ecu)
            .ok_or_else(|| WvaError::EndpointUnknown(ecu.to_string()))?;

        let transport = self.transport.clone();
        let ecus = self.ecus.clone();
        let ecu = ecu.to_string();
        Ok(Pending::spawn(async move {
            let mut values = HashMap::with_capacity(names.len());
            for name in names {
                let resource = path::ecu(&ecu, Some(&name));
                let body = transport::get_json(transport.as_ref(), &resource).await?;
                let value = match body.get(&name) {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => {
                        return Err(WvaError::unexpected(&resource, format!("missing '{}'", name)))
                    }
                };
                values.insert(name, value);
            }

            if let Some(endpoints) = ecus.write().get_mut(&ecu) {
                endpoints.extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            Ok(values)
        }))
    }

    /// Cached value of an ECU endpoint. Empty until fetched.
    pub fn cached(&self, ecu: &str, endpoint: &str) -> Option<String> {
        self.ecus.read().get(ecu)?.get(endpoint).cloned()
    }

    pub fn ecu_names(&self) -> HashSet<String> {
        self.ecus.read().keys().cloned().collect()
    }

    pub fn cached_endpoints(&self, ecu: &str) -> Option<HashSet<String>> {
        self.ecus.read().get(ecu).map(|endpoints| endpoints.keys().cloned().collect())
    }

    fn check_ecu(&self, ecu: &str) -> Result<(), WvaError> {
        if self.ecus.read().contains_key(ecu) {
            Ok(())
        } else {
            Err(WvaError::EndpointUnknown(ecu.to_string()))
        }
    }
}
