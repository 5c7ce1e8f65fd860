use crate::driver::{DocumentStore, Driver};
use crate::error::{GatewayError, Result};
use crate::service::ServiceConfig;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Registry key for a service's connection
pub fn connection_key(service: &str) -> String {
    format!("service.{}", service)
}

struct Slot {
    config: Arc<ServiceConfig>,
    handle: Option<Arc<dyn DocumentStore>>,
    opened_at: Option<Instant>,
}

/// Named connections, one per service.
///
/// Each slot carries its own lock so registering, opening or closing one
/// service never waits on another service's connect. Operations on an open
/// handle take no lock here.
pub struct ConnectionRegistry {
    driver: Arc<dyn Driver>,
    slots: DashMap<String, Arc<Mutex<Slot>>>,
}

impl ConnectionRegistry {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self {
            driver,
            slots: DashMap::new(),
        }
    }

    /// Register `config` under the service's key. A different config
    /// replaces the previous one and closes any handle opened with it.
    pub async fn register(&self, service: &str, config: ServiceConfig) {
        let key = connection_key(service);
        let config = Arc::new(config);

        let slot = self
            .slots
            .entry(key.clone())
            .or_insert_with(|| {
                Arc::new(Mutex::new(Slot {
                    config: config.clone(),
                    handle: None,
                    opened_at: None,
                }))
            })
            .clone();

        let stale = {
            let mut slot = slot.lock().await;
            if *slot.config == *config {
                None
            } else {
                debug!("Replacing configuration for {}", key);
                slot.config = config;
                slot.opened_at = None;
                slot.handle.take()
            }
        };

        if let Some(handle) = stale {
            info!("Configuration changed for {}, closing open connection", key);
            disconnect_quietly(&key, handle).await;
        }
    }

    /// Handle for the service, opening it on first use
    pub async fn get(&self, service: &str) -> Result<Arc<dyn DocumentStore>> {
        let key = connection_key(service);

        let slot = self
            .slots
            .get(&key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                GatewayError::Internal(format!("No connection configuration registered for {}", key))
            })?;

        let mut slot = slot.lock().await;
        if let Some(handle) = &slot.handle {
            return Ok(handle.clone());
        }

        let handle = self.driver.connect(service, &slot.config).await?;
        slot.handle = Some(handle.clone());
        slot.opened_at = Some(Instant::now());

        info!("Opened connection {} (database {})", key, slot.config.database);

        Ok(handle)
    }

    /// Close and forget the service's connection. Missing or already closed
    /// connections are ignored; disconnect failures are logged only.
    /// Returns whether a live handle was closed.
    pub async fn close(&self, service: &str) -> bool {
        let key = connection_key(service);

        let Some((_, slot)) = self.slots.remove(&key) else {
            debug!("No connection registered for {}, nothing to close", key);
            return false;
        };

        let (handle, opened_at) = {
            let mut slot = slot.lock().await;
            (slot.handle.take(), slot.opened_at.take())
        };

        match handle {
            Some(handle) => {
                disconnect_quietly(&key, handle).await;
                if let Some(opened_at) = opened_at {
                    info!("Closed connection {} after {:?}", key, opened_at.elapsed());
                }
                true
            }
            None => {
                debug!("Connection {} was registered but never opened", key);
                false
            }
        }
    }

    pub async fn close_all(&self) -> usize {
        let services: Vec<String> = self
            .slots
            .iter()
            .filter_map(|entry| entry.key().strip_prefix("service.").map(str::to_string))
            .collect();

        let mut closed = 0;
        for service in services {
            if self.close(&service).await {
                closed += 1;
            }
        }
        closed
    }

    pub async fn is_open(&self, service: &str) -> bool {
        let slot = match self.slots.get(&connection_key(service)) {
            Some(entry) => entry.value().clone(),
            None => return false,
        };
        let open = slot.lock().await.handle.is_some();
        open
    }

    pub fn is_registered(&self, service: &str) -> bool {
        self.slots.contains_key(&connection_key(service))
    }

    pub fn registered(&self) -> usize {
        self.slots.len()
    }

    pub async fn active_connections(&self) -> usize {
        let slots: Vec<_> = self.slots.iter().map(|entry| entry.value().clone()).collect();
        let mut active = 0;
        for slot in slots {
            if slot.lock().await.handle.is_some() {
                active += 1;
            }
        }
        active
    }
}

async fn disconnect_quietly(key: &str, handle: Arc<dyn DocumentStore>) {
    if let Err(e) = handle.disconnect().await {
        warn!("Failed to disconnect from database {}: {}", key, e);
    }
}
