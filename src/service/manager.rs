use crate::error::{GatewayError, Result};
use crate::registry::{is_valid_service_name, ServiceStore};
use crate::service::{MongoService, RawSettings, ServiceContext};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Active services by name
pub struct ServiceManager {
    context: Arc<ServiceContext>,
    services: DashMap<String, Arc<MongoService>>,
    store: Option<ServiceStore>,
    lifecycle: Mutex<()>,
}

impl ServiceManager {
    pub fn new(context: Arc<ServiceContext>, store: Option<ServiceStore>) -> Self {
        Self {
            context,
            services: DashMap::new(),
            store,
            lifecycle: Mutex::new(()),
        }
    }

    pub fn context(&self) -> &Arc<ServiceContext> {
        &self.context
    }

    pub fn get(&self, name: &str) -> Result<Arc<MongoService>> {
        self.services
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| GatewayError::ServiceNotFound {
                service: name.to_string(),
            })
    }

    pub fn list(&self) -> Vec<Arc<MongoService>> {
        let mut services: Vec<_> = self.services.iter().map(|e| e.value().clone()).collect();
        services.sort_by(|a, b| a.name().cmp(b.name()));
        services
    }

    pub fn active_services(&self) -> usize {
        self.services.len()
    }

    /// Bring a service up with the given settings, replacing any running
    /// instance of the same name. With `persist`, the settings are stored
    /// for the next start-up once activation succeeds.
    pub async fn activate(&self, name: &str, settings: RawSettings, persist: bool) -> Result<Arc<MongoService>> {
        if !is_valid_service_name(name) {
            return Err(GatewayError::InvalidRequest {
                message: format!("Invalid service name: {}", name),
            });
        }

        let _guard = self.lifecycle.lock().await;

        let service = Arc::new(MongoService::new(name, settings, self.context.clone()));

        if let Err(e) = service.activate().await {
            // Resolution errors happen before registration, so the running
            // instance keeps its connection. Anything later replaced it.
            if !matches!(e, GatewayError::Configuration { .. }) {
                if let Some((_, previous)) = self.services.remove(name) {
                    warn!("Service {} stopped after failed reconfiguration", name);
                    previous.retire();
                }
                self.context.configurator.release(name).await;
            }
            return Err(e);
        }

        if persist {
            if let Some(store) = &self.store {
                store.save(name, service.settings())?;
            }
        }

        if let Some(previous) = self.services.insert(name.to_string(), service.clone()) {
            previous.retire();
            info!("Service {} reconfigured", name);
        } else {
            info!("Service {} activated", name);
        }

        Ok(service)
    }

    /// Stop a service. With `forget`, its stored settings and schema extras
    /// are removed as well.
    pub async fn deactivate(&self, name: &str, forget: bool) -> Result<()> {
        let _guard = self.lifecycle.lock().await;

        let service = self
            .services
            .remove(name)
            .map(|(_, service)| service)
            .ok_or_else(|| GatewayError::ServiceNotFound {
                service: name.to_string(),
            })?;

        service.release().await;

        if forget {
            if let Some(store) = &self.store {
                store.remove(name)?;
            }
            self.context.extras.remove_service(name)?;
        }

        info!("Service {} deactivated", name);
        Ok(())
    }

    /// Activate every stored service. Failures are logged and skipped.
    pub async fn restore(&self) -> Result<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };

        let mut restored = 0;
        for name in store.list()? {
            let record = match store.load(&name) {
                Ok(record) => record,
                Err(e) => {
                    warn!("Skipping stored service {}: {}", name, e);
                    continue;
                }
            };

            match self.activate(&name, record.settings, false).await {
                Ok(_) => restored += 1,
                Err(e) => warn!("Failed to restore service {}: {}", name, e),
            }
        }

        info!("Restored {} stored services", restored);
        Ok(restored)
    }

    pub async fn shutdown(&self) {
        let _guard = self.lifecycle.lock().await;

        let names: Vec<String> = self.services.iter().map(|e| e.key().clone()).collect();
        for name in names {
            if let Some((_, service)) = self.services.remove(&name) {
                service.release().await;
            }
        }
    }
}
