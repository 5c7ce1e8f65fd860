use crate::driver::DocumentStore;
use crate::error::Result;
use crate::pool::ConnectionRegistry;
use crate::service::{Lookups, RawSettings, ServiceConfig};
use std::sync::Arc;
use tracing::{debug, info};

/// Builds service configs and obtains their named connections
pub struct ConnectionConfigurator {
    registry: Arc<ConnectionRegistry>,
    lookups: Lookups,
}

impl ConnectionConfigurator {
    pub fn new(registry: Arc<ConnectionRegistry>, lookups: Lookups) -> Self {
        Self { registry, lookups }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Resolve the settings, register them under the service name and open
    /// (or reuse) the connection. Nothing is registered if resolution fails.
    pub async fn configure(
        &self,
        service: &str,
        settings: &RawSettings,
    ) -> Result<(ServiceConfig, Arc<dyn DocumentStore>)> {
        let config = ServiceConfig::resolve(service, settings, &self.lookups)?;

        debug!(
            "Resolved service {}: dsn={} database={} options={}",
            service,
            config.redacted_dsn(),
            config.database,
            config.options.len()
        );

        self.registry.register(service, config.clone()).await;
        let connection = self.registry.get(service).await?;

        info!("Service {} configured for database {}", service, config.database);

        Ok((config, connection))
    }

    /// Close the service's connection; never fails
    pub async fn release(&self, service: &str) {
        if self.registry.close(service).await {
            info!("Released connection for service {}", service);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::testing::StubDriver;
    use crate::error::GatewayError;
    use serde_json::json;

    fn configurator(driver: &StubDriver) -> ConnectionConfigurator {
        let registry = Arc::new(ConnectionRegistry::new(Arc::new(driver.clone())));
        ConnectionConfigurator::new(registry, Lookups::new().with("db", "inventory"))
    }

    #[tokio::test]
    async fn test_configure_opens_named_connection() {
        let driver = StubDriver::new();
        let configurator = configurator(&driver);

        let settings = RawSettings::from_config(json!({"dsn": "localhost:27017/{db}"}));
        let (config, connection) = configurator.configure("mongo", &settings).await.unwrap();

        assert_eq!(config.dsn, "mongodb://localhost:27017/inventory");
        assert_eq!(connection.database(), "inventory");
        assert!(configurator.registry().is_open("mongo").await);
    }

    #[tokio::test]
    async fn test_missing_database_registers_nothing() {
        let driver = StubDriver::new();
        let configurator = configurator(&driver);

        let settings = RawSettings::from_config(json!({"dsn": "mongodb://host:27017"}));
        let err = configurator.configure("mongo", &settings).await.err().unwrap();

        assert!(matches!(err, GatewayError::Configuration { .. }));
        assert_eq!(configurator.registry().registered(), 0);
        assert_eq!(driver.counters.connects(), 0);
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let driver = StubDriver::new();
        let configurator = configurator(&driver);

        let settings = RawSettings::from_config(json!({"database": "app"}));
        configurator.configure("mongo", &settings).await.unwrap();

        configurator.release("mongo").await;
        configurator.release("mongo").await;
        configurator.release("unknown").await;

        assert_eq!(driver.counters.disconnects(), 1);
    }
}
