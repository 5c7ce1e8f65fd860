//! MongoDB service
//!
//! A named service fronting one MongoDB database. Activation resolves its
//! settings, opens the named connection and wires up the schema resolver;
//! until then, and after release, every accessor fails.

mod configurator;
mod lookups;
mod manager;
mod settings;

pub use configurator::ConnectionConfigurator;
pub use lookups::Lookups;
pub use manager::ServiceManager;
pub use settings::{
    database_from_dsn, normalize_dsn, resolve_database, DriverContext, DriverOptions, RawSettings,
    ServiceConfig, TlsContext, DRIVER_NAME, DSN_PREFIX,
};

use crate::driver::DocumentStore;
use crate::error::{GatewayError, Result};
use crate::registry::ExtrasStore;
use crate::schema::{SchemaDescriptor, SchemaFilter, SchemaResolver, TableCache, TableNames};
use serde::Serialize;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

pub const SCHEMA_RESOURCE: &str = "_schema";
pub const TABLE_RESOURCE: &str = "_table";

/// Collaborators shared by every service of the gateway
pub struct ServiceContext {
    pub configurator: ConnectionConfigurator,
    pub cache: Arc<dyn TableCache>,
    pub extras: Arc<dyn ExtrasStore>,
    pub sample_size: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ResourceInfo {
    pub name: &'static str,
    pub label: &'static str,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Uninitialized,
    Ready,
    Closed,
}

enum State {
    Uninitialized,
    Ready {
        config: ServiceConfig,
        connection: Arc<dyn DocumentStore>,
        schema: Arc<SchemaResolver>,
    },
    Closed,
}

pub struct MongoService {
    name: String,
    settings: RawSettings,
    context: Arc<ServiceContext>,
    state: RwLock<State>,
}

impl MongoService {
    pub fn new(name: &str, settings: RawSettings, context: Arc<ServiceContext>) -> Self {
        Self {
            name: name.to_string(),
            settings,
            context,
            state: RwLock::new(State::Uninitialized),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label(&self) -> &str {
        self.settings.label.as_deref().unwrap_or(&self.name)
    }

    pub fn description(&self) -> Option<&str> {
        self.settings.description.as_deref()
    }

    pub fn settings(&self) -> &RawSettings {
        &self.settings
    }

    pub fn state(&self) -> ServiceState {
        match &*self.read_state() {
            State::Uninitialized => ServiceState::Uninitialized,
            State::Ready { .. } => ServiceState::Ready,
            State::Closed => ServiceState::Closed,
        }
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn not_initialized(&self, component: &'static str) -> GatewayError {
        GatewayError::NotInitialized {
            service: self.name.clone(),
            component,
        }
    }

    /// Configure the connection and schema resolver. Calling it on a ready
    /// service is a no-op; a released service cannot be activated again.
    pub async fn activate(&self) -> Result<()> {
        match self.state() {
            ServiceState::Ready => return Ok(()),
            ServiceState::Closed => {
                return Err(GatewayError::Internal(format!(
                    "Service {} has been released and cannot be reactivated",
                    self.name
                )))
            }
            ServiceState::Uninitialized => {}
        }

        let (config, connection) = self
            .context
            .configurator
            .configure(&self.name, &self.settings)
            .await?;

        // Descriptors from an earlier configuration no longer apply
        self.context.cache.clear(&self.name);

        let schema = Arc::new(SchemaResolver::new(
            &self.name,
            connection.clone(),
            self.context.cache.clone(),
            self.context.extras.clone(),
            self.context.sample_size,
        ));

        *self.write_state() = State::Ready {
            config,
            connection,
            schema,
        };

        info!("Service {} is ready", self.name);
        Ok(())
    }

    pub fn connection(&self) -> Result<Arc<dyn DocumentStore>> {
        match &*self.read_state() {
            State::Ready { connection, .. } => Ok(connection.clone()),
            _ => Err(self.not_initialized("connection")),
        }
    }

    pub fn schema(&self) -> Result<Arc<SchemaResolver>> {
        match &*self.read_state() {
            State::Ready { schema, .. } => Ok(schema.clone()),
            _ => Err(self.not_initialized("schema extension")),
        }
    }

    pub fn config(&self) -> Result<ServiceConfig> {
        match &*self.read_state() {
            State::Ready { config, .. } => Ok(config.clone()),
            _ => Err(self.not_initialized("configuration")),
        }
    }

    pub async fn get_table_names(
        &self,
        schema: &SchemaFilter,
        refresh: bool,
        use_alias: bool,
    ) -> Result<TableNames> {
        self.schema()?.get_table_names(schema, refresh, use_alias).await
    }

    /// Descriptor for a table by name or alias
    pub async fn describe_table(&self, table: &str, refresh: bool) -> Result<Arc<SchemaDescriptor>> {
        self.schema()?
            .describe_table(table, refresh)
            .await?
            .ok_or_else(|| GatewayError::TableNotFound {
                service: self.name.clone(),
                table: table.to_string(),
            })
    }

    pub fn refresh_table_cache(&self) -> Result<()> {
        self.schema()?.refresh();
        debug!("Table cache invalidated for service {}", self.name);
        Ok(())
    }

    pub fn resources(&self) -> Vec<ResourceInfo> {
        vec![
            ResourceInfo {
                name: SCHEMA_RESOURCE,
                label: "Schema",
            },
            ResourceInfo {
                name: TABLE_RESOURCE,
                label: "Table",
            },
        ]
    }

    /// Mark the service closed without touching its named connection.
    /// Used when a newer instance has taken over the connection.
    pub(crate) fn retire(&self) {
        let previous = std::mem::replace(&mut *self.write_state(), State::Closed);
        if let State::Ready { schema, .. } = previous {
            schema.close();
        }
    }

    /// Close the named connection and drop cached descriptors. Safe to call
    /// any number of times. An instance that never became ready owns
    /// neither, so releasing it only marks it closed.
    pub async fn release(&self) {
        let previous = std::mem::replace(&mut *self.write_state(), State::Closed);
        match previous {
            State::Ready { schema, .. } => {
                schema.close();
                self.context.configurator.release(&self.name).await;
                self.context.cache.clear(&self.name);
                info!("Service {} released", self.name);
            }
            State::Uninitialized => debug!("Service {} released before activation", self.name),
            State::Closed => debug!("Service {} already released", self.name),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::driver::testing::StubDriver;
    use crate::driver::CollectionInfo;
    use crate::pool::ConnectionRegistry;
    use crate::registry::MemoryExtrasStore;
    use crate::schema::MemoryTableCache;
    use bson::doc;
    use serde_json::json;

    pub(crate) fn context(driver: &StubDriver) -> Arc<ServiceContext> {
        let registry = Arc::new(ConnectionRegistry::new(Arc::new(driver.clone())));
        Arc::new(ServiceContext {
            configurator: ConnectionConfigurator::new(registry, Lookups::new()),
            cache: Arc::new(MemoryTableCache::new()),
            extras: Arc::new(MemoryExtrasStore::new()),
            sample_size: 10,
        })
    }

    fn settings() -> RawSettings {
        RawSettings::from_config(json!({"dsn": "localhost:27017/app"}))
    }

    fn driver() -> StubDriver {
        StubDriver::new().with_collection(CollectionInfo::new("Users"), vec![doc! { "_id": 1 }])
    }

    #[tokio::test]
    async fn test_uninitialized_access_fails() {
        let service = MongoService::new("mongo", settings(), context(&driver()));

        assert_eq!(service.state(), ServiceState::Uninitialized);
        assert!(matches!(service.connection(), Err(GatewayError::NotInitialized { .. })));
        assert!(matches!(service.schema(), Err(GatewayError::NotInitialized { .. })));
        assert!(matches!(
            service.get_table_names(&SchemaFilter::Default, false, false).await,
            Err(GatewayError::NotInitialized { .. })
        ));
        assert!(matches!(
            service.refresh_table_cache(),
            Err(GatewayError::NotInitialized { .. })
        ));
    }

    #[tokio::test]
    async fn test_activate_then_list_tables() {
        let driver = driver();
        let service = MongoService::new("mongo", settings(), context(&driver));

        service.activate().await.unwrap();
        service.activate().await.unwrap();
        assert_eq!(service.state(), ServiceState::Ready);
        assert_eq!(driver.counters.connects(), 1);

        let tables = service
            .get_table_names(&SchemaFilter::Default, false, false)
            .await
            .unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(service.describe_table("users", false).await.unwrap().name, "Users");
        assert!(matches!(
            service.describe_table("nope", false).await,
            Err(GatewayError::TableNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_activation_fails_without_database() {
        let settings = RawSettings::from_config(json!({"dsn": "mongodb://host:27017"}));
        let service = MongoService::new("mongo", settings, context(&driver()));

        let err = service.activate().await.unwrap_err();
        assert!(matches!(err, GatewayError::Configuration { .. }));
        assert_eq!(service.state(), ServiceState::Uninitialized);
    }

    #[tokio::test]
    async fn test_release_closes_and_is_idempotent() {
        let driver = driver();
        let context = context(&driver);
        let service = MongoService::new("mongo", settings(), context.clone());
        service.activate().await.unwrap();
        service
            .get_table_names(&SchemaFilter::Default, false, false)
            .await
            .unwrap();

        service.release().await;
        service.release().await;

        assert_eq!(service.state(), ServiceState::Closed);
        assert_eq!(driver.counters.disconnects(), 1);
        assert!(context.cache.get("mongo").is_none());
        assert!(matches!(service.connection(), Err(GatewayError::NotInitialized { .. })));
        assert!(service.activate().await.is_err());
    }

    #[test]
    fn test_resources() {
        let service = MongoService::new("mongo", settings(), context(&driver()));
        let names: Vec<&str> = service.resources().iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["_schema", "_table"]);
        assert_eq!(service.label(), "mongo");
    }

    #[tokio::test]
    async fn test_release_before_activation_keeps_shared_connection() {
        let driver = driver();
        let context = context(&driver);
        let live = MongoService::new("mongo", settings(), context.clone());
        live.activate().await.unwrap();

        let pending = MongoService::new("mongo", settings(), context.clone());
        pending.release().await;

        assert_eq!(pending.state(), ServiceState::Closed);
        assert_eq!(driver.counters.disconnects(), 0);
        assert!(context.configurator.registry().is_open("mongo").await);
        assert!(live.connection().is_ok());
    }
}
