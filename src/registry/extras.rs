//! Schema extras storage
//!
//! Labels, descriptions and type overrides that administrators attach to
//! tables. Keys are lower-cased table names.

use crate::error::{GatewayError, Result};
use crate::registry::is_valid_service_name;
use crate::schema::TableExtras;
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

type ServiceExtras = BTreeMap<String, TableExtras>;

pub trait ExtrasStore: Send + Sync {
    /// Extras for the given tables that have any, keyed by lower-cased name
    fn get(&self, service: &str, tables: &[String]) -> Result<HashMap<String, TableExtras>>;

    fn put(&self, service: &str, table: &str, extras: TableExtras) -> Result<()>;

    fn remove_service(&self, service: &str) -> Result<()>;
}

fn select(all: &ServiceExtras, tables: &[String]) -> HashMap<String, TableExtras> {
    tables
        .iter()
        .map(|t| t.to_lowercase())
        .filter_map(|key| all.get(&key).cloned().map(|extras| (key, extras)))
        .collect()
}

/// Extras kept in `{data_dir}/{service}/extras.json`
pub struct FileExtrasStore {
    data_dir: PathBuf,
}

impl FileExtrasStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
        }
    }

    fn extras_path(&self, service: &str) -> PathBuf {
        self.data_dir.join(service).join("extras.json")
    }

    fn load(&self, service: &str) -> Result<ServiceExtras> {
        let path = self.extras_path(service);

        if !path.exists() {
            return Ok(ServiceExtras::new());
        }

        let content = fs::read_to_string(&path).map_err(|e| GatewayError::Internal(
            format!("Failed to read extras.json for {}: {}", service, e)
        ))?;

        serde_json::from_str(&content).map_err(|e| GatewayError::Internal(
            format!("Failed to parse extras.json for {}: {}", service, e)
        ))
    }

    fn save(&self, service: &str, extras: &ServiceExtras) -> Result<()> {
        let path = self.extras_path(service);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| GatewayError::Internal(
                format!("Failed to create service directory: {}", e)
            ))?;
        }

        let content = serde_json::to_string_pretty(extras).map_err(|e| GatewayError::Internal(
            format!("Failed to serialize extras: {}", e)
        ))?;

        fs::write(&path, content).map_err(|e| GatewayError::Internal(
            format!("Failed to write extras.json: {}", e)
        ))?;

        Ok(())
    }
}

impl ExtrasStore for FileExtrasStore {
    fn get(&self, service: &str, tables: &[String]) -> Result<HashMap<String, TableExtras>> {
        Ok(select(&self.load(service)?, tables))
    }

    fn put(&self, service: &str, table: &str, extras: TableExtras) -> Result<()> {
        if !is_valid_service_name(service) {
            return Err(GatewayError::InvalidRequest {
                message: format!("Invalid service name: {}", service),
            });
        }

        let mut all = self.load(service)?;
        all.insert(table.to_lowercase(), extras);
        self.save(service, &all)?;

        info!("Stored schema extras for {}.{}", service, table);
        Ok(())
    }

    fn remove_service(&self, service: &str) -> Result<()> {
        let path = self.extras_path(service);
        if path.exists() {
            fs::remove_file(&path).map_err(|e| GatewayError::Internal(
                format!("Failed to remove extras.json: {}", e)
            ))?;
            debug!("Removed schema extras for {}", service);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryExtrasStore {
    services: DashMap<String, ServiceExtras>,
}

impl MemoryExtrasStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExtrasStore for MemoryExtrasStore {
    fn get(&self, service: &str, tables: &[String]) -> Result<HashMap<String, TableExtras>> {
        Ok(self
            .services
            .get(service)
            .map(|all| select(&all, tables))
            .unwrap_or_default())
    }

    fn put(&self, service: &str, table: &str, extras: TableExtras) -> Result<()> {
        self.services
            .entry(service.to_string())
            .or_default()
            .insert(table.to_lowercase(), extras);
        Ok(())
    }

    fn remove_service(&self, service: &str) -> Result<()> {
        self.services.remove(service);
        Ok(())
    }
}
