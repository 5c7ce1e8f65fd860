//! Service Store
//!
//! Persists raw service settings so services come back after a restart.
//! Settings are stored as submitted, before lookup substitution.

use crate::error::{GatewayError, Result};
use crate::registry::is_valid_service_name;
use crate::service::RawSettings;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Contents of `{data_dir}/{service}/service.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub name: String,
    pub registered_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    pub settings: RawSettings,
}

pub struct ServiceStore {
    data_dir: PathBuf,
}

impl ServiceStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
        }
    }

    fn service_json_path(&self, service: &str) -> PathBuf {
        self.data_dir.join(service).join("service.json")
    }

    pub fn exists(&self, service: &str) -> bool {
        self.service_json_path(service).exists()
    }

    /// Create or replace the stored settings for a service
    pub fn save(&self, service: &str, settings: &RawSettings) -> Result<ServiceRecord> {
        if !is_valid_service_name(service) {
            return Err(GatewayError::InvalidRequest {
                message: format!(
                    "Invalid service name: {}. Must be alphanumeric with underscores or dashes.",
                    service
                ),
            });
        }

        let record = match self.load(service) {
            Ok(existing) => ServiceRecord {
                updated_at: Some(Utc::now()),
                settings: settings.clone(),
                ..existing
            },
            Err(_) => ServiceRecord {
                name: service.to_string(),
                registered_at: Utc::now(),
                updated_at: None,
                settings: settings.clone(),
            },
        };

        let path = self.service_json_path(service);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| GatewayError::Internal(
                format!("Failed to create service directory: {}", e)
            ))?;
        }

        let content = serde_json::to_string_pretty(&record).map_err(|e| GatewayError::Internal(
            format!("Failed to serialize service record: {}", e)
        ))?;

        fs::write(&path, content).map_err(|e| GatewayError::Internal(
            format!("Failed to write service.json: {}", e)
        ))?;

        info!("Stored settings for service: {}", service);
        Ok(record)
    }

    pub fn load(&self, service: &str) -> Result<ServiceRecord> {
        let path = self.service_json_path(service);

        if !path.exists() {
            return Err(GatewayError::ServiceNotFound {
                service: service.to_string(),
            });
        }

        let content = fs::read_to_string(&path).map_err(|e| GatewayError::Internal(
            format!("Failed to read service.json: {}", e)
        ))?;

        serde_json::from_str(&content).map_err(|e| GatewayError::Internal(
            format!("Failed to parse service.json: {}", e)
        ))
    }

    pub fn remove(&self, service: &str) -> Result<()> {
        let path = self.service_json_path(service);
        if path.exists() {
            fs::remove_file(&path).map_err(|e| GatewayError::Internal(
                format!("Failed to remove service.json: {}", e)
            ))?;
            info!("Removed stored settings for service: {}", service);
        }
        Ok(())
    }

    /// Names of all stored services, sorted
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.data_dir.exists() {
            return Ok(Vec::new());
        }

        let mut services = Vec::new();

        for entry in fs::read_dir(&self.data_dir).map_err(|e| GatewayError::Internal(
            format!("Failed to read data directory: {}", e)
        ))? {
            let entry = entry.map_err(|e| GatewayError::Internal(
                format!("Failed to read directory entry: {}", e)
            ))?;

            let path = entry.path();
            if path.is_dir() && path.join("service.json").exists() {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    services.push(name.to_string());
                }
            }
        }

        services.sort();
        Ok(services)
    }
}
