//! Schema Resolver
//!
//! Derives table descriptors from a schema-less store and keeps them in the
//! injected [`TableCache`]. At most one live scan per service runs at a time:
//! callers that queue behind a scan reuse its result instead of rescanning.

use crate::driver::{CollectionInfo, DocumentStore};
use crate::error::Result;
use crate::registry::ExtrasStore;
use crate::schema::cache::{TableCache, TableSet};
use crate::schema::inference::infer_fields;
use crate::schema::{SchemaDescriptor, TableExtras};
use futures::future::try_join_all;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Which schema a request targets.
///
/// Document stores have a single implicit schema, so a named schema is
/// accepted and then treated exactly like the default one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SchemaFilter {
    #[default]
    Default,
    Named(String),
}

impl From<Option<&str>> for SchemaFilter {
    fn from(value: Option<&str>) -> Self {
        match value.map(str::trim).filter(|s| !s.is_empty()) {
            Some(name) => SchemaFilter::Named(name.to_string()),
            None => SchemaFilter::Default,
        }
    }
}

/// Result of a table listing
#[derive(Debug, Clone)]
pub enum TableNames {
    /// Descriptors in discovery order
    Ordered(Vec<Arc<SchemaDescriptor>>),
    /// Descriptors keyed by lower-cased alias (or name when unaliased)
    Aliased(BTreeMap<String, Arc<SchemaDescriptor>>),
}

impl TableNames {
    pub fn len(&self) -> usize {
        match self {
            TableNames::Ordered(tables) => tables.len(),
            TableNames::Aliased(tables) => tables.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Case-insensitive lookup: by alias key when aliased, by name otherwise
    pub fn get(&self, key: &str) -> Option<&Arc<SchemaDescriptor>> {
        match self {
            TableNames::Ordered(tables) => tables.iter().find(|t| t.name.eq_ignore_ascii_case(key)),
            TableNames::Aliased(tables) => tables.get(&key.to_lowercase()),
        }
    }

    pub fn descriptors(&self) -> Vec<Arc<SchemaDescriptor>> {
        match self {
            TableNames::Ordered(tables) => tables.clone(),
            TableNames::Aliased(tables) => tables.values().cloned().collect(),
        }
    }
}

pub struct SchemaResolver {
    service: String,
    store: Arc<dyn DocumentStore>,
    cache: Arc<dyn TableCache>,
    extras: Arc<dyn ExtrasStore>,
    sample_size: u32,
    scan_lock: Mutex<()>,
    /// Bumped whenever a scan result is published to the cache
    scans: AtomicU64,
    /// Set once the owning service is retired or released
    closed: AtomicBool,
}

impl SchemaResolver {
    pub fn new(
        service: &str,
        store: Arc<dyn DocumentStore>,
        cache: Arc<dyn TableCache>,
        extras: Arc<dyn ExtrasStore>,
        sample_size: u32,
    ) -> Self {
        Self {
            service: service.to_string(),
            store,
            cache,
            extras,
            sample_size: sample_size.max(1),
            scan_lock: Mutex::new(()),
            scans: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// The cached table set, scanning the store on a miss or when `refresh`
    /// is set. A failed scan leaves the cache untouched.
    pub async fn table_set(&self, refresh: bool) -> Result<Arc<TableSet>> {
        let seen = self.scans.load(Ordering::SeqCst);

        if !refresh {
            if let Some(set) = self.cache.get(&self.service) {
                return Ok(set);
            }
        }

        let _guard = self.scan_lock.lock().await;

        // Someone else scanned while we waited; their result is fresh enough
        if !refresh || self.scans.load(Ordering::SeqCst) != seen {
            if let Some(set) = self.cache.get(&self.service) {
                debug!("Reusing table scan completed while waiting for {}", self.service);
                return Ok(set);
            }
        }

        let generation = self.cache.generation(&self.service);
        let set = Arc::new(self.scan().await?);

        if self.closed.load(Ordering::SeqCst) {
            debug!("Resolver for {} closed during scan, result not cached", self.service);
        } else if self.cache.set(&self.service, set.clone(), generation) {
            self.scans.fetch_add(1, Ordering::SeqCst);
        } else {
            debug!("Cache for {} invalidated during scan, result not cached", self.service);
        }

        Ok(set)
    }

    pub async fn get_table_names(
        &self,
        schema: &SchemaFilter,
        refresh: bool,
        use_alias: bool,
    ) -> Result<TableNames> {
        if let SchemaFilter::Named(name) = schema {
            debug!("Schema '{}' ignored for {}, using the default schema", name, self.service);
        }

        let set = self.table_set(refresh).await?;

        if use_alias {
            Ok(TableNames::Aliased(set.aliased()))
        } else {
            Ok(TableNames::Ordered(set.tables().to_vec()))
        }
    }

    /// Look a table up by name or alias, case-insensitively
    pub async fn describe_table(&self, table: &str, refresh: bool) -> Result<Option<Arc<SchemaDescriptor>>> {
        let set = self.table_set(refresh).await?;
        Ok(set.find(table).cloned())
    }

    /// Drop the cached descriptors; the next access rescans
    pub fn refresh(&self) {
        self.cache.clear(&self.service);
    }

    /// Stop publishing to the shared cache. Scans still in flight finish
    /// for their callers but are never cached.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    async fn scan(&self) -> Result<TableSet> {
        let start = Instant::now();

        let collections = self.store.list_collections().await?;
        let names: Vec<String> = collections.iter().map(|c| c.name.clone()).collect();
        let extras = self.extras.get(&self.service, &names)?;

        let descriptors = try_join_all(collections.into_iter().map(|info| {
            let table_extras = extras.get(&info.name.to_lowercase());
            self.describe(info, table_extras)
        }))
        .await?;

        info!(
            "Scanned {} collections for service {} in {}ms",
            descriptors.len(),
            self.service,
            start.elapsed().as_millis()
        );

        Ok(TableSet::new(descriptors))
    }

    async fn describe(
        &self,
        info: CollectionInfo,
        extras: Option<&TableExtras>,
    ) -> Result<SchemaDescriptor> {
        let samples = self.store.sample_documents(&info.name, self.sample_size).await?;
        let inferred = infer_fields(info.json_schema.as_ref(), &samples);
        Ok(SchemaDescriptor::build(&info.name, inferred, extras))
    }
}
