//! Table descriptor cache
//!
//! A service's descriptors are cached as one immutable [`TableSet`] that is
//! replaced wholesale, so readers always see a complete snapshot.

use crate::schema::SchemaDescriptor;
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct TableSet {
    tables: Vec<Arc<SchemaDescriptor>>,
    by_name: HashMap<String, usize>,
    by_alias: HashMap<String, usize>,
}

impl TableSet {
    pub fn new(descriptors: Vec<SchemaDescriptor>) -> Self {
        let mut set = TableSet::default();

        for descriptor in descriptors {
            let index = set.tables.len();
            let name_key = descriptor.name.to_lowercase();

            if set.by_name.contains_key(&name_key) {
                warn!("Duplicate table name '{}' ignored", descriptor.name);
                continue;
            }

            set.by_name.insert(name_key, index);
            set.tables.push(Arc::new(descriptor));
        }

        // Real names claim their keys before any alias, matching `find`
        for (index, table) in set.tables.iter().enumerate() {
            if table.alias.is_none() {
                set.by_alias.insert(table.name.to_lowercase(), index);
            }
        }

        for (index, table) in set.tables.iter().enumerate() {
            let Some(alias) = &table.alias else {
                continue;
            };

            let alias_key = alias.to_lowercase();
            let key = if !set.by_alias.contains_key(&alias_key) {
                alias_key
            } else {
                let name_key = table.name.to_lowercase();
                warn!(
                    "Alias '{}' of '{}' is already taken, listing it under its name",
                    alias, table.name
                );
                if set.by_alias.contains_key(&name_key) {
                    warn!("Table '{}' has no free alias key and is not listed by alias", table.name);
                    continue;
                }
                name_key
            };
            set.by_alias.insert(key, index);
        }

        set
    }

    pub fn tables(&self) -> &[Arc<SchemaDescriptor>] {
        &self.tables
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<SchemaDescriptor>> {
        self.by_name
            .get(&name.to_lowercase())
            .map(|index| &self.tables[*index])
    }

    /// Lookup keyed by alias, or by name for tables without one
    pub fn get_by_alias(&self, alias: &str) -> Option<&Arc<SchemaDescriptor>> {
        self.by_alias
            .get(&alias.to_lowercase())
            .map(|index| &self.tables[*index])
    }

    /// Every table under its alias index key, sorted by key
    pub fn aliased(&self) -> BTreeMap<String, Arc<SchemaDescriptor>> {
        self.by_alias
            .iter()
            .map(|(key, index)| (key.clone(), self.tables[*index].clone()))
            .collect()
    }

    /// Name first, then alias
    pub fn find(&self, key: &str) -> Option<&Arc<SchemaDescriptor>> {
        self.get(key).or_else(|| self.get_by_alias(key))
    }
}

/// Cache capability the schema resolver is given.
///
/// Every `clear` bumps the service's generation. A scan publishes with the
/// generation it read before starting, so a result that straddles a clear
/// is dropped no matter which resolver produced it.
pub trait TableCache: Send + Sync {
    fn get(&self, service: &str) -> Option<Arc<TableSet>>;

    fn generation(&self, service: &str) -> u64;

    /// Store `tables` unless the service was cleared after `generation`
    /// was read. Returns whether the set was stored.
    fn set(&self, service: &str, tables: Arc<TableSet>, generation: u64) -> bool;

    fn clear(&self, service: &str);

    fn get_table(&self, service: &str, table: &str) -> Option<Arc<SchemaDescriptor>> {
        self.get(service)
            .and_then(|set| set.find(table).cloned())
    }
}

#[derive(Default)]
struct CacheSlot {
    generation: u64,
    tables: Option<Arc<TableSet>>,
}

/// In-process cache backing
#[derive(Default)]
pub struct MemoryTableCache {
    slots: DashMap<String, CacheSlot>,
}

impl MemoryTableCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Services that currently hold descriptors
    pub fn cached_services(&self) -> usize {
        self.slots.iter().filter(|slot| slot.tables.is_some()).count()
    }
}

impl TableCache for MemoryTableCache {
    fn get(&self, service: &str) -> Option<Arc<TableSet>> {
        self.slots.get(service).and_then(|slot| slot.tables.clone())
    }

    fn generation(&self, service: &str) -> u64 {
        self.slots.get(service).map_or(0, |slot| slot.generation)
    }

    fn set(&self, service: &str, tables: Arc<TableSet>, generation: u64) -> bool {
        let mut slot = self.slots.entry(service.to_string()).or_default();
        if slot.generation != generation {
            debug!("Discarding stale table scan for service {}", service);
            return false;
        }

        debug!("Caching {} tables for service {}", tables.len(), service);
        slot.tables = Some(tables);
        true
    }

    fn clear(&self, service: &str) {
        let mut slot = self.slots.entry(service.to_string()).or_default();
        slot.generation += 1;
        if slot.tables.take().is_some() {
            debug!("Cleared table cache for service {}", service);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::inference::InferredSchema;
    use crate::schema::TableExtras;

    fn descriptor(name: &str, alias: Option<&str>) -> SchemaDescriptor {
        let extras = TableExtras {
            alias: alias.map(str::to_string),
            ..Default::default()
        };
        SchemaDescriptor::build(name, InferredSchema::default(), Some(&extras))
    }

    #[test]
    fn test_table_set_lookups_are_case_insensitive() {
        let set = TableSet::new(vec![
            descriptor("Orders", Some("order_list")),
            descriptor("Users", None),
        ]);

        assert_eq!(set.len(), 2);
        assert_eq!(set.get("ORDERS").unwrap().name, "Orders");
        assert_eq!(set.get_by_alias("ORDER_LIST").unwrap().name, "Orders");
        assert_eq!(set.get_by_alias("users").unwrap().name, "Users");
        assert!(set.get_by_alias("orders").is_none());
        assert_eq!(set.find("Order_List").unwrap().name, "Orders");
    }

    #[test]
    fn test_memory_cache_per_service() {
        let cache = MemoryTableCache::new();
        assert!(cache.set("a", Arc::new(TableSet::new(vec![descriptor("Users", None)])), 0));
        assert!(cache.set("b", Arc::new(TableSet::default()), 0));

        assert_eq!(cache.get_table("a", "users").unwrap().name, "Users");
        assert!(cache.get_table("b", "users").is_none());

        cache.clear("a");
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert_eq!(cache.cached_services(), 1);
    }

    #[test]
    fn test_set_after_clear_is_discarded() {
        let cache = MemoryTableCache::new();
        let seen = cache.generation("a");

        cache.clear("a");
        assert!(!cache.set("a", Arc::new(TableSet::new(vec![descriptor("Users", None)])), seen));
        assert!(cache.get("a").is_none());
        assert_eq!(cache.cached_services(), 0);

        let current = cache.generation("a");
        assert!(cache.set("a", Arc::new(TableSet::default()), current));
        assert!(cache.get("a").is_some());
    }

    #[test]
    fn test_alias_colliding_with_name_keeps_both_tables() {
        let set = TableSet::new(vec![
            descriptor("Users", Some("orders")),
            descriptor("Orders", None),
        ]);

        let aliased = set.aliased();
        assert_eq!(aliased.len(), 2);
        assert_eq!(aliased["orders"].name, "Orders");
        assert_eq!(aliased["users"].name, "Users");
        assert_eq!(set.get_by_alias("orders").unwrap().name, "Orders");
        assert_eq!(set.find("orders").unwrap().name, "Orders");
    }
}
