//! Call-counting in-memory driver used by unit tests

use crate::driver::{CollectionInfo, DocumentStore, Driver};
use crate::error::{GatewayError, Result};
use crate::service::ServiceConfig;
use async_trait::async_trait;
use bson::{oid::ObjectId, Bson, Document};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
pub struct StubCounters {
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
    pub list_collections: AtomicUsize,
    pub samples: AtomicUsize,
}

impl StubCounters {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_collections.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct StubData {
    pub collections: Vec<CollectionInfo>,
    pub documents: HashMap<String, Vec<Document>>,
}

/// Driver whose stores share one set of collections and counters
#[derive(Clone, Default)]
pub struct StubDriver {
    pub counters: Arc<StubCounters>,
    pub data: Arc<Mutex<StubData>>,
    pub fail_connect: Arc<AtomicBool>,
    pub fail_list: Arc<AtomicBool>,
    pub fail_disconnect: Arc<AtomicBool>,
    pub list_delay: Option<Duration>,
}

impl StubDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collection(self, info: CollectionInfo, documents: Vec<Document>) -> Self {
        self.add_collection(info, documents);
        self
    }

    /// Create a collection behind the gateway's back
    pub fn add_collection(&self, info: CollectionInfo, documents: Vec<Document>) {
        let mut data = self.data.lock().unwrap();
        data.documents.insert(info.name.clone(), documents);
        data.collections.push(info);
    }

    pub fn with_list_delay(mut self, delay: Duration) -> Self {
        self.list_delay = Some(delay);
        self
    }

    pub fn set_fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Driver for StubDriver {
    async fn connect(&self, service: &str, config: &ServiceConfig) -> Result<Arc<dyn DocumentStore>> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(GatewayError::ConnectionFailed {
                service: service.to_string(),
                cause: "connection refused".to_string(),
            });
        }
        self.counters.connects.fetch_add(1, Ordering::SeqCst);

        Ok(Arc::new(StubStore {
            driver: self.clone(),
            service: service.to_string(),
            database: config.database.clone(),
        }))
    }
}

pub struct StubStore {
    driver: StubDriver,
    service: String,
    database: String,
}

fn matches(doc: &Document, filter: &Document) -> bool {
    filter.iter().all(|(key, value)| doc.get(key) == Some(value))
}

#[async_trait]
impl DocumentStore for StubStore {
    fn database(&self) -> &str {
        &self.database
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        self.driver.counters.list_collections.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.driver.list_delay {
            tokio::time::sleep(delay).await;
        }
        if self.driver.fail_list.load(Ordering::SeqCst) {
            return Err(GatewayError::ConnectionFailed {
                service: self.service.clone(),
                cause: "listCollections failed".to_string(),
            });
        }
        Ok(self.driver.data.lock().unwrap().collections.clone())
    }

    async fn sample_documents(&self, collection: &str, size: u32) -> Result<Vec<Document>> {
        self.driver.counters.samples.fetch_add(1, Ordering::SeqCst);
        let data = self.driver.data.lock().unwrap();
        Ok(data
            .documents
            .get(collection)
            .map(|docs| docs.iter().take(size as usize).cloned().collect())
            .unwrap_or_default())
    }

    async fn find_documents(
        &self,
        collection: &str,
        filter: Document,
        limit: Option<i64>,
    ) -> Result<Vec<Document>> {
        let data = self.driver.data.lock().unwrap();
        let docs = data.documents.get(collection).cloned().unwrap_or_default();
        let limit = limit.map(|l| l as usize).unwrap_or(usize::MAX);
        Ok(docs.into_iter().filter(|d| matches(d, &filter)).take(limit).collect())
    }

    async fn insert_documents(&self, collection: &str, documents: Vec<Document>) -> Result<Vec<Bson>> {
        let mut data = self.driver.data.lock().unwrap();
        if !data.collections.iter().any(|c| c.name == collection) {
            data.collections.push(CollectionInfo::new(collection));
        }
        let target = data.documents.entry(collection.to_string()).or_default();
        let mut ids = Vec::new();
        for mut doc in documents {
            if !doc.contains_key("_id") {
                doc.insert("_id", ObjectId::new());
            }
            ids.push(doc.get("_id").cloned().unwrap_or(Bson::Null));
            target.push(doc);
        }
        Ok(ids)
    }

    async fn update_documents(&self, collection: &str, filter: Document, update: Document) -> Result<u64> {
        let mut data = self.driver.data.lock().unwrap();
        let set = update.get_document("$set").cloned().unwrap_or_default();
        let mut matched = 0;
        if let Some(docs) = data.documents.get_mut(collection) {
            for doc in docs.iter_mut().filter(|d| matches(d, &filter)) {
                matched += 1;
                for (key, value) in set.iter() {
                    doc.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(matched)
    }

    async fn delete_documents(&self, collection: &str, filter: Document) -> Result<u64> {
        let mut data = self.driver.data.lock().unwrap();
        let Some(docs) = data.documents.get_mut(collection) else {
            return Ok(0);
        };
        let before = docs.len();
        docs.retain(|d| !matches(d, &filter));
        Ok((before - docs.len()) as u64)
    }

    async fn disconnect(&self) -> Result<()> {
        self.driver.counters.disconnects.fetch_add(1, Ordering::SeqCst);
        if self.driver.fail_disconnect.load(Ordering::SeqCst) {
            return Err(GatewayError::Internal("socket already closed".to_string()));
        }
        Ok(())
    }
}
