//! Raw driver capability
//!
//! The gateway talks to the document store only through these traits so the
//! configurator, registry and schema resolver can run against a stub in tests.

mod mongo;
#[cfg(test)]
pub(crate) mod testing;

pub use mongo::{MongoDriver, MongoStore};

use crate::error::Result;
use crate::service::ServiceConfig;
use async_trait::async_trait;
use bson::{Bson, Document};
use std::sync::Arc;

/// A collection as reported by the store
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionInfo {
    pub name: String,
    /// `$jsonSchema` validator attached to the collection, if any
    pub json_schema: Option<Document>,
}

impl CollectionInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            json_schema: None,
        }
    }

    pub fn with_json_schema(mut self, schema: Document) -> Self {
        self.json_schema = Some(schema);
        self
    }
}

/// An open connection to one database
#[async_trait]
pub trait DocumentStore: Send + Sync {
    fn database(&self) -> &str;

    async fn ping(&self) -> Result<()>;

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>>;

    async fn sample_documents(&self, collection: &str, size: u32) -> Result<Vec<Document>>;

    async fn find_documents(
        &self,
        collection: &str,
        filter: Document,
        limit: Option<i64>,
    ) -> Result<Vec<Document>>;

    async fn insert_documents(&self, collection: &str, documents: Vec<Document>) -> Result<Vec<Bson>>;

    /// Returns the number of matched documents
    async fn update_documents(&self, collection: &str, filter: Document, update: Document) -> Result<u64>;

    /// Returns the number of deleted documents
    async fn delete_documents(&self, collection: &str, filter: Document) -> Result<u64>;

    async fn disconnect(&self) -> Result<()>;
}

#[async_trait]
pub trait Driver: Send + Sync {
    async fn connect(&self, service: &str, config: &ServiceConfig) -> Result<Arc<dyn DocumentStore>>;
}
