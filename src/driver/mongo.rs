//! MongoDB implementation of the driver capability

use crate::driver::{CollectionInfo, DocumentStore, Driver};
use crate::error::{GatewayError, Result};
use crate::service::{DriverContext, ServiceConfig};
use async_trait::async_trait;
use bson::{doc, Bson, Document};
use futures::TryStreamExt;
use mongodb::options::{ClientOptions, Tls, TlsOptions};
use mongodb::{Client, Collection, Database};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct MongoDriver;

impl MongoDriver {
    pub fn new() -> Self {
        Self
    }

    async fn client_options(&self, service: &str, config: &ServiceConfig) -> Result<ClientOptions> {
        let uri = config.connection_uri();
        let mut options = ClientOptions::parse(uri.as_str())
            .await
            .map_err(|e| GatewayError::Configuration {
                service: service.to_string(),
                message: format!("Failed to parse MongoDB connection string: {}", e),
            })?;

        if let Some(context) = &config.driver_options.context {
            apply_context(service, &mut options, context);
        }

        if options.app_name.is_none() {
            if let Some(app_name) = config.driver_options.extra.get("appname").and_then(|v| v.as_str()) {
                options.app_name = Some(app_name.to_string());
            }
        }

        Ok(options)
    }
}

impl Default for MongoDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Driver for MongoDriver {
    async fn connect(&self, service: &str, config: &ServiceConfig) -> Result<Arc<dyn DocumentStore>> {
        debug!("Connecting service {} to {}", service, config.redacted_dsn());

        let options = self.client_options(service, config).await?;

        let client = Client::with_options(options).map_err(|e| GatewayError::ConnectionFailed {
            service: service.to_string(),
            cause: e.to_string(),
        })?;

        let store = MongoStore::new(service, client, &config.database);
        store.ping().await?;

        info!("Connected service {} to database {}", service, config.database);

        Ok(Arc::new(store))
    }
}

fn apply_context(service: &str, options: &mut ClientOptions, context: &DriverContext) {
    let Some(tls) = &context.tls else {
        return;
    };

    if tls.allow_invalid_hostnames {
        warn!(
            "Service {}: verify_peer_name=false is not supported by the TLS backend, hostnames will be verified",
            service
        );
    }

    let tls_options = TlsOptions::builder()
        .allow_invalid_certificates(tls.allow_invalid_certificates)
        .ca_file_path(tls.ca_file.clone())
        .cert_key_file_path(tls.cert_key_file.clone())
        .build();

    options.tls = Some(Tls::Enabled(tls_options));
}

pub struct MongoStore {
    service: String,
    client: Client,
    database: String,
}

impl MongoStore {
    pub fn new(service: &str, client: Client, database: &str) -> Self {
        Self {
            service: service.to_string(),
            client,
            database: database.to_string(),
        }
    }

    fn db(&self) -> Database {
        self.client.database(&self.database)
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.db().collection::<Document>(name)
    }

    fn query_failed(&self, collection: &str, err: mongodb::error::Error) -> GatewayError {
        GatewayError::QueryFailed {
            service: self.service.clone(),
            collection: collection.to_string(),
            cause: err.to_string(),
        }
    }

    fn connection_failed(&self, err: mongodb::error::Error) -> GatewayError {
        GatewayError::ConnectionFailed {
            service: self.service.clone(),
            cause: err.to_string(),
        }
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    fn database(&self) -> &str {
        &self.database
    }

    async fn ping(&self) -> Result<()> {
        self.db()
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| self.connection_failed(e))?;
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        let specs: Vec<_> = self
            .db()
            .list_collections()
            .await
            .map_err(|e| self.connection_failed(e))?
            .try_collect()
            .await
            .map_err(|e| self.connection_failed(e))?;

        let collections = specs
            .into_iter()
            .filter(|spec| !spec.name.starts_with("system."))
            .map(|spec| {
                let json_schema = spec
                    .options
                    .validator
                    .as_ref()
                    .and_then(|validator| validator.get_document("$jsonSchema").ok())
                    .cloned();

                CollectionInfo {
                    name: spec.name,
                    json_schema,
                }
            })
            .collect();

        Ok(collections)
    }

    async fn sample_documents(&self, collection: &str, size: u32) -> Result<Vec<Document>> {
        let pipeline = vec![doc! { "$sample": { "size": i64::from(size) } }];

        self.collection(collection)
            .aggregate(pipeline)
            .await
            .map_err(|e| self.query_failed(collection, e))?
            .try_collect()
            .await
            .map_err(|e| self.query_failed(collection, e))
    }

    async fn find_documents(
        &self,
        collection: &str,
        filter: Document,
        limit: Option<i64>,
    ) -> Result<Vec<Document>> {
        let coll = self.collection(collection);
        let mut find = coll.find(filter);
        if let Some(limit) = limit {
            find = find.limit(limit);
        }

        find.await
            .map_err(|e| self.query_failed(collection, e))?
            .try_collect()
            .await
            .map_err(|e| self.query_failed(collection, e))
    }

    async fn insert_documents(&self, collection: &str, documents: Vec<Document>) -> Result<Vec<Bson>> {
        let result = self
            .collection(collection)
            .insert_many(documents)
            .await
            .map_err(|e| self.query_failed(collection, e))?;

        let mut ids: Vec<(usize, Bson)> = result.inserted_ids.into_iter().collect();
        ids.sort_by_key(|(index, _)| *index);

        Ok(ids.into_iter().map(|(_, id)| id).collect())
    }

    async fn update_documents(&self, collection: &str, filter: Document, update: Document) -> Result<u64> {
        let result = self
            .collection(collection)
            .update_many(filter, update)
            .await
            .map_err(|e| self.query_failed(collection, e))?;

        Ok(result.matched_count)
    }

    async fn delete_documents(&self, collection: &str, filter: Document) -> Result<u64> {
        let result = self
            .collection(collection)
            .delete_many(filter)
            .await
            .map_err(|e| self.query_failed(collection, e))?;

        Ok(result.deleted_count)
    }

    async fn disconnect(&self) -> Result<()> {
        self.client.clone().shutdown().await;
        debug!("Disconnected service {}", self.service);
        Ok(())
    }
}
