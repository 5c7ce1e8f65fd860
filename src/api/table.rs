//! Table resource endpoints
//!
//! - GET /services/{service}/_table/{table}?limit=&filter= - Query records
//! - POST /services/{service}/_table/{table} - Insert one or many records
//! - GET /services/{service}/_table/{table}/{id} - Fetch one record
//! - PATCH /services/{service}/_table/{table}/{id} - Update fields of one record
//! - DELETE /services/{service}/_table/{table}/{id} - Delete one record
//!
//! Tables are addressed by name or alias. Records travel as relaxed
//! extended JSON, so `{"$oid": ...}` and `{"$date": ...}` round-trip.

use crate::api::AppState;
use crate::error::{GatewayError, Result};
use crate::service::MongoService;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use bson::{doc, oid::ObjectId, Bson, Document};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Default, Deserialize)]
pub struct ListRecordsQuery {
    #[serde(default)]
    pub limit: Option<i64>,
    /// Filter document as extended JSON
    #[serde(default)]
    pub filter: Option<String>,
}

fn to_json(document: Document) -> Value {
    Bson::Document(document).into_relaxed_extjson()
}

fn to_document(value: Value) -> Result<Document> {
    match Bson::try_from(value) {
        Ok(Bson::Document(document)) => Ok(document),
        Ok(other) => Err(GatewayError::InvalidRequest {
            message: format!("Expected a JSON object, got {:?}", other.element_type()),
        }),
        Err(e) => Err(GatewayError::InvalidRequest {
            message: format!("Invalid extended JSON: {}", e),
        }),
    }
}

/// 24-digit hex ids are matched as ObjectIds, anything else as a string
fn id_filter(id: &str) -> Document {
    match ObjectId::parse_str(id) {
        Ok(oid) => doc! { "_id": oid },
        Err(_) => doc! { "_id": id },
    }
}

/// Real collection name behind a table or alias. A miss rescans once so
/// collections created since the last scan are found.
async fn resolve_table(service: &MongoService, table: &str) -> Result<String> {
    match service.describe_table(table, false).await {
        Ok(descriptor) => Ok(descriptor.name.clone()),
        Err(GatewayError::TableNotFound { .. }) => {
            debug!("Table {} not cached for {}, rescanning", table, service.name());
            Ok(service.describe_table(table, true).await?.name.clone())
        }
        Err(e) => Err(e),
    }
}

async fn collection(state: &AppState, service: &str, table: &str) -> Result<(Arc<MongoService>, String)> {
    let service = state.manager.get(service)?;
    let name = resolve_table(&service, table).await?;
    Ok((service, name))
}

/// Collection names MongoDB will create on first insert
fn new_collection_name(table: &str) -> Result<String> {
    if table.is_empty() || table.contains('$') || table.contains('\0') || table.starts_with("system.") {
        return Err(GatewayError::InvalidRequest {
            message: format!("Invalid collection name: {}", table),
        });
    }
    Ok(table.to_string())
}

pub async fn list_records(
    State(state): State<Arc<AppState>>,
    Path((service, table)): Path<(String, String)>,
    Query(query): Query<ListRecordsQuery>,
) -> Result<Json<Value>> {
    let (service, collection) = collection(&state, &service, &table).await?;

    let filter = match query.filter.as_deref() {
        Some(raw) if !raw.trim().is_empty() => {
            let value: Value = serde_json::from_str(raw).map_err(|e| GatewayError::InvalidRequest {
                message: format!("Invalid filter: {}", e),
            })?;
            to_document(value)?
        }
        _ => Document::new(),
    };

    let limit = query
        .limit
        .filter(|l| *l > 0)
        .map_or(state.max_records, |l| l.min(state.max_records));

    let documents = service
        .connection()?
        .find_documents(&collection, filter, Some(limit))
        .await?;

    debug!("Fetched {} records from {}.{}", documents.len(), service.name(), collection);

    let records: Vec<Value> = documents.into_iter().map(to_json).collect();
    Ok(Json(json!({ "resource": records })))
}

pub async fn create_records(
    State(state): State<Arc<AppState>>,
    Path((service, table)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse> {
    let service = state.manager.get(&service)?;
    let (collection, created) = match resolve_table(&service, &table).await {
        Ok(name) => (name, false),
        Err(GatewayError::TableNotFound { .. }) => (new_collection_name(&table)?, true),
        Err(e) => return Err(e),
    };

    let records = match body {
        Value::Array(records) => records,
        Value::Object(mut object) => match object.remove("resource") {
            Some(Value::Array(records)) => records,
            Some(_) => {
                return Err(GatewayError::InvalidRequest {
                    message: "'resource' must be an array of records".to_string(),
                })
            }
            None => vec![Value::Object(object)],
        },
        _ => {
            return Err(GatewayError::InvalidRequest {
                message: "Expected a record or an array of records".to_string(),
            })
        }
    };

    if records.is_empty() {
        return Err(GatewayError::InvalidRequest {
            message: "No records to insert".to_string(),
        });
    }

    let documents = records
        .into_iter()
        .map(to_document)
        .collect::<Result<Vec<_>>>()?;

    let ids = service
        .connection()?
        .insert_documents(&collection, documents)
        .await?;

    info!("Inserted {} records into {}.{}", ids.len(), service.name(), collection);

    if created {
        service.refresh_table_cache()?;
    }

    let resource: Vec<Value> = ids
        .into_iter()
        .map(|id| json!({ "_id": id.into_relaxed_extjson() }))
        .collect();

    Ok((StatusCode::CREATED, Json(json!({ "resource": resource }))))
}

pub async fn get_record(
    State(state): State<Arc<AppState>>,
    Path((service, table, id)): Path<(String, String, String)>,
) -> Result<Json<Value>> {
    let (service, collection) = collection(&state, &service, &table).await?;

    service
        .connection()?
        .find_documents(&collection, id_filter(&id), Some(1))
        .await?
        .into_iter()
        .next()
        .map(|document| Json(to_json(document)))
        .ok_or_else(|| GatewayError::RecordNotFound {
            table: collection.clone(),
            id: id.clone(),
        })
}

pub async fn update_record(
    State(state): State<Arc<AppState>>,
    Path((service, table, id)): Path<(String, String, String)>,
    Json(body): Json<Value>,
) -> Result<Json<Value>> {
    let (service, collection) = collection(&state, &service, &table).await?;

    let mut changes = to_document(body)?;
    changes.remove("_id");
    if changes.is_empty() {
        return Err(GatewayError::InvalidRequest {
            message: "No fields to update".to_string(),
        });
    }

    let connection = service.connection()?;
    let matched = connection
        .update_documents(&collection, id_filter(&id), doc! { "$set": changes })
        .await?;

    if matched == 0 {
        return Err(GatewayError::RecordNotFound { table: collection, id });
    }

    connection
        .find_documents(&collection, id_filter(&id), Some(1))
        .await?
        .into_iter()
        .next()
        .map(|document| Json(to_json(document)))
        .ok_or_else(|| GatewayError::RecordNotFound {
            table: collection.clone(),
            id: id.clone(),
        })
}

pub async fn delete_record(
    State(state): State<Arc<AppState>>,
    Path((service, table, id)): Path<(String, String, String)>,
) -> Result<Json<Value>> {
    let (service, collection) = collection(&state, &service, &table).await?;

    let deleted = service
        .connection()?
        .delete_documents(&collection, id_filter(&id))
        .await?;

    if deleted == 0 {
        return Err(GatewayError::RecordNotFound { table: collection, id });
    }

    info!("Deleted record {} from {}.{}", id, service.name(), collection);
    Ok(Json(json!({ "_id": id })))
}
