//! Schema resource endpoints
//!
//! - GET /services/{service}/_schema?refresh=&as_alias= - List tables
//! - DELETE /services/{service}/_schema - Drop cached descriptors
//! - GET /services/{service}/_schema/{table}?refresh= - Describe one table
//! - PUT /services/{service}/_schema/{table}/extras - Store table extras

use crate::api::AppState;
use crate::error::{GatewayError, Result};
use crate::schema::{SchemaDescriptor, SchemaFilter, TableExtras, TableNames};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Default, Deserialize)]
pub struct ListTablesQuery {
    #[serde(default)]
    pub refresh: bool,
    #[serde(default)]
    pub as_alias: bool,
    #[serde(default)]
    pub schema: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DescribeQuery {
    #[serde(default)]
    pub refresh: bool,
}

pub async fn list_tables(
    State(state): State<Arc<AppState>>,
    Path(service): Path<String>,
    Query(query): Query<ListTablesQuery>,
) -> Result<Json<Value>> {
    let service = state.manager.get(&service)?;
    let filter = SchemaFilter::from(query.schema.as_deref());

    let names = service
        .get_table_names(&filter, query.refresh, query.as_alias)
        .await?;

    let resource = match names {
        TableNames::Ordered(tables) => serde_json::to_value(tables)?,
        TableNames::Aliased(tables) => serde_json::to_value(tables)?,
    };

    Ok(Json(json!({ "resource": resource })))
}

pub async fn refresh_schema(
    State(state): State<Arc<AppState>>,
    Path(service): Path<String>,
) -> Result<Json<Value>> {
    state.manager.get(&service)?.refresh_table_cache()?;

    Ok(Json(json!({ "status": "invalidated", "service": service })))
}

pub async fn describe_table(
    State(state): State<Arc<AppState>>,
    Path((service, table)): Path<(String, String)>,
    Query(query): Query<DescribeQuery>,
) -> Result<Json<Arc<SchemaDescriptor>>> {
    let service = state.manager.get(&service)?;
    Ok(Json(service.describe_table(&table, query.refresh).await?))
}

pub async fn put_extras(
    State(state): State<Arc<AppState>>,
    Path((service, table)): Path<(String, String)>,
    Json(extras): Json<TableExtras>,
) -> Result<Json<Arc<SchemaDescriptor>>> {
    let service = state.manager.get(&service)?;

    // Extras are keyed by the real collection name, never the alias
    let descriptor = service.describe_table(&table, false).await?;
    let name = descriptor.name.clone();

    // An alias may not shadow another table's name or alias
    if let Some(alias) = &extras.alias {
        match service.describe_table(alias, false).await {
            Ok(other) if other.name != name => {
                return Err(GatewayError::InvalidRequest {
                    message: format!("Alias '{}' is already used by table '{}'", alias, other.name),
                });
            }
            Ok(_) | Err(GatewayError::TableNotFound { .. }) => {}
            Err(e) => return Err(e),
        }
    }

    state
        .manager
        .context()
        .extras
        .put(service.name(), &name, extras)?;
    service.refresh_table_cache()?;

    info!("Stored extras for {}.{}", service.name(), name);

    Ok(Json(service.describe_table(&name, false).await?))
}

#[cfg(test)]
mod tests {
    use crate::api::testing::{app, send};
    use crate::driver::testing::StubDriver;
    use crate::driver::CollectionInfo;
    use axum::http::StatusCode;
    use bson::doc;
    use serde_json::json;

    fn driver() -> StubDriver {
        StubDriver::new()
            .with_collection(
                CollectionInfo::new("orders"),
                vec![doc! { "_id": "o1", "qty": 2, "status": "open" }],
            )
            .with_collection(CollectionInfo::new("customers"), vec![doc! { "_id": "c1", "name": "Ada" }])
    }

    async fn activate(app: &axum::Router) {
        let (status, _) = send(
            app,
            "POST",
            "/services",
            Some(json!({ "name": "mongo", "config": { "dsn": "localhost:27017/shop" } })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_list_and_describe_tables() {
        let driver = driver();
        let (app, _) = app(&driver);
        activate(&app).await;

        let (status, body) = send(&app, "GET", "/services/mongo/_schema", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["resource"][0]["name"], "orders");
        assert_eq!(body["resource"][1]["name"], "customers");

        let (status, body) = send(&app, "GET", "/services/mongo/_schema/ORDERS", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "orders");
        assert_eq!(body["fields"][0]["name"], "_id");
        assert_eq!(body["fields"][0]["is_primary_key"], true);

        let (status, body) = send(&app, "GET", "/services/mongo/_schema/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "table_not_found");
        assert_eq!(driver.counters.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_extras_override_and_alias_listing() {
        let (app, _) = app(&driver());
        activate(&app).await;

        let (status, body) = send(
            &app,
            "PUT",
            "/services/mongo/_schema/orders/extras",
            Some(json!({
                "alias": "Purchases",
                "label": "Purchase",
                "fields": { "qty": { "label": "Quantity" } }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["label"], "Purchase");
        assert_eq!(body["fields"][1]["name"], "qty");
        assert_eq!(body["fields"][1]["label"], "Quantity");

        let (status, body) = send(&app, "GET", "/services/mongo/_schema?as_alias=true", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["resource"]["purchases"]["name"], "orders");
        assert_eq!(body["resource"]["customers"]["name"], "customers");
    }

    #[tokio::test]
    async fn test_alias_taken_by_another_table_is_rejected() {
        let (app, _) = app(&driver());
        activate(&app).await;

        let (status, body) = send(
            &app,
            "PUT",
            "/services/mongo/_schema/customers/extras",
            Some(json!({ "alias": "Orders" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_request");

        let (status, body) = send(&app, "GET", "/services/mongo/_schema?as_alias=true", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["resource"]["orders"]["name"], "orders");
        assert_eq!(body["resource"]["customers"]["name"], "customers");
    }

    #[tokio::test]
    async fn test_invalidate_rescans_on_next_read() {
        let driver = driver();
        let (app, _) = app(&driver);
        activate(&app).await;

        send(&app, "GET", "/services/mongo/_schema", None).await;
        let (status, _) = send(&app, "DELETE", "/services/mongo/_schema", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(driver.counters.list_calls(), 1);

        send(&app, "GET", "/services/mongo/_schema", None).await;
        assert_eq!(driver.counters.list_calls(), 2);
    }

    #[tokio::test]
    async fn test_unknown_service() {
        let (app, _) = app(&StubDriver::new());
        let (status, _) = send(&app, "GET", "/services/ghost/_schema", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
