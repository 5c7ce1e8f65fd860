//! Service administration endpoints
//!
//! - GET /services - List active services
//! - POST /services - Activate (or reconfigure) a service
//! - GET /services/{service} - Service details and resources
//! - DELETE /services/{service}?forget=true - Deactivate a service

use crate::api::AppState;
use crate::error::Result;
use crate::service::{MongoService, RawSettings, ResourceInfo, ServiceState};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct CreateServiceRequest {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub config: Value,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteServiceQuery {
    #[serde(default)]
    pub forget: bool,
}

#[derive(Serialize)]
pub struct ServiceSummary {
    name: String,
    label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    state: ServiceState,
    #[serde(skip_serializing_if = "Option::is_none")]
    database: Option<String>,
    resources: Vec<ResourceInfo>,
}

impl From<&MongoService> for ServiceSummary {
    fn from(service: &MongoService) -> Self {
        Self {
            name: service.name().to_string(),
            label: service.label().to_string(),
            description: service.description().map(str::to_string),
            state: service.state(),
            database: service.config().ok().map(|c| c.database),
            resources: service.resources(),
        }
    }
}

pub async fn list_services(State(state): State<Arc<AppState>>) -> Json<Value> {
    let services: Vec<ServiceSummary> = state
        .manager
        .list()
        .iter()
        .map(|s| ServiceSummary::from(s.as_ref()))
        .collect();

    Json(serde_json::json!({ "resource": services }))
}

pub async fn create_service(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateServiceRequest>,
) -> Result<impl IntoResponse> {
    let settings = RawSettings {
        label: request.label,
        description: request.description,
        config: request.config,
    };

    let service = state.manager.activate(&request.name, settings, true).await?;

    info!("Service {} activated via API", request.name);

    Ok((StatusCode::CREATED, Json(ServiceSummary::from(service.as_ref()))))
}

pub async fn get_service(
    State(state): State<Arc<AppState>>,
    Path(service): Path<String>,
) -> Result<Json<ServiceSummary>> {
    let service = state.manager.get(&service)?;
    Ok(Json(ServiceSummary::from(service.as_ref())))
}

pub async fn delete_service(
    State(state): State<Arc<AppState>>,
    Path(service): Path<String>,
    Query(query): Query<DeleteServiceQuery>,
) -> Result<impl IntoResponse> {
    state.manager.deactivate(&service, query.forget).await?;

    Ok(Json(serde_json::json!({
        "status": "deactivated",
        "service": service,
        "forgotten": query.forget,
    })))
}

#[cfg(test)]
mod tests {
    use crate::api::testing::{app, send};
    use crate::driver::testing::StubDriver;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_service_lifecycle() {
        let driver = StubDriver::new();
        let (app, _) = app(&driver);

        let (status, body) = send(
            &app,
            "POST",
            "/services",
            Some(json!({
                "name": "mongo",
                "label": "Orders",
                "config": { "dsn": "localhost:27017/shop" }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["state"], "ready");
        assert_eq!(body["database"], "shop");
        assert_eq!(body["resources"][0]["name"], "_schema");

        let (status, body) = send(&app, "GET", "/services", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["resource"].as_array().unwrap().len(), 1);

        let (status, body) = send(&app, "GET", "/services/mongo", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["label"], "Orders");

        let (status, _) = send(&app, "DELETE", "/services/mongo", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(driver.counters.disconnects(), 1);

        let (status, body) = send(&app, "GET", "/services/mongo", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "service_not_found");
    }

    #[tokio::test]
    async fn test_create_without_database_is_rejected() {
        let (app, manager) = app(&StubDriver::new());

        let (status, body) = send(
            &app,
            "POST",
            "/services",
            Some(json!({ "name": "mongo", "config": { "dsn": "mongodb://host:27017" } })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "No MongoDb database selected in configuration.");
        assert_eq!(manager.active_services(), 0);
    }
}
