//! HTTP API
//!
//! - GET /health
//! - GET, POST /services
//! - GET, DELETE /services/{service}
//! - GET, DELETE /services/{service}/_schema
//! - GET /services/{service}/_schema/{table}
//! - PUT /services/{service}/_schema/{table}/extras
//! - GET, POST /services/{service}/_table/{table}
//! - GET, PATCH, DELETE /services/{service}/_table/{table}/{id}

mod health;
mod schema;
mod services;
mod table;

pub use health::health_check;

use crate::service::ServiceManager;
use axum::{
    routing::{get, put},
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;

/// Shared state for all endpoints
pub struct AppState {
    pub manager: Arc<ServiceManager>,
    pub started_at: Instant,
    pub max_records: i64,
}

impl AppState {
    pub fn new(manager: Arc<ServiceManager>, max_records: i64) -> Self {
        Self {
            manager,
            started_at: Instant::now(),
            max_records,
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(
            "/services",
            get(services::list_services).post(services::create_service),
        )
        .route(
            "/services/:service",
            get(services::get_service).delete(services::delete_service),
        )
        .route(
            "/services/:service/_schema",
            get(schema::list_tables).delete(schema::refresh_schema),
        )
        .route("/services/:service/_schema/:table", get(schema::describe_table))
        .route(
            "/services/:service/_schema/:table/extras",
            put(schema::put_extras),
        )
        .route(
            "/services/:service/_table/:table",
            get(table::list_records).post(table::create_records),
        )
        .route(
            "/services/:service/_table/:table/:id",
            get(table::get_record)
                .patch(table::update_record)
                .delete(table::delete_record),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::driver::testing::StubDriver;
    use crate::service::tests::context;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    pub(crate) fn app(driver: &StubDriver) -> (Router, Arc<ServiceManager>) {
        let manager = Arc::new(ServiceManager::new(context(driver), None));
        let state = Arc::new(AppState::new(manager.clone(), 100));
        (router(state), manager)
    }

    pub(crate) async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }
}
