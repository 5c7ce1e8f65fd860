use crate::api::AppState;
use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    active_services: usize,
    open_connections: usize,
    uptime_seconds: u64,
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let registry = state.manager.context().configurator.registry();
    let active_services = state.manager.active_services();
    let open_connections = registry.active_connections().await;

    Json(HealthResponse {
        status: if open_connections < active_services {
            "degraded".to_string()
        } else {
            "healthy".to_string()
        },
        active_services,
        open_connections,
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

#[cfg(test)]
mod tests {
    use crate::api::testing::{app, send};
    use crate::driver::testing::StubDriver;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_health_without_services() {
        let (app, _) = app(&StubDriver::new());
        let (status, body) = send(&app, "GET", "/health", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["active_services"], 0);
    }
}
