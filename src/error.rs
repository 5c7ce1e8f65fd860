use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Configuration error for service {service}: {message}")]
    Configuration { service: String, message: String },

    #[error("Connection failed for service {service}: {cause}")]
    ConnectionFailed { service: String, cause: String },

    #[error("Query failed on {collection} in service {service}: {cause}")]
    QueryFailed {
        service: String,
        collection: String,
        cause: String,
    },

    #[error("Service {service}: {component} has not been initialized")]
    NotInitialized {
        service: String,
        component: &'static str,
    },

    #[error("Service not found: {service}")]
    ServiceNotFound { service: String },

    #[error("Table not found in service {service}: {table}")]
    TableNotFound { service: String, table: String },

    #[error("Record {id} not found in {table}")]
    RecordNotFound { table: String, id: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn no_database(service: &str) -> Self {
        GatewayError::Configuration {
            service: service.to_string(),
            message: "No MongoDb database selected in configuration.".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            GatewayError::Configuration { service, message } => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error: "configuration_error".to_string(),
                    message: message.clone(),
                    service: Some(service.clone()),
                    cause: None,
                },
            ),
            GatewayError::ConnectionFailed { service, cause } => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorResponse {
                    error: "connection_failed".to_string(),
                    message: format!("Failed to connect to database for service '{}'", service),
                    service: Some(service.clone()),
                    cause: Some(cause.clone()),
                },
            ),
            GatewayError::QueryFailed {
                service,
                collection,
                cause,
            } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse {
                    error: "query_failed".to_string(),
                    message: format!("Operation on collection '{}' failed", collection),
                    service: Some(service.clone()),
                    cause: Some(cause.clone()),
                },
            ),
            GatewayError::NotInitialized { service, component } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse {
                    error: "internal_error".to_string(),
                    message: format!("Database {} has not been initialized.", component),
                    service: Some(service.clone()),
                    cause: None,
                },
            ),
            GatewayError::ServiceNotFound { service } => (
                StatusCode::NOT_FOUND,
                ErrorResponse {
                    error: "service_not_found".to_string(),
                    message: format!("Service '{}' is not active", service),
                    service: Some(service.clone()),
                    cause: None,
                },
            ),
            GatewayError::TableNotFound { service, table } => (
                StatusCode::NOT_FOUND,
                ErrorResponse {
                    error: "table_not_found".to_string(),
                    message: format!("Table '{}' does not exist in the database", table),
                    service: Some(service.clone()),
                    cause: None,
                },
            ),
            GatewayError::RecordNotFound { table, id } => (
                StatusCode::NOT_FOUND,
                ErrorResponse {
                    error: "record_not_found".to_string(),
                    message: format!("Record '{}' not found in table '{}'", id, table),
                    service: None,
                    cause: None,
                },
            ),
            GatewayError::InvalidRequest { message } => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error: "invalid_request".to_string(),
                    message: message.clone(),
                    service: None,
                    cause: None,
                },
            ),
            GatewayError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse {
                    error: "internal_error".to_string(),
                    message: msg.clone(),
                    service: None,
                    cause: None,
                },
            ),
        };

        (status, Json(error_response)).into_response()
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        GatewayError::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Internal(format!("JSON error: {}", err))
    }
}

impl From<anyhow::Error> for GatewayError {
    fn from(err: anyhow::Error) -> Self {
        GatewayError::Internal(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
