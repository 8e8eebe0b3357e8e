use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose, Engine as _};
use serde_json::json;
use std::sync::Arc;

use crate::metrics;
use crate::services::whatsapp_client::MessagingError;
use crate::services::AppState;
use crate::store::StoreError;

pub mod classrooms;
pub mod evaluations;
pub mod lifecycle;
pub mod programs;
pub mod users;
pub mod whatsapp;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    BadGateway(String),
    ServiceUnavailable(String),
    Internal(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }
}

/// Store failures are 500, provider failures 502, "... not found" is 404
/// and any other service refusal is a 400.
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        let message = format!("{:#}", err);

        match err.downcast_ref::<StoreError>() {
            Some(StoreError::NotFound { .. }) => return ApiError::NotFound(message),
            Some(_) => {
                tracing::error!("Store failure: {}", message);
                return ApiError::Internal(message);
            }
            None => {}
        }

        if err.downcast_ref::<MessagingError>().is_some() {
            return ApiError::BadGateway(message);
        }

        if err.to_string().contains("not found") {
            ApiError::NotFound(message)
        } else {
            ApiError::BadRequest(message)
        }
    }
}

impl From<MessagingError> for ApiError {
    fn from(err: MessagingError) -> Self {
        match err {
            MessagingError::InvalidPhone(_) => ApiError::BadRequest(err.to_string()),
            other => ApiError::BadGateway(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::BadGateway(message) => (StatusCode::BAD_GATEWAY, message),
            ApiError::ServiceUnavailable(message) => (StatusCode::SERVICE_UNAVAILABLE, message),
            ApiError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };
        let json_response = json!({
            "message": message,
            "status": status.as_u16()
        });
        (status, Json(json_response)).into_response()
    }
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let store_health = match tokio::time::timeout(
        std::time::Duration::from_secs(1),
        state.store.ping(),
    )
    .await
    {
        Ok(Ok(())) => json!({
            "status": "healthy",
            "backend": state.store.backend_name(),
        }),
        Ok(Err(e)) => json!({
            "status": "unhealthy",
            "backend": state.store.backend_name(),
            "error": e.to_string(),
        }),
        Err(_) => json!({
            "status": "unhealthy",
            "backend": state.store.backend_name(),
            "error": "Store ping timeout after 1s",
        }),
    };

    let healthy = store_health["status"] == "healthy";
    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(json!({
            "status": if healthy { "healthy" } else { "degraded" },
            "service": "classroom-api",
            "version": env!("CARGO_PKG_VERSION"),
            "dependencies": {
                "store": store_health,
                "whatsapp": { "configured": state.whatsapp.is_some() },
            }
        })),
    )
}

pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::render_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to render metrics: {}", e),
        ),
    }
}

/// HTTP Basic auth for /metrics; credentials come from METRICS_AUTH (user:password)
pub async fn metrics_auth_middleware(
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let encoded = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let decoded = general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;
    let credentials = String::from_utf8(decoded).map_err(|_| StatusCode::UNAUTHORIZED)?;

    let expected = std::env::var("METRICS_AUTH").unwrap_or_else(|_| "admin:changeme".to_string());
    if credentials != expected {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(request).await)
}
