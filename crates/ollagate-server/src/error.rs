//! Gateway error kinds and their single point of status-code mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{error, warn};

use crate::disk::DiskReport;

pub enum GatewayError {
    /// Malformed client input; nothing was persisted.
    BadRequest(String),
    /// Daily per-IP quota exhausted.
    QuotaExceeded { limit: u32 },
    /// Disk guard reported critical usage or could not be evaluated.
    InsufficientStorage { report: DiskReport, threshold: u8 },
    /// Queue entry to delete does not exist (or is already processing).
    NotFound(String),
    /// The backend could not be reached.
    BackendUnavailable(String),
    /// Anything unexpected.
    Internal(anyhow::Error),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        match self {
            GatewayError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            GatewayError::QuotaExceeded { limit } => (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({
                    "error": "Rate limit exceeded",
                    "message": format!("Maximum {} model requests per day", limit),
                    "remaining": 0,
                })),
            )
                .into_response(),
            GatewayError::InsufficientStorage { report, threshold } => (
                StatusCode::INSUFFICIENT_STORAGE,
                Json(json!({
                    "error": "Insufficient storage",
                    "message": format!(
                        "Disk usage at {}% (threshold: {}%)",
                        report
                            .used_percent
                            .map(|p| p.to_string())
                            .unwrap_or_else(|| "?".to_string()),
                        threshold
                    ),
                    "disk": report,
                })),
            )
                .into_response(),
            GatewayError::NotFound(message) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "status": "not_found", "message": message })),
            )
                .into_response(),
            GatewayError::BackendUnavailable(detail) => {
                warn!("Backend unavailable: {}", detail);
                (
                    StatusCode::BAD_GATEWAY,
                    Json(json!({ "error": "Backend unavailable", "detail": detail })),
                )
                    .into_response()
            }
            GatewayError::Internal(e) => {
                error!("Request error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Internal proxy error", "detail": e.to_string() })),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for GatewayError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        GatewayError::Internal(err.into())
    }
}
