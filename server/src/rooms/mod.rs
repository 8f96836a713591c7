pub mod crud;

use axum::{http::StatusCode, Json};

use crate::db::StoreError;

/// JSON error rejection: `{"error": "..."}` with a status code.
pub type ApiError = (StatusCode, Json<serde_json::Value>);

pub fn api_error(status: StatusCode, message: &str) -> ApiError {
    (status, Json(serde_json::json!({ "error": message })))
}

/// Log a store failure and turn it into a 500.
pub fn internal_error(err: StoreError) -> ApiError {
    tracing::error!(error = %err, "Store operation failed");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}
