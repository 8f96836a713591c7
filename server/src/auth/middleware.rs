use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};

/// JWT claims carried by access tokens.
/// Implements axum's FromRequestParts for use as an extractor on REST routes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    #[serde(rename = "userId")]
    pub user_id: String,
    pub email: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

type Rejection = (StatusCode, Json<serde_json::Value>);

fn reject(status: StatusCode, message: &str) -> Rejection {
    (status, Json(serde_json::json!({ "error": message })))
}

impl<S> FromRequestParts<S> for Claims
where
    S: Send + Sync,
{
    type Rejection = Rejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| reject(StatusCode::UNAUTHORIZED, "Unauthorized"))?;

        // Set by the inject_jwt_secret middleware layer
        let jwt_secret = parts
            .extensions
            .get::<JwtSecret>()
            .ok_or_else(|| reject(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"))?;

        crate::auth::jwt::validate_access_token(&jwt_secret.0, token)
            .map_err(|_| reject(StatusCode::UNAUTHORIZED, "Invalid token"))
    }
}

/// JWT secret stored in request extensions for the Claims extractor
#[derive(Clone)]
pub struct JwtSecret(pub std::sync::Arc<Vec<u8>>);
