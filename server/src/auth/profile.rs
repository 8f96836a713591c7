use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::auth::middleware::Claims;
use crate::rooms::{api_error, internal_error, ApiError};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
}

/// GET /api/user
/// Profile of the token's user.
pub async fn get_current_user(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<UserResponse>, ApiError> {
    let user_id = claims.user_id;
    let user = state
        .with_store(move |store| store.find_user_by_id(&user_id))
        .await
        .map_err(internal_error)?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "User not found"))?;

    Ok(Json(UserResponse {
        id: user.id,
        email: user.email,
        name: user.name,
        picture: user.picture,
    }))
}
