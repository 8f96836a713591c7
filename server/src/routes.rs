use axum::{middleware, routing, Json, Router};

use crate::auth::middleware::JwtSecret;
use crate::auth::profile;
use crate::rooms::crud as room_crud;
use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Inject the JWT secret into request extensions so the Claims extractor can find it.
async fn inject_jwt_secret(
    axum::extract::State(state): axum::extract::State<AppState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: middleware::Next,
) -> axum::response::Response {
    req.extensions_mut()
        .insert(JwtSecret(state.jwt_secret.clone()));
    next.run(req).await
}

/// Build the full axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/", routing::get(index))
        .route("/api/health", routing::get(api_health))
        .route("/health", routing::get(health_check));

    // Authenticated routes (JWT required, Claims extractor validates token).
    // /api/rooms/history is a fixed path and coexists with /api/rooms/{room_id}/...
    let room_routes = Router::new()
        .route("/api/user", routing::get(profile::get_current_user))
        .route("/api/rooms", routing::post(room_crud::create_room))
        .route("/api/rooms/history", routing::get(room_crud::room_history))
        .route("/api/rooms/{room_id}/join", routing::post(room_crud::join_room))
        .route("/api/rooms/{room_id}/messages", routing::get(room_crud::room_messages))
        .route("/api/rooms/{room_id}/status", routing::get(room_crud::room_status));

    // WebSocket endpoint (auth is in-band, not via header)
    let ws_routes = Router::new().route("/ws", routing::get(ws_handler::ws_upgrade));

    Router::new()
        .merge(public_routes)
        .merge(room_routes)
        .merge(ws_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            inject_jwt_secret,
        ))
        .with_state(state)
}

/// GET /
/// Service banner
async fn index() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Chat Relay API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Multi-room WebSocket chat relay",
    }))
}

/// GET /api/health
async fn api_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": crate::db::store::now_timestamp(),
    }))
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
