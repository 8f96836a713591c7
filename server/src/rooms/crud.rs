//! REST endpoints for rooms: create, join, per-user history, messages, status.
//! All require a bearer token.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use super::{api_error, internal_error, ApiError};
use crate::auth::middleware::Claims;
use crate::db::models::Room;
use crate::state::AppState;

// --- Response types ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomResponse {
    pub id: String,
    pub created_at: String,
}

impl From<Room> for RoomResponse {
    fn from(room: Room) -> Self {
        Self {
            id: room.id,
            created_at: room.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateRoomResponse {
    pub room: RoomResponse,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantResponse {
    pub joined_at: String,
    pub last_access_at: String,
}

#[derive(Debug, Serialize)]
pub struct JoinRoomResponse {
    pub room: RoomResponse,
    pub participant: ParticipantResponse,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomVisitResponse {
    pub id: String,
    pub joined_at: String,
    pub last_access_at: String,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct RoomHistoryResponse {
    pub rooms: Vec<RoomVisitResponse>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub id: String,
    pub text: String,
    pub user: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct MessageListResponse {
    pub messages: Vec<MessageResponse>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStatusResponse {
    pub room_id: String,
    pub exists: bool,
    pub is_joined: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub joined_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_access_at: Option<String>,
}

// --- Handlers ---

/// POST /api/rooms
/// Create a room with a fresh UUID.
pub async fn create_room(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<CreateRoomResponse>, ApiError> {
    let room_id = Uuid::new_v4().to_string();
    let room = state
        .with_store(move |store| store.create_room(&room_id))
        .await
        .map_err(internal_error)?;

    tracing::info!(user_id = %claims.user_id, room_id = %room.id, "Room created");

    Ok(Json(CreateRoomResponse { room: room.into() }))
}

/// POST /api/rooms/{room_id}/join
/// Record participation, creating the room if needed.
pub async fn join_room(
    State(state): State<AppState>,
    claims: Claims,
    Path(room_id): Path<String>,
) -> Result<Json<JoinRoomResponse>, ApiError> {
    if room_id.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Invalid room id"));
    }

    let user_id = claims.user_id.clone();
    let (room, participant) = state
        .with_store(move |store| {
            let room = store.ensure_room(&room_id)?;
            let participant = store.upsert_participation(&user_id, &room_id)?;
            Ok((room, participant))
        })
        .await
        .map_err(internal_error)?;

    Ok(Json(JoinRoomResponse {
        room: room.into(),
        participant: ParticipantResponse {
            joined_at: participant.joined_at,
            last_access_at: participant.last_access_at,
        },
    }))
}

/// GET /api/rooms/history
/// Rooms the caller has joined, most recent first.
pub async fn room_history(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<RoomHistoryResponse>, ApiError> {
    let user_id = claims.user_id;
    let visits = state
        .with_store(move |store| store.user_room_history(&user_id))
        .await
        .map_err(internal_error)?;

    Ok(Json(RoomHistoryResponse {
        rooms: visits
            .into_iter()
            .map(|v| RoomVisitResponse {
                id: v.room.id,
                joined_at: v.joined_at,
                last_access_at: v.last_access_at,
                created_at: v.room.created_at,
            })
            .collect(),
    }))
}

/// GET /api/rooms/{room_id}/messages
/// Full message history, oldest first.
pub async fn room_messages(
    State(state): State<AppState>,
    _claims: Claims,
    Path(room_id): Path<String>,
) -> Result<Json<MessageListResponse>, ApiError> {
    let messages = state
        .with_store(move |store| store.fetch_room_messages(&room_id, None))
        .await
        .map_err(internal_error)?;

    Ok(Json(MessageListResponse {
        messages: messages
            .into_iter()
            .map(|m| MessageResponse {
                id: m.id,
                text: m.text,
                user: m.user,
                timestamp: m.timestamp,
            })
            .collect(),
    }))
}

/// GET /api/rooms/{room_id}/status
/// Whether the room exists and the caller has joined it.
pub async fn room_status(
    State(state): State<AppState>,
    claims: Claims,
    Path(room_id): Path<String>,
) -> Result<Json<RoomStatusResponse>, ApiError> {
    let user_id = claims.user_id;
    let rid = room_id.clone();
    let (room, participant) = state
        .with_store(move |store| {
            let room = store.find_room(&rid)?;
            let participant = match room {
                Some(_) => store.find_participation(&user_id, &rid)?,
                None => None,
            };
            Ok((room, participant))
        })
        .await
        .map_err(internal_error)?;

    let room = room.ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Room not found"))?;

    Ok(Json(RoomStatusResponse {
        room_id: room.id,
        exists: true,
        is_joined: participant.is_some(),
        joined_at: participant.as_ref().map(|p| p.joined_at.clone()),
        last_access_at: participant.map(|p| p.last_access_at),
    }))
}
