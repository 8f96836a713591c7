//! JSON wire protocol: one JSON object per WebSocket text frame, discriminated
//! by its `type` field.

use axum::extract::ws::Message;
use serde::{Deserialize, Serialize};

/// Frames a client may send.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Auth {
        token: String,
    },
    JoinRoom {
        #[serde(rename = "roomId")]
        room_id: String,
    },
    Message {
        text: String,
    },
}

impl ClientFrame {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "auth",
            Self::JoinRoom { .. } => "join_room",
            Self::Message { .. } => "message",
        }
    }
}

/// Decode a client text frame. Anything that is not one of the three known
/// shapes (bad JSON, unknown `type`, missing fields) is an error.
pub fn parse_client_frame(raw: &str) -> Result<ClientFrame, serde_json::Error> {
    serde_json::from_str(raw)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserInfo {
    pub name: String,
}

/// A chat line as replayed in `room_joined` history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename = "message")]
pub struct ChatMessage {
    pub user: String,
    pub text: String,
    pub timestamp: String,
}

/// Frames the server sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    AuthSuccess {
        user: UserInfo,
    },
    RoomJoined {
        #[serde(rename = "roomId")]
        room_id: String,
        messages: Vec<ChatMessage>,
    },
    Message {
        user: String,
        text: String,
        timestamp: String,
    },
    Error {
        message: String,
    },
}

impl ServerFrame {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Encode as a WebSocket text message.
    pub fn to_ws_message(&self) -> Result<Message, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(Message::Text(json.into()))
    }
}

impl From<ChatMessage> for ServerFrame {
    fn from(msg: ChatMessage) -> Self {
        Self::Message {
            user: msg.user,
            text: msg.text,
            timestamp: msg.timestamp,
        }
    }
}
