//! Per-connection protocol state machine:
//! `Unauthenticated -> Authenticated -> RoomJoined`.
//!
//! A session is owned by its connection's reader loop and only mutated
//! from there, one inbound frame at a time. The registry entry it creates
//! on successful auth is the only state shared with other connections.

use crate::auth::AuthError;
use crate::error::{SessionError, Violation};
use crate::state::AppState;
use crate::ws::broadcast::{broadcast_to_room, send_frame, DeliveryError};
use crate::ws::protocol::{parse_client_frame, ChatMessage, ClientFrame, ServerFrame, UserInfo};
use crate::ws::{ConnectionId, ConnectionSender, RegistryEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
    RoomJoined,
}

/// What the reader loop should do after a frame has been handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Terminate the connection with this close code and reason.
    Close { code: u16, reason: String },
}

#[derive(Debug, Clone)]
struct SessionUser {
    user_id: String,
    display_name: String,
}

pub struct Session {
    conn_id: ConnectionId,
    tx: ConnectionSender,
    user: Option<SessionUser>,
    room_id: Option<String>,
}

impl Session {
    pub fn new(conn_id: ConnectionId, tx: ConnectionSender) -> Self {
        Self {
            conn_id,
            tx,
            user: None,
            room_id: None,
        }
    }

    pub fn conn_id(&self) -> ConnectionId {
        self.conn_id
    }

    pub fn state(&self) -> SessionState {
        match (&self.user, &self.room_id) {
            (None, _) => SessionState::Unauthenticated,
            (Some(_), None) => SessionState::Authenticated,
            (Some(_), Some(_)) => SessionState::RoomJoined,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.user_id.as_str())
    }

    pub fn display_name(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.display_name.as_str())
    }

    pub fn room_id(&self) -> Option<&str> {
        self.room_id.as_deref()
    }

    /// Handle one inbound text frame.
    pub async fn handle_text(&mut self, state: &AppState, raw: &str) -> Flow {
        let frame = match parse_client_frame(raw) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(
                    conn_id = self.conn_id,
                    error = %e,
                    "Malformed client frame"
                );
                self.reply(&ServerFrame::error(SessionError::MalformedInput.client_message()));
                return Flow::Continue;
            }
        };

        let kind = frame.kind();
        let authenticating = matches!(frame, ClientFrame::Auth { .. }) && self.user.is_none();

        let result = match frame {
            ClientFrame::Auth { token } => self.authenticate(state, &token).await,
            ClientFrame::JoinRoom { room_id } => self.join_room(state, room_id).await,
            ClientFrame::Message { text } => self.post_message(state, text).await,
        };

        match result {
            Ok(()) => Flow::Continue,
            Err(err) => {
                match &err {
                    SessionError::DependencyFailure(cause) => tracing::error!(
                        conn_id = self.conn_id,
                        frame = kind,
                        error = %cause,
                        "Request failed"
                    ),
                    other => tracing::info!(
                        conn_id = self.conn_id,
                        user_id = self.user_id().unwrap_or("-"),
                        frame = kind,
                        error = %other,
                        "Request rejected"
                    ),
                }
                self.reply(&ServerFrame::error(err.client_message()));

                if err.is_terminal(authenticating) {
                    Flow::Close {
                        code: err.close_code(),
                        reason: err.client_message(),
                    }
                } else {
                    Flow::Continue
                }
            }
        }
    }

    /// Transport closed: drop the registry entry, if any.
    pub fn close(&mut self, state: &AppState) {
        if state.registry.remove(self.conn_id) {
            tracing::info!(
                conn_id = self.conn_id,
                user_id = self.user_id().unwrap_or("-"),
                room_id = self.room_id().unwrap_or("-"),
                "Session closed"
            );
        }
        self.room_id = None;
    }

    async fn authenticate(&mut self, state: &AppState, token: &str) -> Result<(), SessionError> {
        if self.user.is_some() {
            return Err(Violation::AlreadyAuthenticated.into());
        }

        let identity = state.verifier.verify_credential(token)?;

        let user_id = identity.user_id.clone();
        let user = state
            .with_store(move |store| store.find_user_by_id(&user_id))
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let display_name = user.display_name();
        state.registry.insert(RegistryEntry {
            conn_id: self.conn_id,
            user_id: user.id.clone(),
            display_name: display_name.clone(),
            room_id: None,
            sender: self.tx.clone(),
        });

        tracing::info!(
            conn_id = self.conn_id,
            user_id = %user.id,
            email = %user.email,
            "User authenticated"
        );

        self.user = Some(SessionUser {
            user_id: user.id,
            display_name: display_name.clone(),
        });
        self.reply(&ServerFrame::AuthSuccess {
            user: UserInfo { name: display_name },
        });
        Ok(())
    }

    async fn join_room(&mut self, state: &AppState, room_id: String) -> Result<(), SessionError> {
        let user = self.user.clone().ok_or(Violation::NotAuthenticated)?;
        if room_id.trim().is_empty() {
            return Err(Violation::InvalidRoomId.into());
        }

        let (uid, rid) = (user.user_id.clone(), room_id.clone());
        state
            .with_store(move |store| {
                store.ensure_room(&rid)?;
                store.upsert_participation(&uid, &rid)
            })
            .await?;

        // Rebinding here makes the old room's broadcasts unreachable before
        // history is read, so nothing persisted after this point is missed.
        if !state.registry.update_room(self.conn_id, &room_id) {
            return Err(SessionError::DependencyFailure(format!(
                "connection {} is not registered",
                self.conn_id
            )));
        }
        let previous = self.room_id.replace(room_id.clone());

        let rid = room_id.clone();
        let limit = state.limits.history_limit;
        let history = match state
            .with_store(move |store| store.fetch_room_messages(&rid, limit))
            .await
        {
            Ok(history) => history,
            Err(e) => {
                // No room_joined was sent, so fall back to the prior binding
                match previous.as_deref() {
                    Some(prev) => state.registry.update_room(self.conn_id, prev),
                    None => state.registry.clear_room(self.conn_id),
                };
                self.room_id = previous;
                return Err(e.into());
            }
        };

        tracing::info!(
            conn_id = self.conn_id,
            user_id = %user.user_id,
            room_id = %room_id,
            previous_room = previous.as_deref().unwrap_or("-"),
            history = history.len(),
            "User joined room"
        );

        self.reply(&ServerFrame::RoomJoined {
            room_id,
            messages: history
                .into_iter()
                .map(|m| ChatMessage {
                    user: m.user,
                    text: m.text,
                    timestamp: m.timestamp,
                })
                .collect(),
        });
        Ok(())
    }

    async fn post_message(&mut self, state: &AppState, text: String) -> Result<(), SessionError> {
        let user = self.user.clone().ok_or(Violation::NotAuthenticated)?;
        let room_id = self.room_id.clone().ok_or(Violation::NotInRoom)?;

        if text.trim().is_empty() {
            return Err(Violation::EmptyMessage.into());
        }
        if text.chars().count() > state.limits.max_message_length {
            return Err(Violation::MessageTooLong.into());
        }

        let (rid, uid, body) = (room_id.clone(), user.user_id.clone(), text.clone());
        let persisted = state
            .with_store(move |store| store.persist_message(&rid, &uid, &body))
            .await?;

        let frame = ServerFrame::from(ChatMessage {
            user: user.display_name,
            text,
            timestamp: persisted.timestamp,
        });
        let report = broadcast_to_room(&state.registry, &room_id, &frame);

        tracing::debug!(
            conn_id = self.conn_id,
            room_id = %room_id,
            message_id = %persisted.id,
            delivered = report.delivered,
            failed = report.failed,
            "Message relayed"
        );
        Ok(())
    }

    fn reply(&self, frame: &ServerFrame) {
        match send_frame(&self.tx, frame) {
            Ok(()) => {}
            Err(DeliveryError::Full) => {
                tracing::warn!(conn_id = self.conn_id, "Dropping reply for slow consumer")
            }
            Err(DeliveryError::Closed) => {
                tracing::debug!(conn_id = self.conn_id, "Reply raced with connection close")
            }
        }
    }
}
