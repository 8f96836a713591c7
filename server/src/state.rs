use std::sync::Arc;

use crate::auth::{IdentityVerifier, JwtVerifier};
use crate::config::Config;
use crate::db::{DbPool, RoomStore, SqliteRoomStore, StoreError};
use crate::ws::ConnectionRegistry;

/// Per-connection and per-request limits taken from config.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// History messages replayed on join; None replays everything.
    pub history_limit: Option<u32>,
    pub max_message_length: usize,
    pub outbound_buffer: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            history_limit: None,
            max_message_length: 4000,
            outbound_buffer: 256,
        }
    }
}

impl From<&Config> for Limits {
    fn from(config: &Config) -> Self {
        Self {
            history_limit: config.history_limit,
            max_message_length: config.max_message_length,
            outbound_buffer: config.outbound_buffer.max(1),
        }
    }
}

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Durable users/rooms/messages
    pub store: Arc<dyn RoomStore>,
    /// Turns a client credential into a user id
    pub verifier: Arc<dyn IdentityVerifier>,
    /// HS256 secret, also used by the REST Claims extractor
    pub jwt_secret: Arc<Vec<u8>>,
    /// Live authenticated connections and their room bindings
    pub registry: ConnectionRegistry,
    pub limits: Limits,
}

impl AppState {
    /// State backed by SQLite and JWT verification with `jwt_secret`.
    pub fn new(db: DbPool, jwt_secret: Vec<u8>, limits: Limits) -> Self {
        let jwt_secret = Arc::new(jwt_secret);
        Self {
            store: Arc::new(SqliteRoomStore::new(db)),
            verifier: Arc::new(JwtVerifier::new(jwt_secret.clone())),
            jwt_secret,
            registry: ConnectionRegistry::new(),
            limits,
        }
    }

    /// Run a store operation on the blocking pool.
    pub async fn with_store<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&dyn RoomStore) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || f(store.as_ref()))
            .await
            .map_err(|e| StoreError::Unavailable(format!("Task join: {}", e)))?
    }
}
