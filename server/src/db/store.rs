//! Durable room store: users, rooms, participation records and message history.
//!
//! The relay core only sees the [`RoomStore`] trait. All methods are
//! synchronous (rusqlite); async callers go through
//! `tokio::task::spawn_blocking`.

use chrono::{SecondsFormat, Utc};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use super::models::{HistoryMessage, Participation, PersistedMessage, Room, RoomVisit, User};
use super::DbPool;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached (poisoned lock, aborted worker task).
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Current time as ISO-8601 UTC with millisecond precision, e.g.
/// `2026-10-14T09:30:00.123Z`. Fixed width, so it sorts lexicographically.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Profile fields used to create or refresh a user record.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
}

pub trait RoomStore: Send + Sync {
    fn find_user_by_id(&self, user_id: &str) -> Result<Option<User>, StoreError>;

    /// Insert a user keyed by email, or refresh the profile and
    /// last_login_at of the existing one.
    fn upsert_user(&self, user: &NewUser) -> Result<User, StoreError>;

    /// Create a room with the given id. Fails if it already exists.
    fn create_room(&self, room_id: &str) -> Result<Room, StoreError>;

    fn find_room(&self, room_id: &str) -> Result<Option<Room>, StoreError>;

    /// Idempotent create-if-absent.
    fn ensure_room(&self, room_id: &str) -> Result<Room, StoreError>;

    /// Record that `user_id` joined `room_id`. Repeat joins keep joined_at
    /// and refresh last_access_at.
    fn upsert_participation(&self, user_id: &str, room_id: &str)
        -> Result<Participation, StoreError>;

    fn find_participation(
        &self,
        user_id: &str,
        room_id: &str,
    ) -> Result<Option<Participation>, StoreError>;

    /// Rooms the user has joined, most recently accessed first.
    fn user_room_history(&self, user_id: &str) -> Result<Vec<RoomVisit>, StoreError>;

    /// Messages in ascending creation order (ties by insertion order).
    /// With a limit, the most recent `limit` messages are returned, still ascending.
    fn fetch_room_messages(
        &self,
        room_id: &str,
        limit: Option<u32>,
    ) -> Result<Vec<HistoryMessage>, StoreError>;

    /// Persist a message with a fresh id and a server-assigned timestamp.
    fn persist_message(
        &self,
        room_id: &str,
        user_id: &str,
        text: &str,
    ) -> Result<PersistedMessage, StoreError>;
}

/// SQLite-backed [`RoomStore`].
#[derive(Clone)]
pub struct SqliteRoomStore {
    db: DbPool,
}

impl SqliteRoomStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, rusqlite::Connection>, StoreError> {
        self.db
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("DB lock error: {}", e)))
    }
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        picture: row.get(3)?,
        created_at: row.get(4)?,
        last_login_at: row.get(5)?,
    })
}

impl RoomStore for SqliteRoomStore {
    fn find_user_by_id(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                "SELECT id, email, name, picture, created_at, last_login_at FROM users WHERE id = ?1",
                params![user_id],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    fn upsert_user(&self, user: &NewUser) -> Result<User, StoreError> {
        let conn = self.conn()?;
        let id = Uuid::now_v7().to_string();
        let now = now_timestamp();

        let row = conn.query_row(
            "INSERT INTO users (id, email, name, picture, created_at, last_login_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(email) DO UPDATE SET
                name = excluded.name,
                picture = excluded.picture,
                last_login_at = excluded.last_login_at
             RETURNING id, email, name, picture, created_at, last_login_at",
            params![id, user.email, user.name, user.picture, now],
            user_from_row,
        )?;
        Ok(row)
    }

    fn create_room(&self, room_id: &str) -> Result<Room, StoreError> {
        let conn = self.conn()?;
        let now = now_timestamp();
        conn.execute(
            "INSERT INTO rooms (id, created_at) VALUES (?1, ?2)",
            params![room_id, now],
        )?;
        Ok(Room {
            id: room_id.to_string(),
            created_at: now,
        })
    }

    fn find_room(&self, room_id: &str) -> Result<Option<Room>, StoreError> {
        let conn = self.conn()?;
        let room = conn
            .query_row(
                "SELECT id, created_at FROM rooms WHERE id = ?1",
                params![room_id],
                |row| {
                    Ok(Room {
                        id: row.get(0)?,
                        created_at: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(room)
    }

    fn ensure_room(&self, room_id: &str) -> Result<Room, StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO rooms (id, created_at) VALUES (?1, ?2)",
            params![room_id, now_timestamp()],
        )?;
        let room = conn.query_row(
            "SELECT id, created_at FROM rooms WHERE id = ?1",
            params![room_id],
            |row| {
                Ok(Room {
                    id: row.get(0)?,
                    created_at: row.get(1)?,
                })
            },
        )?;
        Ok(room)
    }

    fn upsert_participation(
        &self,
        user_id: &str,
        room_id: &str,
    ) -> Result<Participation, StoreError> {
        let conn = self.conn()?;
        let id = Uuid::now_v7().to_string();
        let now = now_timestamp();

        let (joined_at, last_access_at): (String, String) = conn.query_row(
            "INSERT INTO room_participants (id, room_id, user_id, joined_at, last_access_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(room_id, user_id) DO UPDATE SET
                last_access_at = excluded.last_access_at
             RETURNING joined_at, last_access_at",
            params![id, room_id, user_id, now],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(Participation {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            joined_at,
            last_access_at,
        })
    }

    fn find_participation(
        &self,
        user_id: &str,
        room_id: &str,
    ) -> Result<Option<Participation>, StoreError> {
        let conn = self.conn()?;
        let participation = conn
            .query_row(
                "SELECT joined_at, last_access_at FROM room_participants
                 WHERE room_id = ?1 AND user_id = ?2",
                params![room_id, user_id],
                |row| {
                    Ok(Participation {
                        room_id: room_id.to_string(),
                        user_id: user_id.to_string(),
                        joined_at: row.get(0)?,
                        last_access_at: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(participation)
    }

    fn user_room_history(&self, user_id: &str) -> Result<Vec<RoomVisit>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT r.id, r.created_at, p.joined_at, p.last_access_at
             FROM room_participants p
             JOIN rooms r ON r.id = p.room_id
             WHERE p.user_id = ?1
             ORDER BY p.last_access_at DESC, p.rowid DESC",
        )?;
        let visits = stmt
            .query_map(params![user_id], |row| {
                Ok(RoomVisit {
                    room: Room {
                        id: row.get(0)?,
                        created_at: row.get(1)?,
                    },
                    joined_at: row.get(2)?,
                    last_access_at: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(visits)
    }

    fn fetch_room_messages(
        &self,
        room_id: &str,
        limit: Option<u32>,
    ) -> Result<Vec<HistoryMessage>, StoreError> {
        let conn = self.conn()?;
        // Newest first so LIMIT keeps the tail; reversed below. -1 means no limit.
        let mut stmt = conn.prepare(
            "SELECT m.id, m.user_id,
                    CASE WHEN u.name IS NOT NULL AND TRIM(u.name) <> '' THEN u.name ELSE u.email END,
                    m.text, m.created_at
             FROM messages m
             JOIN users u ON u.id = m.user_id
             WHERE m.room_id = ?1
             ORDER BY m.created_at DESC, m.rowid DESC
             LIMIT ?2",
        )?;
        let limit = limit.map(i64::from).unwrap_or(-1);
        let mut messages = stmt
            .query_map(params![room_id, limit], |row| {
                Ok(HistoryMessage {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    user: row.get(2)?,
                    text: row.get(3)?,
                    timestamp: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        messages.reverse();
        Ok(messages)
    }

    fn persist_message(
        &self,
        room_id: &str,
        user_id: &str,
        text: &str,
    ) -> Result<PersistedMessage, StoreError> {
        let conn = self.conn()?;
        let id = Uuid::now_v7().to_string();
        let timestamp = now_timestamp();

        conn.execute(
            "INSERT INTO messages (id, room_id, user_id, text, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, room_id, user_id, text, timestamp],
        )?;

        Ok(PersistedMessage { id, timestamp })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> (SqliteRoomStore, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let db = crate::db::init_db(tmp.path().to_str().unwrap()).unwrap();
        (SqliteRoomStore::new(db), tmp)
    }

    fn seed_user(store: &SqliteRoomStore, email: &str, name: Option<&str>) -> User {
        store
            .upsert_user(&NewUser {
                email: email.to_string(),
                name: name.map(str::to_string),
                picture: None,
            })
            .unwrap()
    }

    #[test]
    fn test_upsert_user_keeps_id_on_conflict() {
        let (store, _tmp) = test_store();
        let first = seed_user(&store, "a@example.com", Some("A"));
        let second = seed_user(&store, "a@example.com", Some("Renamed"));
        assert_eq!(first.id, second.id);
        assert_eq!(second.name.as_deref(), Some("Renamed"));
        assert_eq!(store.find_user_by_id(&first.id).unwrap(), Some(second));
    }

    #[test]
    fn test_find_missing_user() {
        let (store, _tmp) = test_store();
        assert!(store.find_user_by_id("nobody").unwrap().is_none());
    }

    #[test]
    fn test_ensure_room_is_idempotent() {
        let (store, _tmp) = test_store();
        let first = store.ensure_room("r1").unwrap();
        let second = store.ensure_room("r1").unwrap();
        assert_eq!(first, second);
        assert!(store.create_room("r1").is_err());
    }

    #[test]
    fn test_repeat_join_refreshes_last_access_only() {
        let (store, _tmp) = test_store();
        let user = seed_user(&store, "a@example.com", None);
        store.ensure_room("r1").unwrap();

        let first = store.upsert_participation(&user.id, "r1").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = store.upsert_participation(&user.id, "r1").unwrap();

        assert_eq!(first.joined_at, second.joined_at);
        assert!(second.last_access_at > first.last_access_at);
        assert_eq!(
            store.find_participation(&user.id, "r1").unwrap(),
            Some(second)
        );
    }

    #[test]
    fn test_persisted_messages_come_back_in_order() {
        let (store, _tmp) = test_store();
        let alice = seed_user(&store, "alice@example.com", Some("Alice"));
        let bob = seed_user(&store, "bob@example.com", None);
        store.ensure_room("r1").unwrap();
        store.ensure_room("r2").unwrap();

        store.persist_message("r1", &alice.id, "one").unwrap();
        store.persist_message("r1", &bob.id, "two").unwrap();
        store.persist_message("r2", &bob.id, "elsewhere").unwrap();
        store.persist_message("r1", &alice.id, "three").unwrap();

        let history = store.fetch_room_messages("r1", None).unwrap();
        let texts: Vec<&str> = history.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
        assert_eq!(history[0].user, "Alice");
        assert_eq!(history[1].user, "bob@example.com");
        assert_eq!(history[1].user_id, bob.id);
        assert!(history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

        let tail = store.fetch_room_messages("r1", Some(2)).unwrap();
        let texts: Vec<&str> = tail.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["two", "three"]);
    }

    #[test]
    fn test_room_history_orders_by_last_access() {
        let (store, _tmp) = test_store();
        let user = seed_user(&store, "a@example.com", None);
        store.ensure_room("r1").unwrap();
        store.ensure_room("r2").unwrap();

        store.upsert_participation(&user.id, "r1").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.upsert_participation(&user.id, "r2").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.upsert_participation(&user.id, "r1").unwrap();

        let visits = store.user_room_history(&user.id).unwrap();
        let ids: Vec<&str> = visits.iter().map(|v| v.room.id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "r2"]);
    }
}
