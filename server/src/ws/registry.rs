//! Connection registry: the live, authenticated sessions and their room
//! bindings.
//!
//! A primary map keyed by connection id and a secondary room -> connections
//! index, both behind one `RwLock` so they never disagree. An entry exists
//! iff its connection is open and authenticated; each entry is bound to at
//! most one room. A user may hold several connections, each its own entry.

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::ConnectionSender;

/// Process-unique identity of one accepted connection.
pub type ConnectionId = u64;

#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub conn_id: ConnectionId,
    pub user_id: String,
    pub display_name: String,
    pub room_id: Option<String>,
    pub sender: ConnectionSender,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<ConnectionId, RegistryEntry>,
    by_room: HashMap<String, HashSet<ConnectionId>>,
}

impl Inner {
    fn unindex(&mut self, conn_id: ConnectionId, room_id: &str) {
        if let Some(members) = self.by_room.get_mut(room_id) {
            members.remove(&conn_id);
            if members.is_empty() {
                self.by_room.remove(room_id);
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<Inner>>,
    next_id: Arc<AtomicU64>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an id for a newly accepted connection.
    pub fn next_connection_id(&self) -> ConnectionId {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Add an entry. An existing entry for the same connection is replaced.
    pub fn insert(&self, entry: RegistryEntry) {
        let mut inner = self.inner.write();
        if let Some(old) = inner.entries.remove(&entry.conn_id) {
            if let Some(room_id) = old.room_id {
                inner.unindex(old.conn_id, &room_id);
            }
        }
        if let Some(room_id) = &entry.room_id {
            inner
                .by_room
                .entry(room_id.clone())
                .or_default()
                .insert(entry.conn_id);
        }
        let (conn_id, user_id) = (entry.conn_id, entry.user_id.clone());
        inner.entries.insert(conn_id, entry);
        tracing::debug!(
            conn_id,
            user_id = %user_id,
            connections = inner.entries.len(),
            "Connection registered"
        );
    }

    /// Remove the entry for this connection. Returns whether one was present;
    /// removing an absent connection is a no-op.
    pub fn remove(&self, conn_id: ConnectionId) -> bool {
        let mut inner = self.inner.write();
        match inner.entries.remove(&conn_id) {
            Some(entry) => {
                if let Some(room_id) = entry.room_id {
                    inner.unindex(conn_id, &room_id);
                }
                tracing::debug!(conn_id, user_id = %entry.user_id, "Connection unregistered");
                true
            }
            None => false,
        }
    }

    /// Rebind a live entry to `room_id`, dropping its previous binding.
    /// Returns false if the connection is not registered.
    pub fn update_room(&self, conn_id: ConnectionId, room_id: &str) -> bool {
        let mut inner = self.inner.write();
        let previous = match inner.entries.get_mut(&conn_id) {
            Some(entry) => entry.room_id.replace(room_id.to_string()),
            None => return false,
        };
        if let Some(previous) = previous {
            inner.unindex(conn_id, &previous);
        }
        inner
            .by_room
            .entry(room_id.to_string())
            .or_default()
            .insert(conn_id);
        true
    }

    /// Drop the room binding of a live entry, keeping it registered.
    /// Returns false if the connection is not registered.
    pub fn clear_room(&self, conn_id: ConnectionId) -> bool {
        let mut inner = self.inner.write();
        let previous = match inner.entries.get_mut(&conn_id) {
            Some(entry) => entry.room_id.take(),
            None => return false,
        };
        if let Some(previous) = previous {
            inner.unindex(conn_id, &previous);
        }
        true
    }

    /// Apply `f` to every entry bound to `room_id`.
    ///
    /// Entries are copied out under the read lock and `f` runs after it is
    /// released, so an entry added or removed concurrently is either fully
    /// in this pass or not in it at all, and `f` may touch the registry.
    pub fn for_each_in_room<F>(&self, room_id: &str, mut f: F)
    where
        F: FnMut(&RegistryEntry),
    {
        let snapshot: Vec<RegistryEntry> = {
            let inner = self.inner.read();
            match inner.by_room.get(room_id) {
                Some(members) => members
                    .iter()
                    .filter_map(|id| inner.entries.get(id).cloned())
                    .collect(),
                None => Vec::new(),
            }
        };
        for entry in &snapshot {
            f(entry);
        }
    }

    pub fn contains(&self, conn_id: ConnectionId) -> bool {
        self.inner.read().entries.contains_key(&conn_id)
    }

    #[cfg(test)]
    pub fn room_of(&self, conn_id: ConnectionId) -> Option<String> {
        self.inner
            .read()
            .entries
            .get(&conn_id)
            .and_then(|e| e.room_id.clone())
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of connections currently bound to `room_id`.
    pub fn room_size(&self, room_id: &str) -> usize {
        self.inner
            .read()
            .by_room
            .get(room_id)
            .map(|m| m.len())
            .unwrap_or(0)
    }
}
