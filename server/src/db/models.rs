/// Database row types.
/// These correspond 1:1 to the SQLite schema defined in migrations.rs.

/// User record in the users table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
    pub created_at: String,
    pub last_login_at: String,
}

impl User {
    /// Name shown to other room members: the profile name, or the email
    /// when the profile has no usable name.
    pub fn display_name(&self) -> String {
        match self.name.as_deref() {
            Some(name) if !name.trim().is_empty() => name.to_string(),
            _ => self.email.clone(),
        }
    }
}

/// Chat room. Created on first reference, never deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    pub id: String,
    pub created_at: String,
}

/// Durable record that a user has joined a room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participation {
    pub room_id: String,
    pub user_id: String,
    pub joined_at: String,
    pub last_access_at: String,
}

/// A participation row joined with its room, for the room history listing
#[derive(Debug, Clone)]
pub struct RoomVisit {
    pub room: Room,
    pub joined_at: String,
    pub last_access_at: String,
}

/// Identity assigned to a freshly persisted message
#[derive(Debug, Clone)]
pub struct PersistedMessage {
    pub id: String,
    pub timestamp: String,
}

/// A stored message joined with its author's display name
#[derive(Debug, Clone)]
pub struct HistoryMessage {
    pub id: String,
    pub user_id: String,
    pub user: String,
    pub text: String,
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: Option<&str>) -> User {
        User {
            id: "u1".to_string(),
            email: "user1@example.com".to_string(),
            name: name.map(str::to_string),
            picture: None,
            created_at: String::new(),
            last_login_at: String::new(),
        }
    }

    #[test]
    fn test_display_name_prefers_name() {
        assert_eq!(user(Some("Alice")).display_name(), "Alice");
    }

    #[test]
    fn test_display_name_falls_back_to_email() {
        assert_eq!(user(None).display_name(), "user1@example.com");
        assert_eq!(user(Some("  ")).display_name(), "user1@example.com");
    }
}
