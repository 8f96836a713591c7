//! Operator-side user provisioning: `relay-server --create-user`.

use crate::auth::jwt;
use crate::db::models::User;
use crate::db::store::NewUser;
use crate::db::{RoomStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("email must not be empty")]
    EmptyEmail,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("token signing failed: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

/// Create or refresh the user keyed by `email` and mint an access token for it.
pub fn create_user_with_token(
    store: &dyn RoomStore,
    secret: &[u8],
    email: &str,
    name: Option<&str>,
) -> Result<(User, String), ProvisionError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(ProvisionError::EmptyEmail);
    }

    let user = store.upsert_user(&NewUser {
        email: email.to_string(),
        name: name.map(str::to_string),
        picture: None,
    })?;
    let token = jwt::issue_access_token(secret, &user.id, &user.email)?;

    tracing::info!(user_id = %user.id, email = %user.email, "User provisioned");
    Ok((user, token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteRoomStore;

    const SECRET: &[u8] = b"provision-test-secret";

    fn store() -> (SqliteRoomStore, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let db = crate::db::init_db(tmp.path().to_str().unwrap()).unwrap();
        (SqliteRoomStore::new(db), tmp)
    }

    #[test]
    fn test_created_user_token_validates() {
        let (store, _tmp) = store();
        let (user, token) =
            create_user_with_token(&store, SECRET, " alice@example.com ", Some("Alice")).unwrap();

        assert_eq!(user.email, "alice@example.com");
        assert_eq!(user.display_name(), "Alice");
        let claims = jwt::validate_access_token(SECRET, &token).unwrap();
        assert_eq!(claims.user_id, user.id);
        assert!(store.find_user_by_id(&user.id).unwrap().is_some());
    }

    #[test]
    fn test_repeat_provisioning_keeps_user_id() {
        let (store, _tmp) = store();
        let (first, _) = create_user_with_token(&store, SECRET, "bob@example.com", None).unwrap();
        let (second, _) =
            create_user_with_token(&store, SECRET, "bob@example.com", Some("Bob")).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.name.as_deref(), Some("Bob"));
    }

    #[test]
    fn test_blank_email_rejected() {
        let (store, _tmp) = store();
        assert!(matches!(
            create_user_with_token(&store, SECRET, "   ", None),
            Err(ProvisionError::EmptyEmail)
        ));
    }
}
