//! Error taxonomy for per-connection processing. Every variant becomes an
//! `error` frame addressed only to the originating connection.

use crate::auth::AuthError;
use crate::db::StoreError;

/// Requests that arrive in a state where they are not allowed, or carry
/// values the relay refuses. Recoverable: the connection stays open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Violation {
    #[error("Not authenticated")]
    NotAuthenticated,
    #[error("Already authenticated")]
    AlreadyAuthenticated,
    #[error("Not in a room. Please join a room first.")]
    NotInRoom,
    #[error("Invalid room id")]
    InvalidRoomId,
    #[error("Message text is empty")]
    EmptyMessage,
    #[error("Message too long")]
    MessageTooLong,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Bad credential or unknown user. Terminal for the connection.
    #[error("authentication failed: {0}")]
    AuthFailure(AuthError),
    #[error("protocol violation: {0}")]
    ProtocolViolation(#[from] Violation),
    #[error("malformed input")]
    MalformedInput,
    /// A collaborator (store, verifier) failed. The request is dropped.
    #[error("dependency failure: {0}")]
    DependencyFailure(String),
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        Self::DependencyFailure(err.to_string())
    }
}

impl From<AuthError> for SessionError {
    fn from(err: AuthError) -> Self {
        Self::AuthFailure(err)
    }
}

/// Close code for an invalid or expired token.
pub const CLOSE_TOKEN_INVALID: u16 = 4001;
/// Close code when the token's user no longer exists.
pub const CLOSE_USER_NOT_FOUND: u16 = 4004;
/// Standard "internal error" close code.
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;

impl SessionError {
    /// Text of the `error` frame sent to the client.
    pub fn client_message(&self) -> String {
        match self {
            Self::AuthFailure(AuthError::InvalidToken | AuthError::ExpiredToken) => {
                "Invalid token".to_string()
            }
            Self::AuthFailure(AuthError::UserNotFound) => "User not found".to_string(),
            Self::ProtocolViolation(v) => v.to_string(),
            Self::MalformedInput => "Invalid message format".to_string(),
            Self::DependencyFailure(_) => "Internal server error".to_string(),
        }
    }

    /// Whether the connection must close after reporting this error.
    /// Dependency failures only end the connection while authenticating.
    pub fn is_terminal(&self, authenticating: bool) -> bool {
        match self {
            Self::AuthFailure(_) => true,
            Self::DependencyFailure(_) => authenticating,
            _ => false,
        }
    }

    pub fn close_code(&self) -> u16 {
        match self {
            Self::AuthFailure(AuthError::UserNotFound) => CLOSE_USER_NOT_FOUND,
            Self::AuthFailure(_) => CLOSE_TOKEN_INVALID,
            _ => CLOSE_INTERNAL_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_messages() {
        assert_eq!(
            SessionError::AuthFailure(AuthError::ExpiredToken).client_message(),
            "Invalid token"
        );
        assert_eq!(
            SessionError::AuthFailure(AuthError::UserNotFound).client_message(),
            "User not found"
        );
        assert_eq!(
            SessionError::from(Violation::NotAuthenticated).client_message(),
            "Not authenticated"
        );
        assert_eq!(
            SessionError::from(Violation::NotInRoom).client_message(),
            "Not in a room. Please join a room first."
        );
        assert_eq!(SessionError::MalformedInput.client_message(), "Invalid message format");
        assert_eq!(
            SessionError::from(StoreError::Unavailable("down".into())).client_message(),
            "Internal server error"
        );
    }

    #[test]
    fn test_close_codes() {
        assert_eq!(SessionError::AuthFailure(AuthError::InvalidToken).close_code(), 4001);
        assert_eq!(SessionError::AuthFailure(AuthError::UserNotFound).close_code(), 4004);
        assert_eq!(SessionError::DependencyFailure("x".into()).close_code(), 1011);
    }

    #[test]
    fn test_only_auth_failures_are_always_terminal() {
        assert!(SessionError::AuthFailure(AuthError::ExpiredToken).is_terminal(false));
        assert!(SessionError::DependencyFailure("x".into()).is_terminal(true));
        assert!(!SessionError::DependencyFailure("x".into()).is_terminal(false));
        assert!(!SessionError::from(Violation::AlreadyAuthenticated).is_terminal(true));
        assert!(!SessionError::MalformedInput.is_terminal(true));
    }
}
