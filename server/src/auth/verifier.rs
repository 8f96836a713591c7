//! Credential verification seam consumed by the session state machine.

use std::sync::Arc;

use jsonwebtoken::errors::ErrorKind;

use crate::auth::jwt;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("token invalid")]
    InvalidToken,
    #[error("token expired")]
    ExpiredToken,
    #[error("user not found")]
    UserNotFound,
}

/// Identity carried by a verified credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub user_id: String,
    pub email: String,
}

pub trait IdentityVerifier: Send + Sync {
    fn verify_credential(&self, token: &str) -> Result<VerifiedIdentity, AuthError>;
}

/// Verifies HS256 access tokens against a shared secret.
#[derive(Clone)]
pub struct JwtVerifier {
    secret: Arc<Vec<u8>>,
}

impl JwtVerifier {
    pub fn new(secret: Arc<Vec<u8>>) -> Self {
        Self { secret }
    }
}

impl IdentityVerifier for JwtVerifier {
    fn verify_credential(&self, token: &str) -> Result<VerifiedIdentity, AuthError> {
        match jwt::validate_access_token(&self.secret, token) {
            Ok(claims) => Ok(VerifiedIdentity {
                user_id: claims.user_id,
                email: claims.email,
            }),
            Err(err) => match err.kind() {
                ErrorKind::ExpiredSignature => Err(AuthError::ExpiredToken),
                _ => Err(AuthError::InvalidToken),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distinguishes_expired_from_invalid() {
        let secret = Arc::new(b"verifier-test-secret".to_vec());
        let verifier = JwtVerifier::new(secret.clone());

        let good = jwt::issue_access_token(&secret, "u1", "u1@example.com").unwrap();
        assert_eq!(
            verifier.verify_credential(&good),
            Ok(VerifiedIdentity {
                user_id: "u1".to_string(),
                email: "u1@example.com".to_string(),
            })
        );

        let expired = jwt::issue_access_token_with_ttl(&secret, "u1", "u1@example.com", -3600).unwrap();
        assert_eq!(verifier.verify_credential(&expired), Err(AuthError::ExpiredToken));
        assert_eq!(verifier.verify_credential("garbage"), Err(AuthError::InvalidToken));
    }
}
