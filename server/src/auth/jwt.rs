use std::path::Path;

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;

use crate::auth::middleware::Claims;

/// Access token lifetime (7 days), matching the token issuer.
pub const ACCESS_TOKEN_TTL_SECS: i64 = 7 * 24 * 60 * 60;

/// Load or generate the JWT signing key (256-bit random secret).
/// Key is stored as raw bytes in data_dir/jwt_secret.
pub fn load_or_generate_jwt_secret(data_dir: &str) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(data_dir)?;
    let key_path = Path::new(data_dir).join("jwt_secret");

    if key_path.exists() {
        let key = std::fs::read(&key_path)?;
        if key.len() == 32 {
            tracing::info!("JWT signing key loaded from {}", key_path.display());
            return Ok(key);
        }
        tracing::warn!("JWT key file has wrong size ({}), regenerating", key.len());
    }

    let key: [u8; 32] = rand::rng().random();
    std::fs::write(&key_path, key)?;
    tracing::info!("JWT signing key generated at {}", key_path.display());
    Ok(key.to_vec())
}

/// Issue an access token for a user.
/// Claims: userId, email, iat, exp
pub fn issue_access_token(
    secret: &[u8],
    user_id: &str,
    email: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    issue_access_token_with_ttl(secret, user_id, email, ACCESS_TOKEN_TTL_SECS)
}

/// Issue an access token with an explicit lifetime. A negative TTL yields
/// an already-expired token.
pub fn issue_access_token_with_ttl(
    secret: &[u8],
    user_id: &str,
    email: &str,
    ttl_secs: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        user_id: user_id.to_string(),
        email: email.to_string(),
        iat: now,
        exp: now + ttl_secs,
    };

    encode(
        &Header::default(), // HS256
        &claims,
        &EncodingKey::from_secret(secret),
    )
}

/// Validate an access token and return its claims.
pub fn validate_access_token(
    secret: &[u8],
    token: &str,
) -> Result<Claims, jsonwebtoken::errors::Error> {
    let validation = Validation::new(jsonwebtoken::Algorithm::HS256);
    let token_data = decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)?;
    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::errors::ErrorKind;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    #[test]
    fn test_issue_then_validate() {
        let token = issue_access_token(SECRET, "user-1", "user1@example.com").unwrap();
        let claims = validate_access_token(SECRET, &token).unwrap();
        assert_eq!(claims.user_id, "user-1");
        assert_eq!(claims.email, "user1@example.com");
        assert_eq!(claims.exp - claims.iat, ACCESS_TOKEN_TTL_SECS);
    }

    #[test]
    fn test_expired_token_rejected() {
        // Beyond the default 60s leeway
        let token = issue_access_token_with_ttl(SECRET, "user-1", "a@b.c", -3600).unwrap();
        let err = validate_access_token(SECRET, &token).unwrap_err();
        assert_eq!(*err.kind(), ErrorKind::ExpiredSignature);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = issue_access_token(SECRET, "user-1", "a@b.c").unwrap();
        assert!(validate_access_token(b"another-secret", &token).is_err());
    }

    #[test]
    fn test_secret_is_persisted() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().to_str().unwrap();
        let first = load_or_generate_jwt_secret(dir).unwrap();
        let second = load_or_generate_jwt_secret(dir).unwrap();
        assert_eq!(first.len(), 32);
        assert_eq!(first, second);
    }
}
