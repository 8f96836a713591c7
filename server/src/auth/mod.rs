pub mod jwt;
pub mod middleware;
pub mod profile;
pub mod provision;
pub mod verifier;

pub use verifier::{AuthError, IdentityVerifier, JwtVerifier, VerifiedIdentity};
