//! JWT bearer authentication.
//!
//! The API is stateless: a successful login returns an HS256-signed
//! token carrying the user id, username, and role. Every request
//! presents it as `Authorization: Bearer <token>`; the WebSocket
//! endpoint additionally accepts `?token=` because browsers cannot set
//! headers on WebSocket upgrades.

pub mod extractors;

pub use extractors::{AuthenticatedUser, RequireAdmin, RequireCashier};

use chrono::{Duration, Utc};
use gp_core::auth::{Role, User};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Default token lifetime.
pub const DEFAULT_TOKEN_TTL_MINUTES: i64 = 12 * 60;

/// Authentication errors.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Token expired")]
    Expired,

    #[error("Invalid token: {0}")]
    Invalid(String),

    #[error("Failed to sign token: {0}")]
    Signing(String),
}

/// Claims carried in an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: Uuid,
    /// Username at issue time, for logs; the database stays
    /// authoritative.
    pub username: String,
    /// Role at issue time.
    pub role: Role,
    /// Issued at (unix seconds).
    pub iat: i64,
    /// Expires at (unix seconds).
    pub exp: i64,
}

/// Signs and verifies access tokens.
pub struct TokenAuthority {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenAuthority {
    /// Creates an authority with the given HS256 secret and token TTL in
    /// minutes.
    pub fn new(secret: &[u8], ttl_minutes: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl: Duration::minutes(ttl_minutes.max(1)),
        }
    }

    /// Issues a token for the user.
    pub fn issue(&self, user: &User) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id,
            username: user.username.clone(),
            role: user.role,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }

    /// Verifies a token and returns its claims.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::Invalid(e.to_string()),
            })
    }

    /// Token lifetime in seconds, reported to clients at login.
    pub fn ttl_seconds(&self) -> i64 {
        self.ttl.num_seconds()
    }
}

/// Extracts the bearer token from an Authorization header value.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    header_value.strip_prefix("Bearer ").map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authority() -> TokenAuthority {
        TokenAuthority::new(b"test-secret-at-least-32-bytes-long!!", 60)
    }

    #[test]
    fn issue_and_verify_round_trip() {
        let authority = authority();
        let user = User::new("kassir1", "kassir1@example.com", "hash", Role::Cashier);

        let token = authority.issue(&user).unwrap();
        let claims = authority.verify(&token).unwrap();

        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.username, "kassir1");
        assert_eq!(claims.role, Role::Cashier);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let user = User::new("op", "op@example.com", "hash", Role::Viewer);
        let token = authority().issue(&user).unwrap();

        let other = TokenAuthority::new(b"a-completely-different-secret-value", 60);
        assert!(matches!(other.verify(&token), Err(AuthError::Invalid(_))));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            authority().verify("not.a.token"),
            Err(AuthError::Invalid(_))
        ));
    }

    #[test]
    fn bearer_extraction() {
        assert_eq!(bearer_token("Bearer abc.def.ghi"), Some("abc.def.ghi"));
        assert_eq!(bearer_token("Basic dXNlcg=="), None);
        assert_eq!(bearer_token("bearer abc"), None);
    }

    #[test]
    fn ttl_is_clamped_to_a_minimum() {
        let authority = TokenAuthority::new(b"secret", 0);
        assert_eq!(authority.ttl_seconds(), 60);
    }
}
