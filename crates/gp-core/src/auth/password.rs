//! Password hashing with Argon2id.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use thiserror::Error;

/// Password hashing errors.
#[derive(Error, Debug)]
pub enum PasswordError {
    #[error("Failed to hash password: {0}")]
    Hash(String),

    #[error("Failed to verify password: {0}")]
    Verify(String),

    /// The stored hash is not a valid PHC string.
    #[error("Invalid password hash format")]
    InvalidHash,
}

/// Hashes a password with Argon2id, returning a PHC string.
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::Hash(e.to_string()))
}

/// Verifies a password against a stored PHC hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(hash).map_err(|_| PasswordError::InvalidHash)?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::Verify(e.to_string())),
    }
}

/// Checks a password against the minimum requirements.
///
/// Returns a list of violation messages, empty if the password is
/// acceptable.
pub fn validate_password_strength(password: &str) -> Vec<&'static str> {
    let mut errors = Vec::new();

    if password.len() < 8 {
        errors.push("Password must be at least 8 characters long");
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        errors.push("Password must contain at least one lowercase letter");
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        errors.push("Password must contain at least one uppercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        errors.push("Password must contain at least one digit");
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify() {
        let hash = hash_password("Turnstile77").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("Turnstile77", &hash).unwrap());
        assert!(!verify_password("turnstile77", &hash).unwrap());
    }

    #[test]
    fn salts_are_unique() {
        let a = hash_password("Turnstile77").unwrap();
        let b = hash_password("Turnstile77").unwrap();
        assert_ne!(a, b);
        assert!(verify_password("Turnstile77", &a).unwrap());
        assert!(verify_password("Turnstile77", &b).unwrap());
    }

    #[test]
    fn malformed_hash_is_rejected() {
        assert!(matches!(
            verify_password("whatever", "plainly-not-a-hash"),
            Err(PasswordError::InvalidHash)
        ));
    }

    #[test]
    fn strength_rules() {
        assert!(validate_password_strength("Gatehouse1").is_empty());
        assert!(!validate_password_strength("short1A").is_empty());
        assert!(!validate_password_strength("nouppercase1").is_empty());
        assert!(!validate_password_strength("NOLOWERCASE1").is_empty());
        assert!(!validate_password_strength("NoDigitsHere").is_empty());
    }
}
