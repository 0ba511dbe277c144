//! Password hashing and verification using bcrypt.

use anyhow::{Context, Result};

/// Hash a plaintext password for storage.
///
/// bcrypt embeds a per-hash random salt, so no separate salt column is
/// needed. The plaintext is never logged or returned.
///
/// # Errors
/// Returns an error if the hashing primitive fails.
pub fn hash(plaintext: &str) -> Result<String> {
    bcrypt::hash(plaintext, bcrypt::DEFAULT_COST).context("failed to hash password")
}

/// Verify a plaintext password against a stored hash.
///
/// Mismatch timing is handled by the bcrypt primitive itself; a malformed
/// stored hash is an error, not a mismatch.
///
/// # Errors
/// Returns an error if the stored hash cannot be parsed.
pub fn verify(plaintext: &str, hashed: &str) -> Result<bool> {
    bcrypt::verify(plaintext, hashed).context("failed to verify password")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correct_password_matches() {
        let hashed = hash("Secret123!").unwrap();
        assert!(verify("Secret123!", &hashed).unwrap());
    }

    #[test]
    fn wrong_password_does_not_match() {
        let hashed = hash("Secret123!").unwrap();
        assert!(!verify("wrong", &hashed).unwrap());
    }

    #[test]
    fn hashes_are_salted() {
        let first = hash("Secret123!").unwrap();
        let second = hash("Secret123!").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn malformed_hash_is_an_error() {
        assert!(verify("Secret123!", "not-a-bcrypt-hash").is_err());
    }
}
