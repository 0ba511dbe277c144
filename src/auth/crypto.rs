//! Authenticated encryption for MFA secrets at rest.
//!
//! Secrets are sealed with ChaCha20-Poly1305 under a key from configuration.
//! The AAD binds the ciphertext to the owning account, so a ciphertext copied
//! onto another account row fails to decrypt.

use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use uuid::Uuid;

/// Encrypts an MFA secret for the given account.
/// Returns `base64(nonce (12 bytes) || ciphertext)`.
///
/// # Errors
/// Returns an error if encryption fails.
pub fn encrypt_secret(key: &[u8; 32], secret: &[u8], account_id: Uuid) -> Result<String> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));

    let mut nonce_bytes = [0u8; 12];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let aad = construct_aad(account_id);
    let payload = Payload {
        msg: secret,
        aad: &aad,
    };

    let ciphertext = cipher
        .encrypt(nonce, payload)
        .map_err(|e| anyhow!("Encryption failure: {e}"))?;

    let mut combined = Vec::with_capacity(nonce_bytes.len() + ciphertext.len());
    combined.extend_from_slice(&nonce_bytes);
    combined.extend_from_slice(&ciphertext);

    Ok(STANDARD.encode(combined))
}

/// Decrypts an MFA secret for the given account.
/// Expects `base64(nonce (12 bytes) || ciphertext)`.
///
/// # Errors
/// Returns an error if the payload is malformed, too short, or fails
/// authentication.
pub fn decrypt_secret(key: &[u8; 32], encoded: &str, account_id: Uuid) -> Result<Vec<u8>> {
    let combined = STANDARD
        .decode(encoded)
        .map_err(|e| anyhow!("Invalid ciphertext encoding: {e}"))?;

    if combined.len() < 13 {
        return Err(anyhow!("Invalid ciphertext length"));
    }

    let (nonce_bytes, ciphertext) = combined.split_at(12);
    let nonce = Nonce::from_slice(nonce_bytes);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));

    let aad = construct_aad(account_id);
    let payload = Payload {
        msg: ciphertext,
        aad: &aad,
    };

    cipher
        .decrypt(nonce, payload)
        .map_err(|e| anyhow!("Decryption failure: {e}"))
}

fn construct_aad(account_id: Uuid) -> Vec<u8> {
    // AAD = "mfa-secret:v1|account_id"
    format!("mfa-secret:v1|{account_id}").into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_encrypt_decrypt_roundtrip() {
        let key = [42u8; 32];
        let secret = b"JBSWY3DPEHPK3PXP";
        let account_id = Uuid::new_v4();

        let encrypted = encrypt_secret(&key, secret, account_id).unwrap();
        assert_ne!(encrypted.as_bytes(), secret);

        let decrypted = decrypt_secret(&key, &encrypted, account_id).unwrap();
        assert_eq!(decrypted, secret);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_decrypt_fails_for_other_account() {
        let key = [42u8; 32];
        let account_id = Uuid::new_v4();

        let encrypted = encrypt_secret(&key, b"secret", account_id).unwrap();

        // Ciphertext moved to another account must not decrypt
        let result = decrypt_secret(&key, &encrypted, Uuid::new_v4());
        assert!(result.is_err());
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_decrypt_fails_wrong_key() {
        let account_id = Uuid::new_v4();
        let encrypted = encrypt_secret(&[42u8; 32], b"secret", account_id).unwrap();
        assert!(decrypt_secret(&[99u8; 32], &encrypted, account_id).is_err());
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_decrypt_fails_tampered_ciphertext() {
        let key = [42u8; 32];
        let account_id = Uuid::new_v4();

        let encrypted = encrypt_secret(&key, b"secret", account_id).unwrap();
        let mut combined = STANDARD.decode(&encrypted).unwrap();
        if let Some(byte) = combined.last_mut() {
            *byte ^= 0xFF;
        }
        let tampered = STANDARD.encode(combined);

        assert!(decrypt_secret(&key, &tampered, account_id).is_err());
    }

    #[test]
    fn test_decrypt_rejects_short_payload() {
        let short = STANDARD.encode([0u8; 4]);
        assert!(decrypt_secret(&[42u8; 32], &short, Uuid::new_v4()).is_err());
    }
}
