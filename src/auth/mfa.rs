//! TOTP engine: secret generation, enrollment material, code verification.

use anyhow::{anyhow, Result};
use totp_rs::{Algorithm, Secret, TOTP};
use uuid::Uuid;

use crate::auth::crypto;

/// Enrollment material returned to the user during MFA setup.
#[derive(Debug)]
pub struct MfaEnrollment {
    pub secret_base32: String,
    pub otpauth_url: String,
    /// PNG QR code as a `data:image/png;base64,...` URL.
    pub qr_code: String,
}

#[derive(Clone)]
pub struct MfaEngine {
    issuer: String,
    encryption_key: [u8; 32],
}

impl MfaEngine {
    #[must_use]
    pub fn new(issuer: String, encryption_key: [u8; 32]) -> Self {
        Self {
            issuer,
            encryption_key,
        }
    }

    /// Generate a fresh random TOTP secret (raw bytes).
    ///
    /// # Errors
    /// Returns an error if secret generation fails.
    pub fn generate_secret(&self) -> Result<Vec<u8>> {
        Secret::generate_secret()
            .to_bytes()
            .map_err(|e| anyhow!("Secret gen error: {e}"))
    }

    /// Build the enrollment material for a generated secret: base32 secret,
    /// otpauth provisioning URI, and a QR code data URL.
    ///
    /// # Errors
    /// Returns an error if TOTP or QR construction fails.
    pub fn enrollment(&self, secret: &[u8], account_email: &str) -> Result<MfaEnrollment> {
        let totp = self.totp(secret, account_email)?;

        let qr = totp
            .get_qr_base64()
            .map_err(|e| anyhow!("QR gen error: {e}"))?;

        Ok(MfaEnrollment {
            secret_base32: totp.get_secret_base32(),
            otpauth_url: totp.get_url(),
            qr_code: format!("data:image/png;base64,{qr}"),
        })
    }

    /// Verify a code against a raw secret, accepting the current step and one
    /// step of clock drift on either side.
    ///
    /// # Errors
    /// Returns an error if TOTP construction fails.
    pub fn verify(&self, secret: &[u8], code: &str) -> Result<bool> {
        let totp = self.totp(secret, "account")?;
        Ok(totp.check_current(code).unwrap_or(false))
    }

    /// Encrypt a secret for storage, bound to the owning account.
    ///
    /// # Errors
    /// Returns an error if encryption fails.
    pub fn seal(&self, secret: &[u8], account_id: Uuid) -> Result<String> {
        crypto::encrypt_secret(&self.encryption_key, secret, account_id)
    }

    /// Decrypt a stored secret. Only done transiently for verification.
    ///
    /// # Errors
    /// Returns an error if the ciphertext fails authentication.
    pub fn open(&self, ciphertext: &str, account_id: Uuid) -> Result<Vec<u8>> {
        crypto::decrypt_secret(&self.encryption_key, ciphertext, account_id)
    }

    fn totp(&self, secret: &[u8], account: &str) -> Result<TOTP> {
        // RFC 6238 defaults: SHA1, 6 digits, 30s step, skew of 1 step
        TOTP::new(
            Algorithm::SHA1,
            6,
            1,
            30,
            secret.to_vec(),
            Some(self.issuer.clone()),
            account.to_string(),
        )
        .map_err(|e| anyhow!("TOTP init error: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> MfaEngine {
        MfaEngine::new("WealthMap".to_string(), [7u8; 32])
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_generated_secrets_differ() {
        let engine = engine();
        let first = engine.generate_secret().unwrap();
        let second = engine.generate_secret().unwrap();
        assert_ne!(first, second);
        assert!(first.len() >= 16);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_enrollment_material() {
        let engine = engine();
        let secret = engine.generate_secret().unwrap();

        let enrollment = engine.enrollment(&secret, "a@acme.com").unwrap();

        assert!(!enrollment.secret_base32.is_empty());
        assert!(enrollment.otpauth_url.starts_with("otpauth://totp/"));
        assert!(enrollment.otpauth_url.contains("WealthMap"));
        assert!(enrollment.qr_code.starts_with("data:image/png;base64,"));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_verify_current_code() {
        let engine = engine();
        let secret = engine.generate_secret().unwrap();

        let totp = TOTP::new(
            Algorithm::SHA1,
            6,
            1,
            30,
            secret.clone(),
            Some("WealthMap".to_string()),
            "a@acme.com".to_string(),
        )
        .unwrap();
        let code = totp.generate_current().unwrap();

        assert!(engine.verify(&secret, &code).unwrap());
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_verify_rejects_wrong_code() {
        let engine = engine();
        let secret = engine.generate_secret().unwrap();
        assert!(!engine.verify(&secret, "000000").unwrap());
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_seal_open_roundtrip() {
        let engine = engine();
        let secret = engine.generate_secret().unwrap();
        let account_id = Uuid::new_v4();

        let sealed = engine.seal(&secret, account_id).unwrap();
        let opened = engine.open(&sealed, account_id).unwrap();
        assert_eq!(opened, secret);

        // Sealed secret is bound to the account
        assert!(engine.open(&sealed, Uuid::new_v4()).is_err());
    }
}
