//! Signed bearer token codec for access and refresh tokens.
//!
//! Tokens are HS256 JWTs. Claims are typed per token kind and decoding fails
//! closed: a bad signature, malformed payload, wrong `type` field, unknown
//! fields, or expired `exp` all collapse to [`AuthError::TokenInvalid`].

use anyhow::anyhow;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::error::AuthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

/// Claims carried by access tokens, including the short-lived MFA-pending
/// variant (`mfa_required = true`, no refresh token issued alongside).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccessClaims {
    pub sub: Uuid,
    pub exp: i64,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    /// Present on full access tokens so logout can blacklist them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mfa_required: Option<bool>,
}

impl AccessClaims {
    /// True for the interim token issued after password login on an
    /// MFA-enabled account. Insufficient to reach protected resources.
    #[must_use]
    pub fn is_mfa_pending(&self) -> bool {
        self.mfa_required.unwrap_or(false)
    }
}

/// Claims carried by refresh tokens. The `jti` keys the durable ledger row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefreshClaims {
    pub sub: Uuid,
    pub exp: i64,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub jti: Uuid,
}

/// A freshly minted refresh token plus the metadata the ledger records.
#[derive(Debug)]
pub struct IssuedRefresh {
    pub token: String,
    pub jti: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
    pending_ttl: Duration,
}

impl TokenCodec {
    #[must_use]
    pub fn new(
        secret: &SecretString,
        access_ttl_minutes: i64,
        refresh_ttl_days: i64,
        pending_ttl_minutes: i64,
    ) -> Self {
        let secret = secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            access_ttl: Duration::minutes(access_ttl_minutes),
            refresh_ttl: Duration::days(refresh_ttl_days),
            pending_ttl: Duration::minutes(pending_ttl_minutes),
        }
    }

    #[must_use]
    pub fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl.num_seconds()
    }

    #[must_use]
    pub fn pending_ttl_seconds(&self) -> i64 {
        self.pending_ttl.num_seconds()
    }

    #[must_use]
    pub fn refresh_ttl_seconds(&self) -> i64 {
        self.refresh_ttl.num_seconds()
    }

    /// Issue a full access token with a fresh `jti`.
    ///
    /// # Errors
    /// Returns an error if signing fails.
    pub fn issue_access(&self, subject: Uuid) -> Result<(String, Uuid), AuthError> {
        let jti = Uuid::new_v4();
        let claims = AccessClaims {
            sub: subject,
            exp: (Utc::now() + self.access_ttl).timestamp(),
            token_type: TokenType::Access,
            jti: Some(jti),
            mfa_required: None,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|err| AuthError::Internal(anyhow!("failed to sign access token: {err}")))?;

        Ok((token, jti))
    }

    /// Issue the short-lived MFA-pending token returned by password login on
    /// an MFA-enabled account. Carries no `jti` — it cannot reach protected
    /// resources, so there is nothing to blacklist.
    ///
    /// # Errors
    /// Returns an error if signing fails.
    pub fn issue_pending(&self, subject: Uuid) -> Result<String, AuthError> {
        let claims = AccessClaims {
            sub: subject,
            exp: (Utc::now() + self.pending_ttl).timestamp(),
            token_type: TokenType::Access,
            jti: None,
            mfa_required: Some(true),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|err| AuthError::Internal(anyhow!("failed to sign pending token: {err}")))
    }

    /// Issue a refresh token with a fresh random `jti`.
    ///
    /// # Errors
    /// Returns an error if signing fails.
    pub fn issue_refresh(&self, subject: Uuid) -> Result<IssuedRefresh, AuthError> {
        let jti = Uuid::new_v4();
        let expires_at = Utc::now() + self.refresh_ttl;
        let claims = RefreshClaims {
            sub: subject,
            exp: expires_at.timestamp(),
            token_type: TokenType::Refresh,
            jti,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|err| AuthError::Internal(anyhow!("failed to sign refresh token: {err}")))?;

        Ok(IssuedRefresh {
            token,
            jti,
            expires_at,
        })
    }

    /// Decode and validate an access token.
    ///
    /// # Errors
    /// Returns [`AuthError::TokenInvalid`] on any signature, shape, type, or
    /// expiry failure.
    pub fn decode_access(&self, token: &str) -> Result<AccessClaims, AuthError> {
        let claims = decode::<AccessClaims>(token, &self.decoding, &self.validation())
            .map(|data| data.claims)
            .map_err(|_| AuthError::TokenInvalid)?;

        if claims.token_type != TokenType::Access {
            return Err(AuthError::TokenInvalid);
        }

        Ok(claims)
    }

    /// Decode and validate a refresh token.
    ///
    /// # Errors
    /// Returns [`AuthError::TokenInvalid`] on any signature, shape, type, or
    /// expiry failure.
    pub fn decode_refresh(&self, token: &str) -> Result<RefreshClaims, AuthError> {
        let claims = decode::<RefreshClaims>(token, &self.decoding, &self.validation())
            .map(|data| data.claims)
            .map_err(|_| AuthError::TokenInvalid)?;

        if claims.token_type != TokenType::Refresh {
            return Err(AuthError::TokenInvalid);
        }

        Ok(claims)
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);
        // No leeway: a token one second past exp is already invalid.
        validation.leeway = 0;
        validation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn codec() -> TokenCodec {
        TokenCodec::new(&SecretString::from("test-signing-secret"), 30, 7, 5)
    }

    #[test]
    fn access_round_trip() {
        let codec = codec();
        let subject = Uuid::new_v4();

        let (token, jti) = codec.issue_access(subject).unwrap();
        let claims = codec.decode_access(&token).unwrap();

        assert_eq!(claims.sub, subject);
        assert_eq!(claims.jti, Some(jti));
        assert_eq!(claims.token_type, TokenType::Access);
        assert!(!claims.is_mfa_pending());
    }

    #[test]
    fn refresh_round_trip() {
        let codec = codec();
        let subject = Uuid::new_v4();

        let issued = codec.issue_refresh(subject).unwrap();
        let claims = codec.decode_refresh(&issued.token).unwrap();

        assert_eq!(claims.sub, subject);
        assert_eq!(claims.jti, issued.jti);
        assert_eq!(claims.exp, issued.expires_at.timestamp());
    }

    #[test]
    fn pending_token_has_no_jti() {
        let codec = codec();
        let subject = Uuid::new_v4();

        let token = codec.issue_pending(subject).unwrap();
        let claims = codec.decode_access(&token).unwrap();

        assert!(claims.is_mfa_pending());
        assert_eq!(claims.jti, None);
    }

    #[test]
    fn jti_is_unique_per_token() {
        let codec = codec();
        let subject = Uuid::new_v4();

        let (_, first) = codec.issue_access(subject).unwrap();
        let (_, second) = codec.issue_access(subject).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn decode_rejects_wrong_token_type() {
        let codec = codec();
        let subject = Uuid::new_v4();

        let (access, _) = codec.issue_access(subject).unwrap();
        let refresh = codec.issue_refresh(subject).unwrap();

        assert!(matches!(
            codec.decode_refresh(&access),
            Err(AuthError::TokenInvalid)
        ));
        assert!(matches!(
            codec.decode_access(&refresh.token),
            Err(AuthError::TokenInvalid)
        ));
    }

    #[test]
    fn decode_rejects_tampered_signature() {
        let codec = codec();
        let (token, _) = codec.issue_access(Uuid::new_v4()).unwrap();

        let mut tampered = token;
        tampered.pop();
        tampered.push('A');

        assert!(matches!(
            codec.decode_access(&tampered),
            Err(AuthError::TokenInvalid)
        ));
    }

    #[test]
    fn decode_rejects_wrong_secret() {
        let codec = codec();
        let other = TokenCodec::new(&SecretString::from("another-secret"), 30, 7, 5);

        let (token, _) = codec.issue_access(Uuid::new_v4()).unwrap();
        assert!(matches!(
            other.decode_access(&token),
            Err(AuthError::TokenInvalid)
        ));
    }

    #[test]
    fn decode_rejects_expired_token() {
        let codec = codec();
        let claims = AccessClaims {
            sub: Uuid::new_v4(),
            exp: (Utc::now() - Duration::seconds(1)).timestamp(),
            token_type: TokenType::Access,
            jti: Some(Uuid::new_v4()),
            mfa_required: None,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test-signing-secret"),
        )
        .unwrap();

        assert!(matches!(
            codec.decode_access(&token),
            Err(AuthError::TokenInvalid)
        ));
    }

    #[test]
    fn decode_rejects_unknown_claims() {
        let codec = codec();
        let claims = json!({
            "sub": Uuid::new_v4(),
            "exp": (Utc::now() + Duration::minutes(5)).timestamp(),
            "type": "access",
            "surprise": "extra",
        });
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test-signing-secret"),
        )
        .unwrap();

        assert!(matches!(
            codec.decode_access(&token),
            Err(AuthError::TokenInvalid)
        ));
    }

    #[test]
    fn decode_rejects_garbage() {
        let codec = codec();
        assert!(matches!(
            codec.decode_access("not-a-jwt"),
            Err(AuthError::TokenInvalid)
        ));
        assert!(matches!(
            codec.decode_refresh(""),
            Err(AuthError::TokenInvalid)
        ));
    }

    #[test]
    fn refresh_token_missing_jti_is_invalid() {
        let codec = codec();
        let claims = json!({
            "sub": Uuid::new_v4(),
            "exp": (Utc::now() + Duration::minutes(5)).timestamp(),
            "type": "refresh",
        });
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test-signing-secret"),
        )
        .unwrap();

        assert!(matches!(
            codec.decode_refresh(&token),
            Err(AuthError::TokenInvalid)
        ));
    }
}
