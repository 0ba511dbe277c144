//! Request and response bodies for the auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::session::{LoginOutcome, TokenPair};
use crate::auth::store::{Invitation, Role};

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub company_name: String,
    pub admin_email: String,
    pub admin_password: String,
    pub admin_full_name: String,
}

/// OAuth2-style password form, `application/x-www-form-urlencoded`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

/// Token response for every flow that mints tokens. The MFA-pending variant
/// carries `mfa_required: true` and no refresh token.
#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mfa_required: Option<bool>,
}

impl TokenResponse {
    #[must_use]
    pub fn from_pair(pair: TokenPair) -> Self {
        Self {
            access_token: pair.access_token,
            token_type: "bearer",
            expires_in: pair.expires_in,
            refresh_token: Some(pair.refresh_token),
            mfa_required: None,
        }
    }

    #[must_use]
    pub fn from_outcome(outcome: LoginOutcome) -> Self {
        match outcome {
            LoginOutcome::Authenticated(pair) => Self::from_pair(pair),
            LoginOutcome::MfaPending {
                access_token,
                expires_in,
            } => Self {
                access_token,
                token_type: "bearer",
                expires_in,
                refresh_token: None,
                mfa_required: Some(true),
            },
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct MfaEnableRequest {
    pub password: String,
}

/// A TOTP code submission, for both `mfa/verify` and `mfa/login`.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct MfaCodeRequest {
    pub token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MfaEnableResponse {
    /// Base32 secret for manual authenticator entry.
    pub secret: String,
    /// `data:image/png;base64,...` QR code of the otpauth URI.
    pub qr_code: String,
    pub detail: &'static str,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DetailResponse {
    pub detail: &'static str,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct InviteRequest {
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InvitationResponse {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub token: String,
    pub expires_at: String,
}

impl InvitationResponse {
    #[must_use]
    pub fn from_invitation(invitation: Invitation) -> Self {
        Self {
            id: invitation.id,
            email: invitation.email,
            role: invitation.role,
            token: invitation.token,
            expires_at: invitation.expires_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct AcceptInviteRequest {
    pub token: String,
    pub password: String,
    pub full_name: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MeResponse {
    pub id: Uuid,
    pub company_id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub mfa_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_outcome_serializes_without_refresh_token() {
        let response = TokenResponse::from_outcome(LoginOutcome::MfaPending {
            access_token: "pending".to_string(),
            expires_in: 300,
        });
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["mfa_required"], true);
        assert_eq!(json["expires_in"], 300);
        assert_eq!(json["token_type"], "bearer");
        assert!(json.get("refresh_token").is_none());
    }

    #[test]
    fn full_pair_serializes_without_mfa_flag() {
        let response = TokenResponse::from_pair(TokenPair {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            expires_in: 1800,
        });
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["refresh_token"], "r");
        assert!(json.get("mfa_required").is_none());
    }

    #[test]
    fn requests_reject_unknown_fields() {
        let result: Result<RefreshRequest, _> =
            serde_json::from_str(r#"{"refresh_token":"x","extra":1}"#);
        assert!(result.is_err());

        let result: Result<MfaCodeRequest, _> = serde_json::from_str(r#"{"token":"123456"}"#);
        assert!(result.is_ok());
    }

    #[test]
    fn invite_role_parses_lowercase() {
        let request: InviteRequest =
            serde_json::from_str(r#"{"email":"b@acme.com","role":"standard"}"#).unwrap();
        assert_eq!(request.role, Role::Standard);
    }
}
