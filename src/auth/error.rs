//! Authentication error taxonomy and its HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Domain errors surfaced by the auth core.
///
/// Every variant maps to a 4xx with a generic message; token errors are
/// deliberately uniform so the client cannot distinguish a malformed token
/// from an expired or revoked one.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Incorrect email or password")]
    InvalidCredentials,

    #[error("Inactive user")]
    InactiveAccount,

    #[error("Could not validate credentials")]
    TokenInvalid,

    #[error("Token has been revoked")]
    TokenRevoked,

    #[error("The user doesn't have enough privileges")]
    InsufficientRole,

    #[error("Resource belongs to another company")]
    InsufficientTenantScope,

    #[error("MFA verification required")]
    MfaRequired,

    #[error("Invalid MFA token")]
    MfaInvalidCode,

    #[error("MFA not set up for this user")]
    MfaNotSetUp,

    #[error("Invalid or expired invitation")]
    InvitationInvalid,

    #[error("Email already registered")]
    EmailExists,

    #[error("Invalid email address")]
    InvalidEmail,

    #[error("HTTPS required")]
    HttpsRequired,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidCredentials
            | Self::TokenInvalid
            | Self::TokenRevoked
            | Self::MfaRequired
            | Self::MfaInvalidCode => StatusCode::UNAUTHORIZED,
            Self::InactiveAccount
            | Self::MfaNotSetUp
            | Self::InvitationInvalid
            | Self::EmailExists
            | Self::InvalidEmail => StatusCode::BAD_REQUEST,
            Self::InsufficientRole | Self::InsufficientTenantScope | Self::HttpsRequired => {
                StatusCode::FORBIDDEN
            }
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Internal detail goes to tracing only; the client gets a generic body.
        let detail = match &self {
            Self::Internal(err) => {
                error!("internal auth error: {err:#}");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn credential_errors_are_unauthorized() {
        assert_eq!(
            AuthError::InvalidCredentials.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(AuthError::MfaInvalidCode.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn token_errors_share_a_status_class() {
        // Revoked and invalid must be indistinguishable by status code.
        assert_eq!(
            AuthError::TokenInvalid.status(),
            AuthError::TokenRevoked.status()
        );
    }

    #[test]
    fn authorization_errors_are_forbidden() {
        assert_eq!(AuthError::InsufficientRole.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            AuthError::InsufficientTenantScope.status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(AuthError::HttpsRequired.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn internal_errors_do_not_leak_detail() {
        let err = AuthError::Internal(anyhow!("pool exhausted on shard 3"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn invitation_errors_are_uniform() {
        // Used, expired, and unknown invitations all collapse to one message.
        assert_eq!(
            AuthError::InvitationInvalid.to_string(),
            "Invalid or expired invitation"
        );
    }
}
