//! Per-request security gate.
//!
//! Resolves a bearer token into a [`Principal`] or rejects the request.
//! Pipeline order matters: HTTPS enforcement, bearer extraction, decode,
//! MFA-pending rejection, blacklist check, account load + active check.

use axum::http::HeaderMap;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::{
    blacklist,
    error::AuthError,
    state::AuthState,
    store::{self, Account, Role},
};

/// Authenticated account context derived from a bearer token.
#[derive(Debug, Clone)]
pub struct Principal {
    pub account: Account,
    /// The access token's `jti`, kept so downstream code can blacklist it.
    pub jti: Option<Uuid>,
}

impl Principal {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.account.role == Role::Admin
    }
}

/// Resolve the request's bearer token into a principal.
///
/// # Errors
/// `HttpsRequired`, `TokenInvalid`, `MfaRequired` for a pending token,
/// `TokenRevoked` for a blacklisted one, `InactiveAccount`, or `Internal`.
pub async fn require_auth(
    headers: &HeaderMap,
    pool: &PgPool,
    state: &AuthState,
) -> Result<Principal, AuthError> {
    require_https(headers, state)?;

    let token = extract_bearer_token(headers).ok_or(AuthError::TokenInvalid)?;
    let claims = state.codec().decode_access(token)?;

    // A pending token proves the password only; it cannot reach protected
    // resources until the TOTP step completes.
    if claims.is_mfa_pending() {
        return Err(AuthError::MfaRequired);
    }

    if let Some(jti) = claims.jti {
        if blacklist::contains(pool, jti).await? {
            return Err(AuthError::TokenRevoked);
        }
    }

    let Some(account) = store::find_account_by_id(pool, claims.sub).await? else {
        return Err(AuthError::TokenInvalid);
    };
    if !account.is_active {
        return Err(AuthError::InactiveAccount);
    }

    Ok(Principal {
        account,
        jti: claims.jti,
    })
}

/// Require the principal to be a company admin.
///
/// # Errors
/// `InsufficientRole` for non-admins.
pub fn require_admin(principal: &Principal) -> Result<(), AuthError> {
    if principal.is_admin() {
        Ok(())
    } else {
        Err(AuthError::InsufficientRole)
    }
}

/// Require a resource's company to match the principal's tenant. Admins are
/// scoped too: they manage only their own company.
///
/// # Errors
/// `InsufficientTenantScope` on a cross-tenant access.
pub fn ensure_company_scope(principal: &Principal, company_id: Uuid) -> Result<(), AuthError> {
    if principal.account.company_id == company_id {
        Ok(())
    } else {
        Err(AuthError::InsufficientTenantScope)
    }
}

/// Enforce HTTPS behind a proxy in production when `https_only` is set.
fn require_https(headers: &HeaderMap, state: &AuthState) -> Result<(), AuthError> {
    let config = state.config();
    if !(config.https_only && config.production) {
        return Ok(());
    }

    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .map(str::trim);

    if proto == Some("https") {
        Ok(())
    } else {
        Err(AuthError::HttpsRequired)
    }
}

/// Pull the token out of an `Authorization: Bearer ...` header.
#[must_use]
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::state::AuthConfig;
    use axum::http::HeaderValue;
    use chrono::Utc;
    use secrecy::SecretString;

    fn account(role: Role) -> Account {
        Account {
            id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            email: "a@acme.com".to_string(),
            full_name: "A".to_string(),
            password_hash: String::new(),
            role,
            is_active: true,
            mfa_enabled: false,
            mfa_secret: None,
            last_login: Some(Utc::now()),
        }
    }

    fn state(https_only: bool, production: bool) -> AuthState {
        let config = AuthConfig::new()
            .with_https_only(https_only)
            .with_production(production);
        AuthState::new(config, &SecretString::from("test-signing-secret"), [1u8; 32])
    }

    #[test]
    fn bearer_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc.def.ghi"),
        );
        assert_eq!(extract_bearer_token(&headers), Some("abc.def.ghi"));
    }

    #[test]
    fn bearer_extraction_rejects_other_schemes_and_empty() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Basic dXNlcjpwYXNz"),
        );
        assert_eq!(extract_bearer_token(&headers), None);

        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer "),
        );
        assert_eq!(extract_bearer_token(&headers), None);

        assert_eq!(extract_bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn https_enforced_only_in_production() {
        let headers = HeaderMap::new();

        assert!(require_https(&headers, &state(false, false)).is_ok());
        assert!(require_https(&headers, &state(true, false)).is_ok());
        assert!(require_https(&headers, &state(false, true)).is_ok());
        assert!(matches!(
            require_https(&headers, &state(true, true)),
            Err(AuthError::HttpsRequired)
        ));
    }

    #[test]
    fn https_accepts_forwarded_proto() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));
        assert!(require_https(&headers, &state(true, true)).is_ok());

        headers.insert("x-forwarded-proto", HeaderValue::from_static("http"));
        assert!(matches!(
            require_https(&headers, &state(true, true)),
            Err(AuthError::HttpsRequired)
        ));
    }

    #[test]
    fn admin_check() {
        let admin = Principal {
            account: account(Role::Admin),
            jti: None,
        };
        let standard = Principal {
            account: account(Role::Standard),
            jti: None,
        };

        assert!(require_admin(&admin).is_ok());
        assert!(matches!(
            require_admin(&standard),
            Err(AuthError::InsufficientRole)
        ));
    }

    #[test]
    fn company_scope_check() {
        let principal = Principal {
            account: account(Role::Admin),
            jti: None,
        };

        assert!(ensure_company_scope(&principal, principal.account.company_id).is_ok());
        assert!(matches!(
            ensure_company_scope(&principal, Uuid::new_v4()),
            Err(AuthError::InsufficientTenantScope)
        ));
    }
}
