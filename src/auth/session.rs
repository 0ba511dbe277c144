//! Session orchestrator: registration, login, MFA, refresh, logout,
//! invitations.
//!
//! Every operation takes the shared pool and [`AuthState`] plus the request
//! metadata for the activity log. Security-relevant outcomes are audited
//! whether the operation succeeds or fails; audit failures never abort the
//! request.

use anyhow::anyhow;
use sqlx::PgPool;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::{
    audit::{self, RequestMeta},
    blacklist,
    error::AuthError,
    ledger::RefreshLedger,
    mfa::MfaEnrollment,
    password,
    state::AuthState,
    store::{self, Account, Invitation, RegisterOutcome, Role},
    token::TokenType,
};

/// A full access + refresh token pair for an authenticated session.
#[derive(Debug)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

/// Outcome of a password login.
#[derive(Debug)]
pub enum LoginOutcome {
    Authenticated(TokenPair),
    /// MFA is enabled: the caller gets only a short-lived pending token and
    /// must present a TOTP code to finish.
    MfaPending {
        access_token: String,
        expires_in: i64,
    },
}

/// Registers a new company with its founding admin account, then behaves as
/// a successful login.
///
/// # Errors
/// `EmailExists` on a duplicate email; `Internal` on storage failure.
pub async fn register(
    pool: &PgPool,
    state: &AuthState,
    company_name: &str,
    email: &str,
    full_name: &str,
    plaintext: &str,
    meta: &RequestMeta,
) -> Result<TokenPair, AuthError> {
    let email = store::normalize_email(email);
    if !store::valid_email(&email) {
        return Err(AuthError::InvalidEmail);
    }

    let password_hash = hash_password(plaintext.to_string()).await?;

    let account = match store::insert_company_and_admin(
        pool,
        company_name,
        &email,
        full_name,
        &password_hash,
    )
    .await?
    {
        RegisterOutcome::Created(account) => account,
        RegisterOutcome::EmailExists => return Err(AuthError::EmailExists),
    };

    store::touch_last_login(pool, account.id).await?;
    let pair = issue_pair(pool, state, account.id).await?;

    audit::record(
        pool,
        Some(account.id),
        "register",
        "company and admin account created",
        meta,
    )
    .await;

    Ok(pair)
}

/// Password login. Unknown email and wrong password are indistinguishable.
///
/// # Errors
/// `InvalidCredentials`, `InactiveAccount`, or `Internal`.
pub async fn login(
    pool: &PgPool,
    state: &AuthState,
    email: &str,
    plaintext: &str,
    meta: &RequestMeta,
) -> Result<LoginOutcome, AuthError> {
    let email = store::normalize_email(email);

    let Some(account) = store::find_account_by_email(pool, &email).await? else {
        audit::record(pool, None, "login_failed", "unknown email", meta).await;
        return Err(AuthError::InvalidCredentials);
    };

    if !verify_password(plaintext.to_string(), account.password_hash.clone()).await? {
        audit::record(
            pool,
            Some(account.id),
            "login_failed",
            "password mismatch",
            meta,
        )
        .await;
        return Err(AuthError::InvalidCredentials);
    }

    if !account.is_active {
        audit::record(
            pool,
            Some(account.id),
            "login_failed",
            "inactive account",
            meta,
        )
        .await;
        return Err(AuthError::InactiveAccount);
    }

    if account.mfa_enabled {
        let access_token = state.codec().issue_pending(account.id)?;
        audit::record(
            pool,
            Some(account.id),
            "login_mfa_pending",
            "password accepted, awaiting TOTP code",
            meta,
        )
        .await;
        return Ok(LoginOutcome::MfaPending {
            access_token,
            expires_in: state.codec().pending_ttl_seconds(),
        });
    }

    store::touch_last_login(pool, account.id).await?;
    let pair = issue_pair(pool, state, account.id).await?;
    audit::record(pool, Some(account.id), "login", "password login", meta).await;

    Ok(LoginOutcome::Authenticated(pair))
}

/// Finishes an MFA login: pending token + current TOTP code in, full token
/// pair out.
///
/// # Errors
/// `TokenInvalid` for a missing/expired/non-pending token, `MfaNotSetUp`,
/// `MfaInvalidCode`, or `Internal`.
pub async fn mfa_login(
    pool: &PgPool,
    state: &AuthState,
    pending_token: &str,
    code: &str,
    meta: &RequestMeta,
) -> Result<TokenPair, AuthError> {
    let claims = state.codec().decode_access(pending_token)?;
    if !claims.is_mfa_pending() {
        return Err(AuthError::TokenInvalid);
    }

    let account = load_active_account(pool, claims.sub).await?;
    check_totp(pool, state, &account, code, meta).await?;

    store::touch_last_login(pool, account.id).await?;
    let pair = issue_pair(pool, state, account.id).await?;
    audit::record(pool, Some(account.id), "login", "MFA login", meta).await;

    Ok(pair)
}

/// Rotates a refresh token: the presented token is revoked and a new pair is
/// issued in one transaction. All failures are uniform so a caller cannot
/// probe whether a stolen token was already spent.
///
/// # Errors
/// `TokenInvalid` for any unusable token, or `Internal`.
pub async fn refresh(
    pool: &PgPool,
    state: &AuthState,
    refresh_token: &str,
    meta: &RequestMeta,
) -> Result<TokenPair, AuthError> {
    let claims = state.codec().decode_refresh(refresh_token)?;

    let mut tx = pool
        .begin()
        .await
        .map_err(|err| AuthError::Internal(anyhow!("begin refresh transaction: {err}")))?;

    let Some(account_id) = RefreshLedger::revoke_for_rotation(&mut tx, claims.jti).await? else {
        // Replay of a spent or revoked token. Likely theft; worth recording.
        audit::record(
            pool,
            Some(claims.sub),
            "token_reuse",
            "refresh token replayed after rotation or revocation",
            meta,
        )
        .await;
        return Err(AuthError::TokenInvalid);
    };

    let Some(account) = store::find_account_by_id(pool, account_id).await? else {
        return Err(AuthError::TokenInvalid);
    };
    if !account.is_active {
        // Commit the revocation anyway: an inactive account keeps no tokens.
        tx.commit()
            .await
            .map_err(|err| AuthError::Internal(anyhow!("commit refresh revocation: {err}")))?;
        return Err(AuthError::TokenInvalid);
    }

    let (access_token, _jti) = state.codec().issue_access(account_id)?;
    let issued = state.codec().issue_refresh(account_id)?;
    RefreshLedger::record_tx(&mut tx, issued.jti, account_id, issued.expires_at).await?;

    tx.commit()
        .await
        .map_err(|err| AuthError::Internal(anyhow!("commit refresh rotation: {err}")))?;

    audit::record(
        pool,
        Some(account_id),
        "token_refresh",
        "refresh token rotated",
        meta,
    )
    .await;

    Ok(TokenPair {
        access_token,
        refresh_token: issued.token,
        expires_in: state.codec().access_ttl_seconds(),
    })
}

/// Logs out: blacklists the access token and revokes the refresh token.
/// Idempotent and always succeeds; unusable tokens are simply ignored.
pub async fn logout(
    pool: &PgPool,
    state: &AuthState,
    access_token: Option<&str>,
    refresh_token: Option<&str>,
    meta: &RequestMeta,
) {
    let mut account_id = None;

    if let Some(token) = access_token {
        if let Ok(claims) = state.codec().decode_access(token) {
            account_id = Some(claims.sub);
            if let Some(jti) = claims.jti {
                let ttl = state.config().blacklist_ttl_hours();
                if let Err(err) = blacklist::add(pool, jti, TokenType::Access, ttl).await {
                    warn!("logout could not blacklist access token: {err:#}");
                }
            }
        } else {
            debug!("logout presented an undecodable access token");
        }
    }

    if let Some(token) = refresh_token {
        if let Ok(claims) = state.codec().decode_refresh(token) {
            account_id = account_id.or(Some(claims.sub));
            if let Err(err) = RefreshLedger::revoke(pool, claims.jti).await {
                warn!("logout could not revoke refresh token: {err:#}");
            }
        }
    }

    audit::record(pool, account_id, "logout", "session terminated", meta).await;
}

/// Starts MFA enrollment: re-verifies the password, generates and seals a
/// secret, and returns the material the user needs for their authenticator.
/// MFA stays off until the first code is verified.
///
/// # Errors
/// `InvalidCredentials` on a bad password, or `Internal`.
pub async fn enable_mfa(
    pool: &PgPool,
    state: &AuthState,
    account: &Account,
    plaintext: &str,
    meta: &RequestMeta,
) -> Result<MfaEnrollment, AuthError> {
    if !verify_password(plaintext.to_string(), account.password_hash.clone()).await? {
        audit::record(
            pool,
            Some(account.id),
            "mfa_enroll_failed",
            "password re-check failed",
            meta,
        )
        .await;
        return Err(AuthError::InvalidCredentials);
    }

    let secret = state.mfa().generate_secret()?;
    let enrollment = state.mfa().enrollment(&secret, &account.email)?;
    let sealed = state.mfa().seal(&secret, account.id)?;
    store::set_mfa_secret(pool, account.id, &sealed).await?;

    audit::record(
        pool,
        Some(account.id),
        "mfa_enroll",
        "MFA secret provisioned, pending verification",
        meta,
    )
    .await;

    Ok(enrollment)
}

/// Completes MFA enrollment by verifying the first code, flipping
/// `mfa_enabled` on.
///
/// # Errors
/// `MfaNotSetUp`, `MfaInvalidCode`, or `Internal`.
pub async fn verify_mfa(
    pool: &PgPool,
    state: &AuthState,
    account: &Account,
    code: &str,
    meta: &RequestMeta,
) -> Result<(), AuthError> {
    check_totp(pool, state, account, code, meta).await?;

    store::enable_mfa(pool, account.id).await?;
    audit::record(pool, Some(account.id), "mfa_enabled", "MFA activated", meta).await;
    Ok(())
}

/// Creates an invitation for a new account in the admin's company.
/// Re-inviting an email with a pending invitation returns that invitation
/// unchanged; the invite email is queued transactionally with the new row.
///
/// # Errors
/// `EmailExists` if the address already has an account, or `Internal`.
pub async fn invite(
    pool: &PgPool,
    state: &AuthState,
    admin: &Account,
    email: &str,
    role: Role,
    meta: &RequestMeta,
) -> Result<Invitation, AuthError> {
    let email = store::normalize_email(email);
    if !store::valid_email(&email) {
        return Err(AuthError::InvalidEmail);
    }

    if store::find_account_by_email(pool, &email).await?.is_some() {
        return Err(AuthError::EmailExists);
    }

    let mut tx = pool
        .begin()
        .await
        .map_err(|err| AuthError::Internal(anyhow!("begin invite transaction: {err}")))?;

    let invitation = match store::find_pending_invitation(&mut tx, admin.company_id, &email).await?
    {
        Some(existing) => existing,
        None => {
            store::insert_invitation(
                &mut tx,
                admin.company_id,
                &email,
                role,
                admin.id,
                state.config().invitation_ttl_days,
            )
            .await?
        }
    };

    tx.commit()
        .await
        .map_err(|err| AuthError::Internal(anyhow!("commit invite transaction: {err}")))?;

    audit::record(
        pool,
        Some(admin.id),
        "invite",
        &format!("invited {email} as {}", role.as_str()),
        meta,
    )
    .await;

    Ok(invitation)
}

/// Redeems an invitation exactly once, creating the account in the inviting
/// company, then behaves as a successful login.
///
/// # Errors
/// `InvitationInvalid` for an unknown/used/expired token, `EmailExists` if
/// the address gained an account since the invite, or `Internal`.
pub async fn accept_invitation(
    pool: &PgPool,
    state: &AuthState,
    token: &str,
    plaintext: &str,
    full_name: &str,
    meta: &RequestMeta,
) -> Result<TokenPair, AuthError> {
    let password_hash = hash_password(plaintext.to_string()).await?;

    let mut tx = pool
        .begin()
        .await
        .map_err(|err| AuthError::Internal(anyhow!("begin invite redeem transaction: {err}")))?;

    let Some(invitation) = store::consume_invitation(&mut tx, token).await? else {
        return Err(AuthError::InvitationInvalid);
    };

    let Some(account) = store::insert_account(
        &mut tx,
        invitation.company_id,
        &invitation.email,
        full_name,
        &password_hash,
        invitation.role,
    )
    .await?
    else {
        let _ = tx.rollback().await;
        return Err(AuthError::EmailExists);
    };

    tx.commit()
        .await
        .map_err(|err| AuthError::Internal(anyhow!("commit invite redeem transaction: {err}")))?;

    store::touch_last_login(pool, account.id).await?;
    let pair = issue_pair(pool, state, account.id).await?;

    audit::record(
        pool,
        Some(account.id),
        "invite_accepted",
        "invitation redeemed, account created",
        meta,
    )
    .await;

    Ok(pair)
}

/// Mints an access + refresh pair and records the refresh token.
async fn issue_pair(
    pool: &PgPool,
    state: &AuthState,
    account_id: Uuid,
) -> Result<TokenPair, AuthError> {
    let (access_token, _jti) = state.codec().issue_access(account_id)?;
    let issued = state.codec().issue_refresh(account_id)?;
    RefreshLedger::record(pool, issued.jti, account_id, issued.expires_at).await?;

    Ok(TokenPair {
        access_token,
        refresh_token: issued.token,
        expires_in: state.codec().access_ttl_seconds(),
    })
}

async fn check_totp(
    pool: &PgPool,
    state: &AuthState,
    account: &Account,
    code: &str,
    meta: &RequestMeta,
) -> Result<(), AuthError> {
    let Some(sealed) = account.mfa_secret.as_deref() else {
        return Err(AuthError::MfaNotSetUp);
    };

    let secret = state.mfa().open(sealed, account.id)?;
    if !state.mfa().verify(&secret, code)? {
        audit::record(
            pool,
            Some(account.id),
            "mfa_failed",
            "TOTP code rejected",
            meta,
        )
        .await;
        return Err(AuthError::MfaInvalidCode);
    }

    Ok(())
}

async fn load_active_account(pool: &PgPool, account_id: Uuid) -> Result<Account, AuthError> {
    let Some(account) = store::find_account_by_id(pool, account_id).await? else {
        return Err(AuthError::TokenInvalid);
    };
    if !account.is_active {
        return Err(AuthError::InactiveAccount);
    }
    Ok(account)
}

/// bcrypt is CPU-bound; keep it off the async worker threads.
async fn hash_password(plaintext: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || password::hash(&plaintext))
        .await
        .map_err(|err| AuthError::Internal(anyhow!("password hash task failed: {err}")))?
        .map_err(AuthError::Internal)
}

async fn verify_password(plaintext: String, password_hash: String) -> Result<bool, AuthError> {
    tokio::task::spawn_blocking(move || password::verify(&plaintext, &password_hash))
        .await
        .map_err(|err| AuthError::Internal(anyhow!("password verify task failed: {err}")))?
        .map_err(AuthError::Internal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn verify_password_offloads_and_matches() {
        let hash = password::hash("Secret123!").unwrap();
        assert!(verify_password("Secret123!".to_string(), hash.clone())
            .await
            .unwrap());
        assert!(!verify_password("wrong".to_string(), hash).await.unwrap());
    }

    #[tokio::test]
    async fn hash_password_produces_verifiable_hash() {
        let hash = hash_password("Secret123!".to_string()).await.unwrap();
        assert!(password::verify("Secret123!", &hash).unwrap());
    }

    #[test]
    fn login_outcome_debug_names() {
        let outcome = LoginOutcome::MfaPending {
            access_token: "t".to_string(),
            expires_in: 300,
        };
        assert!(format!("{outcome:?}").starts_with("MfaPending"));
    }
}
