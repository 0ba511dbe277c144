//! Database access for companies, accounts, and invitations.

use anyhow::{anyhow, Context, Result};
use base64::Engine;
use chrono::{DateTime, Utc};
use rand::{rngs::OsRng, RngCore};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::Instrument;
use uuid::Uuid;

/// Account role within a company. Stored as lowercase text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Standard,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Standard => "standard",
        }
    }

    fn parse(value: &str) -> Result<Self> {
        match value {
            "admin" => Ok(Self::Admin),
            "standard" => Ok(Self::Standard),
            other => Err(anyhow!("unknown role in database: {other}")),
        }
    }
}

/// A company account row. The password hash stays inside the auth core; it
/// is never serialized into a response.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: Uuid,
    pub company_id: Uuid,
    pub email: String,
    pub full_name: String,
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
    pub mfa_enabled: bool,
    pub mfa_secret: Option<String>,
    pub last_login: Option<DateTime<Utc>>,
}

/// A pending invitation row. The token is the raw value sent in the invite
/// email; re-inviting the same address returns this row unchanged.
#[derive(Debug, Clone)]
pub struct Invitation {
    pub id: Uuid,
    pub company_id: Uuid,
    pub email: String,
    pub role: Role,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Outcome of registering a new company with its first admin.
#[derive(Debug)]
pub enum RegisterOutcome {
    Created(Account),
    EmailExists,
}

const ACCOUNT_COLUMNS: &str = "id, company_id, email, full_name, password_hash, \
     role, is_active, mfa_enabled, mfa_secret, last_login";

fn account_from_row(row: &sqlx::postgres::PgRow) -> Result<Account> {
    let role: String = row.get("role");
    Ok(Account {
        id: row.get("id"),
        company_id: row.get("company_id"),
        email: row.get("email"),
        full_name: row.get("full_name"),
        password_hash: row.get("password_hash"),
        role: Role::parse(&role)?,
        is_active: row.get("is_active"),
        mfa_enabled: row.get("mfa_enabled"),
        mfa_secret: row.get("mfa_secret"),
        last_login: row.get("last_login"),
    })
}

/// Look up an account by normalized email.
///
/// # Errors
/// Returns an error if database query fails.
pub async fn find_account_by_email(pool: &PgPool, email: &str) -> Result<Option<Account>> {
    let query = &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = $1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup account by email")?;

    row.as_ref().map(account_from_row).transpose()
}

/// Look up an account by id.
///
/// # Errors
/// Returns an error if database query fails.
pub async fn find_account_by_id(pool: &PgPool, account_id: Uuid) -> Result<Option<Account>> {
    let query = &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(query)
        .bind(account_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup account by id")?;

    row.as_ref().map(account_from_row).transpose()
}

/// Creates a company and its first admin account in one transaction.
///
/// # Errors
/// Returns an error if database insertion fails.
pub async fn insert_company_and_admin(
    pool: &PgPool,
    company_name: &str,
    email: &str,
    full_name: &str,
    password_hash: &str,
) -> Result<RegisterOutcome> {
    // Company row must not survive if the admin insert hits a duplicate email.
    let mut tx = pool.begin().await.context("begin register transaction")?;

    let query = "INSERT INTO companies (name) VALUES ($1) RETURNING id";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(company_name)
        .fetch_one(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert company")?;
    let company_id: Uuid = row.get("id");

    let query = &format!(
        r"
        INSERT INTO accounts (company_id, email, full_name, password_hash, role)
        VALUES ($1, $2, $3, $4, 'admin')
        RETURNING {ACCOUNT_COLUMNS}
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(query)
        .bind(company_id)
        .bind(email)
        .bind(full_name)
        .bind(password_hash)
        .fetch_one(&mut *tx)
        .instrument(span)
        .await;

    let account = match row {
        Ok(row) => account_from_row(&row)?,
        Err(err) => {
            if is_unique_violation(&err) {
                let _ = tx.rollback().await;
                return Ok(RegisterOutcome::EmailExists);
            }
            return Err(err).context("failed to insert admin account");
        }
    };

    tx.commit().await.context("commit register transaction")?;
    Ok(RegisterOutcome::Created(account))
}

/// Inserts an account inside an open transaction. Returns `None` on a
/// duplicate email.
///
/// # Errors
/// Returns an error if database insertion fails.
pub async fn insert_account(
    tx: &mut Transaction<'_, Postgres>,
    company_id: Uuid,
    email: &str,
    full_name: &str,
    password_hash: &str,
    role: Role,
) -> Result<Option<Account>> {
    let query = &format!(
        r"
        INSERT INTO accounts (company_id, email, full_name, password_hash, role)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {ACCOUNT_COLUMNS}
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(query)
        .bind(company_id)
        .bind(email)
        .bind(full_name)
        .bind(password_hash)
        .bind(role.as_str())
        .fetch_one(&mut **tx)
        .instrument(span)
        .await;

    match row {
        Ok(row) => Ok(Some(account_from_row(&row)?)),
        Err(err) if is_unique_violation(&err) => Ok(None),
        Err(err) => Err(err).context("failed to insert account"),
    }
}

/// Records a successful authentication.
///
/// # Errors
/// Returns an error if database update fails.
pub async fn touch_last_login(pool: &PgPool, account_id: Uuid) -> Result<()> {
    let query = "UPDATE accounts SET last_login = NOW() WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(account_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to touch last_login")?;
    Ok(())
}

/// Stores a freshly sealed MFA secret. MFA stays disabled until the first
/// code is verified.
///
/// # Errors
/// Returns an error if database update fails.
pub async fn set_mfa_secret(pool: &PgPool, account_id: Uuid, sealed_secret: &str) -> Result<()> {
    let query = r"
        UPDATE accounts
        SET mfa_secret = $2, mfa_enabled = FALSE
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(account_id)
        .bind(sealed_secret)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to store MFA secret")?;
    Ok(())
}

/// Flips MFA on after the first successful code verification.
///
/// # Errors
/// Returns an error if database update fails.
pub async fn enable_mfa(pool: &PgPool, account_id: Uuid) -> Result<()> {
    let query = "UPDATE accounts SET mfa_enabled = TRUE WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(account_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to enable MFA")?;
    Ok(())
}

fn invitation_from_row(row: &sqlx::postgres::PgRow) -> Result<Invitation> {
    let role: String = row.get("role");
    Ok(Invitation {
        id: row.get("id"),
        company_id: row.get("company_id"),
        email: row.get("email"),
        role: Role::parse(&role)?,
        token: row.get("token"),
        expires_at: row.get("expires_at"),
    })
}

/// Finds an unexpired, unaccepted invitation for an email within a company.
/// Re-inviting returns this row unchanged instead of minting a new token.
///
/// # Errors
/// Returns an error if database query fails.
pub async fn find_pending_invitation(
    tx: &mut Transaction<'_, Postgres>,
    company_id: Uuid,
    email: &str,
) -> Result<Option<Invitation>> {
    let query = r"
        SELECT id, company_id, email, role, token, expires_at
        FROM invitations
        WHERE company_id = $1
          AND email = $2
          AND used = FALSE
          AND expires_at > NOW()
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(company_id)
        .bind(email)
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to lookup pending invitation")?;

    row.as_ref().map(invitation_from_row).transpose()
}

/// Inserts a new invitation and queues the invite email in the same
/// transaction.
///
/// # Errors
/// Returns an error if database insertion fails.
pub async fn insert_invitation(
    tx: &mut Transaction<'_, Postgres>,
    company_id: Uuid,
    email: &str,
    role: Role,
    invited_by: Uuid,
    ttl_days: i64,
) -> Result<Invitation> {
    let token = generate_invitation_token()?;

    let query = r"
        INSERT INTO invitations (company_id, email, role, token, invited_by, expires_at)
        VALUES ($1, $2, $3, $4, $5, NOW() + ($6 * INTERVAL '1 day'))
        RETURNING id, company_id, email, role, token, expires_at
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(company_id)
        .bind(email)
        .bind(role.as_str())
        .bind(&token)
        .bind(invited_by)
        .bind(ttl_days)
        .fetch_one(&mut **tx)
        .instrument(span)
        .await
        .context("failed to insert invitation")?;

    let invitation = invitation_from_row(&row)?;
    enqueue_invitation_email(tx, &invitation).await?;
    Ok(invitation)
}

/// Atomically consumes an invitation by its token. `None` means the token is
/// unknown, already used, or expired; the caller cannot tell which.
///
/// # Errors
/// Returns an error if database update fails.
pub async fn consume_invitation(
    tx: &mut Transaction<'_, Postgres>,
    token: &str,
) -> Result<Option<Invitation>> {
    let query = r"
        UPDATE invitations
        SET used = TRUE, used_at = NOW()
        WHERE token = $1
          AND used = FALSE
          AND expires_at > NOW()
        RETURNING id, company_id, email, role, token, expires_at
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token)
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to consume invitation")?;

    row.as_ref().map(invitation_from_row).transpose()
}

async fn enqueue_invitation_email(
    tx: &mut Transaction<'_, Postgres>,
    invitation: &Invitation,
) -> Result<()> {
    let payload = json!({
        "email": invitation.email,
        "token": invitation.token,
        "role": invitation.role.as_str(),
    });
    let payload_text =
        serde_json::to_string(&payload).context("failed to serialize invite payload")?;

    let query = r"
        INSERT INTO email_outbox (to_email, template, payload_json)
        VALUES ($1, $2, $3::jsonb)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(&invitation.email)
        .bind("invite_member")
        .bind(payload_text)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to insert invite outbox row")?;
    Ok(())
}

/// Normalize an email for lookup/uniqueness checks.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(crate) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

/// Create a new invitation token for invite links. The raw value is stored
/// and emailed; re-invites return the same token.
fn generate_invitation_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate invitation token")?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("a@example.com"));
        assert!(valid_email("name.surname@example.co"));
    }

    #[test]
    fn valid_email_rejects_malformed_input() {
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("a@b"));
        assert!(!valid_email("a b@example.com"));
        assert!(!valid_email(""));
    }

    #[test]
    fn role_round_trips_through_text() {
        assert_eq!(Role::parse("admin").unwrap(), Role::Admin);
        assert_eq!(Role::parse("standard").unwrap(), Role::Standard);
        assert_eq!(Role::Admin.as_str(), "admin");
        assert!(Role::parse("root").is_err());
    }

    #[test]
    fn invitation_tokens_are_unique_and_url_safe() {
        let first = generate_invitation_token().unwrap();
        let second = generate_invitation_token().unwrap();
        assert_ne!(first, second);
        assert!(!first.contains('+'));
        assert!(!first.contains('/'));
        assert!(!first.contains('='));
    }

    #[test]
    fn register_outcome_debug_names() {
        assert_eq!(
            format!("{:?}", RegisterOutcome::EmailExists),
            "EmailExists"
        );
    }
}
