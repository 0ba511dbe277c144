//! Access token blacklist.
//!
//! Access tokens are stateless JWTs, so logout denylists the token's `jti`
//! until its natural expiry. Rows only need to outlive the longest access
//! TTL; the janitor sweeps the rest.

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::Instrument;
use uuid::Uuid;

use crate::auth::token::TokenType;

/// Adds a `jti` to the blacklist. Idempotent: re-blacklisting the same token
/// is a no-op, so a repeated logout still succeeds.
///
/// # Errors
/// Returns an error if database insertion fails.
pub async fn add(pool: &PgPool, jti: Uuid, token_type: TokenType, ttl_hours: i64) -> Result<()> {
    let query = r"
        INSERT INTO token_blacklist (token_jti, token_type, expires_at)
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 hour'))
        ON CONFLICT (token_jti) DO NOTHING
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(jti)
        .bind(token_type.as_str())
        .bind(ttl_hours)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to blacklist token")?;
    Ok(())
}

/// Checks whether a `jti` is blacklisted. Expired rows the janitor has not
/// yet swept do not count: the token itself is already past `exp` by then.
///
/// # Errors
/// Returns an error if database query fails.
pub async fn contains(pool: &PgPool, jti: Uuid) -> Result<bool> {
    let query = r"
        SELECT 1
        FROM token_blacklist
        WHERE token_jti = $1
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
        .bind(jti)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to check token blacklist")?;
    Ok(row.is_some())
}

/// Deletes expired blacklist rows.
///
/// # Errors
/// Returns an error if database deletion fails.
pub async fn purge_expired(pool: &PgPool) -> Result<u64> {
    let query = "DELETE FROM token_blacklist WHERE expires_at <= NOW()";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to purge expired blacklist rows")?;
    Ok(result.rows_affected())
}
