//! Durable ledger of issued refresh tokens.
//!
//! Every refresh token is recorded by its `jti` at issuance. A token is good
//! for exactly one rotation: the rotate query flips `revoked` with a
//! conditional UPDATE, so under a concurrent double-refresh only one caller
//! wins and the loser sees a revoked token.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::Instrument;
use uuid::Uuid;

pub struct RefreshLedger;

impl RefreshLedger {
    /// Records a freshly issued refresh token.
    ///
    /// # Errors
    /// Returns an error if database insertion fails.
    pub async fn record(
        pool: &PgPool,
        jti: Uuid,
        account_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let query = r"
            INSERT INTO refresh_tokens (token_jti, account_id, expires_at)
            VALUES ($1, $2, $3)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(jti)
            .bind(account_id)
            .bind(expires_at)
            .execute(pool)
            .instrument(span)
            .await
            .context("failed to record refresh token")?;
        Ok(())
    }

    /// Same as [`Self::record`] but inside an open transaction, used by
    /// rotation so the revoke of the old token and the record of its
    /// replacement commit together.
    ///
    /// # Errors
    /// Returns an error if database insertion fails.
    pub async fn record_tx(
        tx: &mut Transaction<'_, Postgres>,
        jti: Uuid,
        account_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let query = r"
            INSERT INTO refresh_tokens (token_jti, account_id, expires_at)
            VALUES ($1, $2, $3)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(jti)
            .bind(account_id)
            .bind(expires_at)
            .execute(&mut **tx)
            .instrument(span)
            .await
            .context("failed to record rotated refresh token")?;
        Ok(())
    }

    /// Atomically consumes a refresh token for rotation.
    ///
    /// Only an unrevoked, unexpired row is flipped; the RETURNING clause
    /// tells the caller who owned it. `None` means the token was already
    /// spent, revoked, expired, or never issued.
    ///
    /// # Errors
    /// Returns an error if database update fails.
    pub async fn revoke_for_rotation(
        tx: &mut Transaction<'_, Postgres>,
        jti: Uuid,
    ) -> Result<Option<Uuid>> {
        let query = r"
            UPDATE refresh_tokens
            SET revoked = TRUE, revoked_at = NOW()
            WHERE token_jti = $1
              AND revoked = FALSE
              AND expires_at > NOW()
            RETURNING account_id
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(jti)
            .fetch_optional(&mut **tx)
            .instrument(span)
            .await
            .context("failed to consume refresh token")?;

        Ok(row.map(|row| row.get("account_id")))
    }

    /// Checks whether a refresh token is still usable (issued, unrevoked,
    /// unexpired) and belongs to the given account.
    ///
    /// # Errors
    /// Returns an error if database query fails.
    pub async fn is_valid(pool: &PgPool, jti: Uuid, account_id: Uuid) -> Result<bool> {
        let query = r"
            SELECT 1
            FROM refresh_tokens
            WHERE token_jti = $1
              AND account_id = $2
              AND revoked = FALSE
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
            .bind(account_id)
            .fetch_optional(pool)
            .instrument(span)
            .await
            .context("failed to check refresh token")?;
        Ok(row.is_some())
    }

    /// Revokes a single refresh token. Idempotent: revoking an already
    /// revoked or unknown token is not an error.
    ///
    /// # Errors
    /// Returns an error if database update fails.
    pub async fn revoke(pool: &PgPool, jti: Uuid) -> Result<()> {
        let query = r"
            UPDATE refresh_tokens
            SET revoked = TRUE, revoked_at = NOW()
            WHERE token_jti = $1
              AND revoked = FALSE
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(jti)
            .execute(pool)
            .instrument(span)
            .await
            .context("failed to revoke refresh token")?;
        Ok(())
    }

    /// Revokes every outstanding refresh token for an account. Used for
    /// account-wide session termination, e.g. on password change.
    ///
    /// # Errors
    /// Returns an error if database update fails.
    pub async fn revoke_all(pool: &PgPool, account_id: Uuid) -> Result<u64> {
        let query = r"
            UPDATE refresh_tokens
            SET revoked = TRUE, revoked_at = NOW()
            WHERE account_id = $1
              AND revoked = FALSE
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(account_id)
            .execute(pool)
            .instrument(span)
            .await
            .context("failed to revoke account refresh tokens")?;
        Ok(result.rows_affected())
    }

    /// Deletes expired rows. Run periodically by the janitor; revoked rows
    /// are kept until expiry so rotation conflicts stay observable.
    ///
    /// # Errors
    /// Returns an error if database deletion fails.
    pub async fn purge_expired(pool: &PgPool) -> Result<u64> {
        let query = "DELETE FROM refresh_tokens WHERE expires_at <= NOW()";
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
            .context("failed to purge expired refresh tokens")?;
        Ok(result.rows_affected())
    }
}
