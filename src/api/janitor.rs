//! Periodic cleanup of expired token state.
//!
//! The refresh ledger and blacklist both accumulate rows that matter only
//! until their `expires_at`. A background task sweeps them on a fixed
//! cadence; correctness never depends on the sweep since every read filters
//! on expiry.

use sqlx::PgPool;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error};

use crate::auth::{blacklist, ledger::RefreshLedger};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Spawn the background sweep task.
pub fn spawn(pool: PgPool, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let interval = if interval.is_zero() {
            DEFAULT_INTERVAL
        } else {
            interval
        };

        loop {
            sleep(interval).await;

            match RefreshLedger::purge_expired(&pool).await {
                Ok(count) if count > 0 => debug!("purged {count} expired refresh tokens"),
                Ok(_) => {}
                Err(err) => error!("refresh token purge failed: {err:#}"),
            }

            match blacklist::purge_expired(&pool).await {
                Ok(count) if count > 0 => debug!("purged {count} expired blacklist rows"),
                Ok(_) => {}
                Err(err) => error!("token blacklist purge failed: {err:#}"),
            }
        }
    })
}
