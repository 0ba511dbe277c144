use crate::api;
use crate::auth::state::{AuthConfig, AuthState};
use crate::cli::{actions::Action, globals::GlobalArgs};
use anyhow::Result;
use std::sync::Arc;
use url::Url;

/// Handle the server action
pub async fn handle(action: Action, globals: &GlobalArgs) -> Result<()> {
    match action {
        Action::Server { port, dsn } => {
            // Validate the DSN shape before handing it to the pool
            let dsn = Url::parse(&dsn)?;

            let config = AuthConfig::new()
                .with_access_ttl_minutes(globals.access_ttl_minutes)
                .with_refresh_ttl_days(globals.refresh_ttl_days)
                .with_invitation_ttl_days(globals.invitation_ttl_days)
                .with_mfa_issuer(globals.mfa_issuer.clone())
                .with_https_only(globals.https_only)
                .with_production(globals.production);

            let state = Arc::new(AuthState::new(
                config,
                &globals.secret_key,
                globals.mfa_key_bytes()?,
            ));

            api::new(port, dsn.to_string(), state).await?;
        }
    }

    Ok(())
}
