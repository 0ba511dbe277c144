//! Shared auth configuration and state handed to handlers via Extension.

use secrecy::SecretString;

use crate::auth::{mfa::MfaEngine, token::TokenCodec};

/// Tunables for the auth core. Built once at startup from CLI arguments.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub access_ttl_minutes: i64,
    pub refresh_ttl_days: i64,
    pub pending_ttl_minutes: i64,
    /// Floor for blacklist row lifetime; see [`Self::blacklist_ttl_hours`].
    pub blacklist_min_ttl_hours: i64,
    pub invitation_ttl_days: i64,
    pub mfa_issuer: String,
    pub https_only: bool,
    pub production: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_ttl_minutes: 30,
            refresh_ttl_days: 7,
            pending_ttl_minutes: 5,
            blacklist_min_ttl_hours: 24,
            invitation_ttl_days: 7,
            mfa_issuer: "WealthMap".to_string(),
            https_only: false,
            production: false,
        }
    }
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_access_ttl_minutes(mut self, minutes: i64) -> Self {
        self.access_ttl_minutes = minutes;
        self
    }

    #[must_use]
    pub fn with_refresh_ttl_days(mut self, days: i64) -> Self {
        self.refresh_ttl_days = days;
        self
    }

    #[must_use]
    pub fn with_invitation_ttl_days(mut self, days: i64) -> Self {
        self.invitation_ttl_days = days;
        self
    }

    #[must_use]
    pub fn with_mfa_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.mfa_issuer = issuer.into();
        self
    }

    #[must_use]
    pub fn with_https_only(mut self, https_only: bool) -> Self {
        self.https_only = https_only;
        self
    }

    #[must_use]
    pub fn with_production(mut self, production: bool) -> Self {
        self.production = production;
        self
    }

    /// TTL for blacklist rows. Never shorter than the access token lifetime:
    /// a blacklisted `jti` must outlive any token it blocks, whatever
    /// `--access-ttl-minutes` was set to.
    #[must_use]
    pub fn blacklist_ttl_hours(&self) -> i64 {
        // `i64::div_ceil` is feature-gated on this toolchain; this is the
        // same rounding-up division for the positive divisor 60.
        let access_ttl_hours =
            self.access_ttl_minutes / 60 + i64::from(self.access_ttl_minutes % 60 > 0);
        self.blacklist_min_ttl_hours.max(access_ttl_hours)
    }
}

/// Immutable state shared by every request: config, token codec, MFA engine.
#[derive(Clone)]
pub struct AuthState {
    config: AuthConfig,
    codec: TokenCodec,
    mfa: MfaEngine,
}

impl AuthState {
    #[must_use]
    pub fn new(config: AuthConfig, secret_key: &SecretString, mfa_key: [u8; 32]) -> Self {
        let codec = TokenCodec::new(
            secret_key,
            config.access_ttl_minutes,
            config.refresh_ttl_days,
            config.pending_ttl_minutes,
        );
        let mfa = MfaEngine::new(config.mfa_issuer.clone(), mfa_key);

        Self { config, codec, mfa }
    }

    #[must_use]
    pub const fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub const fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    #[must_use]
    pub const fn mfa(&self) -> &MfaEngine {
        &self.mfa
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_ttls() {
        let config = AuthConfig::default();
        assert_eq!(config.access_ttl_minutes, 30);
        assert_eq!(config.refresh_ttl_days, 7);
        assert_eq!(config.pending_ttl_minutes, 5);
        assert_eq!(config.blacklist_ttl_hours(), 24);
        assert_eq!(config.invitation_ttl_days, 7);
        assert!(!config.https_only);
    }

    #[test]
    fn builder_overrides() {
        let config = AuthConfig::new()
            .with_access_ttl_minutes(15)
            .with_refresh_ttl_days(30)
            .with_mfa_issuer("Acme")
            .with_https_only(true)
            .with_production(true);

        assert_eq!(config.access_ttl_minutes, 15);
        assert_eq!(config.refresh_ttl_days, 30);
        assert_eq!(config.mfa_issuer, "Acme");
        assert!(config.https_only);
        assert!(config.production);
    }

    #[test]
    fn blacklist_ttl_covers_long_access_tokens() {
        // 48h access tokens must not outlive their blacklist entry.
        let config = AuthConfig::new().with_access_ttl_minutes(48 * 60);
        assert_eq!(config.blacklist_ttl_hours(), 48);

        // Partial hours round up.
        let config = AuthConfig::new().with_access_ttl_minutes(25 * 60 + 1);
        assert_eq!(config.blacklist_ttl_hours(), 26);

        // Short access tokens keep the 24h floor.
        let config = AuthConfig::new().with_access_ttl_minutes(30);
        assert_eq!(config.blacklist_ttl_hours(), 24);
    }

    #[test]
    fn state_exposes_config() {
        let secret = SecretString::from("test-signing-key".to_string());
        let state = AuthState::new(AuthConfig::default(), &secret, [1u8; 32]);
        assert_eq!(state.config().access_ttl_minutes, 30);
    }
}
