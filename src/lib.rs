//! # Wealth Map (Multi-Tenant Property Platform API)
//!
//! `wealthmap` is the backend for a multi-tenant property/wealth-data platform.
//! This crate implements its authentication and session-security core: credential
//! verification, short-lived access tokens paired with revocable refresh tokens,
//! TOTP multi-factor authentication, token blacklisting, and the per-request
//! security gate.
//!
//! ## Tenant Model
//!
//! Companies are the tenant boundary. Every account belongs to exactly one
//! company, and authorization scopes resource visibility by `company_id` —
//! admins manage only their own tenant.
//!
//! ## Tokens
//!
//! Access tokens are short-lived signed JWTs, stateless apart from an optional
//! blacklist check on their `jti`. Refresh tokens are longer-lived, persisted in
//! a ledger, and rotated on every use: presenting a refresh token a second time
//! after rotation is rejected.
//!
//! ## MFA
//!
//! TOTP enrollment is two-phase: a generated secret is stored encrypted with
//! `mfa_enabled = false`, and only a successful verification of a live code
//! enables MFA. Logins on MFA-enabled accounts return a five-minute pending
//! token that cannot reach protected resources.

pub mod api;
pub mod auth;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(GIT_COMMIT_HASH.len() >= 7);
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
