//! Authentication and session-security core.
//!
//! Components compose bottom-up: [`password`] and [`token`] are pure
//! primitives, [`ledger`] and [`blacklist`] are the durable revocation
//! records, [`mfa`] and [`crypto`] implement TOTP with secrets encrypted at
//! rest, [`session`] is the login/refresh/logout state machine over all of
//! them, and [`gate`] is the per-request security pipeline.

pub mod audit;
pub mod blacklist;
pub mod crypto;
pub mod error;
pub mod gate;
pub mod ledger;
pub mod mfa;
pub mod password;
pub mod session;
pub mod state;
pub mod store;
pub mod token;

pub use error::AuthError;
pub use gate::Principal;
pub use state::{AuthConfig, AuthState};
