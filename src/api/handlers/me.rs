//! Authenticated account profile.

use axum::{
    extract::Extension,
    http::HeaderMap,
    response::{IntoResponse, Json, Response},
};
use sqlx::PgPool;
use std::sync::Arc;

use crate::auth::{gate, AuthError, AuthState};

use super::auth::types::MeResponse;

#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "The authenticated account profile.", body = MeResponse),
        (status = 401, description = "Missing, invalid, or revoked token."),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn get_me(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
) -> Result<Response, AuthError> {
    let principal = gate::require_auth(&headers, &pool, &state).await?;
    let account = principal.account;

    Ok(Json(MeResponse {
        id: account.id,
        company_id: account.company_id,
        email: account.email,
        full_name: account.full_name,
        role: account.role,
        mfa_enabled: account.mfa_enabled,
        last_login: account.last_login.map(|at| at.to_rfc3339()),
    })
    .into_response())
}
