//! MFA endpoints: enrollment, verification, and the second login step.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use sqlx::PgPool;
use std::sync::Arc;

use crate::api::handlers::auth::token_response;
use crate::auth::{audit::RequestMeta, gate, session, AuthError, AuthState};

use super::types::{DetailResponse, MfaCodeRequest, MfaEnableRequest, MfaEnableResponse};

#[utoipa::path(
    post,
    path = "/auth/mfa/enable",
    request_body = MfaEnableRequest,
    responses(
        (status = 200, description = "Secret provisioned; verify a code to activate.", body = MfaEnableResponse),
        (status = 401, description = "Bad password or invalid token."),
    ),
    security(("bearer" = [])),
    tag = "mfa"
)]
pub async fn enable(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Json(request): Json<MfaEnableRequest>,
) -> Result<Response, AuthError> {
    let meta = RequestMeta::from_headers(&headers);
    let principal = gate::require_auth(&headers, &pool, &state).await?;

    let enrollment =
        session::enable_mfa(&pool, &state, &principal.account, &request.password, &meta).await?;

    Ok(Json(MfaEnableResponse {
        secret: enrollment.secret_base32,
        qr_code: enrollment.qr_code,
        detail: "Scan the QR code, then verify a code to activate MFA",
    })
    .into_response())
}

#[utoipa::path(
    post,
    path = "/auth/mfa/verify",
    request_body = MfaCodeRequest,
    responses(
        (status = 200, description = "MFA activated.", body = DetailResponse),
        (status = 400, description = "MFA not set up for this user."),
        (status = 401, description = "Invalid MFA token."),
    ),
    security(("bearer" = [])),
    tag = "mfa"
)]
pub async fn verify(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Json(request): Json<MfaCodeRequest>,
) -> Result<Response, AuthError> {
    let meta = RequestMeta::from_headers(&headers);
    let principal = gate::require_auth(&headers, &pool, &state).await?;

    session::verify_mfa(&pool, &state, &principal.account, &request.token, &meta).await?;

    Ok((
        StatusCode::OK,
        Json(DetailResponse {
            detail: "MFA enabled",
        }),
    )
        .into_response())
}

#[utoipa::path(
    post,
    path = "/auth/mfa/login",
    request_body = MfaCodeRequest,
    responses(
        (status = 200, description = "Full token pair.", body = super::types::TokenResponse),
        (status = 401, description = "Invalid code or pending token."),
    ),
    security(("bearer" = [])),
    tag = "mfa"
)]
pub async fn login(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Json(request): Json<MfaCodeRequest>,
) -> Result<Response, AuthError> {
    let meta = RequestMeta::from_headers(&headers);

    // The bearer here is the short-lived pending token from the first step,
    // so this goes straight to the orchestrator instead of the gate.
    let pending = gate::extract_bearer_token(&headers).ok_or(AuthError::TokenInvalid)?;
    let pair = session::mfa_login(&pool, &state, pending, &request.token, &meta).await?;

    Ok(token_response(&state, pair))
}
