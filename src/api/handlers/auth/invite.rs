//! Invitation endpoints: admin-created invites and their redemption.

use axum::{
    extract::Extension,
    http::HeaderMap,
    response::{IntoResponse, Json, Response},
};
use sqlx::PgPool;
use std::sync::Arc;

use crate::api::handlers::auth::token_response;
use crate::auth::{audit::RequestMeta, gate, session, AuthError, AuthState};

use super::types::{AcceptInviteRequest, InvitationResponse, InviteRequest};

#[utoipa::path(
    post,
    path = "/auth/invite",
    request_body = InviteRequest,
    responses(
        (status = 200, description = "Invitation created, or the existing pending one returned.", body = InvitationResponse),
        (status = 400, description = "Email already has an account."),
        (status = 403, description = "Caller is not a company admin."),
    ),
    security(("bearer" = [])),
    tag = "invite"
)]
pub async fn invite(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Json(request): Json<InviteRequest>,
) -> Result<Response, AuthError> {
    let meta = RequestMeta::from_headers(&headers);
    let principal = gate::require_auth(&headers, &pool, &state).await?;
    gate::require_admin(&principal)?;

    let invitation = session::invite(
        &pool,
        &state,
        &principal.account,
        &request.email,
        request.role,
        &meta,
    )
    .await?;

    Ok(Json(InvitationResponse::from_invitation(invitation)).into_response())
}

#[utoipa::path(
    post,
    path = "/auth/invite/accept",
    request_body = AcceptInviteRequest,
    responses(
        (status = 200, description = "Account created; invitee logged in.", body = super::types::TokenResponse),
        (status = 400, description = "Invalid or expired invitation."),
    ),
    tag = "invite"
)]
pub async fn accept(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Json(request): Json<AcceptInviteRequest>,
) -> Result<Response, AuthError> {
    let meta = RequestMeta::from_headers(&headers);
    let pair = session::accept_invitation(
        &pool,
        &state,
        request.token.trim(),
        &request.password,
        request.full_name.trim(),
        &meta,
    )
    .await?;

    Ok(token_response(&state, pair))
}
