//! Core auth endpoints: register, login, refresh, logout.

use axum::{
    extract::{Extension, Form},
    http::{header::SET_COOKIE, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use sqlx::PgPool;
use std::sync::Arc;

use crate::auth::{audit::RequestMeta, gate, session, AuthError, AuthState};

pub mod invite;
pub mod mfa;
pub mod types;

use types::{
    DetailResponse, LoginForm, RefreshRequest, RegisterRequest, TokenResponse,
};

pub(crate) const REFRESH_COOKIE: &str = "refresh_token";

#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Company created; founding admin logged in.", body = TokenResponse),
        (status = 400, description = "Email already registered or invalid."),
    ),
    tag = "auth"
)]
pub async fn register(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<Response, AuthError> {
    let meta = RequestMeta::from_headers(&headers);
    let pair = session::register(
        &pool,
        &state,
        request.company_name.trim(),
        &request.admin_email,
        request.admin_full_name.trim(),
        &request.admin_password,
        &meta,
    )
    .await?;

    Ok(token_response(&state, pair))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body(content = LoginForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Token pair, or a pending token when MFA is enabled.", body = TokenResponse),
        (status = 400, description = "Inactive account."),
        (status = 401, description = "Incorrect email or password."),
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Form(form): Form<LoginForm>,
) -> Result<Response, AuthError> {
    let meta = RequestMeta::from_headers(&headers);
    let outcome = session::login(&pool, &state, &form.username, &form.password, &meta).await?;

    match outcome {
        session::LoginOutcome::Authenticated(pair) => Ok(token_response(&state, pair)),
        pending => Ok(Json(TokenResponse::from_outcome(pending)).into_response()),
    }
}

#[utoipa::path(
    post,
    path = "/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New token pair; the presented refresh token is revoked.", body = TokenResponse),
        (status = 401, description = "Invalid, expired, or revoked refresh token."),
    ),
    tag = "auth"
)]
pub async fn refresh(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    request: Option<Json<RefreshRequest>>,
) -> Result<Response, AuthError> {
    let meta = RequestMeta::from_headers(&headers);

    // Body first, then the cookie set for HTTPS-only deployments.
    let token = request
        .and_then(|Json(request)| request.refresh_token)
        .or_else(|| cookie_value(&headers, REFRESH_COOKIE))
        .ok_or(AuthError::TokenInvalid)?;

    let pair = session::refresh(&pool, &state, &token, &meta).await?;
    Ok(token_response(&state, pair))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Session terminated. Always succeeds.", body = DetailResponse),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
) -> Response {
    let meta = RequestMeta::from_headers(&headers);
    let access_token = gate::extract_bearer_token(&headers);
    let refresh_token = cookie_value(&headers, REFRESH_COOKIE);

    session::logout(&pool, &state, access_token, refresh_token.as_deref(), &meta).await;

    let mut response = (
        StatusCode::OK,
        Json(DetailResponse {
            detail: "Successfully logged out",
        }),
    )
        .into_response();

    if let Some(cookie) = clear_refresh_cookie(&state) {
        response.headers_mut().append(SET_COOKIE, cookie);
    }
    response
}

/// Wrap a token pair, attaching the refresh cookie when configured.
pub(crate) fn token_response(state: &AuthState, pair: session::TokenPair) -> Response {
    let cookie = refresh_cookie(state, &pair.refresh_token);
    let mut response = Json(TokenResponse::from_pair(pair)).into_response();
    if let Some(cookie) = cookie {
        response.headers_mut().append(SET_COOKIE, cookie);
    }
    response
}

fn refresh_cookie(state: &AuthState, token: &str) -> Option<HeaderValue> {
    if !state.config().https_only {
        return None;
    }
    let max_age = state.codec().refresh_ttl_seconds();
    HeaderValue::from_str(&format!(
        "{REFRESH_COOKIE}={token}; HttpOnly; Secure; SameSite=Strict; Path=/auth; Max-Age={max_age}"
    ))
    .ok()
}

fn clear_refresh_cookie(state: &AuthState) -> Option<HeaderValue> {
    if !state.config().https_only {
        return None;
    }
    HeaderValue::from_str(&format!(
        "{REFRESH_COOKIE}=; HttpOnly; Secure; SameSite=Strict; Path=/auth; Max-Age=0"
    ))
    .ok()
}

/// Minimal cookie header parsing; enough for our single cookie.
pub(crate) fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers
        .get(axum::http::header::COOKIE)
        .and_then(|value| value.to_str().ok())?;

    raw.split(';').find_map(|part| {
        let (key, value) = part.trim().split_once('=')?;
        (key == name && !value.is_empty()).then(|| value.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::state::AuthConfig;
    use secrecy::SecretString;

    fn state(https_only: bool) -> AuthState {
        AuthState::new(
            AuthConfig::new().with_https_only(https_only),
            &SecretString::from("test-signing-secret"),
            [1u8; 32],
        )
    }

    #[test]
    fn cookie_parsing_finds_named_value() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("theme=dark; refresh_token=abc.def; lang=en"),
        );
        assert_eq!(
            cookie_value(&headers, REFRESH_COOKIE).as_deref(),
            Some("abc.def")
        );
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn cookie_parsing_skips_empty_values() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("refresh_token="),
        );
        assert_eq!(cookie_value(&headers, REFRESH_COOKIE), None);
    }

    #[test]
    fn refresh_cookie_only_set_when_https_only() {
        assert!(refresh_cookie(&state(false), "tok").is_none());

        let cookie = refresh_cookie(&state(true), "tok").unwrap();
        let cookie = cookie.to_str().unwrap();
        assert!(cookie.starts_with("refresh_token=tok;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Secure"));
        assert!(cookie.contains("SameSite=Strict"));
        assert!(cookie.contains("Max-Age=604800"));
    }

    #[test]
    fn clear_cookie_expires_immediately() {
        let cookie = clear_refresh_cookie(&state(true)).unwrap();
        assert!(cookie.to_str().unwrap().contains("Max-Age=0"));
    }
}
