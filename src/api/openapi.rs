//! OpenAPI document assembly.

use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::api::handlers::{auth, health, me};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        me::get_me,
        auth::register,
        auth::login,
        auth::refresh,
        auth::logout,
        auth::mfa::enable,
        auth::mfa::verify,
        auth::mfa::login,
        auth::invite::invite,
        auth::invite::accept,
    ),
    components(schemas(
        health::Health,
        auth::types::RegisterRequest,
        auth::types::LoginForm,
        auth::types::TokenResponse,
        auth::types::RefreshRequest,
        auth::types::MfaEnableRequest,
        auth::types::MfaEnableResponse,
        auth::types::MfaCodeRequest,
        auth::types::DetailResponse,
        auth::types::InviteRequest,
        auth::types::InvitationResponse,
        auth::types::AcceptInviteRequest,
        auth::types::MeResponse,
        crate::auth::store::Role,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "auth", description = "Registration, login, token lifecycle"),
        (name = "mfa", description = "TOTP enrollment and verification"),
        (name = "invite", description = "Company invitations"),
        (name = "health", description = "Service health"),
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_all_auth_paths() {
        let doc = ApiDoc::openapi();
        let paths = &doc.paths.paths;

        for path in [
            "/health",
            "/auth/me",
            "/auth/register",
            "/auth/login",
            "/auth/refresh",
            "/auth/logout",
            "/auth/mfa/enable",
            "/auth/mfa/verify",
            "/auth/mfa/login",
            "/auth/invite",
            "/auth/invite/accept",
        ] {
            assert!(paths.contains_key(path), "missing {path}");
        }
    }

    #[test]
    fn bearer_scheme_registered() {
        let doc = ApiDoc::openapi();
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer"));
    }
}
