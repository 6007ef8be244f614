use super::templates::{LandingTemplate, PrivateTemplate};
use crate::{
    auth::{AuthContext, AuthenticatedUser},
    AppState,
};
use askama::Template;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use std::sync::Arc;

/// Liveness probe - always returns OK if the process is running
pub async fn healthz_handler() -> impl IntoResponse {
    StatusCode::OK
}

/// Readiness probe - checks if the service is ready to handle logins
///
/// Returns 200 OK once OIDC discovery has succeeded (the IdP metadata and
/// JWKS are loaded), 503 Service Unavailable before that.
pub async fn readyz_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.provider.is_ready() {
        (StatusCode::OK, "ready")
    } else {
        tracing::warn!("Readiness check failed: OIDC provider not discovered");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "not ready: OIDC provider not discovered",
        )
    }
}

fn render(template: impl Template) -> Response {
    match template.render() {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Template rendering failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Template error").into_response()
        }
    }
}

pub async fn landing_handler(context: AuthContext) -> Response {
    let username = context
        .session
        .as_ref()
        .map(|s| s.user.display_name().to_string());

    render(LandingTemplate { username })
}

/// Protected page, mounted behind `require_auth`
pub async fn private_handler(AuthenticatedUser { profile, .. }: AuthenticatedUser) -> Response {
    tracing::debug!(sub = %profile.sub, "Rendering private page");

    render(PrivateTemplate {
        username: profile.display_name().to_string(),
        email: profile.email.clone(),
        email_verified: profile.email_verified.unwrap_or(false),
        picture: profile.picture.clone(),
    })
}
