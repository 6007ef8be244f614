//! Pure helper functions for authentication
//!
//! This module contains stateless helper functions for URL building,
//! HTTP client construction and redirect responses.

use axum::{
    http::{header::LOCATION, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use std::time::Duration;

use super::session::now_unix;

// =============================================================================
// JWT Helpers (for logout token hints)
// =============================================================================

/// Check if a JWT token is expired (without signature verification)
///
/// This is used for SSO logout to avoid sending an expired id_token_hint to
/// the identity provider, which most providers reject.
///
/// Returns true if the token is expired or malformed.
pub fn is_jwt_expired(token: &str) -> bool {
    // JWT format: header.payload.signature
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return true;
    }

    let Ok(payload) = URL_SAFE_NO_PAD.decode(parts[1].trim_end_matches('=')) else {
        return true;
    };

    let json: serde_json::Value = match serde_json::from_slice(&payload) {
        Ok(v) => v,
        Err(_) => return true,
    };

    let Some(exp) = json.get("exp").and_then(|v| v.as_i64()) else {
        return true;
    };

    // 5 second buffer for clock skew
    exp < (now_unix() as i64 - 5)
}

// =============================================================================
// HTTP Client Builders
// =============================================================================

/// Create a reqwest client for identity provider requests using config timeouts
pub fn create_http_client(
    connect_timeout_secs: u64,
    request_timeout_secs: u64,
    user_agent: &str,
) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none()) // Security: prevent SSRF
        .user_agent(user_agent)
        .connect_timeout(Duration::from_secs(connect_timeout_secs))
        .timeout(Duration::from_secs(request_timeout_secs))
        .build()
}

// =============================================================================
// URL Builders
// =============================================================================

/// Build login URL that brings the user back to `back_to` afterwards
pub fn build_login_url(back_to: &str) -> String {
    format!("/auth/login?backTo={}", urlencoding::encode(back_to))
}

/// Build the IdP end-session (RP-initiated logout) URL
///
/// Providers require either `client_id` or `id_token_hint` when using
/// `post_logout_redirect_uri`. We prefer `id_token_hint` when available and not
/// expired, falling back to `client_id`.
pub fn build_end_session_url(
    end_session_endpoint: &str,
    post_logout_redirect_uri: &str,
    client_id: &str,
    id_token: Option<&str>,
) -> String {
    let post_logout_redirect = urlencoding::encode(post_logout_redirect_uri);
    let separator = if end_session_endpoint.contains('?') { '&' } else { '?' };

    let valid_id_token = id_token
        .filter(|t| !t.trim().is_empty())
        .filter(|t| {
            if is_jwt_expired(t) {
                tracing::info!("id_token expired, using client_id for end-session");
                false
            } else {
                true
            }
        });

    if let Some(id_token) = valid_id_token {
        format!(
            "{}{}id_token_hint={}&post_logout_redirect_uri={}",
            end_session_endpoint,
            separator,
            urlencoding::encode(id_token),
            post_logout_redirect
        )
    } else {
        if id_token.is_none() {
            tracing::warn!("No id_token available, using client_id for end-session");
        }
        format!(
            "{}{}client_id={}&post_logout_redirect_uri={}",
            end_session_endpoint,
            separator,
            urlencoding::encode(client_id),
            post_logout_redirect
        )
    }
}

// =============================================================================
// Responses
// =============================================================================

/// `302 Found` redirect
pub fn redirect_found(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::FOUND, [(LOCATION, value)]).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Refusing to redirect to invalid location");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
