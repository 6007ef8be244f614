//! Authentication handlers for login, callback, and logout flows
//!
//! This module contains the Axum HTTP handlers for the OIDC authorization code flow:
//! - `login_handler`: Stores the auth state cookie and redirects to the IdP
//! - `callback_handler`: Checks state, exchanges the code, creates the session cookie
//! - `logout_handler`: Local logout (best-effort token revocation)
//! - `logout_sso_handler`: Local logout followed by the IdP end-session endpoint

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::Response,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::Instrument;

use super::cookies::{
    clear_cookie, get_cookie, session_cookie_options, set_cookie, state_cookie_options,
    SESSION_COOKIE, STATE_COOKIE,
};
use super::error::AuthError;
use super::helpers::redirect_found;
use super::middleware::AuthContext;
use super::provider::CallbackParams;
use super::session::{serialize_session, Session};
use super::state::{
    deserialize_state, sanitize_back_to_path, serialize_state, DEFAULT_BACK_TO_PATH,
};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    #[serde(rename = "backTo")]
    pub back_to: Option<String>,
}

/// Login handler - initiates the authorization code flow
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LoginQuery>,
) -> Result<Response, AuthError> {
    let back_to = sanitize_back_to_path(query.back_to.as_deref());
    tracing::info!(back_to = %back_to, "Login requested");

    let provider = state.provider.get().await?;

    let (encoded_state, auth_state) = serialize_state(&back_to)?;
    let auth_url = provider.authorization_url(&encoded_state, &auth_state.nonce)?;

    tracing::debug!(
        state_len = encoded_state.len(),
        "Redirecting to identity provider for authentication"
    );

    let mut response = redirect_found(auth_url.as_str());
    set_cookie(
        response.headers_mut(),
        STATE_COOKIE,
        &encoded_state,
        &state_cookie_options(&state.config),
    )?;

    Ok(response)
}

/// Callback handler - completes the authorization code flow
pub async fn callback_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
    headers: HeaderMap,
) -> Result<Response, AuthError> {
    if let Some(error) = params.error.clone() {
        tracing::warn!(
            error = %error,
            description = ?params.error_description,
            "Identity provider returned an error on callback"
        );
        return Err(AuthError::Provider {
            error,
            description: params.error_description.clone(),
        });
    }

    // The state echoed by the IdP must be the one this browser was given
    let Some(expected_state) = get_cookie(&headers, STATE_COOKIE) else {
        tracing::warn!("Callback without state cookie");
        return Err(AuthError::StateMismatch);
    };
    if params.state.as_deref() != Some(expected_state.as_str()) {
        tracing::warn!(
            has_state_param = params.state.is_some(),
            "Callback state does not match state cookie"
        );
        return Err(AuthError::StateMismatch);
    }

    let (back_to, expected_nonce) = match deserialize_state(&expected_state) {
        Ok(auth_state) => (
            sanitize_back_to_path(Some(&auth_state.back_to_path)),
            Some(auth_state.nonce),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Unreadable auth state, using default redirect");
            (DEFAULT_BACK_TO_PATH.to_string(), None)
        }
    };

    let provider = state.provider.get().await?;

    let token_set = provider
        .exchange_code(&params, &expected_state, expected_nonce.as_deref())
        .await?;
    let user = provider.fetch_user_info(&token_set).await?;

    tracing::info!(
        sub = %user.sub,
        back_to = %back_to,
        "User authenticated, creating session"
    );

    let session_value = serialize_session(&Session { user, token_set })?;

    let mut response = redirect_found(&back_to);
    set_cookie(
        response.headers_mut(),
        SESSION_COOKIE,
        &session_value,
        &session_cookie_options(&state.config),
    )?;
    clear_cookie(
        response.headers_mut(),
        STATE_COOKIE,
        &state_cookie_options(&state.config),
    );

    Ok(response)
}

/// Revoke the session's access token, logging instead of failing
async fn revoke_session(state: &AppState, session: &Session) {
    match state.provider.get().await {
        Ok(provider) => {
            if let Err(e) = provider.revoke(&session.token_set.access_token).await {
                tracing::warn!(error = %e, "Access token revocation failed");
            } else {
                tracing::info!("Access token revoked");
            }
        }
        Err(e) => tracing::warn!(error = %e, "Skipping token revocation, provider unavailable"),
    }
}

/// Logout handler - ends the session with this app only
///
/// The IdP session stays intact; see `logout_sso_handler` for the full logout.
pub async fn logout_handler(State(state): State<Arc<AppState>>, context: AuthContext) -> Response {
    let span = tracing::info_span!(
        "logout",
        sub = context.session.as_ref().map(|s| s.user.sub.as_str())
    );

    async move {
        if let Some(session) = &context.session {
            revoke_session(&state, session).await;
        }

        let mut response = redirect_found("/");
        clear_cookie(
            response.headers_mut(),
            SESSION_COOKIE,
            &session_cookie_options(&state.config),
        );

        tracing::info!("Logout complete");
        response
    }
    .instrument(span)
    .await
}

/// SSO logout handler - clears the session, then RP-initiated logout at the IdP
pub async fn logout_sso_handler(
    State(state): State<Arc<AppState>>,
    context: AuthContext,
) -> Response {
    let id_token = context
        .session
        .as_ref()
        .and_then(|s| s.token_set.id_token.as_deref());

    let location = match state.provider.get().await {
        Ok(provider) => provider
            .end_session_url(id_token, &state.config.post_logout_redirect_uri())
            .unwrap_or_else(|| {
                tracing::warn!("Provider has no end_session_endpoint, logging out locally");
                "/".to_string()
            }),
        Err(e) => {
            tracing::warn!(error = %e, "Provider unavailable, logging out locally");
            "/".to_string()
        }
    };

    let mut response = redirect_found(&location);
    clear_cookie(
        response.headers_mut(),
        SESSION_COOKIE,
        &session_cookie_options(&state.config),
    );

    tracing::info!(sso = location != "/", "SSO logout");
    response
}
