//! Session middleware and the authentication gate
//!
//! `session_middleware` runs on every request: it reads the `AUTH` cookie,
//! verifies the ID token through the provider, refreshes expired token sets
//! and publishes the outcome as an [`AuthContext`] request extension.
//! `require_auth` is layered on protected routes only.

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use super::cookies::{
    clear_cookie, get_cookie, session_cookie_options, set_cookie, sets_cookie, SESSION_COOKIE,
};
use super::error::AuthError;
use super::helpers::{build_login_url, redirect_found};
use super::session::{deserialize_session, serialize_session, Session};
use crate::AppState;

/// Authentication outcome for the current request
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    /// Present only when the session cookie was verified (and refreshed if needed)
    pub session: Option<Session>,
}

/// What the middleware has to do with the session cookie once the handler ran
#[derive(Debug, PartialEq)]
enum CookieChange {
    Keep,
    Reissue(String),
    Clear,
}

/// Resolve the session carried by `headers`
async fn resolve_session(state: &AppState, headers: &HeaderMap) -> (Option<Session>, CookieChange) {
    let Some(raw) = get_cookie(headers, SESSION_COOKIE) else {
        return (None, CookieChange::Keep);
    };

    let session = match deserialize_session(&raw) {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!(error = %e, cookie_len = raw.len(), "Discarding malformed session cookie");
            return (None, CookieChange::Clear);
        }
    };

    let provider = match state.provider.get().await {
        Ok(provider) => provider,
        Err(e) => {
            // The cookie may be perfectly valid; keep it for when the IdP is back
            tracing::warn!(error = %e, "Identity provider unavailable, treating request as anonymous");
            return (None, CookieChange::Keep);
        }
    };

    if let Err(e) = provider.validate_id_token(&session.token_set).await {
        tracing::warn!(error = %e, sub = %session.user.sub, "Session ID token rejected");
        return (None, CookieChange::Clear);
    }

    if !session.token_set.is_expired() {
        tracing::debug!(sub = %session.user.sub, "Session validated");
        return (Some(session), CookieChange::Keep);
    }

    tracing::info!(sub = %session.user.sub, "Access token expired, refreshing");

    match provider.refresh(&session.token_set).await {
        Ok(token_set) => {
            let refreshed = Session {
                user: session.user,
                token_set,
            };
            match serialize_session(&refreshed) {
                Ok(value) => {
                    tracing::info!(sub = %refreshed.user.sub, "Session refreshed");
                    (Some(refreshed), CookieChange::Reissue(value))
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to encode refreshed session");
                    (None, CookieChange::Clear)
                }
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, sub = %session.user.sub, "Session refresh failed, logging out");
            (None, CookieChange::Clear)
        }
    }
}

/// Attach an [`AuthContext`] to every request and keep the cookie in sync
pub async fn session_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let (session, change) = resolve_session(&state, request.headers()).await;
    request.extensions_mut().insert(AuthContext { session });

    let mut response = next.run(request).await;

    // A handler that wrote the cookie itself (login callback, logout) wins
    if change == CookieChange::Keep || sets_cookie(response.headers(), SESSION_COOKIE) {
        return response;
    }

    let options = session_cookie_options(&state.config);
    match change {
        CookieChange::Reissue(value) => {
            if let Err(e) = set_cookie(response.headers_mut(), SESSION_COOKIE, &value, &options) {
                // The old cookie holds the expired tokens; drop it rather than refresh forever
                tracing::error!(error = %e, "Failed to re-issue session cookie");
                clear_cookie(response.headers_mut(), SESSION_COOKIE, &options);
            }
        }
        CookieChange::Clear => clear_cookie(response.headers_mut(), SESSION_COOKIE, &options),
        CookieChange::Keep => {}
    }

    response
}

/// The verified session, or `Unauthenticated`
pub fn require_session(context: Option<&AuthContext>) -> Result<&Session, AuthError> {
    context
        .and_then(|c| c.session.as_ref())
        .ok_or(AuthError::Unauthenticated)
}

/// Gate for browser routes: anonymous users are sent to log in and come back
pub async fn require_auth(request: Request, next: Next) -> Response {
    if require_session(request.extensions().get::<AuthContext>()).is_err() {
        let back_to = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        tracing::info!(path = %back_to, "Unauthenticated request to protected route");
        return redirect_found(&build_login_url(back_to));
    }

    next.run(request).await
}
