use crate::auth::error::AuthError;
use crate::auth::middleware::{require_session, AuthContext};
use crate::auth::session::{Session, UserProfile};
use axum::{extract::FromRequestParts, http::request::Parts};
use std::convert::Infallible;

/// The request's [`AuthContext`]; anonymous when the session middleware did not run
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .unwrap_or_default())
    }
}

/// Authenticated user extractor - reads the session verified by the middleware
///
/// Rejects with a 401 JSON body for API-style handlers. Browser pages should
/// sit behind the `require_auth` layer instead, which redirects to login.
///
/// Usage:
/// ```rust,ignore
/// async fn handler(AuthenticatedUser { profile, .. }: AuthenticatedUser) {
///     println!("User: {}", profile.sub);
/// }
/// ```
pub struct AuthenticatedUser {
    pub profile: UserProfile,
    pub session: Session,
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let session = require_session(parts.extensions.get::<AuthContext>())?.clone();

        tracing::debug!(user = %session.user.sub, "User authenticated via session cookie");

        Ok(AuthenticatedUser {
            profile: session.user.clone(),
            session,
        })
    }
}
