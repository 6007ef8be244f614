//! Authentication module
//!
//! This module provides OpenID Connect login for the portal. The session lives
//! entirely in an encoded cookie; the identity provider stays the authority
//! on whether the tokens inside it are still good.
//!
//! ## Structure
//!
//! - `encoding`: base64url(JSON) codec shared by both cookies
//! - `state`: auth state (`backToPath` + nonce) carried through the IdP round-trip
//! - `session`: user profile and token set stored in the `AUTH` cookie
//! - `cookies`: `Set-Cookie` building and `Cookie` parsing
//! - `discovery`, `jwt`, `provider`: the OIDC client and its process-wide handle
//! - `middleware`: session validation/refresh and the `require_auth` gate
//! - `extractors`: Axum extractors for the auth context and authenticated users
//! - `handlers`: HTTP handlers for login, callback, and logout flows
//! - `helpers`: Pure helper functions (URL builders, HTTP client, redirects)
//!
//! ## Authentication Flow
//!
//! 1. User visits `/auth/login?backTo=/private` → state cookie set, redirect to the IdP
//! 2. IdP authenticates → redirect to `/auth/callback`
//! 3. Portal checks state, exchanges the code, fetches userinfo → sets `AUTH` → redirect to `backTo`
//! 4. Every request: `AUTH` is verified, refreshed when expired, or cleared
//! 5. User visits `/auth/logout` → token revoked, cookie cleared

pub mod cookies;
pub mod discovery;
pub mod encoding;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod helpers;
pub mod jwt;
pub mod middleware;
pub mod provider;
pub mod session;
pub mod state;

// Re-export handlers for convenient routing
pub use handlers::{callback_handler, login_handler, logout_handler, logout_sso_handler};

pub use error::AuthError;
pub use extractors::AuthenticatedUser;
pub use middleware::{require_auth, require_session, session_middleware, AuthContext};
pub use provider::{CallbackParams, OidcClient, OidcProvider, OidcSettings, ProviderHandle};
pub use session::{Session, TokenSet, UserProfile};
