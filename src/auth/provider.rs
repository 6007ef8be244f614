//! OIDC client collaborator
//!
//! - `OidcProvider`: everything the routes and middleware need from the
//!   identity provider, as an object-safe async trait
//! - `OidcClient`: the real implementation (oauth2 for the authorization
//!   code / refresh / revocation grants, reqwest for discovery and userinfo,
//!   jsonwebtoken for ID token verification)
//! - `ProviderHandle`: process-wide, initialized-once handle with
//!   single-flight discovery

use async_trait::async_trait;
use oauth2::{
    basic::{BasicErrorResponseType, BasicTokenType},
    AccessToken, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointMaybeSet,
    EndpointNotSet, EndpointSet, ErrorResponse, ExtraTokenFields, RedirectUrl, RefreshToken,
    RequestTokenError, RevocationErrorResponseType, RevocationUrl, Scope, StandardErrorResponse,
    StandardRevocableToken, StandardTokenIntrospectionResponse, StandardTokenResponse,
    TokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use url::Url;

use super::discovery::{self, ProviderMetadata};
use super::error::AuthError;
use super::helpers::{build_end_session_url, create_http_client};
use super::jwt::{IdTokenChecks, IdTokenValidator};
use super::session::{now_unix, TokenSet, UserProfile};

/// Scopes requested on every login
pub const SCOPES: [&str; 3] = ["openid", "email", "profile"];

// =============================================================================
// Types
// =============================================================================

/// Query parameters the IdP sends to the redirect URI
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Everything needed to discover the provider and build a client
#[derive(Debug, Clone)]
pub struct OidcSettings {
    pub issuer_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub http_connect_timeout_secs: u64,
    pub http_request_timeout_secs: u64,
    pub http_user_agent: String,
    pub jwks_cache_ttl_secs: u64,
}

#[async_trait]
pub trait OidcProvider: Send + Sync {
    /// IdP authorization endpoint URL for a new login attempt
    fn authorization_url(&self, state: &str, nonce: &str) -> Result<Url, AuthError>;

    /// Exchange the authorization code. Rejects the response when its `state`
    /// differs from `expected_state` before contacting the token endpoint.
    async fn exchange_code(
        &self,
        params: &CallbackParams,
        expected_state: &str,
        expected_nonce: Option<&str>,
    ) -> Result<TokenSet, AuthError>;

    async fn fetch_user_info(&self, token_set: &TokenSet) -> Result<UserProfile, AuthError>;

    async fn refresh(&self, token_set: &TokenSet) -> Result<TokenSet, AuthError>;

    async fn revoke(&self, access_token: &str) -> Result<(), AuthError>;

    /// Verify the ID token was issued by this provider for this client.
    /// Expiry is not checked here; expired sessions go through `refresh`.
    async fn validate_id_token(&self, token_set: &TokenSet) -> Result<(), AuthError>;

    /// RP-initiated logout URL, if the provider supports it
    fn end_session_url(
        &self,
        id_token_hint: Option<&str>,
        post_logout_redirect_uri: &str,
    ) -> Option<String>;
}

/// Custom extra fields to capture id_token from OIDC response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OidcTokenFields {
    pub id_token: Option<String>,
}

impl ExtraTokenFields for OidcTokenFields {}

type OidcTokenResponse = StandardTokenResponse<OidcTokenFields, BasicTokenType>;

/// Type alias for our configured OAuth client with OIDC support
type ConfiguredOAuthClient = oauth2::Client<
    StandardErrorResponse<BasicErrorResponseType>,
    OidcTokenResponse,
    StandardTokenIntrospectionResponse<OidcTokenFields, BasicTokenType>,
    StandardRevocableToken,
    StandardErrorResponse<RevocationErrorResponseType>,
    EndpointSet,      // HasAuthUrl
    EndpointNotSet,   // HasDeviceAuthUrl
    EndpointNotSet,   // HasIntrospectionUrl
    EndpointMaybeSet, // HasRevocationUrl
    EndpointSet,      // HasTokenUrl
>;

impl TokenSet {
    /// Build a token set from a token endpoint response. Fields the response
    /// leaves out (refresh grants often omit them) are kept from `previous`.
    fn from_response(response: &OidcTokenResponse, previous: Option<&TokenSet>) -> Self {
        TokenSet {
            access_token: response.access_token().secret().clone(),
            refresh_token: response
                .refresh_token()
                .map(|t| t.secret().clone())
                .or_else(|| previous.and_then(|p| p.refresh_token.clone())),
            id_token: response
                .extra_fields()
                .id_token
                .clone()
                .or_else(|| previous.and_then(|p| p.id_token.clone())),
            expires_at: response.expires_in().map(|d| now_unix() + d.as_secs()),
            scope: response
                .scopes()
                .map(|scopes| {
                    scopes
                        .iter()
                        .map(|s| s.as_str())
                        .collect::<Vec<_>>()
                        .join(" ")
                })
                .or_else(|| previous.and_then(|p| p.scope.clone())),
        }
    }
}

// =============================================================================
// Real client
// =============================================================================

pub struct OidcClient {
    oauth: ConfiguredOAuthClient,
    http: reqwest::Client,
    metadata: ProviderMetadata,
    client_id: String,
    id_tokens: IdTokenValidator,
}

impl OidcClient {
    /// Discover the provider, build the client and warm the JWKS cache
    pub async fn discover(settings: &OidcSettings) -> Result<Self, AuthError> {
        let http = create_http_client(
            settings.http_connect_timeout_secs,
            settings.http_request_timeout_secs,
            &settings.http_user_agent,
        )
        .map_err(|e| AuthError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        let metadata = discovery::discover(&http, &settings.issuer_url).await?;
        let client = Self::from_metadata(settings, metadata, http)?;

        client.id_tokens.prefetch_jwks().await.map_err(|e| {
            AuthError::ProviderUnreachable(format!("failed to prefetch JWKS: {:#}", e))
        })?;

        Ok(client)
    }

    /// Build a client from already-known provider metadata (no network)
    pub fn from_metadata(
        settings: &OidcSettings,
        metadata: ProviderMetadata,
        http: reqwest::Client,
    ) -> Result<Self, AuthError> {
        let auth_url = AuthUrl::new(metadata.authorization_endpoint.clone())
            .map_err(|e| AuthError::Configuration(format!("Invalid auth URL: {}", e)))?;

        let token_url = TokenUrl::new(metadata.token_endpoint.clone())
            .map_err(|e| AuthError::Configuration(format!("Invalid token URL: {}", e)))?;

        let revocation_url = metadata
            .revocation_endpoint
            .clone()
            .map(RevocationUrl::new)
            .transpose()
            .map_err(|e| AuthError::Configuration(format!("Invalid revocation URL: {}", e)))?;

        let redirect_url = RedirectUrl::new(settings.redirect_uri.clone())
            .map_err(|e| AuthError::Configuration(format!("Invalid redirect URL: {}", e)))?;

        let oauth = oauth2::Client::new(ClientId::new(settings.client_id.clone()))
            .set_client_secret(ClientSecret::new(settings.client_secret.clone()))
            .set_auth_uri(auth_url)
            .set_token_uri(token_url)
            .set_revocation_url_option(revocation_url)
            .set_redirect_uri(redirect_url);

        let id_tokens = IdTokenValidator::new(
            metadata.jwks_uri.clone(),
            metadata.issuer.clone(),
            settings.client_id.clone(),
            http.clone(),
            settings.jwks_cache_ttl_secs,
        );

        Ok(Self {
            oauth,
            http,
            metadata,
            client_id: settings.client_id.clone(),
            id_tokens,
        })
    }
}

/// Network failures are `unreachable`; anything the token endpoint said is
/// turned into `other`.
fn token_error<RE, T>(
    err: RequestTokenError<RE, T>,
    other: fn(String) -> AuthError,
) -> AuthError
where
    RE: std::error::Error + 'static,
    T: ErrorResponse + 'static,
{
    match err {
        RequestTokenError::Request(e) => AuthError::ProviderUnreachable(e.to_string()),
        e => other(e.to_string()),
    }
}

#[async_trait]
impl OidcProvider for OidcClient {
    fn authorization_url(&self, state: &str, nonce: &str) -> Result<Url, AuthError> {
        let state = state.to_string();
        let (url, _) = self
            .oauth
            .authorize_url(move || CsrfToken::new(state))
            .add_scopes(SCOPES.iter().map(|s| Scope::new(s.to_string())))
            .add_extra_param("nonce", nonce.to_string())
            .url();
        Ok(url)
    }

    async fn exchange_code(
        &self,
        params: &CallbackParams,
        expected_state: &str,
        expected_nonce: Option<&str>,
    ) -> Result<TokenSet, AuthError> {
        if params.state.as_deref() != Some(expected_state) {
            return Err(AuthError::StateMismatch);
        }
        let code = params.code.clone().ok_or(AuthError::MissingCode)?;

        tracing::debug!(
            token_endpoint = %self.metadata.token_endpoint,
            "POST authorization code exchange"
        );

        let response = self
            .oauth
            .exchange_code(AuthorizationCode::new(code))
            .request_async(&self.http)
            .await
            .map_err(|e| token_error(e, AuthError::TokenExchange))?;

        let token_set = TokenSet::from_response(&response, None);

        let id_token = token_set
            .id_token
            .as_deref()
            .ok_or_else(|| AuthError::TokenInvalid("token response has no id_token".into()))?;

        self.id_tokens
            .validate(
                id_token,
                IdTokenChecks {
                    nonce: expected_nonce,
                    expiry: true,
                },
            )
            .await
            .map_err(|e| AuthError::TokenInvalid(format!("{:#}", e)))?;

        tracing::info!(
            has_refresh_token = token_set.refresh_token.is_some(),
            expires_at = ?token_set.expires_at,
            "Authorization code exchanged"
        );

        Ok(token_set)
    }

    async fn fetch_user_info(&self, token_set: &TokenSet) -> Result<UserProfile, AuthError> {
        // Userinfo is only trusted for the subject the ID token was issued to
        let id_token = token_set
            .id_token
            .as_deref()
            .ok_or_else(|| AuthError::TokenInvalid("token set has no id_token".into()))?;
        let claims = self
            .id_tokens
            .validate(id_token, IdTokenChecks::default())
            .await
            .map_err(|e| AuthError::TokenInvalid(format!("{:#}", e)))?;

        let Some(userinfo_endpoint) = self.metadata.userinfo_endpoint.as_deref() else {
            // No userinfo endpoint: the verified ID token claims are the profile
            return Ok(claims.into());
        };

        tracing::debug!(userinfo_endpoint = %userinfo_endpoint, "GET userinfo");

        let response = self
            .http
            .get(userinfo_endpoint)
            .bearer_auth(&token_set.access_token)
            .send()
            .await
            .map_err(|e| AuthError::ProviderUnreachable(format!("userinfo request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AuthError::UserInfo(format!(
                "userinfo returned HTTP {}",
                response.status()
            )));
        }

        let profile = response
            .json::<UserProfile>()
            .await
            .map_err(|e| AuthError::UserInfo(format!("invalid userinfo response: {}", e)))?;

        if profile.sub != claims.sub {
            tracing::error!(
                id_token_sub = %claims.sub,
                userinfo_sub = %profile.sub,
                "Userinfo subject does not match the ID token"
            );
            return Err(AuthError::UserInfo("userinfo sub mismatch".into()));
        }

        Ok(profile)
    }

    async fn refresh(&self, token_set: &TokenSet) -> Result<TokenSet, AuthError> {
        let Some(refresh_token) = token_set.refresh_token.clone() else {
            return Err(AuthError::TokenExpired);
        };
        let refresh_token = RefreshToken::new(refresh_token);

        tracing::debug!(
            token_endpoint = %self.metadata.token_endpoint,
            "POST refresh_token grant"
        );

        let response = self
            .oauth
            .exchange_refresh_token(&refresh_token)
            .request_async(&self.http)
            .await
            .map_err(|e| token_error(e, AuthError::RefreshFailed))?;

        let refreshed = TokenSet::from_response(&response, Some(token_set));

        // A refresh may rotate the ID token; a new one must check out too
        if response.extra_fields().id_token.is_some() {
            self.validate_id_token(&refreshed).await?;
        }

        Ok(refreshed)
    }

    async fn revoke(&self, access_token: &str) -> Result<(), AuthError> {
        let token = StandardRevocableToken::AccessToken(AccessToken::new(access_token.to_string()));

        let request = self
            .oauth
            .revoke_token(token)
            .map_err(|e| AuthError::RevokeFailed(e.to_string()))?;

        tracing::debug!(
            revocation_endpoint = ?self.metadata.revocation_endpoint,
            "POST token revocation"
        );

        request
            .request_async(&self.http)
            .await
            .map_err(|e| AuthError::RevokeFailed(e.to_string()))
    }

    async fn validate_id_token(&self, token_set: &TokenSet) -> Result<(), AuthError> {
        let id_token = token_set
            .id_token
            .as_deref()
            .ok_or_else(|| AuthError::TokenInvalid("session has no id_token".into()))?;

        self.id_tokens
            .validate(id_token, IdTokenChecks::default())
            .await
            .map(|_| ())
            .map_err(|e| AuthError::TokenInvalid(format!("{:#}", e)))
    }

    fn end_session_url(
        &self,
        id_token_hint: Option<&str>,
        post_logout_redirect_uri: &str,
    ) -> Option<String> {
        self.metadata.end_session_endpoint.as_deref().map(|endpoint| {
            build_end_session_url(
                endpoint,
                post_logout_redirect_uri,
                &self.client_id,
                id_token_hint,
            )
        })
    }
}

// =============================================================================
// Process-wide handle
// =============================================================================

/// Lazily constructed, process-wide OIDC provider
///
/// Concurrent first callers share a single discovery. A failed discovery
/// leaves the handle empty, so the next caller tries again.
pub struct ProviderHandle {
    cell: OnceCell<Arc<dyn OidcProvider>>,
    settings: Option<OidcSettings>,
}

impl ProviderHandle {
    /// Discover on first use
    pub fn lazy(settings: OidcSettings) -> Self {
        Self {
            cell: OnceCell::new(),
            settings: Some(settings),
        }
    }

    /// Already-constructed provider
    pub fn ready(provider: Arc<dyn OidcProvider>) -> Self {
        Self {
            cell: OnceCell::new_with(Some(provider)),
            settings: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.cell.initialized()
    }

    pub async fn get(&self) -> Result<Arc<dyn OidcProvider>, AuthError> {
        self.cell
            .get_or_try_init(|| async {
                let settings = self.settings.as_ref().ok_or_else(|| {
                    AuthError::Configuration("provider handle has no settings".into())
                })?;
                let client = OidcClient::discover(settings).await?;
                Ok::<_, AuthError>(Arc::new(client) as Arc<dyn OidcProvider>)
            })
            .await
            .cloned()
    }

    /// Initialize at startup, retrying with exponential backoff and jitter.
    pub async fn warm_up(&self, max_attempts: u32) -> Result<(), AuthError> {
        let mut delay = Duration::from_millis(500);
        let mut attempt = 1;

        loop {
            match self.get().await {
                Ok(_) => return Ok(()),
                Err(e) if attempt < max_attempts => {
                    let jitter = Duration::from_millis(fastrand::u64(0..=delay.as_millis() as u64 / 2));
                    tracing::warn!(
                        error = %e,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        retry_in_ms = (delay + jitter).as_millis() as u64,
                        "OIDC discovery failed, retrying"
                    );
                    tokio::time::sleep(delay + jitter).await;
                    delay = (delay * 2).min(Duration::from_secs(30));
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
