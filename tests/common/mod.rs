#![allow(dead_code)]

use async_trait::async_trait;
use axum::{body::Body, http::Response};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use oidc_portal::{
    auth::{
        discovery::ProviderMetadata, AuthError, CallbackParams, OidcProvider, OidcSettings,
        ProviderHandle, Session, TokenSet, UserProfile,
    },
    config::{Config, Environment},
    AppState,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use url::Url;

pub const KEY_ID: &str = "test-key";

/// Public half of `fixtures/idp_rsa_key.pem`
pub const KEY_MODULUS: &str = "uSEewdeKP_4I42cFH-Tgy-bgFmoesyUZKfs-XIRX2Z6HO8rXw9aCJpAB-S_eciIa1um0KH7qOZ1s74ycepgtNRE9snjcvcCUwsp3gdDxDVw1QLC171nJqFEBh0PgX_CycDzIYUwEo58VphrKfsoBHGUaBuBMNAB6cSnBHR_p3W6CQ0sqXjaQg08RbSjITX5YomTgzTDzOzbj3jsgX9RQvXgxH5CUKZqdyhDSzLwNcQEKR31IY9cLYhH94mc-fRsHFfR4EBv2jJTn8l0Bb1yYJkn8vsrcZrXzdf2Ggm68ugRYln9ebynw583CLhgi9eBu2HhUQ-vqdNfUTNrRqMBsYQ";
pub const KEY_EXPONENT: &str = "AQAB";

const PRIVATE_KEY_PEM: &[u8] = include_bytes!("../fixtures/idp_rsa_key.pem");

pub const CLIENT_ID: &str = "portal";

pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

pub fn test_config() -> Config {
    Config {
        environment: Environment::Development,
        host: "127.0.0.1".to_string(),
        port: 3000,
        public_base_url: "http://localhost:3000".to_string(),
        issuer_url: "https://idp.test".to_string(),
        client_id: CLIENT_ID.to_string(),
        client_secret: "secret".to_string(),
        cookie_domain: None,
        session_ttl_secs: 9000,
        state_ttl_secs: 900,
        http_connect_timeout_secs: 2,
        http_request_timeout_secs: 5,
        http_user_agent: "oidc-portal-tests".to_string(),
        jwks_cache_ttl_secs: 3600,
        discovery_max_attempts: 1,
    }
}

pub fn settings_for(issuer_url: &str) -> OidcSettings {
    let mut config = test_config();
    config.issuer_url = issuer_url.to_string();
    config.oidc_settings()
}

pub fn state_with(handle: ProviderHandle) -> Arc<AppState> {
    Arc::new(AppState {
        config: Arc::new(test_config()),
        provider: Arc::new(handle),
    })
}

pub fn metadata_json(issuer: &str) -> serde_json::Value {
    serde_json::json!({
        "issuer": issuer,
        "authorization_endpoint": format!("{}/authorize", issuer),
        "token_endpoint": format!("{}/token", issuer),
        "jwks_uri": format!("{}/jwks", issuer),
        "userinfo_endpoint": format!("{}/userinfo", issuer),
        "end_session_endpoint": format!("{}/logout", issuer),
        "response_types_supported": ["code"]
    })
}

pub fn metadata(issuer: &str) -> ProviderMetadata {
    serde_json::from_value(metadata_json(issuer)).unwrap()
}

pub fn jwks_json() -> serde_json::Value {
    serde_json::json!({
        "keys": [{
            "kty": "RSA",
            "use": "sig",
            "alg": "RS256",
            "kid": KEY_ID,
            "n": KEY_MODULUS,
            "e": KEY_EXPONENT
        }]
    })
}

/// RS256 ID token signed with the fixture key
pub fn sign_id_token(issuer: &str, nonce: Option<&str>, exp: u64) -> String {
    sign_id_token_with_kid(KEY_ID, issuer, nonce, exp)
}

/// Same as `sign_id_token`, but advertising an arbitrary key ID
pub fn sign_id_token_with_kid(kid: &str, issuer: &str, nonce: Option<&str>, exp: u64) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());

    let mut claims = serde_json::json!({
        "iss": issuer,
        "sub": "user-123",
        "aud": CLIENT_ID,
        "iat": now(),
        "exp": exp,
        "name": "Ada Lovelace",
        "email": "ada@example.com",
        "email_verified": true
    });
    if let Some(nonce) = nonce {
        claims["nonce"] = serde_json::Value::String(nonce.to_string());
    }

    let key = EncodingKey::from_rsa_pem(PRIVATE_KEY_PEM).unwrap();
    encode(&header, &claims, &key).unwrap()
}

pub fn user() -> UserProfile {
    UserProfile {
        sub: "user-123".to_string(),
        name: Some("Ada Lovelace".to_string()),
        email: Some("ada@example.com".to_string()),
        email_verified: Some(true),
        ..Default::default()
    }
}

pub fn session(access_token: &str, expires_at: Option<u64>, refresh_token: Option<&str>) -> Session {
    Session {
        user: user(),
        token_set: TokenSet {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.map(str::to_string),
            id_token: Some("id-token".to_string()),
            expires_at,
            scope: Some("openid email profile".to_string()),
        },
    }
}

/// All `Set-Cookie` headers of `response` for cookie `name`
pub fn set_cookies<'a>(response: &'a Response<Body>, name: &str) -> Vec<&'a str> {
    let prefix = format!("{}=", name);
    response
        .headers()
        .get_all(axum::http::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter(|v| v.starts_with(&prefix))
        .collect()
}

/// Value part of a `Set-Cookie` header
pub fn cookie_value(set_cookie: &str) -> &str {
    let pair = set_cookie.split(';').next().unwrap_or_default();
    pair.split_once('=').map(|(_, v)| v).unwrap_or_default()
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Scriptable `OidcProvider` that records how it was called
pub struct MockProvider {
    pub id_token_valid: bool,
    pub refreshed: Option<TokenSet>,
    pub revoke_ok: bool,
    pub end_session_endpoint: Option<String>,
    /// Userinfo too large to fit in a cookie
    pub oversized_profile: bool,
    pub exchange_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub revoke_calls: AtomicUsize,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            id_token_valid: true,
            refreshed: None,
            revoke_ok: true,
            end_session_endpoint: None,
            oversized_profile: false,
            exchange_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            revoke_calls: AtomicUsize::new(0),
        }
    }
}

impl MockProvider {
    pub fn exchanges(&self) -> usize {
        self.exchange_calls.load(Ordering::SeqCst)
    }

    pub fn refreshes(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn revocations(&self) -> usize {
        self.revoke_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OidcProvider for MockProvider {
    fn authorization_url(&self, state: &str, nonce: &str) -> Result<Url, AuthError> {
        let mut url = Url::parse("https://idp.test/authorize").unwrap();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", CLIENT_ID)
            .append_pair("scope", "openid email profile")
            .append_pair("state", state)
            .append_pair("nonce", nonce);
        Ok(url)
    }

    async fn exchange_code(
        &self,
        params: &CallbackParams,
        expected_state: &str,
        _expected_nonce: Option<&str>,
    ) -> Result<TokenSet, AuthError> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        if params.state.as_deref() != Some(expected_state) {
            return Err(AuthError::StateMismatch);
        }
        if params.code.as_deref() != Some("good-code") {
            return Err(AuthError::TokenExchange("invalid_grant".to_string()));
        }
        Ok(session("fresh-access", Some(now() + 3600), Some("refresh")).token_set)
    }

    async fn fetch_user_info(&self, _token_set: &TokenSet) -> Result<UserProfile, AuthError> {
        let mut profile = user();
        if self.oversized_profile {
            profile.picture = Some(format!("https://images.example.com/{}", "x".repeat(5000)));
        }
        Ok(profile)
    }

    async fn refresh(&self, _token_set: &TokenSet) -> Result<TokenSet, AuthError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.refreshed
            .clone()
            .ok_or_else(|| AuthError::RefreshFailed("invalid_grant".to_string()))
    }

    async fn revoke(&self, _access_token: &str) -> Result<(), AuthError> {
        self.revoke_calls.fetch_add(1, Ordering::SeqCst);
        if self.revoke_ok {
            Ok(())
        } else {
            Err(AuthError::RevokeFailed("unsupported_token_type".to_string()))
        }
    }

    async fn validate_id_token(&self, _token_set: &TokenSet) -> Result<(), AuthError> {
        if self.id_token_valid {
            Ok(())
        } else {
            Err(AuthError::TokenInvalid("bad signature".to_string()))
        }
    }

    fn end_session_url(
        &self,
        id_token_hint: Option<&str>,
        post_logout_redirect_uri: &str,
    ) -> Option<String> {
        self.end_session_endpoint.as_ref().map(|endpoint| {
            format!(
                "{}?id_token_hint={}&post_logout_redirect_uri={}",
                endpoint,
                id_token_hint.unwrap_or_default(),
                urlencoding::encode(post_logout_redirect_uri)
            )
        })
    }
}
