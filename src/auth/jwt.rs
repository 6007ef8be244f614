use anyhow::{Context, Result};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

use super::session::UserProfile;

/// An unknown `kid` refetches the JWKS at most this often
const MIN_FORCED_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Claims read from a validated ID token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdTokenClaims {
    pub sub: String,
    pub exp: u64,
    #[serde(default)]
    pub nonce: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: Option<bool>,
    #[serde(default)]
    pub locale: Option<String>,
}

impl From<IdTokenClaims> for UserProfile {
    fn from(claims: IdTokenClaims) -> Self {
        UserProfile {
            sub: claims.sub,
            name: claims.name,
            given_name: claims.given_name,
            family_name: claims.family_name,
            picture: claims.picture,
            email: claims.email,
            email_verified: claims.email_verified,
            locale: claims.locale,
        }
    }
}

/// What to check beyond signature, issuer and audience
#[derive(Debug, Clone, Copy, Default)]
pub struct IdTokenChecks<'a> {
    /// Nonce sent in the authorization request (fresh logins only)
    pub nonce: Option<&'a str>,
    /// Session tokens are allowed to outlive `exp`; the refresh flow covers it
    pub expiry: bool,
}

#[derive(Debug, Deserialize)]
struct JwksResponse {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    #[serde(default)]
    kid: Option<String>,
    #[serde(default)]
    kty: Option<String>,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
}

struct JwksCache {
    keys: HashMap<String, DecodingKey>,
    fetched_at: Instant,
}

/// Verifies ID token signatures against the provider's published JWKS
pub struct IdTokenValidator {
    jwks_uri: String,
    /// Issuer advertised by discovery
    expected_issuer: String,
    /// Expected audience (the client_id)
    expected_audience: String,
    client: reqwest::Client,
    jwks_cache: RwLock<Option<JwksCache>>,
    /// Serializes fetches so concurrent misses share one request
    refresh_lock: Mutex<()>,
    cache_ttl: Duration,
}

impl IdTokenValidator {
    pub fn new(
        jwks_uri: String,
        expected_issuer: String,
        expected_audience: String,
        client: reqwest::Client,
        jwks_cache_ttl_secs: u64,
    ) -> Self {
        tracing::info!(
            jwks_uri = %jwks_uri,
            expected_issuer = %expected_issuer,
            expected_audience = %expected_audience,
            jwks_cache_ttl_secs = jwks_cache_ttl_secs,
            "ID token validator initialized with issuer and audience validation"
        );

        Self {
            jwks_uri,
            expected_issuer,
            expected_audience,
            client,
            jwks_cache: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            cache_ttl: Duration::from_secs(jwks_cache_ttl_secs),
        }
    }

    /// Validate an ID token (fetches JWKS if not cached or expired)
    pub async fn validate(&self, token: &str, checks: IdTokenChecks<'_>) -> Result<IdTokenClaims> {
        tracing::debug!(token_len = token.len(), "Validating ID token");

        let header = decode_header(token).context("Invalid token header")?;
        let kid = header.kid.clone().context("Token missing kid")?;

        if !matches!(
            header.alg,
            Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512
        ) {
            anyhow::bail!("Unsupported ID token algorithm: {:?}", header.alg);
        }

        let decoding_key = match self.get_cached_key(&kid).await? {
            Some(key) => key,
            None => {
                // Providers rotate keys; an unknown kid forces a throttled refresh
                let min_age = MIN_FORCED_REFRESH_INTERVAL.min(self.cache_ttl);
                let refreshed = self.refresh_jwks_if_older_than(min_age).await?;

                // A concurrent caller may have loaded the key while we waited
                match self.get_cached_key(&kid).await? {
                    Some(key) => key,
                    None => {
                        tracing::warn!(kid = %kid, refreshed, "Unknown key ID");
                        anyhow::bail!("Unknown key ID: {}", kid);
                    }
                }
            }
        };

        let mut validation = Validation::new(header.alg);
        validation.validate_exp = checks.expiry;
        validation.set_issuer(&[&self.expected_issuer]);
        validation.set_audience(&[&self.expected_audience]);

        let token_data = match decode::<IdTokenClaims>(token, &decoding_key, &validation) {
            Ok(data) => data,
            Err(e) => {
                let token_hash = format!("{:x}", md5::compute(token));
                tracing::error!(
                    error = ?e,
                    kid = %kid,
                    alg = ?header.alg,
                    token_hash = %token_hash,
                    token_len = token.len(),
                    "ID token validation failed"
                );
                anyhow::bail!("Token validation failed: {}", e);
            }
        };

        if let Some(expected_nonce) = checks.nonce {
            if token_data.claims.nonce.as_deref() != Some(expected_nonce) {
                tracing::warn!(
                    sub = %token_data.claims.sub,
                    has_nonce = token_data.claims.nonce.is_some(),
                    "ID token nonce does not match the login attempt"
                );
                anyhow::bail!("ID token nonce mismatch");
            }
        }

        tracing::debug!(sub = %token_data.claims.sub, "ID token validated");

        Ok(token_data.claims)
    }

    /// Prefetch JWKS so the first login does not pay for it
    pub async fn prefetch_jwks(&self) -> Result<()> {
        tracing::info!("Prefetching JWKS");
        self.refresh_jwks_if_older_than(Duration::ZERO).await?;
        Ok(())
    }

    /// Get cached key if available and not expired
    async fn get_cached_key(&self, kid: &str) -> Result<Option<DecodingKey>> {
        {
            let cache = self.jwks_cache.read().await;

            if let Some(jwks_cache) = cache.as_ref() {
                if jwks_cache.fetched_at.elapsed() < self.cache_ttl {
                    return Ok(jwks_cache.keys.get(kid).cloned());
                }
                tracing::info!(
                    elapsed_secs = jwks_cache.fetched_at.elapsed().as_secs(),
                    ttl_secs = self.cache_ttl.as_secs(),
                    "JWKS cache expired, will refresh"
                );
            }
        } // Lock is dropped here

        self.refresh_jwks_if_older_than(self.cache_ttl).await?;

        let cache = self.jwks_cache.read().await;
        Ok(cache.as_ref().and_then(|c| c.keys.get(kid).cloned()))
    }

    /// Fetch the JWKS unless the cache is younger than `min_age`.
    /// Returns whether a fetch happened.
    ///
    /// Callers queue on `refresh_lock`, so the ones behind the first fetch
    /// see a fresh cache and skip the request.
    async fn refresh_jwks_if_older_than(&self, min_age: Duration) -> Result<bool> {
        let _guard = self.refresh_lock.lock().await;

        {
            let cache = self.jwks_cache.read().await;
            if let Some(jwks_cache) = cache.as_ref() {
                if jwks_cache.fetched_at.elapsed() < min_age {
                    return Ok(false);
                }
            }
        }

        self.refresh_jwks().await?;
        Ok(true)
    }

    /// Refresh JWKS cache from the provider
    async fn refresh_jwks(&self) -> Result<()> {
        tracing::info!(url = %self.jwks_uri, "Fetching JWKS");

        let response: JwksResponse = self
            .client
            .get(&self.jwks_uri)
            .send()
            .await
            .context("Failed to fetch JWKS")?
            .error_for_status()
            .context("JWKS endpoint returned an error")?
            .json()
            .await
            .context("Failed to parse JWKS")?;

        let mut keys = HashMap::new();
        for jwk in response.keys {
            // Only RSA signing keys are usable here
            let (Some(kid), Some(n), Some(e)) = (jwk.kid, jwk.n, jwk.e) else {
                continue;
            };
            if jwk.kty.as_deref().is_some_and(|kty| kty != "RSA") {
                continue;
            }
            // One malformed entry must not take the other keys down with it
            let key = match DecodingKey::from_rsa_components(&n, &e) {
                Ok(key) => key,
                Err(err) => {
                    tracing::warn!(kid = %kid, error = %err, "Skipping unusable JWKS key");
                    continue;
                }
            };
            tracing::debug!(kid = %kid, "Added key to cache");
            keys.insert(kid, key);
        }

        tracing::info!(key_count = keys.len(), "JWKS fetched successfully");

        let mut cache = self.jwks_cache.write().await;
        *cache = Some(JwksCache {
            keys,
            fetched_at: Instant::now(),
        });

        Ok(())
    }
}
