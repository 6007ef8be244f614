use std::env;

use crate::auth::provider::OidcSettings;

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Development,
    Production,
}

#[derive(Debug, Clone)]
pub struct Config {
    // Environment configuration
    pub environment: Environment,

    // Server configuration
    pub host: String,
    pub port: u16,

    // Public origin of this app, used to build the redirect URI
    pub public_base_url: String,

    // Identity provider configuration
    pub issuer_url: String,
    pub client_id: String,
    pub client_secret: String,

    // Cookie configuration (None = host-only cookie, Some = domain cookie)
    pub cookie_domain: Option<String>,
    pub session_ttl_secs: u64,
    pub state_ttl_secs: u64,

    // HTTP client configuration for calls to the identity provider
    pub http_connect_timeout_secs: u64,
    pub http_request_timeout_secs: u64,
    pub http_user_agent: String,

    // JWKS cache configuration (in seconds)
    pub jwks_cache_ttl_secs: u64,

    // Startup discovery attempts before serving with a cold provider
    pub discovery_max_attempts: u32,
}

impl Config {
    /// Load configuration from environment variables using std::env::var
    pub fn load() -> anyhow::Result<Self> {
        let environment = match env::var("ENVIRONMENT")
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
            .as_str()
        {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        };

        // Required variables
        let issuer_url = env::var("OIDC_ISSUER_URL")
            .map_err(|_| anyhow::anyhow!("OIDC_ISSUER_URL environment variable is required"))?;

        let client_id = env::var("OAUTH_CLIENT_ID")
            .map_err(|_| anyhow::anyhow!("OAUTH_CLIENT_ID environment variable is required"))?;

        let client_secret = env::var("OAUTH_CLIENT_SECRET").map_err(|_| {
            anyhow::anyhow!("OAUTH_CLIENT_SECRET environment variable is required")
        })?;

        // Optional variables with defaults
        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = parse_var("PORT", 3000u16);

        // Public URL defaults to the listen address, which is what a local
        // browser sees when running without a reverse proxy
        let public_base_url = env::var("PUBLIC_BASE_URL")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| format!("http://{}:{}", host, port))
            .trim_end_matches('/')
            .to_string();

        url::Url::parse(&public_base_url)
            .map_err(|e| anyhow::anyhow!("PUBLIC_BASE_URL is not a valid URL: {}", e))?;

        // Cookie domain: if not set or empty, use host-only cookies (no Domain attribute)
        let cookie_domain = env::var("COOKIE_DOMAIN").ok().filter(|s| !s.is_empty());

        let http_user_agent = env::var("HTTP_USER_AGENT")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| format!("oidc-portal/{}", env!("CARGO_PKG_VERSION")));

        Ok(Config {
            environment,
            host,
            port,
            public_base_url,
            issuer_url,
            client_id,
            client_secret,
            cookie_domain,
            session_ttl_secs: parse_var("SESSION_TTL_SECS", 9000),
            state_ttl_secs: parse_var("STATE_TTL_SECS", 900),
            http_connect_timeout_secs: parse_var("HTTP_CONNECT_TIMEOUT_SECS", 10),
            http_request_timeout_secs: parse_var("HTTP_REQUEST_TIMEOUT_SECS", 30),
            http_user_agent,
            jwks_cache_ttl_secs: parse_var("JWKS_CACHE_TTL_SECS", 3600),
            discovery_max_attempts: parse_var("DISCOVERY_MAX_ATTEMPTS", 5),
        })
    }

    /// Check if running in production mode
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Redirect URI registered with the identity provider
    pub fn redirect_uri(&self) -> String {
        format!("{}/auth/callback", self.public_base_url)
    }

    /// Where the IdP sends the browser after an SSO logout
    pub fn post_logout_redirect_uri(&self) -> String {
        format!("{}/", self.public_base_url)
    }

    /// Settings needed to discover and build the OIDC client
    pub fn oidc_settings(&self) -> OidcSettings {
        OidcSettings {
            issuer_url: self.issuer_url.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            redirect_uri: self.redirect_uri(),
            http_connect_timeout_secs: self.http_connect_timeout_secs,
            http_request_timeout_secs: self.http_request_timeout_secs,
            http_user_agent: self.http_user_agent.clone(),
            jwks_cache_ttl_secs: self.jwks_cache_ttl_secs,
        }
    }

    /// Get bind address for server
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.parse::<T>().ok())
        .unwrap_or(default)
}
