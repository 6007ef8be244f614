//! OpenID Provider discovery (`/.well-known/openid-configuration`)

use serde::Deserialize;

use super::error::AuthError;

/// The subset of provider metadata this app uses
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
    #[serde(default)]
    pub revocation_endpoint: Option<String>,
    #[serde(default)]
    pub end_session_endpoint: Option<String>,
}

pub fn well_known_url(issuer_url: &str) -> String {
    format!(
        "{}/.well-known/openid-configuration",
        issuer_url.trim_end_matches('/')
    )
}

/// Fetch and sanity-check the provider metadata for `issuer_url`
pub async fn discover(
    http: &reqwest::Client,
    issuer_url: &str,
) -> Result<ProviderMetadata, AuthError> {
    let url = well_known_url(issuer_url);
    tracing::info!(url = %url, "Discovering OpenID provider metadata");

    let response = http
        .get(&url)
        .send()
        .await
        .map_err(|e| AuthError::ProviderUnreachable(format!("discovery request failed: {}", e)))?;

    if !response.status().is_success() {
        return Err(AuthError::ProviderUnreachable(format!(
            "discovery returned HTTP {}",
            response.status()
        )));
    }

    let metadata: ProviderMetadata = response.json().await.map_err(|e| {
        AuthError::Configuration(format!("invalid discovery document: {}", e))
    })?;

    // The document must describe the issuer we asked for
    if metadata.issuer.trim_end_matches('/') != issuer_url.trim_end_matches('/') {
        tracing::error!(
            expected_issuer = %issuer_url,
            advertised_issuer = %metadata.issuer,
            "Discovery document issuer mismatch"
        );
        return Err(AuthError::Configuration(format!(
            "issuer mismatch: expected {}, got {}",
            issuer_url, metadata.issuer
        )));
    }

    tracing::info!(
        issuer = %metadata.issuer,
        has_userinfo = metadata.userinfo_endpoint.is_some(),
        has_revocation = metadata.revocation_endpoint.is_some(),
        has_end_session = metadata.end_session_endpoint.is_some(),
        "OpenID provider discovered"
    );

    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_known_url() {
        assert_eq!(
            well_known_url("https://accounts.google.com"),
            "https://accounts.google.com/.well-known/openid-configuration"
        );
        assert_eq!(
            well_known_url("https://idp.example.com/realms/dev/"),
            "https://idp.example.com/realms/dev/.well-known/openid-configuration"
        );
    }

    #[test]
    fn test_metadata_optional_endpoints() {
        let json = r#"{
            "issuer": "https://idp.example.com",
            "authorization_endpoint": "https://idp.example.com/auth",
            "token_endpoint": "https://idp.example.com/token",
            "jwks_uri": "https://idp.example.com/jwks",
            "response_types_supported": ["code"]
        }"#;
        let metadata: ProviderMetadata = serde_json::from_str(json).unwrap();
        assert!(metadata.userinfo_endpoint.is_none());
        assert!(metadata.revocation_endpoint.is_none());
        assert!(metadata.end_session_endpoint.is_none());
    }
}
