//! Cookie adapter for the `state` and `AUTH` cookies
//!
//! Cookies are written as raw `Set-Cookie` header values; no jar, no
//! signing. Both cookies are HttpOnly and scoped by `CookieOptions`.

use axum::http::{
    header::{COOKIE, SET_COOKIE},
    HeaderMap, HeaderValue,
};

use super::error::AuthError;
use crate::config::Config;

pub const STATE_COOKIE: &str = "state";
pub const SESSION_COOKIE: &str = "AUTH";

/// Browsers drop cookies larger than this
const MAX_COOKIE_BYTES: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    fn as_str(self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieOptions {
    pub http_only: bool,
    pub max_age_secs: u64,
    pub same_site: SameSite,
    pub secure: bool,
    pub path: String,
    /// None = host-only cookie
    pub domain: Option<String>,
}

/// State cookie: short-lived, only sent back to `/auth/*`
pub fn state_cookie_options(config: &Config) -> CookieOptions {
    CookieOptions {
        http_only: true,
        max_age_secs: config.state_ttl_secs,
        // Lax so the cookie survives the top-level redirect back from the IdP
        same_site: SameSite::Lax,
        secure: config.is_production(),
        path: "/auth".to_string(),
        domain: config.cookie_domain.clone(),
    }
}

pub fn session_cookie_options(config: &Config) -> CookieOptions {
    CookieOptions {
        http_only: true,
        max_age_secs: config.session_ttl_secs,
        same_site: SameSite::Lax,
        secure: config.is_production(),
        path: "/".to_string(),
        domain: config.cookie_domain.clone(),
    }
}

/// Render a `Set-Cookie` header value
pub fn build_set_cookie(name: &str, value: &str, options: &CookieOptions) -> String {
    let mut cookie = format!(
        "{}={}; Path={}; Max-Age={}; SameSite={}",
        name,
        value,
        options.path,
        options.max_age_secs,
        options.same_site.as_str()
    );
    if options.http_only {
        cookie.push_str("; HttpOnly");
    }
    if options.secure || options.same_site == SameSite::None {
        cookie.push_str("; Secure");
    }
    if let Some(domain) = &options.domain {
        cookie.push_str(&format!("; Domain={}", domain));
    }
    cookie
}

/// Append a `Set-Cookie` header carrying `value`
///
/// Fails instead of sending a cookie the browser would silently discard.
pub fn set_cookie(
    headers: &mut HeaderMap,
    name: &str,
    value: &str,
    options: &CookieOptions,
) -> Result<(), AuthError> {
    let cookie = build_set_cookie(name, value, options);
    if cookie.len() > MAX_COOKIE_BYTES {
        tracing::error!(
            cookie = name,
            cookie_len = cookie.len(),
            "Cookie exceeds 4096 bytes, browsers would drop it"
        );
        return Err(AuthError::Internal(format!(
            "{} cookie is {} bytes, limit is {}",
            name,
            cookie.len(),
            MAX_COOKIE_BYTES
        )));
    }
    headers.append(SET_COOKIE, header_value(&cookie)?);
    Ok(())
}

/// Append a `Set-Cookie` header that expires `name` immediately
pub fn clear_cookie(headers: &mut HeaderMap, name: &str, options: &CookieOptions) {
    let expired = CookieOptions {
        max_age_secs: 0,
        ..options.clone()
    };
    // Empty value with static-safe attributes cannot produce an invalid header
    if let Ok(value) = header_value(&build_set_cookie(name, "", &expired)) {
        headers.append(SET_COOKIE, value);
    }
}

/// Extract a cookie value from request headers
///
/// Handles multiple Cookie headers (some proxies fold/duplicate headers).
/// Uses `get_all` to collect all Cookie header values.
pub fn get_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let prefix = format!("{}=", name);

    for header_value in headers.get_all(COOKIE) {
        if let Ok(cookie_str) = header_value.to_str() {
            if let Some(value) = cookie_str
                .split(';')
                .map(|c| c.trim())
                .find(|c| c.starts_with(&prefix))
                .and_then(|c| c.strip_prefix(&prefix))
            {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Whether `headers` already carry a `Set-Cookie` for `name`
pub fn sets_cookie(headers: &HeaderMap, name: &str) -> bool {
    let prefix = format!("{}=", name);
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.starts_with(&prefix))
}

/// Create a HeaderValue from a string without panicking on bad input.
fn header_value(s: &str) -> Result<HeaderValue, AuthError> {
    HeaderValue::from_str(s).map_err(|e| {
        tracing::error!(
            error = %e,
            value_len = s.len(),
            "Failed to create header value - possible malformed cookie"
        );
        AuthError::Internal("Internal error setting response headers".to_string())
    })
}
