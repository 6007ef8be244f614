//! Login-attempt state carried through the IdP round trip
//!
//! The encoded record is used twice: as the `state` cookie value and as the
//! `state` authorization parameter. The callback only trusts the record when
//! the value echoed by the IdP equals the cookie.

use oauth2::CsrfToken;
use serde::{Deserialize, Serialize};

use super::encoding::{decode, encode, EncodingError};

/// Where to land after a login that did not ask for anything specific
pub const DEFAULT_BACK_TO_PATH: &str = "/private";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthState {
    pub back_to_path: String,
    pub nonce: String,
}

/// Fresh unguessable nonce (16 random bytes from the OS RNG, base64url)
pub fn random_nonce() -> String {
    CsrfToken::new_random().secret().clone()
}

/// Build a state record with a fresh nonce and encode it.
///
/// Returns the encoded value together with the record so the caller can send
/// the nonce as the OIDC `nonce` parameter.
pub fn serialize_state(back_to_path: &str) -> Result<(String, AuthState), EncodingError> {
    let state = AuthState {
        back_to_path: back_to_path.to_string(),
        nonce: random_nonce(),
    };
    let encoded = encode(&state)?;
    Ok((encoded, state))
}

pub fn deserialize_state(value: &str) -> Result<AuthState, EncodingError> {
    decode(value)
}

/// Keep only same-origin relative paths as post-login redirect targets.
///
/// Anything that could send the browser to another origin after login
/// (`https://evil.com`, `//evil.com`, `/\evil.com`, `/%2F/evil.com`) is
/// replaced with [`DEFAULT_BACK_TO_PATH`].
pub fn sanitize_back_to_path(candidate: Option<&str>) -> String {
    match candidate.map(str::trim).filter(|c| !c.is_empty()) {
        Some(path) if is_local_path(path) => path.to_string(),
        Some(path) => {
            tracing::warn!(
                back_to_len = path.len(),
                "Rejected non-local backTo target, using default"
            );
            DEFAULT_BACK_TO_PATH.to_string()
        }
        None => DEFAULT_BACK_TO_PATH.to_string(),
    }
}

fn is_local_path(path: &str) -> bool {
    let Ok(decoded) = urlencoding::decode(path) else {
        return false;
    };

    decoded.starts_with('/')
        && !decoded.starts_with("//")
        && !decoded.contains("://")
        && !decoded.contains('\\')
        && !decoded.chars().any(char::is_control)
}
