//! Authenticated session record stored in the `AUTH` cookie
//!
//! The cookie *is* the session: there is no server-side store. This module
//! only turns the record into a cookie value and back; it does not judge
//! whether the tokens inside are authentic (see `middleware`).

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use super::encoding::{decode, encode, EncodingError};

/// Claims returned by the IdP's userinfo endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

impl UserProfile {
    /// Best human-readable label for the user
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or(&self.sub)
    }
}

/// Tokens issued by the IdP. Interpreted by the OIDC provider, not by the
/// session layer; the only question asked here is whether it has expired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    /// Unix seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl TokenSet {
    /// A token set without expiry metadata is never considered expired locally.
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= now_unix())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user: UserProfile,
    pub token_set: TokenSet,
}

pub fn serialize_session(session: &Session) -> Result<String, EncodingError> {
    encode(session)
}

pub fn deserialize_session(value: &str) -> Result<Session, EncodingError> {
    decode(value)
}

pub(crate) fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> UserProfile {
        UserProfile {
            sub: "1234567890".to_string(),
            name: Some("Ada Lovelace".to_string()),
            given_name: Some("Ada".to_string()),
            family_name: Some("Lovelace".to_string()),
            picture: Some("https://example.com/ada.png".to_string()),
            email: Some("ada@example.com".to_string()),
            email_verified: Some(true),
            locale: Some("en".to_string()),
        }
    }

    fn token_set(expires_at: Option<u64>) -> TokenSet {
        TokenSet {
            access_token: "access-123".to_string(),
            refresh_token: Some("refresh-456".to_string()),
            id_token: Some("header.payload.signature".to_string()),
            expires_at,
            scope: Some("openid email profile".to_string()),
        }
    }

    #[test]
    fn test_session_round_trip() {
        let session = Session {
            user: profile(),
            token_set: token_set(Some(now_unix() + 3600)),
        };

        let encoded = serialize_session(&session).unwrap();
        assert_eq!(deserialize_session(&encoded).unwrap(), session);
    }

    #[test]
    fn test_session_round_trip_minimal() {
        let session = Session {
            user: UserProfile {
                sub: "only-sub".to_string(),
                name: None,
                given_name: None,
                family_name: None,
                picture: None,
                email: None,
                email_verified: None,
                locale: None,
            },
            token_set: TokenSet {
                access_token: "a".to_string(),
                refresh_token: None,
                id_token: None,
                expires_at: None,
                scope: None,
            },
        };

        let encoded = serialize_session(&session).unwrap();
        assert_eq!(deserialize_session(&encoded).unwrap(), session);
    }

    #[test]
    fn test_session_wire_shape() {
        let session = Session {
            user: profile(),
            token_set: token_set(None),
        };
        let raw: serde_json::Value = decode(&serialize_session(&session).unwrap()).unwrap();
        assert!(raw.get("user").is_some());
        assert_eq!(raw["tokenSet"]["access_token"], "access-123");
    }

    #[test]
    fn test_deserialize_session_malformed() {
        assert!(matches!(
            deserialize_session("definitely not a session").unwrap_err(),
            EncodingError::MalformedPayload(_)
        ));

        let wrong_shape = encode(&serde_json::json!({"user": {"name": "x"}})).unwrap();
        assert!(matches!(
            deserialize_session(&wrong_shape).unwrap_err(),
            EncodingError::MalformedPayload(_)
        ));
    }

    #[test]
    fn test_token_set_expiry() {
        assert!(token_set(Some(now_unix() - 10)).is_expired());
        assert!(token_set(Some(now_unix())).is_expired());
        assert!(!token_set(Some(now_unix() + 600)).is_expired());
        assert!(!token_set(None).is_expired());
    }

    #[test]
    fn test_display_name_fallbacks() {
        let mut user = profile();
        assert_eq!(user.display_name(), "Ada Lovelace");
        user.name = None;
        assert_eq!(user.display_name(), "ada@example.com");
        user.email = None;
        assert_eq!(user.display_name(), "1234567890");
    }
}
