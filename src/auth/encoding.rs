//! Cookie-safe encoding of JSON payloads
//!
//! Both the state cookie and the session cookie carry `base64url(json)`
//! without padding, so values survive cookie headers and query strings as-is.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{de::DeserializeOwned, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum EncodingError {
    /// Input is not base64url-encoded JSON of the expected shape
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Serialize `value` to JSON, then base64url (no padding).
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String, EncodingError> {
    let json = serde_json::to_vec(value)?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

/// Inverse of [`encode`].
pub fn decode<T: DeserializeOwned>(value: &str) -> Result<T, EncodingError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(value.trim())
        .map_err(|e| EncodingError::MalformedPayload(format!("invalid base64url: {}", e)))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| EncodingError::MalformedPayload(format!("invalid json: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_round_trip_json_values() {
        let samples = vec![
            json!(null),
            json!(true),
            json!(42),
            json!(-3.5),
            json!("plain"),
            json!("unicode: héllo wörld ✓"),
            json!([1, "two", {"three": 3}]),
            json!({"backToPath": "/private", "nonce": "abc"}),
            json!({"nested": {"deeper": {"list": [null, false, ""]}}}),
        ];

        for sample in samples {
            let encoded = encode(&sample).unwrap();
            let decoded: Value = decode(&encoded).unwrap();
            assert_eq!(decoded, sample);
        }
    }

    #[test]
    fn test_encoded_value_is_cookie_safe() {
        let encoded = encode(&json!({"path": "/a?b=c&d=e", "text": "~~~???>>>"})).unwrap();
        assert!(encoded
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_decode_rejects_non_base64() {
        let err = decode::<Value>("not base64!!").unwrap_err();
        assert!(matches!(err, EncodingError::MalformedPayload(_)));
    }

    #[test]
    fn test_decode_rejects_base64_of_non_json() {
        let garbage = URL_SAFE_NO_PAD.encode(b"{not json");
        let err = decode::<Value>(&garbage).unwrap_err();
        assert!(matches!(err, EncodingError::MalformedPayload(_)));
    }

    #[test]
    fn test_decode_rejects_wrong_shape() {
        #[derive(Debug, serde::Deserialize)]
        #[allow(dead_code)]
        struct Expected {
            nonce: String,
        }

        let encoded = encode(&json!({"other": 1})).unwrap();
        let err = decode::<Expected>(&encoded).unwrap_err();
        assert!(matches!(err, EncodingError::MalformedPayload(_)));
    }

    #[test]
    fn test_decode_empty_string() {
        assert!(matches!(
            decode::<Value>("").unwrap_err(),
            EncodingError::MalformedPayload(_)
        ));
    }
}
