use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use super::encoding::EncodingError;

/// Authentication errors
///
/// Failures that only affect the validity of the current session
/// (`TokenInvalid`, `TokenExpired`, `RefreshFailed`, malformed cookies) are
/// absorbed by the session middleware and never reach a response.
/// Everything else maps to an HTTP response through `IntoResponse`.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error("identity provider unreachable: {0}")]
    ProviderUnreachable(String),

    #[error("invalid token: {0}")]
    TokenInvalid(String),

    #[error("token expired and no refresh token available")]
    TokenExpired,

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("state mismatch")]
    StateMismatch,

    #[error("not authenticated")]
    Unauthenticated,

    #[error("token revocation failed: {0}")]
    RevokeFailed(String),

    /// `error=` reported by the IdP on the callback
    #[error("identity provider returned {error}")]
    Provider {
        error: String,
        description: Option<String>,
    },

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("userinfo request failed: {0}")]
    UserInfo(String),

    #[error("missing authorization code")]
    MissingCode,

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Encoding(_) | AuthError::StateMismatch | AuthError::MissingCode => {
                StatusCode::BAD_REQUEST
            }
            AuthError::Unauthenticated
            | AuthError::TokenInvalid(_)
            | AuthError::TokenExpired
            | AuthError::RefreshFailed(_)
            | AuthError::Provider { .. } => StatusCode::UNAUTHORIZED,
            AuthError::ProviderUnreachable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::TokenExchange(_) | AuthError::UserInfo(_) | AuthError::RevokeFailed(_) => {
                StatusCode::BAD_GATEWAY
            }
            AuthError::Configuration(_) | AuthError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AuthError::Encoding(_) => "MALFORMED_PAYLOAD",
            AuthError::ProviderUnreachable(_) => "PROVIDER_UNREACHABLE",
            AuthError::TokenInvalid(_) => "TOKEN_INVALID",
            AuthError::TokenExpired => "TOKEN_EXPIRED",
            AuthError::RefreshFailed(_) => "REFRESH_FAILED",
            AuthError::StateMismatch => "STATE_MISMATCH",
            AuthError::Unauthenticated => "UNAUTHENTICATED",
            AuthError::RevokeFailed(_) => "REVOKE_FAILED",
            AuthError::Provider { .. } => "PROVIDER_ERROR",
            AuthError::TokenExchange(_) => "TOKEN_EXCHANGE_FAILED",
            AuthError::UserInfo(_) => "USERINFO_FAILED",
            AuthError::MissingCode => "MISSING_CODE",
            AuthError::Configuration(_) => "CONFIGURATION_ERROR",
            AuthError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(error = %self, code = self.code(), "Authentication request failed");
        } else {
            tracing::warn!(error = %self, code = self.code(), "Authentication request rejected");
        }

        // Internal details stay in the logs
        let message = match &self {
            AuthError::Configuration(_) | AuthError::Internal(_) => {
                "Internal server error".to_string()
            }
            AuthError::Provider {
                error,
                description: Some(description),
            } => format!("{}: {}", error, description),
            other => other.to_string(),
        };

        let error = match status {
            StatusCode::UNAUTHORIZED => "Authentication required",
            StatusCode::BAD_REQUEST => "Bad request",
            StatusCode::SERVICE_UNAVAILABLE => "Identity provider unavailable",
            StatusCode::BAD_GATEWAY => "Identity provider error",
            _ => "Internal server error",
        };

        (
            status,
            Json(json!({
                "error": error,
                "message": message,
                "code": self.code()
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AuthError::Unauthenticated.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::StateMismatch.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AuthError::ProviderUnreachable("down".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AuthError::TokenExchange("invalid_grant".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AuthError::Encoding(EncodingError::MalformedPayload("x".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_into_response_keeps_status() {
        let response = AuthError::StateMismatch.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = AuthError::Internal("secret detail".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
