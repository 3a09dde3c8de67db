//! Error types for the LN Markets integration.

use risk_guard_core::GuardError;
use thiserror::Error;

/// Errors that can occur when talking to LN Markets.
#[derive(Debug, Error)]
pub enum LnMarketsError {
    /// Signature, key or passphrase rejected (401/403).
    #[error("authentication error: {0}")]
    Authentication(String),

    /// Request signing failed locally.
    #[error("signing error: {0}")]
    Signing(String),

    /// Resource not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Any other non-2xx answer.
    #[error("API error: {status_code} - {message}")]
    Api {
        /// HTTP status code.
        status_code: u16,
        /// Error body returned by the API.
        message: String,
    },

    /// Rate limit exceeded (429).
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimit {
        /// Seconds to wait before retry.
        retry_after_secs: u64,
    },

    /// Network error.
    #[error("network error: {0}")]
    Network(String),

    /// Request timeout.
    #[error("request timeout: {0}")]
    Timeout(String),

    /// Request parameters rejected before sending.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl LnMarketsError {
    /// Creates an API error from status code and message.
    pub fn api(status_code: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status_code,
            message: message.into(),
        }
    }

    /// Creates a rate limit error.
    pub fn rate_limit(retry_after_secs: u64) -> Self {
        Self::RateLimit { retry_after_secs }
    }

    /// Maps an unsuccessful HTTP status and body onto an error.
    pub fn from_status(status_code: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status_code {
            401 | 403 => Self::Authentication(body),
            404 => Self::NotFound(body),
            429 => Self::rate_limit(60),
            _ => Self::api(status_code, body),
        }
    }

    /// Returns true if the error is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Timeout(_) | Self::RateLimit { .. }
        )
    }

    /// Returns true if the error indicates the request should be retried later.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::RateLimit { .. } => true,
            Self::Api { status_code, .. } => *status_code >= 500,
            _ => false,
        }
    }

    /// Short label for the per-call log event.
    #[must_use]
    pub const fn outcome(&self) -> &'static str {
        match self {
            Self::Authentication(_) => "authentication",
            Self::Signing(_) => "signing",
            Self::NotFound(_) => "not_found",
            Self::Api { .. } => "upstream",
            Self::RateLimit { .. } => "rate_limited",
            Self::Network(_) => "network",
            Self::Timeout(_) => "timeout",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Configuration(_) => "configuration",
            Self::Serialization(_) => "serialization",
        }
    }
}

impl From<reqwest::Error> for LnMarketsError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::Network(format!("connection failed: {err}"))
        } else if err.is_decode() {
            Self::Serialization(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for LnMarketsError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_urlencoded::ser::Error> for LnMarketsError {
    fn from(err: serde_urlencoded::ser::Error) -> Self {
        Self::InvalidRequest(format!("query encoding failed: {err}"))
    }
}

impl From<LnMarketsError> for GuardError {
    fn from(err: LnMarketsError) -> Self {
        match err {
            LnMarketsError::Authentication(msg) | LnMarketsError::Signing(msg) => {
                Self::Authentication(msg)
            }
            LnMarketsError::NotFound(msg) => Self::NotFound(msg),
            LnMarketsError::Api {
                status_code,
                message,
            } => Self::upstream(status_code, message),
            LnMarketsError::RateLimit { retry_after_secs } => {
                Self::RateLimited { retry_after_secs }
            }
            LnMarketsError::Network(msg) => Self::Network(msg),
            LnMarketsError::Timeout(msg) => Self::NetworkTimeout(msg),
            LnMarketsError::InvalidRequest(msg) | LnMarketsError::Serialization(msg) => {
                Self::Validation(msg)
            }
            LnMarketsError::Configuration(msg) => Self::Configuration(msg),
        }
    }
}

/// Result type alias for LN Markets operations.
pub type Result<T> = std::result::Result<T, LnMarketsError>;

#[cfg(test)]
mod tests {
    use super::*;
    use risk_guard_core::ErrorKind;

    // ==================== Status Mapping Tests ====================

    #[test]
    fn test_unauthorized_maps_to_authentication() {
        assert!(matches!(
            LnMarketsError::from_status(401, "bad signature"),
            LnMarketsError::Authentication(_)
        ));
        assert!(matches!(
            LnMarketsError::from_status(403, "forbidden"),
            LnMarketsError::Authentication(_)
        ));
    }

    #[test]
    fn test_not_found_status() {
        let err = LnMarketsError::from_status(404, "no such trade");
        assert!(matches!(err, LnMarketsError::NotFound(_)));
        assert!(err.to_string().contains("no such trade"));
    }

    #[test]
    fn test_other_status_is_api_error() {
        let err = LnMarketsError::from_status(502, "bad gateway");
        assert!(matches!(
            err,
            LnMarketsError::Api {
                status_code: 502,
                ..
            }
        ));
        assert!(err.is_transient());
        assert!(!err.is_retryable());
    }

    // ==================== Retryable Tests ====================

    #[test]
    fn test_rate_limit_is_retryable() {
        let err = LnMarketsError::rate_limit(30);
        assert!(err.is_retryable());
        assert!(err.to_string().contains("30"));
    }

    #[test]
    fn test_auth_error_is_not_transient() {
        let err = LnMarketsError::Authentication("invalid key".to_string());
        assert!(!err.is_retryable());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_client_error_is_not_transient() {
        assert!(!LnMarketsError::api(400, "bad request").is_transient());
    }

    // ==================== Conversion Tests ====================

    #[test]
    fn test_conversion_into_guard_error() {
        let cases = [
            (LnMarketsError::Authentication("x".into()), ErrorKind::Authentication),
            (LnMarketsError::NotFound("x".into()), ErrorKind::NotFound),
            (LnMarketsError::rate_limit(5), ErrorKind::RateLimited),
            (LnMarketsError::Timeout("x".into()), ErrorKind::NetworkTimeout),
            (LnMarketsError::Network("x".into()), ErrorKind::Network),
            (LnMarketsError::api(500, "x"), ErrorKind::Upstream),
            (LnMarketsError::Serialization("x".into()), ErrorKind::Validation),
            (LnMarketsError::InvalidRequest("x".into()), ErrorKind::Validation),
        ];

        for (err, kind) in cases {
            assert_eq!(GuardError::from(err).kind(), kind);
        }
    }

    #[test]
    fn test_rate_limit_conversion_keeps_delay() {
        let err: GuardError = LnMarketsError::rate_limit(12).into();
        assert_eq!(err, GuardError::RateLimited { retry_after_secs: 12 });
    }
}
