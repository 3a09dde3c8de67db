//! Error taxonomy shared by every component of the risk guard.
//!
//! Each variant maps onto an [`ErrorKind`] so results handed to the audit sink
//! carry a stable, serializable classification.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable classification of a [`GuardError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Signature or timestamp rejected upstream.
    Authentication,
    /// Resource does not exist upstream.
    NotFound,
    /// Upstream throttled the request.
    RateLimited,
    /// The call's deadline elapsed.
    NetworkTimeout,
    /// Transport failure other than a timeout.
    Network,
    /// Data was fetched but is older than its freshness ceiling.
    StaleData,
    /// Fresh data could not be obtained.
    Unavailable,
    /// Malformed input or upstream response.
    Validation,
    /// Any other non-2xx upstream answer.
    Upstream,
    /// Credentials missing or unusable.
    Credentials,
    /// Local configuration is invalid.
    Configuration,
}

impl ErrorKind {
    /// Returns the snake_case label used in logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::NotFound => "not_found",
            Self::RateLimited => "rate_limited",
            Self::NetworkTimeout => "network_timeout",
            Self::Network => "network",
            Self::StaleData => "stale_data",
            Self::Unavailable => "unavailable",
            Self::Validation => "validation",
            Self::Upstream => "upstream",
            Self::Credentials => "credentials",
            Self::Configuration => "configuration",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by the risk guard core and its collaborators.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GuardError {
    /// Authentication rejected by the exchange.
    #[error("authentication error: {0}")]
    Authentication(String),

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Rate limit exceeded.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds suggested by upstream before retrying.
        retry_after_secs: u64,
    },

    /// Deadline elapsed.
    #[error("timeout: {0}")]
    NetworkTimeout(String),

    /// Transport error.
    #[error("network error: {0}")]
    Network(String),

    /// Data older than its freshness ceiling.
    #[error("stale data for {key}: age {age_ms}ms exceeds {max_age_ms}ms")]
    StaleData {
        /// Cache key of the rejected value.
        key: String,
        /// Observed age in milliseconds.
        age_ms: i64,
        /// Maximum permitted age in milliseconds.
        max_age_ms: i64,
    },

    /// Fresh data could not be obtained.
    #[error("data unavailable for {key}: {reason}")]
    Unavailable {
        /// Cache key that could not be served.
        key: String,
        /// Underlying cause.
        reason: String,
    },

    /// Malformed input or upstream response.
    #[error("validation error: {0}")]
    Validation(String),

    /// Non-2xx response not covered by another variant.
    #[error("upstream error: {status_code} - {message}")]
    Upstream {
        /// HTTP status code.
        status_code: u16,
        /// Response body or reason.
        message: String,
    },

    /// Credentials could not be resolved.
    #[error("credentials unavailable for user {user_id}: {reason}")]
    Credentials {
        /// User the lookup was for.
        user_id: String,
        /// Underlying cause.
        reason: String,
    },

    /// Invalid local configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl GuardError {
    /// Creates an unavailable error.
    pub fn unavailable(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Creates a stale data error.
    pub fn stale(key: impl Into<String>, age_ms: i64, max_age_ms: i64) -> Self {
        Self::StaleData {
            key: key.into(),
            age_ms,
            max_age_ms,
        }
    }

    /// Creates a credentials error.
    pub fn credentials(user_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Credentials {
            user_id: user_id.into(),
            reason: reason.into(),
        }
    }

    /// Creates an upstream error from status code and message.
    pub fn upstream(status_code: u16, message: impl Into<String>) -> Self {
        Self::Upstream {
            status_code,
            message: message.into(),
        }
    }

    /// Returns the classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Authentication(_) => ErrorKind::Authentication,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::NetworkTimeout(_) => ErrorKind::NetworkTimeout,
            Self::Network(_) => ErrorKind::Network,
            Self::StaleData { .. } => ErrorKind::StaleData,
            Self::Unavailable { .. } => ErrorKind::Unavailable,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Upstream { .. } => ErrorKind::Upstream,
            Self::Credentials { .. } => ErrorKind::Credentials,
            Self::Configuration(_) => ErrorKind::Configuration,
        }
    }

    /// Returns true when fresh market data could not be used.
    ///
    /// These errors short-circuit a config's evaluation without an action.
    #[must_use]
    pub const fn is_freshness_failure(&self) -> bool {
        matches!(self, Self::StaleData { .. } | Self::Unavailable { .. })
    }

    /// Returns true if a caller may reasonably retry later.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::NetworkTimeout(_)
            | Self::Network(_)
            | Self::RateLimited { .. }
            | Self::Unavailable { .. }
            | Self::StaleData { .. } => true,
            Self::Upstream { status_code, .. } => *status_code >= 500,
            _ => false,
        }
    }
}

/// Result alias for risk guard operations.
pub type GuardResult<T> = std::result::Result<T, GuardError>;
