//! Error types for maintme operations.
//!
//! Every failure the poller can observe is classified into one of a small
//! number of kinds. The classification decides what the poller does with it:
//! transient fetch failures are retried on the next tick, authentication
//! failures deactivate the subscriber, malformed rules are skipped, delivery
//! failures are logged and retried later, and store failures stop the poller.

use thiserror::Error;

use crate::types::{ConditionId, FilterId, SubscriberId};

/// Result type alias for maintme operations.
pub type MaintmeResult<T> = Result<T, MaintmeError>;

/// Main error type for all maintme operations.
#[derive(Error, Debug)]
pub enum MaintmeError {
    /// The event feed could not be fetched (network error, 5xx, bad payload).
    #[error("Transient fetch error: {message}")]
    TransientFetch {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The event feed rejected the request because of rate limiting.
    #[error("Rate limit exceeded: {message}")]
    RateLimit {
        message: String,
        code: ErrorCode,
        retry_after: Option<u64>,
    },

    /// The subscriber's credentials were rejected by the event feed.
    #[error("Authentication error: {message}")]
    Authentication { message: String, code: ErrorCode },

    /// A condition or filter could not be compiled.
    #[error("Malformed rule in filter {filter_id}: {message}")]
    MalformedRule {
        message: String,
        code: ErrorCode,
        filter_id: FilterId,
        condition_id: Option<ConditionId>,
    },

    /// An event could not be delivered to the notification sink.
    #[error("Delivery error: {message}")]
    Delivery {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The persistent store failed.
    #[error("Store error during {operation}{}: {message}", subscriber_suffix(.subscriber_id))]
    Store {
        message: String,
        code: ErrorCode,
        operation: &'static str,
        subscriber_id: Option<SubscriberId>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn subscriber_suffix(id: &Option<SubscriberId>) -> String {
    id.map(|id| format!(" (subscriber {})", id))
        .unwrap_or_default()
}

/// Error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Fetch (FETCH_xxx)
    FetchNetwork,
    FetchServer,
    FetchInvalidResponse,

    // Rate Limit (RATE_xxx)
    RateLimitExceeded,

    // Authentication (AUTH_xxx)
    AuthRejected,
    AuthMissingCredentials,

    // Rules (RULE_xxx)
    RuleInvalidRegex,

    // Delivery (DLV_xxx)
    DeliveryFailed,
    DeliveryRejected,

    // Store (DB_xxx)
    DbConnectionFailed,
    DbOperationFailed,
    DbCorrupted,

    // Internal
    Internal,
}

impl ErrorCode {
    /// Get the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::FetchNetwork => "FETCH_001",
            ErrorCode::FetchServer => "FETCH_002",
            ErrorCode::FetchInvalidResponse => "FETCH_003",
            ErrorCode::RateLimitExceeded => "RATE_001",
            ErrorCode::AuthRejected => "AUTH_001",
            ErrorCode::AuthMissingCredentials => "AUTH_002",
            ErrorCode::RuleInvalidRegex => "RULE_001",
            ErrorCode::DeliveryFailed => "DLV_001",
            ErrorCode::DeliveryRejected => "DLV_002",
            ErrorCode::DbConnectionFailed => "DB_001",
            ErrorCode::DbOperationFailed => "DB_002",
            ErrorCode::DbCorrupted => "DB_003",
            ErrorCode::Internal => "INT_001",
        }
    }
}

impl MaintmeError {
    /// Create a transient fetch error.
    pub fn transient_fetch(message: impl Into<String>) -> Self {
        Self::TransientFetch {
            message: message.into(),
            code: ErrorCode::FetchNetwork,
            source: None,
        }
    }

    /// Create a transient fetch error for an unparseable feed response.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::TransientFetch {
            message: message.into(),
            code: ErrorCode::FetchInvalidResponse,
            source: None,
        }
    }

    /// Create a rate limit error.
    pub fn rate_limit(message: impl Into<String>, retry_after: Option<u64>) -> Self {
        Self::RateLimit {
            message: message.into(),
            code: ErrorCode::RateLimitExceeded,
            retry_after,
        }
    }

    /// Create an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
            code: ErrorCode::AuthRejected,
        }
    }

    /// Create a missing-credentials error.
    pub fn missing_credentials(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
            code: ErrorCode::AuthMissingCredentials,
        }
    }

    /// Create a malformed rule error.
    pub fn malformed_rule(
        filter_id: FilterId,
        condition_id: Option<ConditionId>,
        message: impl Into<String>,
    ) -> Self {
        Self::MalformedRule {
            message: message.into(),
            code: ErrorCode::RuleInvalidRegex,
            filter_id,
            condition_id,
        }
    }

    /// Create a delivery error.
    pub fn delivery(message: impl Into<String>) -> Self {
        Self::Delivery {
            message: message.into(),
            code: ErrorCode::DeliveryFailed,
            source: None,
        }
    }

    /// Create a delivery error the sink will not accept on retry.
    pub fn delivery_rejected(message: impl Into<String>) -> Self {
        Self::Delivery {
            message: message.into(),
            code: ErrorCode::DeliveryRejected,
            source: None,
        }
    }

    /// Create a store error for the given operation.
    pub fn store(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
            code: ErrorCode::DbOperationFailed,
            operation,
            subscriber_id: None,
            source: None,
        }
    }

    /// Attach the subscriber a store error happened for.
    pub fn for_subscriber(self, id: SubscriberId) -> Self {
        match self {
            Self::Store {
                message,
                code,
                operation,
                source,
                ..
            } => Self::Store {
                message,
                code,
                operation,
                subscriber_id: Some(id),
                source,
            },
            other => other,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::TransientFetch { code, .. } => *code,
            Self::RateLimit { code, .. } => *code,
            Self::Authentication { code, .. } => *code,
            Self::MalformedRule { code, .. } => *code,
            Self::Delivery { code, .. } => *code,
            Self::Store { code, .. } => *code,
            _ => ErrorCode::Internal,
        }
    }

    /// Whether the failure only affects the current cycle and should be
    /// retried on the next tick.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientFetch { .. } | Self::RateLimit { .. })
    }

    /// Whether a delivery failed in a way worth retrying immediately.
    pub fn is_retryable_delivery(&self) -> bool {
        matches!(
            self,
            Self::Delivery {
                code: ErrorCode::DeliveryFailed,
                ..
            }
        )
    }

    /// Whether the subscriber's credentials were rejected.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Whether the failure must stop the poller.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Store { .. } | Self::Internal(_))
    }

    /// Convert from an HTTP status code returned by the event feed.
    ///
    /// `rate_limit_remaining` is the value of the feed's remaining-quota
    /// header, used to tell a 403 caused by an exhausted quota apart from a
    /// 403 caused by a revoked token.
    pub fn from_http_status(status: u16, body: &str, rate_limit_remaining: Option<u64>) -> Self {
        match status {
            401 => Self::authentication(body.to_string()),
            403 if rate_limit_remaining == Some(0) => Self::rate_limit(body.to_string(), None),
            403 => Self::authentication(body.to_string()),
            429 => Self::rate_limit(body.to_string(), None),
            500..=599 => Self::TransientFetch {
                message: format!("HTTP {}: {}", status, body),
                code: ErrorCode::FetchServer,
                source: None,
            },
            _ => Self::invalid_response(format!("HTTP {}: {}", status, body)),
        }
    }
}
