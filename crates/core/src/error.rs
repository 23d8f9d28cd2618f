//! Typed errors at the exchange boundary.
//!
//! The lifecycle controller keys its retry policy off these variants, so the
//! gateway must map wire-level failures into them rather than surface raw
//! transport errors.

use thiserror::Error;

/// Errors returned by an [`crate::ExchangeGateway`] implementation.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Authentication or signing failed.
    #[error("authentication error: {0}")]
    Authentication(String),

    /// API request returned a business error.
    #[error("API error: {code} - {message}")]
    Api {
        /// Exchange error code.
        code: String,
        /// Error message from the exchange.
        message: String,
    },

    /// Rate limit exceeded.
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

    /// Order rejected by the exchange (e.g. insufficient balance).
    #[error("order rejected: {0}")]
    OrderRejected(String),

    /// A close was requested but the exchange holds no position. Callers
    /// treat this as confirmation that the position is already flat.
    #[error("no position to close")]
    NoPositionToClose,

    /// A cancel targeted an order that is already filled or cancelled.
    /// Non-fatal at every call site; truth is re-queried via the reconciler.
    #[error("order already inactive: {order_id}")]
    AlreadyInactive {
        /// The order id that was no longer live.
        order_id: String,
    },

    /// Configuration error (missing credentials, bad symbol).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl GatewayError {
    /// Creates an API error from code and message.
    pub fn api(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Creates a rate limit error.
    #[must_use]
    pub const fn rate_limit(retry_after_secs: u64) -> Self {
        Self::RateLimit { retry_after_secs }
    }

    /// Creates an already-inactive error.
    pub fn already_inactive(order_id: impl Into<String>) -> Self {
        Self::AlreadyInactive {
            order_id: order_id.into(),
        }
    }

    /// True if the call may succeed if simply retried on a later tick.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Timeout(_) | Self::RateLimit { .. }
        )
    }

    /// True if the error confirms the desired end state rather than failing
    /// it: a close finding no position, or a cancel finding a dead order.
    #[must_use]
    pub fn confirms_absence(&self) -> bool {
        matches!(self, Self::NoPositionToClose | Self::AlreadyInactive { .. })
    }

    /// Suggested retry delay in seconds, if applicable.
    #[must_use]
    pub fn retry_delay_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimit { retry_after_secs } => Some(*retry_after_secs),
            Self::Network(_) | Self::Timeout(_) => Some(1),
            _ => None,
        }
    }
}

/// Result type alias for gateway operations.
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;
