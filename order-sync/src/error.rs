//! Engine error types

use shared::error::{AppError, ErrorCategory, ErrorCode};
use thiserror::Error;

/// Engine error type
///
/// Every variant maps to exactly one [`ErrorCode`]. Remote failures are
/// classified by code here; transports that only receive message text
/// settle on a code before the error reaches this type.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SyncError {
    /// Dish exists but is not sellable right now
    #[error("Item unavailable: {dish_id}")]
    ItemUnavailable { dish_id: String },

    /// Dish no longer exists on the restaurant's menu
    #[error("Item not found: {dish_id}")]
    ItemNotFound { dish_id: String },

    /// Checkout attempted on an empty cart
    #[error("Cart is empty")]
    EmptyCart,

    /// A checkout is already in flight for this owner
    #[error("Checkout already in progress for {owner_id}")]
    CheckoutInProgress { owner_id: String },

    /// Order absent (or not in the expected bucket)
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// Gateway could not create a payment session
    #[error("Payment session failed: {0}")]
    PaymentSessionFailed(String),

    /// Terminal payment signal with no payment awaiting
    #[error("No payment awaiting confirmation for {owner_id}")]
    PaymentNotAwaited { owner_id: String },

    /// Reorder batch failed part way; already applied lines were rolled back
    #[error("Reorder commit failed at {dish_id}: {source}")]
    ReorderCommitFailed {
        dish_id: String,
        #[source]
        source: Box<SyncError>,
        /// Dishes whose rollback also failed (left in the cart)
        rollback_failed: Vec<String>,
    },

    /// Transient transport failure, safe to retry
    #[error("Network error: {0}")]
    Network(String),

    /// Caller error, not retryable
    #[error("Validation error: {0}")]
    Validation(String),

    /// Response could not be decoded
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl SyncError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::ItemUnavailable { .. } => ErrorCode::ItemUnavailable,
            Self::ItemNotFound { .. } => ErrorCode::ItemNotFound,
            Self::EmptyCart => ErrorCode::EmptyCart,
            Self::CheckoutInProgress { .. } => ErrorCode::CheckoutInProgress,
            Self::OrderNotFound(_) => ErrorCode::OrderNotFound,
            Self::PaymentSessionFailed(_) => ErrorCode::PaymentSessionFailed,
            Self::PaymentNotAwaited { .. } => ErrorCode::PaymentNotAwaited,
            Self::ReorderCommitFailed { .. } => ErrorCode::ReorderCommitFailed,
            Self::Network(_) => ErrorCode::NetworkFailure,
            Self::Validation(_) => ErrorCode::ValidationFailed,
            Self::InvalidResponse(_) => ErrorCode::InvalidResponse,
        }
    }

    /// Range the error code belongs to, used as a log field
    pub fn category(&self) -> ErrorCategory {
        self.code().category()
    }

    /// Whether the same call may be retried unchanged
    pub fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }

    /// Human-readable message for the UI
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::ReorderCommitFailed { source, .. } => source.user_message(),
            other => other.code().message(),
        }
    }
}

impl From<AppError> for SyncError {
    fn from(err: AppError) -> Self {
        let dish_id = || err.detail_str("dish_id").unwrap_or_default().to_string();
        match err.code {
            ErrorCode::ItemUnavailable => Self::ItemUnavailable { dish_id: dish_id() },
            ErrorCode::ItemNotFound => Self::ItemNotFound { dish_id: dish_id() },
            ErrorCode::EmptyCart => Self::EmptyCart,
            ErrorCode::CheckoutInProgress => Self::CheckoutInProgress {
                owner_id: err.detail_str("owner_id").unwrap_or_default().to_string(),
            },
            ErrorCode::OrderNotFound => Self::OrderNotFound(
                err.detail_str("internal_order_id")
                    .map(str::to_string)
                    .unwrap_or(err.message),
            ),
            ErrorCode::PaymentSessionFailed => Self::PaymentSessionFailed(err.message),
            ErrorCode::PaymentNotAwaited => Self::PaymentNotAwaited {
                owner_id: err.detail_str("owner_id").unwrap_or_default().to_string(),
            },
            ErrorCode::ValidationFailed => Self::Validation(err.message),
            ErrorCode::InvalidResponse => Self::InvalidResponse(err.message),
            ErrorCode::NetworkFailure => Self::Network(err.message),
            // Unclassified remote failures are not assumed transient
            ErrorCode::Unknown => Self::InvalidResponse(err.message),
            // Neither of these should come back from a remote call
            ErrorCode::ReorderCommitFailed | ErrorCode::Success => {
                Self::InvalidResponse(format!("unexpected error code {}: {}", err.code, err.message))
            }
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

/// Result type for engine operations
pub type SyncResult<T> = Result<T, SyncError>;
