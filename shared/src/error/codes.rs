//! Unified error codes for the ordering engine
//!
//! Error codes are shared between the backend, the remote layer and the
//! engine. They are organized by category:
//! - 0xxx: General errors
//! - 4xxx: Order / cart errors
//! - 5xxx: Payment errors
//! - 6xxx: Catalog errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values on the wire so the remote
/// layer never has to inspect message text to classify a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed (caller error, not retryable)
    ValidationFailed = 2,
    /// Network or transport failure (transient, safe to retry)
    NetworkFailure = 3,
    /// Response could not be decoded
    InvalidResponse = 4,

    // ==================== 4xxx: Order ====================
    /// Order not found (or not in the expected bucket)
    OrderNotFound = 4001,
    /// Cart has no items
    EmptyCart = 4002,
    /// Another checkout is already in flight for this owner
    CheckoutInProgress = 4003,
    /// A reorder batch failed part way and was rolled back
    ReorderCommitFailed = 4004,

    // ==================== 5xxx: Payment ====================
    /// Payment gateway refused to create a session
    PaymentSessionFailed = 5001,
    /// A payment signal arrived while no payment was awaited
    PaymentNotAwaited = 5002,

    // ==================== 6xxx: Catalog ====================
    /// Dish exists but is not sellable right now
    ItemUnavailable = 6001,
    /// Dish no longer exists on the restaurant's menu
    ItemNotFound = 6002,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Check if this is a success code
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    /// Whether the failed operation may be retried unchanged
    #[inline]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::NetworkFailure | ErrorCode::PaymentSessionFailed
        )
    }

    /// Get the English message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            ErrorCode::Success => "Operation completed successfully",
            ErrorCode::Unknown => "An unknown error occurred",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::NetworkFailure => "Network request failed, please retry",
            ErrorCode::InvalidResponse => "Unexpected response from server",

            ErrorCode::OrderNotFound => "Order not found",
            ErrorCode::EmptyCart => "Your cart is empty",
            ErrorCode::CheckoutInProgress => "A checkout is already in progress",
            ErrorCode::ReorderCommitFailed => "Could not add the order to your cart",

            ErrorCode::PaymentSessionFailed => "Payment failed to start",
            ErrorCode::PaymentNotAwaited => "No payment is awaiting confirmation",

            ErrorCode::ItemUnavailable => "This item is currently unavailable.",
            ErrorCode::ItemNotFound => "This item is no longer on the menu.",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error when converting from an invalid u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            0 => Ok(ErrorCode::Success),
            1 => Ok(ErrorCode::Unknown),
            2 => Ok(ErrorCode::ValidationFailed),
            3 => Ok(ErrorCode::NetworkFailure),
            4 => Ok(ErrorCode::InvalidResponse),

            // Order
            4001 => Ok(ErrorCode::OrderNotFound),
            4002 => Ok(ErrorCode::EmptyCart),
            4003 => Ok(ErrorCode::CheckoutInProgress),
            4004 => Ok(ErrorCode::ReorderCommitFailed),

            // Payment
            5001 => Ok(ErrorCode::PaymentSessionFailed),
            5002 => Ok(ErrorCode::PaymentNotAwaited),

            // Catalog
            6001 => Ok(ErrorCode::ItemUnavailable),
            6002 => Ok(ErrorCode::ItemNotFound),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
