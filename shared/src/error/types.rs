//! Error types returned by remote collaborators

use super::codes::ErrorCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Application error with structured error code and details
///
/// This is what every remote collaborator (cart backend, order backend,
/// catalog, payment gateway, push channel) returns on failure:
/// - Standardized error codes via [`ErrorCode`]
/// - Human-readable messages
/// - Optional structured details for debugging
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq)]
#[error("{message}")]
pub struct AppError {
    /// The error code identifying the type of error
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details (dish id, order id, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, Value>>,
}

impl AppError {
    /// Create a new error with the default message for the error code
    pub fn new(code: ErrorCode) -> Self {
        Self {
            message: code.message().to_string(),
            code,
            details: None,
        }
    }

    /// Create a new error with a custom message
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Add a detail entry to this error
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Read a string detail
    pub fn detail_str(&self, key: &str) -> Option<&str> {
        self.details.as_ref()?.get(key)?.as_str()
    }

    // ==================== Convenience constructors ====================

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::ValidationFailed, msg)
    }

    /// Create a network failure
    pub fn network(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::NetworkFailure, msg)
    }

    /// Create an invalid response error
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::InvalidResponse, msg)
    }

    /// Create an order not found error
    pub fn order_not_found(internal_order_id: impl Into<String>) -> Self {
        let id = internal_order_id.into();
        Self::with_message(ErrorCode::OrderNotFound, format!("Order not found: {}", id))
            .with_detail("internal_order_id", id)
    }

    /// Create an empty cart error
    pub fn empty_cart() -> Self {
        Self::new(ErrorCode::EmptyCart)
    }

    /// Create an item unavailable error
    pub fn item_unavailable(dish_id: impl Into<String>) -> Self {
        Self::new(ErrorCode::ItemUnavailable).with_detail("dish_id", dish_id.into())
    }

    /// Create an item not found error
    pub fn item_not_found(dish_id: impl Into<String>) -> Self {
        Self::new(ErrorCode::ItemNotFound).with_detail("dish_id", dish_id.into())
    }

    /// Create a payment session failure
    pub fn payment_session_failed(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::PaymentSessionFailed, msg)
    }
}

/// Type alias for Result with AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_new() {
        let err = AppError::new(ErrorCode::EmptyCart);
        assert_eq!(err.code, ErrorCode::EmptyCart);
        assert_eq!(err.message, "Your cart is empty");
        assert!(err.details.is_none());
    }

    #[test]
    fn test_app_error_with_detail() {
        let err = AppError::item_unavailable("dish-7");
        assert_eq!(err.code, ErrorCode::ItemUnavailable);
        assert_eq!(err.detail_str("dish_id"), Some("dish-7"));
        assert_eq!(err.detail_str("missing"), None);
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::order_not_found("ord-1");
        assert_eq!(format!("{}", err), "Order not found: ord-1");
    }

    #[test]
    fn test_app_error_deserialize() {
        let json = r#"{"code":6002,"message":"gone","details":{"dish_id":"d1"}}"#;
        let err: AppError = serde_json::from_str(json).unwrap();
        assert_eq!(err.code, ErrorCode::ItemNotFound);
        assert_eq!(err.detail_str("dish_id"), Some("d1"));
    }
}
