//! Payment Model
//!
//! The gateway hands back a session id for a hosted checkout surface; the
//! surface reports back exactly one terminal signal.

use serde::{Deserialize, Serialize};

/// Handle for a hosted payment session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSession {
    #[serde(rename = "paymentSessionId")]
    pub session_id: String,
    #[serde(default)]
    pub internal_order_id: String,
    /// Hosted checkout page for this session, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkout_url: Option<String>,
}

/// Gateway details delivered with a successful payment
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentConfirmation {
    pub gateway_payment_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Terminal signal from the payment surface
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentSignal {
    Success(PaymentConfirmation),
    Cancelled,
    Failure(String),
}

impl PaymentSignal {
    pub fn is_success(&self) -> bool {
        matches!(self, PaymentSignal::Success(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_wire_format() {
        let signal: PaymentSignal = serde_json::from_str(r#"{"type":"CANCELLED"}"#).unwrap();
        assert_eq!(signal, PaymentSignal::Cancelled);

        let signal: PaymentSignal = serde_json::from_str(
            r#"{"type":"SUCCESS","data":{"gateway_payment_id":"pay_1","signature":"sig"}}"#,
        )
        .unwrap();
        assert!(signal.is_success());
    }
}
