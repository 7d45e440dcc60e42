//! Order Model
//!
//! Orders are created once by checkout and afterwards only change status.
//! The status vocabulary belongs to the backend; clients only need to know
//! whether a status is ACTIVE (tracking bucket) or TERMINAL (past bucket).

use super::cart::LineItem;
use serde::{Deserialize, Serialize};
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use std::fmt;

/// Backend-supplied order status label (stored lowercase)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct OrderStatus(String);

impl OrderStatus {
    pub const CREATED: &'static str = "created";
    pub const PAID: &'static str = "paid";
    pub const PREPARING: &'static str = "preparing";
    pub const READY: &'static str = "ready";
    pub const DELIVERED: &'static str = "delivered";
    pub const COMPLETED: &'static str = "completed";
    pub const CANCELLED: &'static str = "cancelled";

    pub fn new(label: impl AsRef<str>) -> Self {
        Self(label.as_ref().trim().to_lowercase())
    }

    pub fn created() -> Self {
        Self::new(Self::CREATED)
    }

    pub fn paid() -> Self {
        Self::new(Self::PAID)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is(&self, label: &str) -> bool {
        self.0.eq_ignore_ascii_case(label)
    }
}

impl From<String> for OrderStatus {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for OrderStatus {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<OrderStatus> for String {
    fn from(value: OrderStatus) -> Self {
        value.0
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bucket classification of a status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusClass {
    Active,
    Terminal,
}

/// Configurable status classifier
///
/// Statuses listed as terminal go to the past bucket; everything else,
/// including labels the client has never seen, is ACTIVE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusClassifier {
    terminal: BTreeSet<String>,
}

impl StatusClassifier {
    pub fn new<I, S>(terminal: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            terminal: terminal
                .into_iter()
                .map(|s| s.as_ref().trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    pub fn classify(&self, status: &OrderStatus) -> StatusClass {
        if self.terminal.contains(status.as_str()) {
            StatusClass::Terminal
        } else {
            StatusClass::Active
        }
    }

    pub fn is_terminal(&self, status: &OrderStatus) -> bool {
        self.classify(status) == StatusClass::Terminal
    }

    pub fn terminal_labels(&self) -> impl Iterator<Item = &str> {
        self.terminal.iter().map(String::as_str)
    }
}

impl Default for StatusClassifier {
    fn default() -> Self {
        Self::new([
            OrderStatus::DELIVERED,
            OrderStatus::COMPLETED,
            OrderStatus::CANCELLED,
        ])
    }
}

/// Order snapshot as held by the ledger
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub internal_order_id: String,
    /// Payment gateway reference, once one exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_order_id: Option<String>,
    #[serde(rename = "userId")]
    pub owner_id: String,
    pub restaurant_id: String,
    /// Immutable after creation
    pub items: Vec<LineItem>,
    pub total: Decimal,
    /// Creation timestamp (ms)
    pub created_at: i64,
    /// Last status change (ms)
    #[serde(default)]
    pub updated_at: i64,
    pub status: OrderStatus,
}

impl Order {
    pub fn item(&self, dish_id: &str) -> Option<&LineItem> {
        self.items.iter().find(|item| item.dish_id == dish_id)
    }
}

/// Result of converting a cart into an order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutReceipt {
    pub internal_order_id: String,
    pub restaurant_id: String,
    pub total: Decimal,
}

/// Which bucket an order currently lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Tracking,
    Past,
}

/// Two-bucket view of one owner's orders, newest first
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LedgerView {
    #[serde(default)]
    pub tracking: Vec<Order>,
    #[serde(default)]
    pub past: Vec<Order>,
}

impl LedgerView {
    pub fn new(tracking: Vec<Order>, past: Vec<Order>) -> Self {
        Self { tracking, past }
    }

    pub fn is_empty(&self) -> bool {
        self.tracking.is_empty() && self.past.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tracking.len() + self.past.len()
    }

    pub fn bucket_of(&self, internal_order_id: &str) -> Option<Bucket> {
        if self.tracking.iter().any(|o| o.internal_order_id == internal_order_id) {
            Some(Bucket::Tracking)
        } else if self.past.iter().any(|o| o.internal_order_id == internal_order_id) {
            Some(Bucket::Past)
        } else {
            None
        }
    }

    pub fn find(&self, internal_order_id: &str) -> Option<&Order> {
        self.tracking
            .iter()
            .chain(self.past.iter())
            .find(|o| o.internal_order_id == internal_order_id)
    }

    pub fn find_past(&self, internal_order_id: &str) -> Option<&Order> {
        self.past
            .iter()
            .find(|o| o.internal_order_id == internal_order_id)
    }

    /// Every order id appears exactly once across both buckets
    pub fn is_partitioned(&self) -> bool {
        let mut seen = BTreeSet::new();
        self.tracking
            .iter()
            .chain(self.past.iter())
            .all(|o| seen.insert(o.internal_order_id.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(id: &str, status: &str) -> Order {
        Order {
            internal_order_id: id.to_string(),
            external_order_id: None,
            owner_id: "u1".to_string(),
            restaurant_id: "r1".to_string(),
            items: vec![],
            total: Decimal::ZERO,
            created_at: 0,
            updated_at: 0,
            status: OrderStatus::new(status),
        }
    }

    #[test]
    fn test_status_normalized() {
        let status = OrderStatus::new("  Delivered ");
        assert_eq!(status.as_str(), "delivered");
        assert!(status.is("DELIVERED"));
    }

    #[test]
    fn test_default_classifier() {
        let classifier = StatusClassifier::default();
        assert_eq!(classifier.classify(&"preparing".into()), StatusClass::Active);
        assert_eq!(classifier.classify(&"CANCELLED".into()), StatusClass::Terminal);
        assert_eq!(classifier.classify(&"delivered".into()), StatusClass::Terminal);
        // Unknown labels stay visible in tracking
        assert_eq!(classifier.classify(&"out_for_delivery".into()), StatusClass::Active);
    }

    #[test]
    fn test_custom_classifier() {
        let classifier = StatusClassifier::new(["Refunded", " ", "picked_up"]);
        assert!(classifier.is_terminal(&"refunded".into()));
        assert!(!classifier.is_terminal(&"delivered".into()));
        assert_eq!(classifier.terminal_labels().count(), 2);
    }

    #[test]
    fn test_ledger_view_lookup() {
        let view = LedgerView::new(vec![order("a", "preparing")], vec![order("b", "delivered")]);
        assert_eq!(view.bucket_of("a"), Some(Bucket::Tracking));
        assert_eq!(view.bucket_of("b"), Some(Bucket::Past));
        assert_eq!(view.bucket_of("c"), None);
        assert!(view.find_past("a").is_none());
        assert!(view.find_past("b").is_some());
        assert!(view.is_partitioned());

        let broken = LedgerView::new(vec![order("a", "preparing")], vec![order("a", "delivered")]);
        assert!(!broken.is_partitioned());
    }

    #[test]
    fn test_order_status_serde() {
        let json = serde_json::to_string(&OrderStatus::new("Paid")).unwrap();
        assert_eq!(json, "\"paid\"");
        let status: OrderStatus = serde_json::from_str("\"READY\"").unwrap();
        assert_eq!(status.as_str(), OrderStatus::READY);
    }
}
