//! Reorder Outcome Model

use super::cart::LineItem;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Three-way availability classification of a past order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReorderClass {
    AllAvailable,
    PartialAvailable,
    NoItemsAvailable,
}

/// A dish that can no longer be reordered; metadata comes from the order snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnavailableItem {
    pub dish_id: String,
    pub dish_name: String,
    pub unit_price: Decimal,
    pub image_ref: Option<String>,
}

impl From<&LineItem> for UnavailableItem {
    fn from(item: &LineItem) -> Self {
        Self {
            dish_id: item.dish_id.clone(),
            dish_name: item.dish_name.clone(),
            unit_price: item.unit_price,
            image_ref: item.image_ref.clone(),
        }
    }
}

/// Result of resolving a reorder against live availability
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReorderOutcome {
    pub classification: ReorderClass,
    pub available_items: Vec<LineItem>,
    pub unavailable_items: Vec<UnavailableItem>,
    /// Whether `available_items` were added to the cart by this call
    pub committed: bool,
}

impl ReorderOutcome {
    /// Classify a partition. Both lists empty counts as nothing available.
    pub fn classify(available: &[LineItem], unavailable: &[UnavailableItem]) -> ReorderClass {
        if available.is_empty() {
            ReorderClass::NoItemsAvailable
        } else if unavailable.is_empty() {
            ReorderClass::AllAvailable
        } else {
            ReorderClass::PartialAvailable
        }
    }

    /// Caller must confirm before the available subset is added
    pub fn needs_confirmation(&self) -> bool {
        self.classification == ReorderClass::PartialAvailable && !self.committed
    }
}
