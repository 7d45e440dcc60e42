//! Cart Model
//!
//! A cart belongs to one owner and targets exactly one restaurant at a time.
//! Quantities are changed through signed deltas, never absolute writes.

use crate::util::{deserialize_blank_as_none, round_money};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

/// One dish line in a cart or order, keyed by `dish_id`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub dish_id: String,
    pub dish_name: String,
    /// Non-negative unit price
    #[serde(rename = "price")]
    pub unit_price: Decimal,
    /// Always >= 1 while the line exists
    pub quantity: u32,
    #[serde(rename = "imageUrl", default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
}

impl LineItem {
    pub fn new(dish_id: impl Into<String>, meta: &DishMeta, quantity: u32) -> Self {
        Self {
            dish_id: dish_id.into(),
            dish_name: meta.dish_name.clone(),
            unit_price: meta.unit_price,
            quantity,
            image_ref: meta.image_ref.clone(),
        }
    }

    /// unit_price * quantity, rounded to cents
    pub fn line_total(&self) -> Decimal {
        round_money(self.unit_price * Decimal::from(self.quantity))
    }

    /// Display metadata carried alongside a delta
    pub fn meta(&self) -> DishMeta {
        DishMeta {
            dish_name: self.dish_name.clone(),
            unit_price: self.unit_price,
            image_ref: self.image_ref.clone(),
        }
    }
}

/// Dish metadata sent with a delta so the backend can create the line
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DishMeta {
    pub dish_name: String,
    pub unit_price: Decimal,
    pub image_ref: Option<String>,
}

impl DishMeta {
    pub fn new(dish_name: impl Into<String>, unit_price: Decimal) -> Self {
        Self {
            dish_name: dish_name.into(),
            unit_price,
            image_ref: None,
        }
    }

    pub fn with_image(mut self, image_ref: impl Into<String>) -> Self {
        self.image_ref = Some(image_ref.into());
        self
    }
}

/// Cart status as reported by the backend
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CartStatus {
    #[default]
    #[serde(alias = "active")]
    Active,
    #[serde(alias = "checked_out")]
    CheckedOut,
}

/// Per-owner cart
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    #[serde(rename = "userId", default)]
    pub owner_id: String,
    #[serde(rename = "userName", default, skip_serializing_if = "Option::is_none")]
    pub owner_name: Option<String>,
    /// Restaurant the current items belong to (None while empty)
    #[serde(default, deserialize_with = "deserialize_blank_as_none")]
    pub restaurant_id: Option<String>,
    #[serde(default, with = "items_as_list")]
    pub items: BTreeMap<String, LineItem>,
    #[serde(default)]
    pub status: CartStatus,
    /// Commit counter, bumped on every successful mutation by backends
    /// that track one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<u64>,
}

/// What a single delta did to a cart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaEffect {
    /// Line created or quantity changed
    Updated { quantity: u32 },
    /// Quantity reached zero and the line was dropped
    Removed,
    /// Negative delta on a dish that was not in the cart
    Unchanged,
}

impl Cart {
    /// An empty cart for `owner_id`
    pub fn empty(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            owner_name: None,
            restaurant_id: None,
            items: BTreeMap::new(),
            status: CartStatus::Active,
            revision: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of distinct dishes
    pub fn line_count(&self) -> usize {
        self.items.len()
    }

    /// Sum of quantities across all lines
    pub fn item_count(&self) -> u32 {
        self.items.values().map(|item| item.quantity).sum()
    }

    pub fn get(&self, dish_id: &str) -> Option<&LineItem> {
        self.items.get(dish_id)
    }

    pub fn quantity_of(&self, dish_id: &str) -> u32 {
        self.items.get(dish_id).map(|item| item.quantity).unwrap_or(0)
    }

    /// Cart total, rounded to cents
    pub fn total(&self) -> Decimal {
        round_money(self.items.values().map(LineItem::line_total).sum())
    }

    /// Lines in dish id order
    pub fn lines(&self) -> impl Iterator<Item = &LineItem> {
        self.items.values()
    }

    /// Drop every line and release the restaurant scope
    pub fn clear(&mut self) {
        self.items.clear();
        self.restaurant_id = None;
    }

    /// Record one committed mutation
    pub fn bump_revision(&mut self) {
        self.revision = Some(self.revision.map_or(1, |r| r + 1));
    }

    /// Apply a signed quantity delta.
    ///
    /// A delta against a different restaurant than the current non-empty
    /// cart starts a new cart scope for that restaurant; carts are never
    /// merged across restaurants. The resulting quantity is clamped at zero
    /// and a zero-quantity line is removed. Metadata on an existing line is
    /// refreshed from `meta`.
    pub fn apply_delta(
        &mut self,
        restaurant_id: &str,
        dish_id: &str,
        meta: &DishMeta,
        delta: i32,
    ) -> DeltaEffect {
        if self.restaurant_id.as_deref() != Some(restaurant_id) {
            if delta <= 0 {
                // Decrementing in a cart scope that does not exist yet
                return DeltaEffect::Unchanged;
            }
            self.items.clear();
            self.restaurant_id = Some(restaurant_id.to_string());
        }

        let current = i64::from(self.quantity_of(dish_id));
        let next = (current + i64::from(delta)).max(0);

        let effect = if next == 0 {
            if self.items.remove(dish_id).is_some() {
                DeltaEffect::Removed
            } else {
                DeltaEffect::Unchanged
            }
        } else {
            let quantity = u32::try_from(next).unwrap_or(u32::MAX);
            let line = self
                .items
                .entry(dish_id.to_string())
                .or_insert_with(|| LineItem::new(dish_id, meta, 0));
            line.dish_name = meta.dish_name.clone();
            line.unit_price = meta.unit_price;
            if meta.image_ref.is_some() {
                line.image_ref = meta.image_ref.clone();
            }
            line.quantity = quantity;
            DeltaEffect::Updated { quantity }
        };

        if self.items.is_empty() {
            self.restaurant_id = None;
        }
        effect
    }
}

/// Signed quantity change sent to the cart backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CartDelta {
    pub owner_id: String,
    pub owner_name: Option<String>,
    pub restaurant_id: String,
    pub dish_id: String,
    pub meta: DishMeta,
    pub delta: i32,
}

/// Carts travel as a list of lines; the map key is the line's dish id
mod items_as_list {
    use super::*;

    pub fn serialize<S>(items: &BTreeMap<String, LineItem>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(items.values())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<String, LineItem>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let lines = Option::<Vec<LineItem>>::deserialize(deserializer)?.unwrap_or_default();
        Ok(lines
            .into_iter()
            .filter(|line| line.quantity > 0)
            .map(|line| (line.dish_id.clone(), line))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn meta(name: &str, price: &str) -> DishMeta {
        DishMeta::new(name, Decimal::from_str(price).unwrap())
    }

    #[test]
    fn test_delta_increments_and_removes() {
        let mut cart = Cart::empty("u1");
        let pizza = meta("Pizza", "9.50");

        assert_eq!(
            cart.apply_delta("r1", "pizza", &pizza, 2),
            DeltaEffect::Updated { quantity: 2 }
        );
        assert_eq!(cart.restaurant_id.as_deref(), Some("r1"));

        assert_eq!(
            cart.apply_delta("r1", "pizza", &pizza, -1),
            DeltaEffect::Updated { quantity: 1 }
        );
        assert_eq!(cart.apply_delta("r1", "pizza", &pizza, -1), DeltaEffect::Removed);
        assert!(cart.is_empty());
        assert!(cart.restaurant_id.is_none());
    }

    #[test]
    fn test_delta_clamps_at_zero() {
        let mut cart = Cart::empty("u1");
        let pasta = meta("Pasta", "12");
        cart.apply_delta("r1", "pasta", &pasta, 1);
        cart.apply_delta("r1", "salad", &meta("Salad", "5"), 1);

        assert_eq!(cart.apply_delta("r1", "pasta", &pasta, -10), DeltaEffect::Removed);
        assert_eq!(cart.quantity_of("pasta"), 0);
        assert_eq!(cart.line_count(), 1);
    }

    #[test]
    fn test_negative_delta_on_missing_dish_is_noop() {
        let mut cart = Cart::empty("u1");
        assert_eq!(
            cart.apply_delta("r1", "pizza", &meta("Pizza", "9"), -1),
            DeltaEffect::Unchanged
        );
        assert!(cart.is_empty());
    }

    #[test]
    fn test_other_restaurant_starts_new_scope() {
        let mut cart = Cart::empty("u1");
        cart.apply_delta("r1", "pizza", &meta("Pizza", "9"), 2);
        cart.apply_delta("r2", "sushi", &meta("Sushi", "15"), 1);

        assert_eq!(cart.restaurant_id.as_deref(), Some("r2"));
        assert_eq!(cart.line_count(), 1);
        assert_eq!(cart.quantity_of("pizza"), 0);

        // Removing from a restaurant the cart is not scoped to changes nothing
        assert_eq!(
            cart.apply_delta("r1", "sushi", &meta("Sushi", "15"), -1),
            DeltaEffect::Unchanged
        );
        assert_eq!(cart.quantity_of("sushi"), 1);
    }

    #[test]
    fn test_totals() {
        let mut cart = Cart::empty("u1");
        cart.apply_delta("r1", "pizza", &meta("Pizza", "9.99"), 2);
        cart.apply_delta("r1", "cola", &meta("Cola", "1.50"), 3);

        assert_eq!(cart.item_count(), 5);
        assert_eq!(cart.total(), Decimal::from_str("24.48").unwrap());
    }

    #[test]
    fn test_cart_wire_format() {
        let json = r#"{
            "userId": "u1",
            "userName": "Asha",
            "restaurantId": "",
            "items": [
                {"dishId": "d1", "dishName": "Paneer Pizza", "price": 100.0, "quantity": 2, "imageUrl": "p.png"}
            ],
            "status": "active"
        }"#;
        let cart: Cart = serde_json::from_str(json).unwrap();
        assert_eq!(cart.owner_id, "u1");
        assert!(cart.restaurant_id.is_none());
        assert_eq!(cart.quantity_of("d1"), 2);
        assert_eq!(cart.get("d1").unwrap().image_ref.as_deref(), Some("p.png"));
        assert_eq!(cart.status, CartStatus::Active);
        assert_eq!(cart.revision, None);
    }

    #[test]
    fn test_cart_without_user_id_or_revision() {
        let json = r#"{
            "createdAt": "2024-05-01T10:00:00Z",
            "items": [{"dishId": "Paneer Pizza", "dishName": "Paneer Pizza", "imageUrl": null, "price": 250, "quantity": 1}],
            "restaurantId": "Spice Route",
            "status": "active",
            "userName": "Asha"
        }"#;
        let mut cart: Cart = serde_json::from_str(json).unwrap();
        assert!(cart.owner_id.is_empty());
        assert_eq!(cart.restaurant_id.as_deref(), Some("Spice Route"));
        assert_eq!(cart.revision, None);

        cart.bump_revision();
        cart.bump_revision();
        assert_eq!(cart.revision, Some(2));
        let out = serde_json::to_value(&cart).unwrap();
        assert_eq!(out["revision"], 2);
    }
}
