//! Catalog Model (restaurant menu as served by the catalog service)

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Menu entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
    #[serde(rename = "id")]
    pub dish_id: String,
    pub name: String,
    pub price: Decimal,
    pub is_available: bool,
    #[serde(rename = "imageUrl", default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A restaurant's live menu
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Menu {
    pub restaurant_id: String,
    #[serde(default)]
    pub items: Vec<MenuItem>,
    pub is_open: bool,
}

/// Live availability of one dish
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Availability<'a> {
    /// On the menu and sellable
    Available(&'a MenuItem),
    /// On the menu but not sellable right now (or the restaurant is closed)
    Unavailable(&'a MenuItem),
    /// No longer on the menu
    Missing,
}

impl Availability<'_> {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available(_))
    }
}

impl Menu {
    pub fn item(&self, dish_id: &str) -> Option<&MenuItem> {
        self.items.iter().find(|item| item.dish_id == dish_id)
    }

    /// A closed restaurant sells nothing, whatever the per-item flag says
    pub fn availability(&self, dish_id: &str) -> Availability<'_> {
        match self.item(dish_id) {
            None => Availability::Missing,
            Some(item) if item.is_available && self.is_open => Availability::Available(item),
            Some(item) => Availability::Unavailable(item),
        }
    }
}
