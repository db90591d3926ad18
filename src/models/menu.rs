use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::de::{lenient, lenient_datetime, lenient_vec, null_as_default};

/// A priced size/flavour option of a menu item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Variation {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<i32>,
}

/// An input the customer fills in when ordering an item (e.g. an account name).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomField {
    pub label: String,
    pub key: String,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AddOn {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub price: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
}

impl AddOn {
    /// Price contribution of this add-on to one unit of the parent item.
    pub fn subtotal(&self) -> f64 {
        self.price * self.quantity.unwrap_or(1) as f64
    }
}

/// Catalog entry as stored by the backend.
///
/// Field names follow the stored JSON (mostly camelCase, `sort_order` excepted)
/// so that order line items round-trip unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub base_price: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub category: String,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub popular: Option<bool>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub available: Option<bool>,
    #[serde(rename = "sort_order", default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<i32>,
    #[serde(default, deserialize_with = "lenient_vec", skip_serializing_if = "Option::is_none")]
    pub variations: Option<Vec<Variation>>,
    /// Percentage off (0-100)
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub discount_percentage: Option<f64>,
    #[serde(default, deserialize_with = "lenient_datetime", skip_serializing_if = "Option::is_none")]
    pub discount_start_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_datetime", skip_serializing_if = "Option::is_none")]
    pub discount_end_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub discount_active: Option<bool>,
    /// Legacy absolute discount price, superseded by `discount_percentage`
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub discount_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub effective_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub is_on_discount: Option<bool>,
    #[serde(default, deserialize_with = "lenient_vec", skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<Vec<CustomField>>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
}

impl MenuItem {
    /// Whether the percentage discount applies at `now`.
    ///
    /// Requires the active flag, a positive percentage and `now` inside the
    /// window. A missing start or end date leaves that side of the window open.
    pub fn is_discount_active(&self, now: DateTime<Utc>) -> bool {
        if !self.discount_active.unwrap_or(false) {
            return false;
        }
        match self.discount_percentage {
            Some(pct) if pct > 0.0 => {}
            _ => return false,
        }
        if let Some(start) = self.discount_start_date {
            if now < start {
                return false;
            }
        }
        if let Some(end) = self.discount_end_date {
            if now > end {
                return false;
            }
        }
        true
    }

    /// Apply the item's discount (if in effect) to an arbitrary unit price.
    pub fn discounted(&self, price: f64, now: DateTime<Utc>) -> f64 {
        if !self.is_discount_active(now) {
            return price;
        }
        let pct = self.discount_percentage.unwrap_or(0.0).min(100.0);
        round_cents(price * (1.0 - pct / 100.0))
    }

    pub fn effective_price_at(&self, now: DateTime<Utc>) -> f64 {
        self.discounted(self.base_price, now)
    }

    /// Fill the computed `effective_price` / `is_on_discount` fields.
    pub fn with_pricing(mut self, now: DateTime<Utc>) -> Self {
        self.effective_price = Some(self.effective_price_at(now));
        self.is_on_discount = Some(self.is_discount_active(now));
        self
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &CustomField> {
        self.custom_fields.iter().flatten().filter(|f| f.required)
    }
}

/// A menu item placed in the cart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    #[serde(flatten)]
    pub item: MenuItem,
    #[serde(default, deserialize_with = "null_as_default")]
    pub quantity: u32,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub selected_variation: Option<Variation>,
    #[serde(default, deserialize_with = "lenient_vec", skip_serializing_if = "Option::is_none")]
    pub selected_add_ons: Option<Vec<AddOn>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_price: f64,
}

impl CartItem {
    pub fn new(item: MenuItem, quantity: u32) -> Self {
        Self {
            item,
            quantity,
            selected_variation: None,
            selected_add_ons: None,
            total_price: 0.0,
        }
    }

    pub fn with_variation(mut self, variation: Variation) -> Self {
        self.selected_variation = Some(variation);
        self
    }

    pub fn with_add_ons(mut self, add_ons: Vec<AddOn>) -> Self {
        self.selected_add_ons = Some(add_ons);
        self
    }

    /// Price of one unit: chosen variation (or base price), discounted when
    /// the item's discount is in effect, plus selected add-ons.
    pub fn unit_price(&self, now: DateTime<Utc>) -> f64 {
        let base = self
            .selected_variation
            .as_ref()
            .map(|v| v.price)
            .unwrap_or(self.item.base_price);
        let add_ons: f64 = self
            .selected_add_ons
            .iter()
            .flatten()
            .map(AddOn::subtotal)
            .sum();
        round_cents(self.item.discounted(base, now) + add_ons)
    }

    pub fn line_total(&self, now: DateTime<Utc>) -> f64 {
        round_cents(self.unit_price(now) * self.quantity as f64)
    }

    /// Recompute and store `total_price`.
    pub fn priced(mut self, now: DateTime<Utc>) -> Self {
        self.total_price = self.line_total(now);
        self
    }
}

pub(crate) fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, 12, 0, 0).unwrap()
    }

    fn latte() -> MenuItem {
        MenuItem {
            id: "latte".into(),
            name: "Latte".into(),
            base_price: 120.0,
            category: "coffee".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_discount_requires_active_flag_and_percentage() {
        let mut item = latte();
        item.discount_percentage = Some(25.0);
        assert!(!item.is_discount_active(at(10)));

        item.discount_active = Some(true);
        assert!(item.is_discount_active(at(10)));
        assert_eq!(item.effective_price_at(at(10)), 90.0);

        item.discount_percentage = Some(0.0);
        assert!(!item.is_discount_active(at(10)));
        assert_eq!(item.effective_price_at(at(10)), 120.0);
    }

    #[test]
    fn test_discount_window_bounds() {
        let mut item = latte();
        item.discount_active = Some(true);
        item.discount_percentage = Some(10.0);
        item.discount_start_date = Some(at(5));
        item.discount_end_date = Some(at(15));

        assert!(!item.is_discount_active(at(4)));
        assert!(item.is_discount_active(at(5)));
        assert!(item.is_discount_active(at(15)));
        assert!(!item.is_discount_active(at(16)));

        item.discount_end_date = None;
        assert!(item.is_discount_active(at(28)));
    }

    #[test]
    fn test_line_total_uses_variation_and_add_ons() {
        let large = Variation {
            id: "l".into(),
            name: "Large".into(),
            price: 150.0,
            description: None,
            sort_order: None,
            category: None,
            sort: None,
        };
        let shot = AddOn {
            id: "shot".into(),
            name: "Extra shot".into(),
            price: 30.0,
            category: "extras".into(),
            quantity: Some(2),
        };
        let cart = CartItem::new(latte(), 2)
            .with_variation(large)
            .with_add_ons(vec![shot]);

        assert_eq!(cart.unit_price(at(1)), 210.0);
        assert_eq!(cart.line_total(at(1)), 420.0);
        assert_eq!(cart.priced(at(1)).total_price, 420.0);
    }

    #[test]
    fn test_cart_item_json_flattens_menu_item() {
        let json = serde_json::json!({
            "id": "latte",
            "name": "Latte",
            "description": "",
            "basePrice": 120.0,
            "category": "coffee",
            "sort_order": 3,
            "quantity": 1,
            "totalPrice": 120.0
        });
        let cart: CartItem = serde_json::from_value(json).unwrap();
        assert_eq!(cart.item.sort_order, Some(3));
        assert_eq!(cart.item.base_price, 120.0);
        assert_eq!(cart.quantity, 1);

        let back = serde_json::to_value(&cart).unwrap();
        assert_eq!(back["basePrice"], 120.0);
        assert_eq!(back["sort_order"], 3);
    }
}
