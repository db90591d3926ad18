use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::de::lenient_vec;
use super::menu::{round_cents, CartItem};

/// Free-form customer details, e.g. `{"IGN": "Miki", "Payment Method": "GCash"}`.
/// Values are usually strings but may be structured.
pub type CustomerInfo = Map<String, Value>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Approved,
    Rejected,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 4] = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Approved,
        OrderStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Approved => "approved",
            OrderStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown order status '{}'", s))
    }
}

/// A submitted purchase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(from = "OrderRow")]
pub struct Order {
    pub id: String,
    pub order_items: Vec<CartItem>,
    pub customer_info: CustomerInfo,
    pub payment_method_id: String,
    pub receipt_url: String,
    pub total_price: f64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row shape as returned by the backend. Columns may be null or absent on
/// older rows, so everything except identity, status and creation time is
/// optional and defaulted when converted into an [`Order`].
#[derive(Debug, Clone, Deserialize)]
pub struct OrderRow {
    pub id: String,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub order_items: Option<Vec<CartItem>>,
    #[serde(default)]
    pub customer_info: Option<CustomerInfo>,
    #[serde(default)]
    pub payment_method_id: Option<String>,
    #[serde(default)]
    pub receipt_url: Option<String>,
    #[serde(default)]
    pub total_price: Option<f64>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<OrderRow> for Order {
    fn from(row: OrderRow) -> Self {
        Order {
            id: row.id,
            order_items: row.order_items.unwrap_or_default(),
            customer_info: row.customer_info.unwrap_or_default(),
            payment_method_id: row.payment_method_id.unwrap_or_default(),
            receipt_url: row.receipt_url.unwrap_or_default(),
            total_price: row.total_price.unwrap_or(0.0),
            status: row.status,
            created_at: row.created_at,
            updated_at: row.updated_at.unwrap_or(row.created_at),
        }
    }
}

impl Order {
    pub fn item_count(&self) -> u32 {
        self.order_items.iter().map(|i| i.quantity).sum()
    }

    /// Look up a customer detail as a string, if it is one.
    pub fn customer_field(&self, key: &str) -> Option<&str> {
        self.customer_info.get(key).and_then(Value::as_str)
    }
}

/// Fields a customer submits; the server assigns id, timestamps and status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateOrderData {
    pub order_items: Vec<CartItem>,
    #[serde(default)]
    pub customer_info: CustomerInfo,
    pub payment_method_id: String,
    #[serde(default)]
    pub receipt_url: String,
    pub total_price: f64,
}

impl CreateOrderData {
    /// Build an order from cart contents, pricing every line at `now` and
    /// summing the line totals.
    pub fn from_cart(
        items: Vec<CartItem>,
        customer_info: CustomerInfo,
        payment_method_id: impl Into<String>,
        receipt_url: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let order_items: Vec<CartItem> = items.into_iter().map(|i| i.priced(now)).collect();
        let total_price = round_cents(order_items.iter().map(|i| i.total_price).sum());
        Self {
            order_items,
            customer_info,
            payment_method_id: payment_method_id.into(),
            receipt_url: receipt_url.into(),
            total_price,
        }
    }
}

/// Insert payload. Status is always `pending` on creation.
#[derive(Debug, Clone, Serialize)]
pub struct NewOrder<'a> {
    pub order_items: &'a [CartItem],
    pub customer_info: &'a CustomerInfo,
    pub payment_method_id: &'a str,
    pub receipt_url: &'a str,
    pub total_price: f64,
    pub status: OrderStatus,
}

impl<'a> From<&'a CreateOrderData> for NewOrder<'a> {
    fn from(data: &'a CreateOrderData) -> Self {
        NewOrder {
            order_items: &data.order_items,
            customer_info: &data.customer_info,
            payment_method_id: &data.payment_method_id,
            receipt_url: &data.receipt_url,
            total_price: data.total_price,
            status: OrderStatus::Pending,
        }
    }
}

/// Sort newest first. Stable, so rows sharing a timestamp keep server order.
pub fn sort_newest_first(orders: &mut [Order]) {
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}
