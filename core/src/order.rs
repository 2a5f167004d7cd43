//! The order model.
//!
//! An [`Order`] is the root entity, identified by its `order_uid`. It owns exactly one
//! [`Delivery`], exactly one [`Payment`] and an ordered list of [`Item`]s. None of the owned
//! records has an independent lifecycle: they are written, read and replaced together with
//! the order.
//!
//! Field names match the JSON wire format used both by inbound messages and by the HTTP API.
//! Money amounts are integers in minor currency units.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A customer order with its delivery, payment and line items.
///
/// Scalar fields that are absent from a payload decode to their empty value. `delivery` and
/// `payment` are mandatory: a payload without them does not decode.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Globally unique, immutable identifier. Sole key for cache and store lookups.
    #[serde(default)]
    pub order_uid: String,
    /// Tracking number shared by the order's items.
    #[serde(default)]
    pub track_number: String,
    /// Entry channel the order came through.
    #[serde(default)]
    pub entry: String,
    /// Delivery details (mandatory).
    pub delivery: Delivery,
    /// Payment details (mandatory).
    pub payment: Payment,
    /// Line items, in the order they were received.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub items: Vec<Item>,
    /// Customer locale.
    #[serde(default)]
    pub locale: String,
    /// Internal signature.
    #[serde(default)]
    pub internal_signature: String,
    /// Customer identifier.
    #[serde(default)]
    pub customer_id: String,
    /// Delivery service name.
    #[serde(default)]
    pub delivery_service: String,
    /// Shard key.
    #[serde(default)]
    pub shardkey: String,
    /// Shard manager id.
    #[serde(default)]
    pub sm_id: i64,
    /// When the order was created.
    #[serde(default)]
    pub date_created: DateTime<Utc>,
    /// Out-of-shard value.
    #[serde(default)]
    pub oof_shard: String,
}

impl Order {
    /// Returns `true` if the order carries no line items.
    ///
    /// Structurally legal, but a business anomaly worth logging.
    #[must_use]
    pub fn has_no_items(&self) -> bool {
        self.items.is_empty()
    }
}

/// Where and to whom an order is delivered.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Delivery {
    /// Recipient name.
    pub name: String,
    /// Recipient phone.
    pub phone: String,
    /// Postal code.
    pub zip: String,
    /// City.
    pub city: String,
    /// Street address.
    pub address: String,
    /// Region.
    pub region: String,
    /// Recipient email.
    pub email: String,
}

/// How an order was paid.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Payment {
    /// Transaction id.
    pub transaction: String,
    /// Payment request id.
    pub request_id: String,
    /// ISO currency code.
    pub currency: String,
    /// Payment provider.
    pub provider: String,
    /// Amount charged, in minor units.
    pub amount: i64,
    /// Payment time as Unix seconds.
    pub payment_dt: i64,
    /// Bank.
    pub bank: String,
    /// Delivery cost, in minor units.
    pub delivery_cost: i64,
    /// Total of goods, in minor units.
    pub goods_total: i64,
    /// Custom fee, in minor units.
    pub custom_fee: i64,
}

/// A single line item of an order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Item {
    /// Catalog id.
    pub chrt_id: i64,
    /// Tracking number.
    pub track_number: String,
    /// Unit price, in minor units.
    pub price: i64,
    /// Return id.
    pub rid: String,
    /// Product name.
    pub name: String,
    /// Discount percentage.
    pub sale: i32,
    /// Size label.
    pub size: String,
    /// Total price after discount, in minor units.
    pub total_price: i64,
    /// Numeric model id.
    pub nm_id: i64,
    /// Brand.
    pub brand: String,
    /// Status code.
    pub status: i32,
}

// Producers serialise an empty item list as `null`.
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Item>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Item>>::deserialize(deserializer)?.unwrap_or_default())
}
