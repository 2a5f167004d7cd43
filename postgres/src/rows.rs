//! Row types for the order tables and their assembly into an [`Order`].

use chrono::{DateTime, Utc};
use order_stream_core::{Delivery, Item, Order, Payment, StoreError};

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct OrderRow {
    pub order_uid: String,
    pub track_number: String,
    pub entry: String,
    pub locale: String,
    pub internal_signature: String,
    pub customer_id: String,
    pub delivery_service: String,
    pub shardkey: String,
    pub sm_id: i64,
    pub date_created: DateTime<Utc>,
    pub oof_shard: String,
}

impl OrderRow {
    pub const COLUMNS: &'static str = "order_uid, track_number, entry, locale, \
        internal_signature, customer_id, delivery_service, shardkey, sm_id, date_created, \
        oof_shard";

    /// Join the root row with its owned rows.
    ///
    /// A root row without its delivery or payment is an integrity violation, not an absence.
    pub fn assemble(
        self,
        delivery: Option<DeliveryRow>,
        payment: Option<PaymentRow>,
        items: Vec<ItemRow>,
    ) -> Result<Order, StoreError> {
        let Some(delivery) = delivery else {
            return Err(StoreError::Incomplete {
                order_uid: self.order_uid,
                reason: "missing delivery".to_string(),
            });
        };
        let Some(payment) = payment else {
            return Err(StoreError::Incomplete {
                order_uid: self.order_uid,
                reason: "missing payment".to_string(),
            });
        };

        Ok(Order {
            order_uid: self.order_uid,
            track_number: self.track_number,
            entry: self.entry,
            delivery: delivery.into(),
            payment: payment.into(),
            items: items.into_iter().map(Item::from).collect(),
            locale: self.locale,
            internal_signature: self.internal_signature,
            customer_id: self.customer_id,
            delivery_service: self.delivery_service,
            shardkey: self.shardkey,
            sm_id: self.sm_id,
            date_created: self.date_created,
            oof_shard: self.oof_shard,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct DeliveryRow {
    pub order_uid: String,
    pub name: String,
    pub phone: String,
    pub zip: String,
    pub city: String,
    pub address: String,
    pub region: String,
    pub email: String,
}

impl DeliveryRow {
    pub const COLUMNS: &'static str = "order_uid, name, phone, zip, city, address, region, email";
}

impl From<DeliveryRow> for Delivery {
    fn from(row: DeliveryRow) -> Self {
        Self {
            name: row.name,
            phone: row.phone,
            zip: row.zip,
            city: row.city,
            address: row.address,
            region: row.region,
            email: row.email,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PaymentRow {
    pub order_uid: String,
    pub transaction: String,
    pub request_id: String,
    pub currency: String,
    pub provider: String,
    pub amount: i64,
    pub payment_dt: i64,
    pub bank: String,
    pub delivery_cost: i64,
    pub goods_total: i64,
    pub custom_fee: i64,
}

impl PaymentRow {
    pub const COLUMNS: &'static str = "order_uid, transaction, request_id, currency, provider, \
        amount, payment_dt, bank, delivery_cost, goods_total, custom_fee";
}

impl From<PaymentRow> for Payment {
    fn from(row: PaymentRow) -> Self {
        Self {
            transaction: row.transaction,
            request_id: row.request_id,
            currency: row.currency,
            provider: row.provider,
            amount: row.amount,
            payment_dt: row.payment_dt,
            bank: row.bank,
            delivery_cost: row.delivery_cost,
            goods_total: row.goods_total,
            custom_fee: row.custom_fee,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ItemRow {
    pub order_uid: String,
    pub chrt_id: i64,
    pub track_number: String,
    pub price: i64,
    pub rid: String,
    pub name: String,
    pub sale: i32,
    pub size: String,
    pub total_price: i64,
    pub nm_id: i64,
    pub brand: String,
    pub status: i32,
}

impl ItemRow {
    pub const COLUMNS: &'static str = "order_uid, chrt_id, track_number, price, rid, name, \
        sale, size, total_price, nm_id, brand, status";
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        Self {
            chrt_id: row.chrt_id,
            track_number: row.track_number,
            price: row.price,
            rid: row.rid,
            name: row.name,
            sale: row.sale,
            size: row.size,
            total_price: row.total_price,
            nm_id: row.nm_id,
            brand: row.brand,
            status: row.status,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn order_row(uid: &str) -> OrderRow {
        OrderRow {
            order_uid: uid.to_string(),
            track_number: "T".to_string(),
            entry: "E".to_string(),
            locale: "en".to_string(),
            internal_signature: String::new(),
            customer_id: "c".to_string(),
            delivery_service: "meest".to_string(),
            shardkey: "9".to_string(),
            sm_id: 99,
            date_created: DateTime::<Utc>::default(),
            oof_shard: "1".to_string(),
        }
    }

    fn delivery_row(uid: &str) -> DeliveryRow {
        DeliveryRow {
            order_uid: uid.to_string(),
            name: "n".to_string(),
            phone: "p".to_string(),
            zip: "z".to_string(),
            city: "c".to_string(),
            address: "a".to_string(),
            region: "r".to_string(),
            email: "e".to_string(),
        }
    }

    fn payment_row(uid: &str) -> PaymentRow {
        PaymentRow {
            order_uid: uid.to_string(),
            transaction: uid.to_string(),
            request_id: String::new(),
            currency: "USD".to_string(),
            provider: "wbpay".to_string(),
            amount: 10,
            payment_dt: 1,
            bank: "alpha".to_string(),
            delivery_cost: 2,
            goods_total: 8,
            custom_fee: 0,
        }
    }

    #[test]
    fn assembles_complete_order() {
        let order = order_row("o1")
            .assemble(Some(delivery_row("o1")), Some(payment_row("o1")), vec![])
            .unwrap();

        assert_eq!(order.order_uid, "o1");
        assert_eq!(order.delivery.city, "c");
        assert_eq!(order.payment.amount, 10);
        assert!(order.items.is_empty());
    }

    #[test]
    fn missing_delivery_is_incomplete() {
        let err = order_row("o1")
            .assemble(None, Some(payment_row("o1")), vec![])
            .unwrap_err();

        assert!(matches!(err, StoreError::Incomplete { ref order_uid, .. } if order_uid == "o1"));
    }

    #[test]
    fn missing_payment_is_incomplete() {
        let err = order_row("o1")
            .assemble(Some(delivery_row("o1")), None, vec![])
            .unwrap_err();

        assert!(matches!(err, StoreError::Incomplete { .. }));
    }
}
