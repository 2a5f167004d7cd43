//! Ready-made orders and payloads.

#![allow(clippy::unwrap_used)] // Fixtures are always serializable

use chrono::{TimeZone, Utc};
use order_stream_core::{Delivery, Item, Order, Payment};

/// A complete order with one item and the given id.
///
/// Every other field is fixed, so two calls with the same id compare equal.
#[must_use]
pub fn sample_order(order_uid: &str) -> Order {
    Order {
        order_uid: order_uid.to_string(),
        track_number: "WBILMTESTTRACK".to_string(),
        entry: "WBIL".to_string(),
        delivery: Delivery {
            name: "Test Testov".to_string(),
            phone: "+9720000000".to_string(),
            zip: "2639809".to_string(),
            city: "Kiryat Mozkin".to_string(),
            address: "Ploshad Mira 15".to_string(),
            region: "Kraiot".to_string(),
            email: "test@gmail.com".to_string(),
        },
        payment: Payment {
            transaction: order_uid.to_string(),
            request_id: String::new(),
            currency: "USD".to_string(),
            provider: "wbpay".to_string(),
            amount: 1817,
            payment_dt: 1_637_907_727,
            bank: "alpha".to_string(),
            delivery_cost: 1500,
            goods_total: 317,
            custom_fee: 0,
        },
        items: vec![Item {
            chrt_id: 9_934_930,
            track_number: "WBILMTESTTRACK".to_string(),
            price: 453,
            rid: "ab4219087a764ae0btest".to_string(),
            name: "Mascaras".to_string(),
            sale: 30,
            size: "0".to_string(),
            total_price: 317,
            nm_id: 2_389_212,
            brand: "Vivienne Sabo".to_string(),
            status: 202,
        }],
        locale: "en".to_string(),
        internal_signature: String::new(),
        customer_id: "test".to_string(),
        delivery_service: "meest".to_string(),
        shardkey: "9".to_string(),
        sm_id: 99,
        date_created: Utc.with_ymd_and_hms(2021, 11, 26, 6, 22, 19).unwrap(),
        oof_shard: "1".to_string(),
    }
}

/// [`sample_order`] with `count` distinct items.
#[must_use]
pub fn order_with_items(order_uid: &str, count: usize) -> Order {
    let mut order = sample_order(order_uid);
    let template = order.items[0].clone();
    order.items = (0..count)
        .map(|i| Item {
            chrt_id: template.chrt_id + i64::try_from(i).unwrap(),
            name: format!("{} #{i}", template.name),
            ..template.clone()
        })
        .collect();
    order
}

/// The JSON wire form of [`sample_order`].
#[must_use]
pub fn sample_payload(order_uid: &str) -> Vec<u8> {
    serde_json::to_vec(&sample_order(order_uid)).unwrap()
}
