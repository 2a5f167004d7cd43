//! Decoding and validation of inbound order payloads.
//!
//! Decoding is deliberately lenient about scalars and strict about structure: a payload that
//! is not a JSON object, or that lacks `delivery` or `payment`, fails with [`DecodeError`].
//! Semantic checks that serde cannot express live in [`Order::validate`] and fail with
//! [`ValidationError`].

use crate::order::Order;
use thiserror::Error;

/// A payload could not be turned into an [`Order`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to decode order payload: {reason}")]
pub struct DecodeError {
    /// Human-readable cause reported by the JSON parser.
    pub reason: String,
}

/// A decoded order failed a structural check.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// `order_uid` is empty or consists only of whitespace.
    #[error("Order has an empty order_uid")]
    EmptyOrderUid,
}

/// Decode a raw message payload into an [`Order`].
///
/// Absent scalar fields take their empty value, absent or `null` `items` become an empty
/// list and an absent `date_created` becomes the Unix epoch.
///
/// # Errors
///
/// Returns [`DecodeError`] if the payload is not valid JSON, is not an object, has a field of
/// the wrong type, or is missing `delivery` or `payment`.
pub fn decode_order(payload: &[u8]) -> Result<Order, DecodeError> {
    serde_json::from_slice(payload).map_err(|e| DecodeError {
        reason: e.to_string(),
    })
}

/// Encode an [`Order`] into its JSON wire form.
///
/// # Errors
///
/// Returns [`DecodeError`] if serialization fails, which for this model only happens on
/// allocation failure inside the serializer.
pub fn encode_order(order: &Order) -> Result<Vec<u8>, DecodeError> {
    serde_json::to_vec(order).map_err(|e| DecodeError {
        reason: e.to_string(),
    })
}

impl Order {
    /// Check the invariants every ingested order must satisfy.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyOrderUid`] if `order_uid` is blank.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.order_uid.trim().is_empty() {
            return Err(ValidationError::EmptyOrderUid);
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    const FULL: &str = r#"{
        "order_uid": "b563feb7b2b84b6test",
        "track_number": "WBILMTESTTRACK",
        "entry": "WBIL",
        "delivery": {
            "name": "Test Testov",
            "phone": "+9720000000",
            "zip": "2639809",
            "city": "Kiryat Mozkin",
            "address": "Ploshad Mira 15",
            "region": "Kraiot",
            "email": "test@gmail.com"
        },
        "payment": {
            "transaction": "b563feb7b2b84b6test",
            "request_id": "",
            "currency": "USD",
            "provider": "wbpay",
            "amount": 1817,
            "payment_dt": 1637907727,
            "bank": "alpha",
            "delivery_cost": 1500,
            "goods_total": 317,
            "custom_fee": 0
        },
        "items": [
            {
                "chrt_id": 9934930,
                "track_number": "WBILMTESTTRACK",
                "price": 453,
                "rid": "ab4219087a764ae0btest",
                "name": "Mascaras",
                "sale": 30,
                "size": "0",
                "total_price": 317,
                "nm_id": 2389212,
                "brand": "Vivienne Sabo",
                "status": 202
            }
        ],
        "locale": "en",
        "internal_signature": "",
        "customer_id": "test",
        "delivery_service": "meest",
        "shardkey": "9",
        "sm_id": 99,
        "date_created": "2021-11-26T06:22:19Z",
        "oof_shard": "1"
    }"#;

    #[test]
    fn decodes_full_payload() {
        let order = decode_order(FULL.as_bytes()).unwrap();

        assert_eq!(order.order_uid, "b563feb7b2b84b6test");
        assert_eq!(order.delivery.city, "Kiryat Mozkin");
        assert_eq!(order.payment.amount, 1817);
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items[0].brand, "Vivienne Sabo");
        assert_eq!(order.sm_id, 99);
        assert_eq!(
            order.date_created,
            Utc.with_ymd_and_hms(2021, 11, 26, 6, 22, 19).unwrap()
        );
        assert!(order.validate().is_ok());
    }

    #[test]
    fn missing_scalars_take_empty_values() {
        let order = decode_order(br#"{"order_uid":"o1","delivery":{},"payment":{}}"#).unwrap();

        assert_eq!(order.track_number, "");
        assert_eq!(order.sm_id, 0);
        assert_eq!(order.payment.amount, 0);
        assert!(order.items.is_empty());
        assert_eq!(order.date_created, DateTime::<Utc>::default());
    }

    #[test]
    fn null_items_decode_as_empty() {
        let order =
            decode_order(br#"{"order_uid":"o1","delivery":{},"payment":{},"items":null}"#)
                .unwrap();

        assert!(order.has_no_items());
    }

    #[test]
    fn missing_delivery_or_payment_is_rejected() {
        assert!(decode_order(br#"{"order_uid":"o1","payment":{}}"#).is_err());
        assert!(decode_order(br#"{"order_uid":"o1","delivery":{}}"#).is_err());
        assert!(decode_order(br#"{"order_uid":"o1","delivery":null,"payment":{}}"#).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        let err = decode_order(b"not json at all").unwrap_err();
        assert!(!err.reason.is_empty());

        assert!(decode_order(b"[1,2,3]").is_err());
        assert!(decode_order(br#"{"order_uid":42,"delivery":{},"payment":{}}"#).is_err());
    }

    #[test]
    fn blank_uid_fails_validation() {
        for uid in ["", "   ", "\t\n"] {
            let payload = format!(
                r#"{{"order_uid":"{}","delivery":{{}},"payment":{{}}}}"#,
                uid.escape_default()
            );
            let order = decode_order(payload.as_bytes()).unwrap();
            assert_eq!(order.validate(), Err(ValidationError::EmptyOrderUid));
        }
    }

    #[test]
    fn encoding_keeps_wire_field_names() {
        let order = decode_order(FULL.as_bytes()).unwrap();
        let encoded = encode_order(&order).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&encoded).unwrap();

        assert_eq!(value["order_uid"], "b563feb7b2b84b6test");
        assert_eq!(value["payment"]["payment_dt"], 1_637_907_727);
        assert_eq!(value["items"][0]["nm_id"], 2_389_212);
        assert_eq!(value["date_created"], "2021-11-26T06:22:19Z");
    }
}
