//! Server-to-client push frames.
//!
//! A single record with optional fields; unset fields are left out of the
//! JSON entirely rather than sent as `null`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{OrderStatus, Venue};

/// Status update for one order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusFrame {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<Venue>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusFrame {
    pub fn new(order_id: Uuid, status: OrderStatus) -> Self {
        Self {
            order_id,
            status,
            timestamp: Utc::now(),
            venue: None,
            price: None,
            tx_hash: None,
            error: None,
        }
    }

    pub fn with_venue(mut self, venue: Venue) -> Self {
        self.venue = Some(venue);
        self
    }

    pub fn with_price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_tx_hash(mut self, tx_hash: impl Into<String>) -> Self {
        self.tx_hash = Some(tx_hash.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Sent once, before closing, when a request is rejected at ingress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorFrame {
    pub error: String,
}

impl ErrorFrame {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn unset_fields_are_omitted() {
        let frame = StatusFrame::new(Uuid::new_v4(), OrderStatus::Routing);
        let json = serde_json::to_value(&frame).unwrap();
        let obj = json.as_object().unwrap();

        assert_eq!(obj["status"], "routing");
        assert!(obj.contains_key("order_id"));
        assert!(obj.contains_key("timestamp"));
        for key in ["venue", "price", "tx_hash", "error"] {
            assert!(!obj.contains_key(key), "{key} should be omitted");
        }
    }

    #[test]
    fn price_is_a_json_number() {
        let frame = StatusFrame::new(Uuid::new_v4(), OrderStatus::Building)
            .with_venue(Venue::Meteora)
            .with_price(dec!(100.25));
        let json = serde_json::to_value(&frame).unwrap();

        assert_eq!(json["venue"], "meteora");
        assert_eq!(json["price"].as_f64(), Some(100.25));
    }

    #[test]
    fn timestamp_is_rfc3339_utc() {
        let frame = StatusFrame::new(Uuid::new_v4(), OrderStatus::Pending);
        let json = serde_json::to_value(&frame).unwrap();
        let raw = json["timestamp"].as_str().unwrap();

        assert!(raw.ends_with('Z'));
        assert!(DateTime::parse_from_rfc3339(raw).is_ok());
    }
}
