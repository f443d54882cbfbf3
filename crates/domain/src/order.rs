use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Order aggregate as it travels on the wire and in storage.
///
/// `order_uid` is the stable identifier; two orders with the same
/// `order_uid` describe the same aggregate. All fields outside the
/// validated set are opaque pass-through.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_uid: String,
    pub track_number: String,
    #[serde(default)]
    pub entry: String,
    pub delivery: Delivery,
    pub payment: Payment,
    pub items: Vec<Item>,
    #[serde(default)]
    pub locale: String,
    #[serde(default)]
    pub internal_signature: String,
    #[serde(default)]
    pub customer_id: String,
    #[serde(default)]
    pub delivery_service: String,
    #[serde(default)]
    pub shardkey: String,
    #[serde(default)]
    pub sm_id: i64,
    #[serde(default)]
    pub date_created: String,
    #[serde(default)]
    pub oof_shard: String,
}

/// Delivery address and contact block, one per order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub zip: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub email: String,
}

/// Payment block, one per order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    #[serde(default)]
    pub transaction: String,
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub payment_dt: i64,
    #[serde(default)]
    pub bank: String,
    #[serde(default)]
    pub delivery_cost: i64,
    #[serde(default)]
    pub goods_total: i64,
    #[serde(default)]
    pub custom_fee: i64,
}

/// A single order line. Unique inside the aggregate by `(chrt_id, order_uid)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub chrt_id: i64,
    #[serde(default)]
    pub track_number: String,
    #[serde(default)]
    pub price: i64,
    #[serde(default)]
    pub rid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sale: i64,
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub total_price: i64,
    #[serde(default)]
    pub nm_id: i64,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub status: i64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("order_uid is required")]
    OrderUidRequired,

    #[error("track_number is required")]
    TrackNumberRequired,

    #[error("order must have at least one item")]
    ItemsEmpty,

    #[error("payment amount must not be negative")]
    InvalidPaymentAmount,

    #[error("delivery email must contain '@'")]
    InvalidEmailFormat,

    #[error("delivery phone must start with '+'")]
    InvalidPhoneFormat,
}

impl Order {
    /// Check structural constraints. The first violated rule wins.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.order_uid.is_empty() {
            return Err(ValidationError::OrderUidRequired);
        }
        if self.track_number.is_empty() {
            return Err(ValidationError::TrackNumberRequired);
        }
        if self.items.is_empty() {
            return Err(ValidationError::ItemsEmpty);
        }
        if self.payment.amount < 0 {
            return Err(ValidationError::InvalidPaymentAmount);
        }
        if !self.delivery.email.is_empty() && !self.delivery.email.contains('@') {
            return Err(ValidationError::InvalidEmailFormat);
        }
        if !self.delivery.phone.is_empty() && !self.delivery.phone.starts_with('+') {
            return Err(ValidationError::InvalidPhoneFormat);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_order() -> Order {
        Order {
            order_uid: "b563feb7b2b84b6test".to_string(),
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
                transaction: "b563feb7b2b84b6test".to_string(),
                currency: "USD".to_string(),
                provider: "wbpay".to_string(),
                amount: 1817,
                payment_dt: 1637907727,
                bank: "alpha".to_string(),
                delivery_cost: 1500,
                goods_total: 317,
                ..Payment::default()
            },
            items: vec![Item {
                chrt_id: 9934930,
                track_number: "WBILMTESTTRACK".to_string(),
                price: 453,
                rid: "ab4219087a764ae0btest".to_string(),
                name: "Mascaras".to_string(),
                sale: 30,
                size: "0".to_string(),
                total_price: 317,
                nm_id: 2389212,
                brand: "Vivienne Sabo".to_string(),
                status: 202,
            }],
            locale: "en".to_string(),
            customer_id: "test".to_string(),
            delivery_service: "meest".to_string(),
            shardkey: "9".to_string(),
            sm_id: 99,
            date_created: "2021-11-26T06:22:19Z".to_string(),
            oof_shard: "1".to_string(),
            ..Order::default()
        }
    }

    #[test]
    fn test_valid_order_passes() {
        assert!(sample_order().validate().is_ok());
    }

    #[test]
    fn test_empty_order_uid_rejected() {
        let mut order = sample_order();
        order.order_uid = String::new();
        assert_eq!(order.validate(), Err(ValidationError::OrderUidRequired));
    }

    #[test]
    fn test_empty_track_number_rejected() {
        let mut order = sample_order();
        order.track_number = String::new();
        assert_eq!(order.validate(), Err(ValidationError::TrackNumberRequired));
    }

    #[test]
    fn test_empty_items_rejected() {
        let mut order = sample_order();
        order.items.clear();
        assert_eq!(order.validate(), Err(ValidationError::ItemsEmpty));
    }

    #[test]
    fn test_negative_amount_rejected() {
        let mut order = sample_order();
        order.payment.amount = -1;
        assert_eq!(order.validate(), Err(ValidationError::InvalidPaymentAmount));
    }

    #[test]
    fn test_zero_amount_allowed() {
        let mut order = sample_order();
        order.payment.amount = 0;
        assert!(order.validate().is_ok());
    }

    #[test]
    fn test_email_without_at_rejected() {
        let mut order = sample_order();
        order.delivery.email = "not-an-email".to_string();
        assert_eq!(order.validate(), Err(ValidationError::InvalidEmailFormat));
    }

    #[test]
    fn test_empty_email_allowed() {
        let mut order = sample_order();
        order.delivery.email = String::new();
        assert!(order.validate().is_ok());
    }

    #[test]
    fn test_phone_without_plus_rejected() {
        let mut order = sample_order();
        order.delivery.phone = "9720000000".to_string();
        assert_eq!(order.validate(), Err(ValidationError::InvalidPhoneFormat));
    }

    #[test]
    fn test_empty_phone_allowed() {
        let mut order = sample_order();
        order.delivery.phone = String::new();
        assert!(order.validate().is_ok());
    }

    #[test]
    fn test_first_failure_wins() {
        let mut order = sample_order();
        order.order_uid = String::new();
        order.track_number = String::new();
        order.payment.amount = -5;
        assert_eq!(order.validate(), Err(ValidationError::OrderUidRequired));
    }

    #[test]
    fn test_equality_is_structural() {
        let a = sample_order();
        let b = a.clone();
        assert_eq!(a, b);

        let mut c = a.clone();
        c.payment.amount += 1;
        assert_ne!(a, c);

        let mut d = a.clone();
        d.items[0].brand = "other".to_string();
        assert_ne!(a, d);
    }

    #[test]
    fn test_equality_respects_item_order() {
        let mut a = sample_order();
        a.items.push(Item {
            chrt_id: 555,
            ..Item::default()
        });
        let mut b = a.clone();
        b.items.reverse();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wire_format_round_trip() {
        let order = sample_order();
        let json = serde_json::to_string(&order).unwrap();
        assert!(json.contains("\"order_uid\""));
        assert!(json.contains("\"track_number\""));
        assert!(json.contains("\"chrt_id\""));
        let decoded: Order = serde_json::from_str(&json).unwrap();
        assert_eq!(order, decoded);
    }

    #[test]
    fn test_decode_tolerates_missing_optional_fields() {
        let json = r#"{
            "order_uid": "abc",
            "track_number": "T1",
            "delivery": {"phone": "+111", "email": "a@b"},
            "payment": {"amount": 10},
            "items": [{"chrt_id": 1}]
        }"#;
        let order: Order = serde_json::from_str(json).unwrap();
        assert!(order.validate().is_ok());
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.payment.amount, 10);
    }
}
