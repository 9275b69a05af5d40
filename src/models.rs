use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppResult;

/// Mailing address. Always embedded by value, never referenced by id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Location {
    #[serde(default)]
    pub house_number: String,
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub city_or_town: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub zip_code: String,
    #[serde(default)]
    pub telephone: String,
}

/// Public view of an account; credentials never leave the store layer.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Account {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub mobile_number: Option<String>,
    pub full_name: String,
    pub profile_picture: Option<String>,
    pub role: String,
    pub email_is_verified: bool,
    pub default_payment_method: Option<String>,
    pub default_delivery_location: Option<Location>,
    pub locations: Vec<Location>,
    pub orders: Vec<Order>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Review {
    pub user: String,
    pub stars: i64,
    #[serde(default)]
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub category: String,
    pub price: Decimal,
    pub currency: String,
    pub quantity: i64,
    #[serde(default)]
    pub pictures: Vec<String>,
    #[serde(default)]
    pub videos: Vec<String>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub reviews: Vec<Review>,
    pub review_count: i64,
    pub order_count: i64,
    pub slashed_price: Option<Decimal>,
    pub minimum_order: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn check_order_quantity(&self, quantity: i64) -> Result<(), String> {
        if quantity <= 0 {
            return Err("quantity must be greater than 0".into());
        }
        if let Some(minimum) = self.minimum_order.filter(|m| quantity < *m) {
            return Err(format!(
                "{} requires a minimum order of {minimum}",
                self.name
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i64,
    pub date_added: DateTime<Utc>,
    pub product: Product,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub full_name: String,
    pub delivery_location: Location,
    pub delivery_fee: Decimal,
    pub product: Product,
    pub quantity: i64,
    pub payment_method: String,
    pub delivered: bool,
    pub delivered_at: Option<DateTime<Utc>>,
    pub received: bool,
    pub received_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Fulfillment transitions an order goes through after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Delivered,
    Received,
}

impl Order {
    /// Applies a status transition in place. Receipt requires delivery first and
    /// neither transition can be applied twice.
    pub fn apply_status(&mut self, status: OrderStatus, at: DateTime<Utc>) -> Result<(), StatusError> {
        match status {
            OrderStatus::Delivered => {
                if self.delivered {
                    return Err(StatusError::AlreadyApplied("order already delivered"));
                }
                self.delivered = true;
                self.delivered_at = Some(at);
            }
            OrderStatus::Received => {
                if !self.delivered {
                    return Err(StatusError::NotDelivered);
                }
                if self.received {
                    return Err(StatusError::AlreadyApplied("order already received"));
                }
                self.received = true;
                self.received_at = Some(at);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusError {
    NotDelivered,
    AlreadyApplied(&'static str),
}

impl From<StatusError> for crate::error::AppError {
    fn from(err: StatusError) -> Self {
        match err {
            StatusError::NotDelivered => {
                crate::error::AppError::InvalidInput("order has not been delivered yet".into())
            }
            StatusError::AlreadyApplied(msg) => crate::error::AppError::NoOp(msg.into()),
        }
    }
}

pub(crate) fn from_json<T: DeserializeOwned>(value: serde_json::Value) -> AppResult<T> {
    Ok(serde_json::from_value(value)?)
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> AppResult<serde_json::Value> {
    Ok(serde_json::to_value(value)?)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn product(quantity: i64) -> Product {
        let now = Utc::now();
        Product {
            id: Uuid::new_v4(),
            name: "Chandler Bags".into(),
            description: "Leather travel bag".into(),
            category: "bags".into(),
            price: Decimal::new(4999, 2),
            currency: "USD".into(),
            quantity,
            pictures: vec![],
            videos: vec![],
            features: vec!["waterproof".into()],
            reviews: vec![],
            review_count: 0,
            order_count: 0,
            slashed_price: None,
            minimum_order: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn order() -> Order {
        Order {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            full_name: "Harry Potter".into(),
            delivery_location: Location {
                city_or_town: "London".into(),
                ..Location::default()
            },
            delivery_fee: Decimal::ZERO,
            product: product(10),
            quantity: 1,
            payment_method: "card".into(),
            delivered: false,
            delivered_at: None,
            received: false,
            received_at: None,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receipt_before_delivery_is_rejected() {
        let mut order = fixtures::order();
        let err = order.apply_status(OrderStatus::Received, Utc::now()).unwrap_err();
        assert_eq!(err, StatusError::NotDelivered);
        assert!(!order.received);
    }

    #[test]
    fn delivered_then_received_stamps_both() {
        let mut order = fixtures::order();
        let delivered_at = Utc::now();
        order.apply_status(OrderStatus::Delivered, delivered_at).unwrap();
        let received_at = delivered_at + chrono::Duration::minutes(5);
        order.apply_status(OrderStatus::Received, received_at).unwrap();

        assert!(order.delivered && order.received);
        assert!(order.delivered_at.unwrap() <= order.received_at.unwrap());
    }

    #[test]
    fn transitions_cannot_repeat() {
        let mut order = fixtures::order();
        order.apply_status(OrderStatus::Delivered, Utc::now()).unwrap();
        assert!(matches!(
            order.apply_status(OrderStatus::Delivered, Utc::now()),
            Err(StatusError::AlreadyApplied(_))
        ));
    }

    #[test]
    fn minimum_order_is_enforced() {
        let mut product = fixtures::product(100);
        product.minimum_order = Some(3);
        assert!(product.check_order_quantity(2).is_err());
        assert!(product.check_order_quantity(3).is_ok());
        assert!(product.check_order_quantity(0).is_err());
    }

    #[test]
    fn snapshot_survives_json_round_trip() {
        let order = fixtures::order();
        let stored = to_json(&order).unwrap();
        let back: Order = from_json(stored).unwrap();
        assert_eq!(back, order);
    }
}
