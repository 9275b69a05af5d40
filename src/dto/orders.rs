use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Location, Order};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct DirectOrderRequest {
    #[serde(alias = "fullname")]
    pub full_name: String,
    pub quantity: i64,
    pub location: Location,
    pub payment_method: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CartOrderRequest {
    #[serde(alias = "fullname")]
    pub full_name: String,
    pub location: Location,
    pub payment_method: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderConfirmation {
    pub order_id: Uuid,
    pub product_name: String,
    pub quantity: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartOrderSummary {
    pub items_ordered: usize,
    pub order_ids: Vec<Uuid>,
    pub product_names: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<Order>,
}
