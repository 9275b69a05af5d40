use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::Product;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateProductRequest {
    pub name: String,
    pub description: String,
    pub category: String,
    pub price: Decimal,
    pub currency: Option<String>,
    pub quantity: i64,
    #[serde(default)]
    pub pictures: Vec<String>,
    #[serde(default)]
    pub videos: Vec<String>,
    #[serde(default)]
    pub features: Vec<String>,
    pub slashed_price: Option<Decimal>,
    pub minimum_order: Option<i64>,
}

/// Admin adjustment: a new price and/or relative changes to stock and order count.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct AdjustProductRequest {
    pub price: Option<Decimal>,
    #[serde(default)]
    pub quantity_delta: i64,
    #[serde(default)]
    pub order_count_delta: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddReviewRequest {
    pub stars: i64,
    pub comment: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct ProductList {
    pub items: Vec<Product>,
}
