use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::{get, post, put},
};
use uuid::Uuid;

use crate::{
    dto::orders::{CartOrderRequest, CartOrderSummary, DirectOrderRequest, OrderConfirmation, OrderList},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Order,
    response::ApiResponse,
    routes::params::OrderListQuery,
    services::order_service,
    state::AppState,
};

pub const IDEMPOTENCY_KEY: &str = "idempotency-key";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders))
        .route("/product/{product_id}", post(order_product))
        .route("/cart", post(order_cart))
        .route("/{id}", get(get_order))
        .route("/{id}/receive", put(receive_order))
}

fn idempotency_key(headers: &HeaderMap) -> AppResult<Option<Uuid>> {
    let Some(value) = headers.get(IDEMPOTENCY_KEY) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
        .map(Some)
        .ok_or_else(|| AppError::InvalidInput("Idempotency-Key must be a UUID".into()))
}

#[utoipa::path(
    post,
    path = "/api/orders/product/{product_id}",
    params(
        ("product_id" = Uuid, Path, description = "Product ID"),
        ("Idempotency-Key" = Option<Uuid>, Header, description = "Reused as the order id; replays return the committed order")
    ),
    request_body = DirectOrderRequest,
    responses(
        (status = 200, description = "Order placed", body = ApiResponse<OrderConfirmation>),
        (status = 400, description = "Invalid quantity or details"),
        (status = 404, description = "Product not found"),
        (status = 409, description = "Not enough stock")
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn order_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(product_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<DirectOrderRequest>,
) -> AppResult<Json<ApiResponse<OrderConfirmation>>> {
    let key = idempotency_key(&headers)?;
    let resp = order_service::place_direct_order(&state, &user, product_id, payload, key).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/orders/cart",
    request_body = CartOrderRequest,
    responses(
        (status = 200, description = "Every cart item ordered and the cart emptied", body = ApiResponse<CartOrderSummary>),
        (status = 400, description = "Cart is empty"),
        (status = 409, description = "Not enough stock for one of the items")
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn order_cart(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CartOrderRequest>,
) -> AppResult<Json<ApiResponse<CartOrderSummary>>> {
    let resp = order_service::place_cart_order(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/orders",
    params(OrderListQuery),
    responses(
        (status = 200, description = "Caller's orders", body = ApiResponse<OrderList>),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<OrderListQuery>,
) -> AppResult<Json<ApiResponse<OrderList>>> {
    let resp = order_service::list_orders_by_user(&state, &user, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    params(
        ("id" = Uuid, Path, description = "Order ID")
    ),
    responses(
        (status = 200, description = "Order", body = ApiResponse<Order>),
        (status = 404, description = "Not found or not the caller's order")
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Order>>> {
    let resp = order_service::get_order(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/orders/{id}/receive",
    params(
        ("id" = Uuid, Path, description = "Order ID")
    ),
    responses(
        (status = 200, description = "Receipt confirmed", body = ApiResponse<Order>),
        (status = 400, description = "Not delivered yet or already received"),
        (status = 404, description = "Not found or not the caller's order")
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn receive_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Order>>> {
    let resp = order_service::mark_received(&state, &user, id).await?;
    Ok(Json(resp))
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn idempotency_key_is_optional() {
        assert_eq!(idempotency_key(&HeaderMap::new()).unwrap(), None);
    }

    #[test]
    fn idempotency_key_must_be_a_uuid() {
        let id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(IDEMPOTENCY_KEY, HeaderValue::from_str(&id.to_string()).unwrap());
        assert_eq!(idempotency_key(&headers).unwrap(), Some(id));

        headers.insert(IDEMPOTENCY_KEY, HeaderValue::from_static("retry-1"));
        assert!(matches!(idempotency_key(&headers), Err(AppError::InvalidInput(_))));
    }
}
