use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Select, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit,
    db::{fetch_page, read_with_retry, with_deadline},
    dto::orders::{CartOrderRequest, CartOrderSummary, DirectOrderRequest, OrderConfirmation, OrderList},
    entity::{
        cart_items::{Column as CartCol, Entity as CartItems},
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
        users::{Column as UserCol, Entity as Users},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Location, Order, OrderStatus, from_json, to_json},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    services::{
        account_service::{
            append_orders, clear_order_copies, lock_purchaser, mutate_order_status,
            remove_order_copies,
        },
        product_service::{load_product, take_stock},
    },
    state::AppState,
};

/// Purchaser-supplied details shared by every order of one placement.
#[derive(Debug, Clone)]
struct Delivery {
    full_name: String,
    location: Location,
    payment_method: String,
    fee: Decimal,
}

impl Delivery {
    fn new(full_name: String, location: Location, payment_method: String, fee: Decimal) -> AppResult<Self> {
        let full_name = full_name.trim().to_string();
        let payment_method = payment_method.trim().to_string();
        if full_name.is_empty() {
            return Err(AppError::InvalidInput("fullname is required".into()));
        }
        if payment_method.is_empty() {
            return Err(AppError::InvalidInput("payment method is required".into()));
        }
        Ok(Self {
            full_name,
            location,
            payment_method,
            fee,
        })
    }
}

/// Orders one product outright. Stock reservation, the order row and the copy on the
/// account commit together or not at all.
///
/// With an idempotency key the key becomes the order id, so a retried request from the
/// same user returns the order that already committed instead of buying twice.
pub async fn place_direct_order(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
    payload: DirectOrderRequest,
    idempotency_key: Option<Uuid>,
) -> AppResult<ApiResponse<OrderConfirmation>> {
    let delivery = Delivery::new(
        payload.full_name,
        payload.location,
        payload.payment_method,
        state.config.delivery_fee,
    )?;
    let quantity = payload.quantity;

    if let Some(key) = idempotency_key {
        if let Some(existing) = replayed_order(state, user, key).await? {
            return Ok(ApiResponse::success("Order already placed", existing, Some(Meta::empty())));
        }
    }

    let order_id = idempotency_key.unwrap_or_else(Uuid::new_v4);
    let placed = with_deadline(state.store().timeout, async {
        let txn = state.orm.begin().await?;
        let purchaser = lock_purchaser(&txn, user.user_id).await?;
        let order = place_in_txn(&txn, user.user_id, order_id, product_id, quantity, &delivery).await?;
        append_orders(&txn, purchaser, std::slice::from_ref(&order)).await?;
        txn.commit().await?;
        Ok(order)
    })
    .await;

    let order = match placed {
        Ok(order) => order,
        // A concurrent request with the same key won the insert.
        Err(AppError::DuplicateKey(_)) if idempotency_key.is_some() => {
            return match replayed_order(state, user, order_id).await? {
                Some(existing) => Ok(ApiResponse::success(
                    "Order already placed",
                    existing,
                    Some(Meta::empty()),
                )),
                None => Err(AppError::DuplicateKey("idempotency key already used".into())),
            };
        }
        Err(err) => return Err(err),
    };

    tracing::info!(
        order_id = %order.id,
        user_id = %user.user_id,
        product_id = %product_id,
        quantity,
        "order placed"
    );
    audit::record(
        state,
        Some(user.user_id),
        "order_place",
        "orders",
        serde_json::json!({ "order_id": order.id, "product_id": product_id, "quantity": quantity }),
    )
    .await;

    Ok(ApiResponse::success(
        "Order placed",
        confirmation(&order),
        Some(Meta::empty()),
    ))
}

/// Orders every item in the caller's cart and empties it, in one transaction.
pub async fn place_cart_order(
    state: &AppState,
    user: &AuthUser,
    payload: CartOrderRequest,
) -> AppResult<ApiResponse<CartOrderSummary>> {
    let delivery = Delivery::new(
        payload.full_name,
        payload.location,
        payload.payment_method,
        state.config.delivery_fee,
    )?;

    let orders = with_deadline(state.store().timeout, async {
        let txn = state.orm.begin().await?;
        let purchaser = lock_purchaser(&txn, user.user_id).await?;
        // Product order keeps row locks in a consistent sequence across concurrent checkouts.
        let items = CartItems::find()
            .filter(CartCol::UserId.eq(user.user_id))
            .order_by_asc(CartCol::ProductId)
            .lock(LockType::Update)
            .all(&txn)
            .await?;
        if items.is_empty() {
            return Err(AppError::InvalidInput("cart is empty".into()));
        }

        let mut orders = Vec::with_capacity(items.len());
        for item in &items {
            let order = place_in_txn(
                &txn,
                user.user_id,
                Uuid::new_v4(),
                item.product_id,
                item.quantity,
                &delivery,
            )
            .await?;
            orders.push(order);
        }

        CartItems::delete_many()
            .filter(CartCol::Id.is_in(items.iter().map(|i| i.id)))
            .exec(&txn)
            .await?;

        append_orders(&txn, purchaser, &orders).await?;
        txn.commit().await?;
        Ok(orders)
    })
    .await?;

    let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
    tracing::info!(user_id = %user.user_id, orders = orders.len(), "cart ordered");
    audit::record(
        state,
        Some(user.user_id),
        "order_place_cart",
        "orders",
        serde_json::json!({ "order_ids": order_ids }),
    )
    .await;

    let summary = CartOrderSummary {
        items_ordered: orders.len(),
        product_names: orders
            .iter()
            .map(|o| o.product.name.as_str())
            .collect::<Vec<_>>()
            .join(", "),
        order_ids,
    };
    Ok(ApiResponse::success("Cart ordered", summary, Some(Meta::empty())))
}

async fn place_in_txn<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    order_id: Uuid,
    product_id: Uuid,
    quantity: i64,
    delivery: &Delivery,
) -> AppResult<Order> {
    let product = load_product(conn, product_id).await?;
    product
        .check_order_quantity(quantity)
        .map_err(AppError::InvalidInput)?;
    take_stock(conn, &product, quantity).await?;

    let order = Order {
        id: order_id,
        user_id,
        full_name: delivery.full_name.clone(),
        delivery_location: delivery.location.clone(),
        delivery_fee: delivery.fee,
        product,
        quantity,
        payment_method: delivery.payment_method.clone(),
        delivered: false,
        delivered_at: None,
        received: false,
        received_at: None,
        created_at: Utc::now(),
    };

    OrderActive {
        id: Set(order.id),
        user_id: Set(order.user_id),
        full_name: Set(order.full_name.clone()),
        delivery_location: Set(to_json(&order.delivery_location)?),
        delivery_fee: Set(order.delivery_fee),
        product: Set(to_json(&order.product)?),
        quantity: Set(order.quantity),
        payment_method: Set(order.payment_method.clone()),
        delivered: Set(false),
        delivered_at: Set(None),
        received: Set(false),
        received_at: Set(None),
        created_at: Set(order.created_at.into()),
    }
    .insert(conn)
    .await?;

    Ok(order)
}

async fn replayed_order(
    state: &AppState,
    user: &AuthUser,
    key: Uuid,
) -> AppResult<Option<OrderConfirmation>> {
    let existing = read_with_retry(state.store(), || async {
        Ok(Orders::find_by_id(key).one(&state.orm).await?)
    })
    .await?;

    match existing {
        None => Ok(None),
        Some(model) if model.user_id == user.user_id => {
            tracing::info!(order_id = %key, "idempotent replay of committed order");
            Ok(Some(confirmation(&order_from_entity(model)?)))
        }
        Some(_) => Err(AppError::DuplicateKey("idempotency key already used".into())),
    }
}

fn confirmation(order: &Order) -> OrderConfirmation {
    OrderConfirmation {
        order_id: order.id,
        product_name: order.product.name.clone(),
        quantity: order.quantity,
    }
}

pub async fn get_order(state: &AppState, user: &AuthUser, id: Uuid) -> AppResult<ApiResponse<Order>> {
    let model = read_with_retry(state.store(), || async {
        Orders::find()
            .filter(
                Condition::all()
                    .add(OrderCol::Id.eq(id))
                    .add(OrderCol::UserId.eq(user.user_id)),
            )
            .one(&state.orm)
            .await?
            .ok_or_else(|| AppError::not_found("order"))
    })
    .await?;
    Ok(ApiResponse::success("Order", order_from_entity(model)?, None))
}

pub async fn list_orders_by_user(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let finder = Orders::find().filter(OrderCol::UserId.eq(user.user_id));
    list_orders(state, finder, query).await
}

pub async fn list_all_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_admin(user)?;
    list_orders(state, Orders::find(), query).await
}

async fn list_orders(
    state: &AppState,
    finder: Select<Orders>,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let page = state.page(query.page_id, query.page_size);
    let finder = match query.sort_order.unwrap_or_default() {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    }
    .order_by_asc(OrderCol::Id);

    let (rows, total) = read_with_retry(state.store(), || {
        fetch_page(&state.orm, finder.clone(), page.per_page, page.offset)
    })
    .await?;

    let items = rows
        .into_iter()
        .map(order_from_entity)
        .collect::<AppResult<Vec<_>>>()?;

    let meta = Meta::new(page.page, page.per_page, total);
    Ok(ApiResponse::success("Orders", OrderList { items }, Some(meta)))
}

pub async fn get_order_admin(state: &AppState, user: &AuthUser, id: Uuid) -> AppResult<ApiResponse<Order>> {
    ensure_admin(user)?;
    let model = read_with_retry(state.store(), || async {
        Orders::find_by_id(id)
            .one(&state.orm)
            .await?
            .ok_or_else(|| AppError::not_found("order"))
    })
    .await?;
    Ok(ApiResponse::success("Order", order_from_entity(model)?, None))
}

pub async fn mark_delivered(state: &AppState, user: &AuthUser, id: Uuid) -> AppResult<ApiResponse<Order>> {
    ensure_admin(user)?;
    let order = transition(state, Condition::all().add(OrderCol::Id.eq(id)), OrderStatus::Delivered).await?;

    tracing::info!(order_id = %id, actor = %user.username, "order marked delivered");
    audit::record(
        state,
        Some(user.user_id),
        "order_delivered",
        "orders",
        serde_json::json!({ "order_id": id, "actor": user.username }),
    )
    .await;

    Ok(ApiResponse::success("Order delivered", order, Some(Meta::empty())))
}

/// Only the purchaser can confirm receipt; anyone else sees the order as missing.
pub async fn mark_received(state: &AppState, user: &AuthUser, id: Uuid) -> AppResult<ApiResponse<Order>> {
    let owned = Condition::all()
        .add(OrderCol::Id.eq(id))
        .add(OrderCol::UserId.eq(user.user_id));
    let order = transition(state, owned, OrderStatus::Received).await?;

    tracing::info!(order_id = %id, user_id = %user.user_id, "order marked received");
    audit::record(
        state,
        Some(user.user_id),
        "order_received",
        "orders",
        serde_json::json!({ "order_id": id }),
    )
    .await;

    Ok(ApiResponse::success("Order received", order, Some(Meta::empty())))
}

/// Applies a status change to the order row and the purchaser's embedded copy together.
async fn transition(state: &AppState, filter: Condition, status: OrderStatus) -> AppResult<Order> {
    with_deadline(state.store().timeout, async {
        let txn = state.orm.begin().await?;
        let model = Orders::find()
            .filter(filter)
            .lock(LockType::Update)
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::not_found("order"))?;

        let mut order = order_from_entity(model.clone())?;
        let at = Utc::now();
        order.apply_status(status, at)?;

        let mut active: OrderActive = model.into();
        match status {
            OrderStatus::Delivered => {
                active.delivered = Set(true);
                active.delivered_at = Set(Some(at.into()));
            }
            OrderStatus::Received => {
                active.received = Set(true);
                active.received_at = Set(Some(at.into()));
            }
        }
        active.update(&txn).await?;

        mutate_order_status(&txn, order.user_id, order.id, status, at).await?;
        txn.commit().await?;
        Ok(order)
    })
    .await
}

pub async fn delete_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    with_deadline(state.store().timeout, async {
        let txn = state.orm.begin().await?;
        let model = Orders::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::not_found("order"))?;
        Orders::delete_by_id(id).exec(&txn).await?;
        remove_order_copies(&txn, model.user_id, &[id]).await?;
        txn.commit().await?;
        Ok(())
    })
    .await?;

    audit::record(
        state,
        Some(user.user_id),
        "order_delete",
        "orders",
        serde_json::json!({ "order_id": id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({ "deleted": 1 }),
        Some(Meta::empty()),
    ))
}

pub async fn delete_all_orders_of_user(
    state: &AppState,
    user: &AuthUser,
    user_id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let deleted = with_deadline(state.store().timeout, async {
        let txn = state.orm.begin().await?;
        let result = Orders::delete_many()
            .filter(OrderCol::UserId.eq(user_id))
            .exec(&txn)
            .await?;
        clear_order_copies(&txn, user_id).await?;
        txn.commit().await?;
        Ok(result.rows_affected)
    })
    .await?;

    audit::record(
        state,
        Some(user.user_id),
        "order_delete_user",
        "orders",
        serde_json::json!({ "user_id": user_id, "deleted": deleted }),
    )
    .await;

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({ "deleted": deleted }),
        Some(Meta::empty()),
    ))
}

pub async fn delete_all_orders(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let deleted = with_deadline(state.store().timeout, async {
        let txn = state.orm.begin().await?;
        let result = Orders::delete_many().exec(&txn).await?;
        Users::update_many()
            .col_expr(UserCol::Orders, Expr::value(serde_json::json!([])))
            .exec(&txn)
            .await?;
        txn.commit().await?;
        Ok(result.rows_affected)
    })
    .await?;

    audit::record(
        state,
        Some(user.user_id),
        "order_delete_all",
        "orders",
        serde_json::json!({ "deleted": deleted }),
    )
    .await;

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({ "deleted": deleted }),
        Some(Meta::empty()),
    ))
}

pub(crate) fn order_from_entity(model: OrderModel) -> AppResult<Order> {
    Ok(Order {
        id: model.id,
        user_id: model.user_id,
        full_name: model.full_name,
        delivery_location: from_json(model.delivery_location)?,
        delivery_fee: model.delivery_fee,
        product: from_json(model.product)?,
        quantity: model.quantity,
        payment_method: model.payment_method,
        delivered: model.delivered,
        delivered_at: model.delivered_at.map(|dt| dt.with_timezone(&Utc)),
        received: model.received,
        received_at: model.received_at.map(|dt| dt.with_timezone(&Utc)),
        created_at: model.created_at.with_timezone(&Utc),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures;

    #[test]
    fn delivery_details_are_required() {
        let ok = Delivery::new(" Harry ".into(), Location::default(), "card".into(), Decimal::ZERO).unwrap();
        assert_eq!(ok.full_name, "Harry");

        assert!(matches!(
            Delivery::new(" ".into(), Location::default(), "card".into(), Decimal::ZERO),
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            Delivery::new("Harry".into(), Location::default(), "".into(), Decimal::ZERO),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn order_row_maps_back_to_the_snapshot() {
        let order = fixtures::order();
        let model = OrderModel {
            id: order.id,
            user_id: order.user_id,
            full_name: order.full_name.clone(),
            delivery_location: to_json(&order.delivery_location).unwrap(),
            delivery_fee: order.delivery_fee,
            product: to_json(&order.product).unwrap(),
            quantity: order.quantity,
            payment_method: order.payment_method.clone(),
            delivered: false,
            delivered_at: None,
            received: false,
            received_at: None,
            created_at: order.created_at.into(),
        };

        let back = order_from_entity(model).unwrap();
        assert_eq!(back, order);
    }

    #[test]
    fn confirmation_names_the_product() {
        let order = fixtures::order();
        let confirmation = confirmation(&order);
        assert_eq!(confirmation.order_id, order.id);
        assert_eq!(confirmation.product_name, "Chandler Bags");
    }
}
