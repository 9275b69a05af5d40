use chrono::Utc;
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, ModelTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit,
    db::{fetch_page, read_with_retry, with_deadline},
    dto::cart::{AddToCartRequest, CartList, UpdateCartQuantityRequest},
    entity::cart_items::{ActiveModel as CartActive, Column as CartCol, Entity as CartItems, Model as CartModel},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{CartItem, Product, from_json, to_json},
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    services::product_service::load_product,
    state::AppState,
};

/// Adds a product to the caller's cart with a snapshot of the product as it is now.
/// A user holds at most one item per product.
pub async fn add_item(
    state: &AppState,
    user: &AuthUser,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<CartItem>> {
    let item = with_deadline(state.store().timeout, async {
        let product = load_product(&state.orm, payload.product_id).await?;
        product
            .check_order_quantity(payload.quantity)
            .map_err(AppError::InvalidInput)?;

        let active = CartActive {
            id: Set(Uuid::new_v4()),
            user_id: Set(user.user_id),
            product_id: Set(product.id),
            quantity: Set(payload.quantity),
            product: Set(to_json(&product)?),
            created_at: Set(Utc::now().into()),
        };
        active.insert(&state.orm).await.map_err(|err| match AppError::from(err) {
            AppError::DuplicateKey(_) => AppError::DuplicateItem,
            other => other,
        })
    })
    .await?;

    tracing::debug!(user_id = %user.user_id, product_id = %item.product_id, "cart item added");
    Ok(ApiResponse::success("Added to cart", cart_item_from_entity(item)?, Some(Meta::empty())))
}

pub async fn list_user_items(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<CartList>> {
    let page = state.page(pagination.page_id, pagination.page_size);
    let finder = CartItems::find()
        .filter(CartCol::UserId.eq(user.user_id))
        .order_by_asc(CartCol::CreatedAt)
        .order_by_asc(CartCol::Id);

    let (rows, total) = read_with_retry(state.store(), || {
        fetch_page(&state.orm, finder.clone(), page.per_page, page.offset)
    })
    .await?;

    let items = rows
        .into_iter()
        .map(cart_item_from_entity)
        .collect::<AppResult<Vec<_>>>()?;

    let meta = Meta::new(page.page, page.per_page, total);
    Ok(ApiResponse::success("Cart", CartList { items }, Some(meta)))
}

/// Deletes an item only when both the id and the owner match.
pub async fn remove_item(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = with_deadline(state.store().timeout, async {
        Ok(CartItems::delete_many()
            .filter(owned_by(user, id))
            .exec(&state.orm)
            .await?)
    })
    .await?;

    if result.rows_affected == 0 {
        return Err(AppError::not_found("cart item"));
    }
    Ok(ApiResponse::success(
        "Removed from cart",
        serde_json::json!({ "deleted": 1 }),
        Some(Meta::empty()),
    ))
}

/// Sets an item's quantity. Zero removes the item; `None` is returned in that case.
pub async fn set_quantity(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateCartQuantityRequest,
) -> AppResult<ApiResponse<Option<CartItem>>> {
    if payload.quantity < 0 {
        return Err(AppError::InvalidInput("quantity must not be negative".into()));
    }
    let updated = with_deadline(state.store().timeout, async {
        change_quantity(state, user, id, |_| payload.quantity).await
    })
    .await?;

    Ok(ApiResponse::success("Cart updated", updated, Some(Meta::empty())))
}

/// Takes one unit off an item; an item at quantity 1 is removed instead of kept at zero.
pub async fn decrement(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Option<CartItem>>> {
    let updated = with_deadline(state.store().timeout, async {
        change_quantity(state, user, id, |current| current - 1).await
    })
    .await?;

    Ok(ApiResponse::success("Cart updated", updated, Some(Meta::empty())))
}

async fn change_quantity<F>(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    next: F,
) -> AppResult<Option<CartItem>>
where
    F: FnOnce(i64) -> i64,
{
    let txn = state.orm.begin().await?;
    let item = CartItems::find()
        .filter(owned_by(user, id))
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::not_found("cart item"))?;

    let quantity = next(item.quantity);
    if quantity < 1 {
        item.delete(&txn).await?;
        txn.commit().await?;
        return Ok(None);
    }

    let snapshot: Product = from_json(item.product.clone())?;
    snapshot
        .check_order_quantity(quantity)
        .map_err(AppError::InvalidInput)?;

    CartItems::update_many()
        .col_expr(CartCol::Quantity, Expr::value(quantity))
        .filter(CartCol::Id.eq(item.id))
        .exec(&txn)
        .await?;
    txn.commit().await?;

    let mut item = cart_item_from_entity(item)?;
    item.quantity = quantity;
    Ok(Some(item))
}

pub async fn list_all_items(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<CartList>> {
    ensure_admin(user)?;
    let page = state.page(pagination.page_id, pagination.page_size);
    let finder = CartItems::find()
        .order_by_asc(CartCol::CreatedAt)
        .order_by_asc(CartCol::Id);

    let (rows, total) = read_with_retry(state.store(), || {
        fetch_page(&state.orm, finder.clone(), page.per_page, page.offset)
    })
    .await?;

    let items = rows
        .into_iter()
        .map(cart_item_from_entity)
        .collect::<AppResult<Vec<_>>>()?;

    let meta = Meta::new(page.page, page.per_page, total);
    Ok(ApiResponse::success("Cart items", CartList { items }, Some(meta)))
}

pub async fn get_cart_item(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<CartItem>> {
    ensure_admin(user)?;
    let item = read_with_retry(state.store(), || async {
        CartItems::find_by_id(id)
            .one(&state.orm)
            .await?
            .ok_or_else(|| AppError::not_found("cart item"))
    })
    .await?;
    Ok(ApiResponse::success("Cart item", cart_item_from_entity(item)?, None))
}

pub async fn delete_all_cart_items(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let result = with_deadline(state.store().timeout, async {
        Ok(CartItems::delete_many().exec(&state.orm).await?)
    })
    .await?;

    audit::record(
        state,
        Some(user.user_id),
        "cart_delete_all",
        "cart_items",
        serde_json::json!({ "deleted": result.rows_affected }),
    )
    .await;

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({ "deleted": result.rows_affected }),
        Some(Meta::empty()),
    ))
}

fn owned_by(user: &AuthUser, id: Uuid) -> Condition {
    Condition::all()
        .add(CartCol::Id.eq(id))
        .add(CartCol::UserId.eq(user.user_id))
}

pub(crate) fn cart_item_from_entity(model: CartModel) -> AppResult<CartItem> {
    Ok(CartItem {
        id: model.id,
        user_id: model.user_id,
        product_id: model.product_id,
        quantity: model.quantity,
        date_added: model.created_at.with_timezone(&Utc),
        product: from_json(model.product)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures;

    #[test]
    fn cart_item_keeps_the_snapshot_taken_at_insert() {
        let product = fixtures::product(7);
        let model = CartModel {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            product_id: product.id,
            quantity: 2,
            product: to_json(&product).unwrap(),
            created_at: Utc::now().into(),
        };

        let item = cart_item_from_entity(model).unwrap();
        assert_eq!(item.product, product);
        assert_eq!(item.quantity, 2);
    }
}
