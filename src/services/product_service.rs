use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::{Expr, Func, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit,
    db::{fetch_page, read_with_retry, with_deadline},
    dto::products::{AddReviewRequest, AdjustProductRequest, CreateProductRequest, ProductList},
    entity::products::{ActiveModel, Column, Entity as Products, Model as ProductModel},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Product, Review, from_json, to_json},
    response::{ApiResponse, Meta},
    routes::params::{Pagination, ProductQuery},
    state::AppState,
};

pub async fn add_product(
    state: &AppState,
    user: &AuthUser,
    payload: CreateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    validate_new_product(&payload)?;

    let now = Utc::now();
    let active = ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(payload.name.trim().to_string()),
        description: Set(payload.description),
        category: Set(payload.category.trim().to_string()),
        price: Set(payload.price),
        currency: Set(payload
            .currency
            .map(|c| c.trim().to_uppercase())
            .unwrap_or_else(|| "USD".to_string())),
        quantity: Set(payload.quantity),
        pictures: Set(to_json(&payload.pictures)?),
        videos: Set(to_json(&payload.videos)?),
        features: Set(to_json(&payload.features)?),
        reviews: Set(serde_json::json!([])),
        review_count: Set(0),
        order_count: Set(0),
        slashed_price: Set(payload.slashed_price),
        minimum_order: Set(payload.minimum_order),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    };
    let product = with_deadline(state.store().timeout, async {
        Ok(active.insert(&state.orm).await?)
    })
    .await?;

    audit::record(
        state,
        Some(user.user_id),
        "product_create",
        "products",
        serde_json::json!({ "product_id": product.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Product created",
        product_from_entity(product)?,
        Some(Meta::empty()),
    ))
}

pub async fn get_product(state: &AppState, id: Uuid) -> AppResult<ApiResponse<Product>> {
    let product = read_with_retry(state.store(), || load_product(&state.orm, id)).await?;
    Ok(ApiResponse::success("Product", product, None))
}

/// Case-insensitive substring search over name and description; an empty query matches everything.
pub async fn find_products(
    state: &AppState,
    query: ProductQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let page = state.page(query.page_id, query.page_size);
    let mut condition = Condition::all();

    if let Some(search) = query.q.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = like_pattern(&search.to_lowercase());
        condition = condition.add(
            Condition::any()
                .add(Expr::expr(Func::lower(Expr::col(Column::Name))).like(pattern.clone()))
                .add(Expr::expr(Func::lower(Expr::col(Column::Description))).like(pattern)),
        );
    }

    let finder = Products::find()
        .filter(condition)
        .order_by_desc(Column::CreatedAt)
        .order_by_asc(Column::Id);

    let (rows, total) = read_with_retry(state.store(), || {
        fetch_page(&state.orm, finder.clone(), page.per_page, page.offset)
    })
    .await?;

    let items = rows
        .into_iter()
        .map(product_from_entity)
        .collect::<AppResult<Vec<_>>>()?;

    let meta = Meta::new(page.page, page.per_page, total);
    Ok(ApiResponse::success("Products", ProductList { items }, Some(meta)))
}

pub async fn products_by_category(
    state: &AppState,
    category: &str,
    pagination: Pagination,
) -> AppResult<ApiResponse<ProductList>> {
    let page = state.page(pagination.page_id, pagination.page_size);
    let finder = Products::find()
        .filter(Column::Category.eq(category))
        .order_by_desc(Column::CreatedAt)
        .order_by_asc(Column::Id);

    let (rows, total) = read_with_retry(state.store(), || {
        fetch_page(&state.orm, finder.clone(), page.per_page, page.offset)
    })
    .await?;

    let items = rows
        .into_iter()
        .map(product_from_entity)
        .collect::<AppResult<Vec<_>>>()?;

    let meta = Meta::new(page.page, page.per_page, total);
    Ok(ApiResponse::success("Products", ProductList { items }, Some(meta)))
}

/// Applies a new price and relative stock / order-count changes in one guarded UPDATE.
/// Stock can never be adjusted below zero.
pub async fn adjust_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: AdjustProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    let removed = validate_adjustment(&payload)?;

    let mut update = Products::update_many()
        .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(Column::Id.eq(id));
    if let Some(price) = payload.price {
        update = update.col_expr(Column::Price, Expr::value(price));
    }
    if payload.quantity_delta != 0 {
        update = update.col_expr(
            Column::Quantity,
            Expr::col(Column::Quantity).add(payload.quantity_delta),
        );
        if removed > 0 {
            update = update.filter(Column::Quantity.gte(removed));
        }
    }
    if payload.order_count_delta != 0 {
        update = update.col_expr(
            Column::OrderCount,
            Expr::col(Column::OrderCount).add(payload.order_count_delta),
        );
    }

    let product = with_deadline(state.store().timeout, async {
        let result = update.exec(&state.orm).await?;
        let current = load_product(&state.orm, id).await?;
        if result.rows_affected == 0 {
            return Err(AppError::InsufficientStock {
                product_id: id,
                requested: removed,
                available: current.quantity,
            });
        }
        Ok(current)
    })
    .await?;

    audit::record(
        state,
        Some(user.user_id),
        "product_adjust",
        "products",
        serde_json::json!({
            "product_id": id,
            "price": payload.price,
            "quantity_delta": payload.quantity_delta,
            "order_count_delta": payload.order_count_delta,
        }),
    )
    .await;

    Ok(ApiResponse::success("Updated", product, Some(Meta::empty())))
}

pub async fn add_review(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: AddReviewRequest,
) -> AppResult<ApiResponse<Review>> {
    validate_stars(payload.stars)?;
    let review = Review {
        user: user.username.clone(),
        stars: payload.stars,
        comment: payload.comment.filter(|c| !c.trim().is_empty()),
        created_at: Utc::now(),
    };

    with_deadline(state.store().timeout, async {
        let txn = state.orm.begin().await?;
        let product = Products::find_by_id(id)
            .lock(LockType::Update)
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::not_found("product"))?;

        let mut reviews: Vec<Review> = from_json(product.reviews.clone())?;
        reviews.push(review.clone());
        let review_count = product.review_count + 1;

        let mut active: ActiveModel = product.into();
        active.reviews = Set(to_json(&reviews)?);
        active.review_count = Set(review_count);
        active.updated_at = Set(Utc::now().into());
        active.update(&txn).await?;

        txn.commit().await?;
        Ok(())
    })
    .await?;

    Ok(ApiResponse::success("Review added", review, Some(Meta::empty())))
}

pub async fn delete_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let result = with_deadline(state.store().timeout, async {
        Ok(Products::delete_by_id(id).exec(&state.orm).await?)
    })
    .await?;

    if result.rows_affected == 0 {
        return Err(AppError::not_found("product"));
    }

    audit::record(
        state,
        Some(user.user_id),
        "product_delete",
        "products",
        serde_json::json!({ "product_id": id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({ "deleted": 1 }),
        Some(Meta::empty()),
    ))
}

pub async fn delete_all_products(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let result = with_deadline(state.store().timeout, async {
        Ok(Products::delete_many().exec(&state.orm).await?)
    })
    .await?;

    audit::record(
        state,
        Some(user.user_id),
        "product_delete_all",
        "products",
        serde_json::json!({ "deleted": result.rows_affected }),
    )
    .await;

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({ "deleted": result.rows_affected }),
        Some(Meta::empty()),
    ))
}

pub(crate) async fn load_product<C: ConnectionTrait>(conn: &C, id: Uuid) -> AppResult<Product> {
    let model = Products::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::not_found("product"))?;
    product_from_entity(model)
}

/// Takes `quantity` units out of stock and counts one more order, only if enough stock is left.
/// The guard and the decrement are one statement, so concurrent buyers cannot oversell.
pub(crate) async fn take_stock<C: ConnectionTrait>(
    conn: &C,
    product: &Product,
    quantity: i64,
) -> AppResult<()> {
    let result = Products::update_many()
        .col_expr(Column::Quantity, Expr::col(Column::Quantity).sub(quantity))
        .col_expr(Column::OrderCount, Expr::col(Column::OrderCount).add(1))
        .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(Column::Id.eq(product.id))
        .filter(Column::Quantity.gte(quantity))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        let available = Products::find_by_id(product.id)
            .one(conn)
            .await?
            .ok_or_else(|| AppError::not_found("product"))?
            .quantity;
        tracing::info!(
            product_id = %product.id,
            requested = quantity,
            available,
            "stock reservation rejected"
        );
        return Err(AppError::InsufficientStock {
            product_id: product.id,
            requested: quantity,
            available,
        });
    }
    Ok(())
}

pub(crate) fn product_from_entity(model: ProductModel) -> AppResult<Product> {
    Ok(Product {
        id: model.id,
        name: model.name,
        description: model.description,
        category: model.category,
        price: model.price,
        currency: model.currency,
        quantity: model.quantity,
        pictures: from_json(model.pictures)?,
        videos: from_json(model.videos)?,
        features: from_json(model.features)?,
        reviews: from_json(model.reviews)?,
        review_count: model.review_count,
        order_count: model.order_count,
        slashed_price: model.slashed_price,
        minimum_order: model.minimum_order,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

fn validate_new_product(payload: &CreateProductRequest) -> AppResult<()> {
    if payload.name.trim().is_empty() {
        return Err(AppError::InvalidInput("name is required".into()));
    }
    if payload.category.trim().is_empty() {
        return Err(AppError::InvalidInput("category is required".into()));
    }
    if payload.price < Decimal::ZERO {
        return Err(AppError::InvalidInput("price must not be negative".into()));
    }
    if payload.slashed_price.is_some_and(|p| p < Decimal::ZERO) {
        return Err(AppError::InvalidInput("slashed price must not be negative".into()));
    }
    if payload.quantity < 0 {
        return Err(AppError::InvalidInput("quantity must not be negative".into()));
    }
    if payload.minimum_order.is_some_and(|m| m < 1) {
        return Err(AppError::InvalidInput("minimum order must be at least 1".into()));
    }
    Ok(())
}

fn validate_stars(stars: i64) -> AppResult<()> {
    if !(1..=5).contains(&stars) {
        return Err(AppError::InvalidInput("stars must be between 1 and 5".into()));
    }
    Ok(())
}

/// Wraps user text for LIKE, escaping the pattern metacharacters so they match literally.
fn like_pattern(search: &str) -> String {
    let mut escaped = String::with_capacity(search.len() + 2);
    escaped.push('%');
    for ch in search.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

/// Checks an adjustment and returns how many units it takes out of stock.
fn validate_adjustment(payload: &AdjustProductRequest) -> AppResult<i64> {
    if payload.price.is_none() && payload.quantity_delta == 0 && payload.order_count_delta == 0 {
        return Err(AppError::NoOp("no product field to adjust".into()));
    }
    if payload.price.is_some_and(|p| p.is_sign_negative()) {
        return Err(AppError::InvalidInput("price must not be negative".into()));
    }
    if payload.order_count_delta < 0 {
        return Err(AppError::InvalidInput("order count can only grow".into()));
    }
    payload
        .quantity_delta
        .min(0)
        .checked_neg()
        .ok_or_else(|| AppError::InvalidInput("quantity delta is out of range".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CreateProductRequest {
        CreateProductRequest {
            name: "Chandler Bags".into(),
            description: "Leather".into(),
            category: "bags".into(),
            price: Decimal::new(4999, 2),
            currency: None,
            quantity: 216348,
            pictures: vec![],
            videos: vec![],
            features: vec![],
            slashed_price: None,
            minimum_order: None,
        }
    }

    #[test]
    fn stars_outside_one_to_five_are_rejected() {
        assert!(validate_stars(0).is_err());
        assert!(validate_stars(6).is_err());
        for stars in 1..=5 {
            assert!(validate_stars(stars).is_ok());
        }
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("bag"), "%bag%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }

    fn adjustment(quantity_delta: i64) -> AdjustProductRequest {
        AdjustProductRequest {
            price: None,
            quantity_delta,
            order_count_delta: 0,
        }
    }

    #[test]
    fn adjustment_reports_units_taken_out_of_stock() {
        assert_eq!(validate_adjustment(&adjustment(-3)).unwrap(), 3);
        assert_eq!(validate_adjustment(&adjustment(10)).unwrap(), 0);
        assert!(matches!(validate_adjustment(&adjustment(0)), Err(AppError::NoOp(_))));
    }

    #[test]
    fn most_negative_quantity_delta_is_rejected() {
        assert!(matches!(
            validate_adjustment(&adjustment(i64::MIN)),
            Err(AppError::InvalidInput(_))
        ));
        assert_eq!(validate_adjustment(&adjustment(i64::MIN + 1)).unwrap(), i64::MAX);
    }

    #[test]
    fn new_product_validation() {
        assert!(validate_new_product(&request()).is_ok());

        let mut bad = request();
        bad.price = Decimal::new(-1, 0);
        assert!(matches!(validate_new_product(&bad), Err(AppError::InvalidInput(_))));

        let mut bad = request();
        bad.name = "  ".into();
        assert!(validate_new_product(&bad).is_err());

        let mut bad = request();
        bad.minimum_order = Some(0);
        assert!(validate_new_product(&bad).is_err());
    }
}
