use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit,
    db::{fetch_page, read_with_retry, with_deadline},
    dto::users::{AccountUpdate, ChangePasswordRequest, UserList},
    entity::{
        cart_items::{Column as CartCol, Entity as CartItems},
        users::{ActiveModel as UserActive, Column as UserCol, Entity as Users, Model as UserModel},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Account, Location, Order, OrderStatus, from_json, to_json},
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    services::auth_service::{hash_password, validate_email, verify_password},
    state::AppState,
};

pub async fn get_account(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<Account>> {
    let model = read_with_retry(state.store(), || find_user(&state.orm, user.user_id)).await?;
    Ok(ApiResponse::success("Account", account_from_entity(model)?, None))
}

/// Sets one profile field in a single targeted UPDATE.
pub async fn update_account(
    state: &AppState,
    user: &AuthUser,
    update: AccountUpdate,
) -> AppResult<ApiResponse<Account>> {
    let field = update.field_name();
    let (column, value) = match update {
        AccountUpdate::Username(v) => (UserCol::Username, v),
        AccountUpdate::FullName(v) => (UserCol::FullName, v),
        AccountUpdate::ProfilePicture(v) => (UserCol::ProfilePicture, v),
        AccountUpdate::Email(v) => {
            validate_email(&v)?;
            (UserCol::Email, v.to_lowercase())
        }
        AccountUpdate::MobileNumber(v) => (UserCol::MobileNumber, v),
        AccountUpdate::DefaultPaymentMethod(v) => (UserCol::DefaultPaymentMethod, v),
    };

    let model = with_deadline(state.store().timeout, async {
        let result = Users::update_many()
            .col_expr(column, Expr::value(value))
            .col_expr(UserCol::UpdatedAt, Expr::value(Utc::now()))
            .filter(UserCol::Id.eq(user.user_id))
            .exec(&state.orm)
            .await?;
        if result.rows_affected == 0 {
            return Err(AppError::not_found("user"));
        }
        find_user(&state.orm, user.user_id).await
    })
    .await?;

    audit::record(
        state,
        Some(user.user_id),
        "user_update",
        "users",
        serde_json::json!({ "field": field }),
    )
    .await;

    Ok(ApiResponse::success("Updated", account_from_entity(model)?, Some(Meta::empty())))
}

pub async fn change_password(
    state: &AppState,
    user: &AuthUser,
    payload: ChangePasswordRequest,
) -> AppResult<ApiResponse<serde_json::Value>> {
    if payload.new_password.chars().count() < 6 {
        return Err(AppError::InvalidInput(
            "password must be at least 6 characters".into(),
        ));
    }

    with_deadline(state.store().timeout, async {
        let txn = state.orm.begin().await?;
        let current = Users::find_by_id(user.user_id)
            .lock(LockType::Update)
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::not_found("user"))?;

        verify_password(&payload.password, &current.password_hash)?;
        if payload.new_password == payload.password {
            return Err(AppError::NoOp("new password equals old password".into()));
        }

        let hashed = hash_password(&payload.new_password)?;
        let mut active: UserActive = current.into();
        active.password_hash = Set(hashed.hash);
        active.password_salt = Set(hashed.salt);
        active.updated_at = Set(Utc::now().into());
        active.update(&txn).await?;

        txn.commit().await?;
        Ok(())
    })
    .await?;

    audit::record(
        state,
        Some(user.user_id),
        "user_password_change",
        "users",
        serde_json::json!({ "user_id": user.user_id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Password updated",
        serde_json::json!({ "updated": true }),
        Some(Meta::empty()),
    ))
}

/// Appends a delivery location; the first one registered also becomes the default.
pub async fn add_location(
    state: &AppState,
    user: &AuthUser,
    location: Location,
) -> AppResult<ApiResponse<Location>> {
    let stored = location.clone();
    with_deadline(state.store().timeout, async {
        let txn = state.orm.begin().await?;
        let current = Users::find_by_id(user.user_id)
            .lock(LockType::Update)
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::not_found("user"))?;

        let mut locations: Vec<Location> = from_json(current.locations.clone())?;
        let first = locations.is_empty();
        locations.push(location);

        let mut active: UserActive = current.into();
        if first {
            active.default_delivery_location = Set(Some(to_json(&locations[0])?));
        }
        active.locations = Set(to_json(&locations)?);
        active.updated_at = Set(Utc::now().into());
        active.update(&txn).await?;

        txn.commit().await?;
        Ok(())
    })
    .await?;

    Ok(ApiResponse::success("Location added", stored, Some(Meta::empty())))
}

/// Row-locks the purchaser's account. Order placement takes this lock before any
/// product or cart lock so every placement acquires locks in the same sequence.
pub(crate) async fn lock_purchaser<C: ConnectionTrait>(conn: &C, user_id: Uuid) -> AppResult<UserModel> {
    Users::find_by_id(user_id)
        .lock(LockType::Update)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::not_found("user"))
}

/// Appends denormalized copies of new orders to an account already locked by
/// [`lock_purchaser`]. Runs inside the caller's transaction.
pub(crate) async fn append_orders<C: ConnectionTrait>(
    conn: &C,
    purchaser: UserModel,
    placed: &[Order],
) -> AppResult<()> {
    let mut orders: Vec<Order> = from_json(purchaser.orders.clone())?;
    orders.extend_from_slice(placed);

    let mut active: UserActive = purchaser.into();
    active.orders = Set(to_json(&orders)?);
    active.updated_at = Set(Utc::now().into());
    active.update(conn).await?;
    Ok(())
}

/// Patches the status of the account's embedded copy of `order_id`. Runs inside the caller's transaction.
pub(crate) async fn mutate_order_status<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    order_id: Uuid,
    status: OrderStatus,
    at: DateTime<Utc>,
) -> AppResult<()> {
    let Some(current) = Users::find_by_id(user_id)
        .lock(LockType::Update)
        .one(conn)
        .await?
    else {
        tracing::debug!(%user_id, %order_id, "purchaser account is gone, no copy to update");
        return Ok(());
    };

    let mut orders: Vec<Order> = from_json(current.orders.clone())?;
    let embedded = orders
        .iter_mut()
        .find(|o| o.id == order_id)
        .ok_or_else(|| AppError::not_found("order copy on account"))?;
    embedded.apply_status(status, at)?;

    let mut active: UserActive = current.into();
    active.orders = Set(to_json(&orders)?);
    active.updated_at = Set(Utc::now().into());
    active.update(conn).await?;
    Ok(())
}

pub(crate) async fn remove_order_copies<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    order_ids: &[Uuid],
) -> AppResult<()> {
    let Some(current) = Users::find_by_id(user_id)
        .lock(LockType::Update)
        .one(conn)
        .await?
    else {
        // Orders can outlive a deleted account.
        return Ok(());
    };

    let mut orders: Vec<Order> = from_json(current.orders.clone())?;
    orders.retain(|o| !order_ids.contains(&o.id));

    let mut active: UserActive = current.into();
    active.orders = Set(to_json(&orders)?);
    active.updated_at = Set(Utc::now().into());
    active.update(conn).await?;
    Ok(())
}

pub(crate) async fn clear_order_copies<C: ConnectionTrait>(conn: &C, user_id: Uuid) -> AppResult<()> {
    Users::update_many()
        .col_expr(UserCol::Orders, Expr::value(serde_json::json!([])))
        .col_expr(UserCol::UpdatedAt, Expr::value(Utc::now()))
        .filter(UserCol::Id.eq(user_id))
        .exec(conn)
        .await?;
    Ok(())
}

pub async fn list_users(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<UserList>> {
    ensure_admin(user)?;
    let page = state.page(pagination.page_id, pagination.page_size);
    let finder = Users::find()
        .order_by_asc(UserCol::CreatedAt)
        .order_by_asc(UserCol::Id);

    let (rows, total) = read_with_retry(state.store(), || {
        fetch_page(&state.orm, finder.clone(), page.per_page, page.offset)
    })
    .await?;

    let items = rows
        .into_iter()
        .map(account_from_entity)
        .collect::<AppResult<Vec<_>>>()?;

    let meta = Meta::new(page.page, page.per_page, total);
    Ok(ApiResponse::success("Users", UserList { items }, Some(meta)))
}

/// Removes the account and its cart. Orders stay behind as sales history.
pub async fn delete_user(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    with_deadline(state.store().timeout, async {
        let txn = state.orm.begin().await?;
        let result = Users::delete_by_id(id).exec(&txn).await?;
        if result.rows_affected == 0 {
            return Err(AppError::not_found("user"));
        }
        CartItems::delete_many()
            .filter(CartCol::UserId.eq(id))
            .exec(&txn)
            .await?;
        txn.commit().await?;
        Ok(())
    })
    .await?;

    audit::record(
        state,
        Some(user.user_id),
        "user_delete",
        "users",
        serde_json::json!({ "user_id": id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({ "deleted": 1 }),
        Some(Meta::empty()),
    ))
}

/// Deletes every non-admin account together with their carts.
pub async fn delete_all_users(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let deleted = with_deadline(state.store().timeout, async {
        let txn = state.orm.begin().await?;
        let doomed: Vec<Uuid> = Users::find()
            .select_only()
            .column(UserCol::Id)
            .filter(UserCol::Role.ne(crate::middleware::auth::ADMIN_ROLE))
            .into_tuple()
            .all(&txn)
            .await?;
        if !doomed.is_empty() {
            CartItems::delete_many()
                .filter(CartCol::UserId.is_in(doomed.clone()))
                .exec(&txn)
                .await?;
            Users::delete_many()
                .filter(UserCol::Id.is_in(doomed.clone()))
                .exec(&txn)
                .await?;
        }
        txn.commit().await?;
        Ok(doomed.len())
    })
    .await?;

    audit::record(
        state,
        Some(user.user_id),
        "user_delete_all",
        "users",
        serde_json::json!({ "deleted": deleted }),
    )
    .await;

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({ "deleted": deleted }),
        Some(Meta::empty()),
    ))
}

async fn find_user<C: ConnectionTrait>(conn: &C, id: Uuid) -> AppResult<UserModel> {
    Users::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::not_found("user"))
}

pub(crate) fn account_from_entity(model: UserModel) -> AppResult<Account> {
    Ok(Account {
        id: model.id,
        username: model.username,
        email: model.email,
        mobile_number: model.mobile_number,
        full_name: model.full_name,
        profile_picture: model.profile_picture,
        role: model.role,
        email_is_verified: model.email_is_verified,
        default_payment_method: model.default_payment_method,
        default_delivery_location: model
            .default_delivery_location
            .map(from_json)
            .transpose()?,
        locations: from_json(model.locations)?,
        orders: from_json(model.orders)?,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> UserModel {
        let now = Utc::now();
        UserModel {
            id: Uuid::new_v4(),
            username: "harry".into(),
            email: "harry@hogwarts.edu".into(),
            mobile_number: None,
            password_hash: "hash".into(),
            password_salt: "salt".into(),
            full_name: "Harry Potter".into(),
            profile_picture: None,
            role: "user".into(),
            email_is_verified: false,
            default_payment_method: None,
            default_delivery_location: None,
            locations: serde_json::json!([]),
            orders: serde_json::json!([]),
            created_at: now.into(),
            updated_at: now.into(),
        }
    }

    #[test]
    fn account_view_decodes_embedded_documents() {
        let mut model = model();
        let location = Location {
            city_or_town: "London".into(),
            ..Location::default()
        };
        model.locations = serde_json::to_value(vec![location.clone()]).unwrap();
        model.default_delivery_location = Some(serde_json::to_value(&location).unwrap());
        model.orders = serde_json::to_value(vec![crate::models::fixtures::order()]).unwrap();

        let account = account_from_entity(model).unwrap();
        assert_eq!(account.locations, vec![location.clone()]);
        assert_eq!(account.default_delivery_location, Some(location));
        assert_eq!(account.orders.len(), 1);
    }

    #[test]
    fn malformed_embedded_document_is_internal() {
        let mut model = model();
        model.locations = serde_json::json!({ "not": "a list" });
        assert!(matches!(account_from_entity(model), Err(AppError::Internal(_))));
    }
}
