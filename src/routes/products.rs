use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    dto::products::{AddReviewRequest, ProductList},
    error::AppResult,
    middleware::auth::AuthUser,
    models::{Product, Review},
    response::ApiResponse,
    routes::params::{Pagination, ProductQuery},
    services::product_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/find", get(find_products))
        .route("/category/{category}", get(products_by_category))
        .route("/{id}", get(get_product))
        .route("/{id}/reviews", post(add_review))
}

#[utoipa::path(
    get,
    path = "/api/products/find",
    params(ProductQuery),
    responses(
        (status = 200, description = "Products whose name or description contain `q`", body = ApiResponse<ProductList>)
    ),
    tag = "Products"
)]
pub async fn find_products(
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
) -> AppResult<Json<ApiResponse<ProductList>>> {
    let resp = product_service::find_products(&state, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/products/category/{category}",
    params(
        ("category" = String, Path, description = "Exact category name"),
        Pagination
    ),
    responses(
        (status = 200, description = "Products in the category", body = ApiResponse<ProductList>)
    ),
    tag = "Products"
)]
pub async fn products_by_category(
    State(state): State<AppState>,
    Path(category): Path<String>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<ProductList>>> {
    let resp = product_service::products_by_category(&state, &category, pagination).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/products/{id}",
    params(
        ("id" = Uuid, Path, description = "Product ID")
    ),
    responses(
        (status = 200, description = "Get product", body = ApiResponse<Product>),
        (status = 404, description = "Product not found"),
    ),
    tag = "Products"
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Product>>> {
    let resp = product_service::get_product(&state, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/products/{id}/reviews",
    params(
        ("id" = Uuid, Path, description = "Product ID")
    ),
    request_body = AddReviewRequest,
    responses(
        (status = 200, description = "Review appended", body = ApiResponse<Review>),
        (status = 400, description = "Stars outside 1..=5"),
        (status = 404, description = "Product not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Products"
)]
pub async fn add_review(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AddReviewRequest>,
) -> AppResult<Json<ApiResponse<Review>>> {
    let resp = product_service::add_review(&state, &user, id, payload).await?;
    Ok(Json(resp))
}
