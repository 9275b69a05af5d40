use std::collections::HashMap;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use axum_storefront_api::{app::build_router, config::AppConfig, state::AppState};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;
use uuid::Uuid;

// None of these requests reach the database, so a lazy pool that never connects is enough.
fn app() -> (Router, AppState) {
    let vars = HashMap::from([
        ("DATABASE_URL", "postgres://nobody@127.0.0.1:1/none".to_string()),
        ("JWT_SECRET", "router-test-secret".to_string()),
    ]);
    let config = AppConfig::from_lookup(|key| vars.get(key).cloned()).unwrap();
    let pool = PgPoolOptions::new()
        .connect_lazy(&config.database_url)
        .unwrap();
    let state = AppState::new(pool, config);
    (build_router(state.clone()), state)
}

fn bearer(state: &AppState, role: &str) -> String {
    let token = state.tokens.issue(Uuid::new_v4(), "harry", role).unwrap();
    format!("Bearer {token}")
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_is_public_and_tagged_with_a_request_id() {
    let (app, _) = app();
    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(body_json(response).await["data"]["status"], "ok");
}

#[tokio::test]
async fn unknown_paths_fall_back_to_404() {
    let (app, _) = app();
    let response = app
        .oneshot(Request::get("/api/wizards").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["data"]["path"], "/api/wizards");
}

#[tokio::test]
async fn account_routes_need_a_token() {
    let (app, _) = app();
    let response = app
        .oneshot(Request::get("/api/users").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(body_json(response).await["data"]["error"].is_string());
}

#[tokio::test]
async fn forged_token_is_unauthorized() {
    let (app, _) = app();
    let response = app
        .oneshot(
            Request::get("/api/cart")
                .header(header::AUTHORIZATION, "Bearer not.a.token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_routes_reject_plain_users() {
    let (app, state) = app();
    let response = app
        .oneshot(
            Request::get("/api/admin/users")
                .header(header::AUTHORIZATION, bearer(&state, "user"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn malformed_idempotency_key_is_rejected_before_ordering() {
    let (app, state) = app();
    let body = serde_json::json!({
        "full_name": "Harry Potter",
        "quantity": 1,
        "location": { "city_or_town": "London" },
        "payment_method": "card"
    });
    let response = app
        .oneshot(
            Request::post(format!("/api/orders/product/{}", Uuid::new_v4()))
                .header(header::AUTHORIZATION, bearer(&state, "user"))
                .header(header::CONTENT_TYPE, "application/json")
                .header("idempotency-key", "retry-1")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
