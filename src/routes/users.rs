use axum::{
    Json, Router,
    extract::State,
    routing::{get, patch, post},
};

use crate::{
    dto::{
        auth::{AuthResponse, LoginRequest, SignupRequest},
        users::{AccountUpdate, ChangePasswordRequest, UpdateAccountRequest},
    },
    error::AppResult,
    middleware::auth::AuthUser,
    models::{Account, Location},
    response::ApiResponse,
    services::{account_service, auth_service},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/", get(get_account).patch(update_account))
        .route("/password", patch(change_password))
        .route("/locations", post(add_location))
}

#[utoipa::path(
    post,
    path = "/api/users/signup",
    request_body = SignupRequest,
    responses(
        (status = 200, description = "Account created", body = ApiResponse<AuthResponse>),
        (status = 400, description = "Invalid input or duplicate username, email or mobile number")
    ),
    tag = "Users"
)]
pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> AppResult<Json<ApiResponse<AuthResponse>>> {
    let resp = auth_service::signup(&state, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/users/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = ApiResponse<AuthResponse>),
        (status = 401, description = "Invalid credentials"),
        (status = 404, description = "User not found")
    ),
    tag = "Users"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<ApiResponse<AuthResponse>>> {
    let resp = auth_service::login(&state, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/users",
    responses(
        (status = 200, description = "Caller's account", body = ApiResponse<Account>),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn get_account(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<Account>>> {
    let resp = account_service::get_account(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    patch,
    path = "/api/users",
    request_body = UpdateAccountRequest,
    responses(
        (status = 200, description = "Field updated", body = ApiResponse<Account>),
        (status = 400, description = "Unknown field, empty value or duplicate"),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn update_account(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<UpdateAccountRequest>,
) -> AppResult<Json<ApiResponse<Account>>> {
    let update = AccountUpdate::try_from(payload)?;
    let resp = account_service::update_account(&state, &user, update).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    patch,
    path = "/api/users/password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed"),
        (status = 400, description = "New password equals the old one"),
        (status = 401, description = "Old password does not match")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn change_password(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = account_service::change_password(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/users/locations",
    request_body = Location,
    responses(
        (status = 200, description = "Location registered", body = ApiResponse<Location>),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn add_location(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<Location>,
) -> AppResult<Json<ApiResponse<Location>>> {
    let resp = account_service::add_location(&state, &user, payload).await?;
    Ok(Json(resp))
}
