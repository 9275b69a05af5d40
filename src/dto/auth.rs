use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Deserialize, Debug, ToSchema)]
pub struct SignupRequest {
    pub username: String,
    #[serde(alias = "fullname")]
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub mobile_number: Option<String>,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Returned by signup and login.
#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub id: Uuid,
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub email_is_verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mobile_number: Option<String>,
}
