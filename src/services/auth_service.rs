use argon2::{
    Argon2, PasswordHasher,
    password_hash::{PasswordHash, PasswordVerifier, SaltString},
};
use chrono::Utc;
use password_hash::rand_core::OsRng;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use crate::{
    audit,
    db::{read_with_retry, with_deadline},
    dto::auth::{AuthResponse, LoginRequest, SignupRequest},
    entity::users::{ActiveModel as UserActive, Column as UserCol, Entity as Users, Model as UserModel},
    error::{AppError, AppResult},
    middleware::auth::ADMIN_ROLE,
    response::{ApiResponse, Meta},
    state::AppState,
};

pub const USER_ROLE: &str = "user";

/// A freshly generated salt and the PHC string argon2 produced with it.
pub(crate) struct HashedPassword {
    pub hash: String,
    pub salt: String,
}

pub(crate) fn hash_password(password: &str) -> AppResult<HashedPassword> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?
        .to_string();
    Ok(HashedPassword {
        hash,
        salt: salt.as_str().to_string(),
    })
}

pub(crate) fn verify_password(password: &str, stored_hash: &str) -> AppResult<()> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid password hash")))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| AppError::InvalidCredentials)
}

pub async fn signup(state: &AppState, payload: SignupRequest) -> AppResult<ApiResponse<AuthResponse>> {
    validate_signup(&payload)?;
    let hashed = hash_password(&payload.password)?;
    let now = Utc::now();

    let active = UserActive {
        id: Set(Uuid::new_v4()),
        username: Set(payload.username.trim().to_string()),
        email: Set(payload.email.trim().to_lowercase()),
        mobile_number: Set(payload
            .mobile_number
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())),
        password_hash: Set(hashed.hash),
        password_salt: Set(hashed.salt),
        full_name: Set(payload.full_name.trim().to_string()),
        profile_picture: Set(None),
        role: Set(USER_ROLE.to_string()),
        email_is_verified: Set(false),
        default_payment_method: Set(None),
        default_delivery_location: Set(None),
        locations: Set(serde_json::json!([])),
        orders: Set(serde_json::json!([])),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    };

    let user = with_deadline(state.store().timeout, async {
        Ok(active.insert(&state.orm).await?)
    })
    .await?;

    tracing::info!(user_id = %user.id, username = %user.username, "account created");
    audit::record(
        state,
        Some(user.id),
        "user_signup",
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    let response = auth_response(state, user)?;
    Ok(ApiResponse::success("User created", response, Some(Meta::empty())))
}

pub async fn login(state: &AppState, payload: LoginRequest) -> AppResult<ApiResponse<AuthResponse>> {
    let username = payload.username.trim().to_string();
    let user = read_with_retry(state.store(), || find_by_username(state, &username))
        .await?
        .ok_or_else(|| AppError::not_found("user"))?;

    verify_password(&payload.password, &user.password_hash)?;

    audit::record(
        state,
        Some(user.id),
        "user_login",
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    let response = auth_response(state, user)?;
    Ok(ApiResponse::success("Logged in", response, Some(Meta::empty())))
}

/// Creates the configured admin account, or resets its password and role if the username exists.
pub async fn ensure_admin_account(state: &AppState) -> AppResult<()> {
    let Some(admin) = state.config.admin.clone() else {
        tracing::info!("no admin credentials configured");
        return Ok(());
    };
    let hashed = hash_password(&admin.password)?;
    let now = Utc::now();

    with_deadline(state.store().timeout, async {
        match find_by_username(state, &admin.username).await? {
            Some(existing) => {
                let mut active: UserActive = existing.into();
                active.password_hash = Set(hashed.hash);
                active.password_salt = Set(hashed.salt);
                active.role = Set(ADMIN_ROLE.to_string());
                active.updated_at = Set(now.into());
                active.update(&state.orm).await?;
            }
            None => {
                UserActive {
                    id: Set(Uuid::new_v4()),
                    username: Set(admin.username.clone()),
                    email: Set(format!("{}@admin.localhost", admin.username)),
                    mobile_number: Set(None),
                    password_hash: Set(hashed.hash),
                    password_salt: Set(hashed.salt),
                    full_name: Set("Administrator".to_string()),
                    profile_picture: Set(None),
                    role: Set(ADMIN_ROLE.to_string()),
                    email_is_verified: Set(true),
                    default_payment_method: Set(None),
                    default_delivery_location: Set(None),
                    locations: Set(serde_json::json!([])),
                    orders: Set(serde_json::json!([])),
                    created_at: Set(now.into()),
                    updated_at: Set(now.into()),
                }
                .insert(&state.orm)
                .await?;
            }
        }
        Ok(())
    })
    .await?;

    tracing::info!(username = %admin.username, "admin account ensured");
    Ok(())
}

async fn find_by_username(state: &AppState, username: &str) -> AppResult<Option<UserModel>> {
    Ok(Users::find()
        .filter(UserCol::Username.eq(username))
        .one(&state.orm)
        .await?)
}

fn auth_response(state: &AppState, user: UserModel) -> AppResult<AuthResponse> {
    let token = state.tokens.issue(user.id, &user.username, &user.role)?;
    Ok(AuthResponse {
        id: user.id,
        username: user.username,
        full_name: user.full_name,
        email: user.email,
        token,
        created_at: user.created_at.with_timezone(&Utc),
        email_is_verified: user.email_is_verified,
        mobile_number: user.mobile_number,
    })
}

fn validate_signup(payload: &SignupRequest) -> AppResult<()> {
    if payload.username.trim().is_empty() {
        return Err(AppError::InvalidInput("username is required".into()));
    }
    if payload.full_name.trim().is_empty() {
        return Err(AppError::InvalidInput("fullname is required".into()));
    }
    validate_email(&payload.email)?;
    if payload.password.chars().count() < 6 {
        return Err(AppError::InvalidInput(
            "password must be at least 6 characters".into(),
        ));
    }
    Ok(())
}

pub(crate) fn validate_email(email: &str) -> AppResult<()> {
    match email.trim().split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.contains('@') && domain.contains('.') => {
            Ok(())
        }
        _ => Err(AppError::InvalidInput("email is not valid".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signup(email: &str, password: &str) -> SignupRequest {
        SignupRequest {
            username: "harry".into(),
            full_name: "Harry Potter".into(),
            email: email.into(),
            password: password.into(),
            mobile_number: None,
        }
    }

    #[test]
    fn hash_verifies_only_the_password_it_was_made_from() {
        let hashed = hash_password("hogwarts").unwrap();
        assert!(hashed.hash.contains(&hashed.salt));
        assert!(verify_password("hogwarts", &hashed.hash).is_ok());
        assert!(matches!(
            verify_password("muggle", &hashed.hash),
            Err(AppError::InvalidCredentials)
        ));
    }

    #[test]
    fn every_hash_gets_a_fresh_salt() {
        let a = hash_password("hogwarts").unwrap();
        let b = hash_password("hogwarts").unwrap();
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn signup_validation() {
        assert!(validate_signup(&signup("harry@hogwarts.edu", "hogwarts")).is_ok());
        assert!(validate_signup(&signup("not-an-email", "hogwarts")).is_err());
        assert!(validate_signup(&signup("harry@hogwarts.edu", "abc")).is_err());
    }

    #[test]
    fn email_shape() {
        assert!(validate_email("harry@hogwarts.edu").is_ok());
        assert!(validate_email(" harry@hogwarts.edu ").is_ok());
        for bad in ["not-an-email", "@hogwarts.edu", "harry@hogwarts", "a@b@c.edu"] {
            assert!(
                matches!(validate_email(bad), Err(AppError::InvalidInput(_))),
                "{bad} accepted"
            );
        }
    }
}
