use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{error::AppError, models::Account};

/// Wire form of a single-field profile update: `{"detail": "email", "update": "new@x.io"}`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateAccountRequest {
    pub detail: String,
    pub update: String,
}

/// Typed single-field profile update. Password changes go through `ChangePasswordRequest`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountUpdate {
    Username(String),
    FullName(String),
    ProfilePicture(String),
    Email(String),
    MobileNumber(String),
    DefaultPaymentMethod(String),
}

impl AccountUpdate {
    pub fn field_name(&self) -> &'static str {
        match self {
            AccountUpdate::Username(_) => "username",
            AccountUpdate::FullName(_) => "fullname",
            AccountUpdate::ProfilePicture(_) => "profile_picture",
            AccountUpdate::Email(_) => "email",
            AccountUpdate::MobileNumber(_) => "mobile_number",
            AccountUpdate::DefaultPaymentMethod(_) => "default_payment_method",
        }
    }
}

impl TryFrom<UpdateAccountRequest> for AccountUpdate {
    type Error = AppError;

    fn try_from(req: UpdateAccountRequest) -> Result<Self, Self::Error> {
        let value = req.update.trim().to_string();
        if value.is_empty() {
            return Err(AppError::InvalidInput("update must not be empty".into()));
        }
        let update = match req.detail.trim() {
            "username" => AccountUpdate::Username(value),
            "fullname" | "full_name" => AccountUpdate::FullName(value),
            "profile_picture" => AccountUpdate::ProfilePicture(value),
            "email" => AccountUpdate::Email(value),
            "mobile_number" => AccountUpdate::MobileNumber(value),
            "default_payment_method" => AccountUpdate::DefaultPaymentMethod(value),
            other => return Err(AppError::InvalidField(other.to_string())),
        };
        Ok(update)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChangePasswordRequest {
    pub password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserList {
    pub items: Vec<Account>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(detail: &str, update: &str) -> UpdateAccountRequest {
        UpdateAccountRequest {
            detail: detail.into(),
            update: update.into(),
        }
    }

    #[test]
    fn known_fields_parse_into_typed_updates() {
        assert_eq!(
            AccountUpdate::try_from(req("email", "h@hogwarts.uk")).unwrap(),
            AccountUpdate::Email("h@hogwarts.uk".into())
        );
        assert_eq!(
            AccountUpdate::try_from(req("fullname", " Harry Potter ")).unwrap(),
            AccountUpdate::FullName("Harry Potter".into())
        );
    }

    #[test]
    fn password_is_not_a_generic_field() {
        let err = AccountUpdate::try_from(req("password", "secret")).unwrap_err();
        assert!(matches!(err, AppError::InvalidField(field) if field == "password"));
    }

    #[test]
    fn unknown_field_is_invalid() {
        assert!(matches!(
            AccountUpdate::try_from(req("role", "admin")),
            Err(AppError::InvalidField(_))
        ));
    }

    #[test]
    fn empty_value_is_invalid_input() {
        assert!(matches!(
            AccountUpdate::try_from(req("email", "  ")),
            Err(AppError::InvalidInput(_))
        ));
    }
}
