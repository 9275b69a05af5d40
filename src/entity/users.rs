use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub username: String,
    #[sea_orm(unique)]
    pub email: String,
    #[sea_orm(unique)]
    pub mobile_number: Option<String>,
    pub password_hash: String,
    pub password_salt: String,
    pub full_name: String,
    pub profile_picture: Option<String>,
    pub role: String,
    pub email_is_verified: bool,
    pub default_payment_method: Option<String>,
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub default_delivery_location: Option<Json>,
    #[sea_orm(column_type = "JsonBinary")]
    pub locations: Json,
    /// Denormalized copies of the account's orders, newest last.
    #[sea_orm(column_type = "JsonBinary")]
    pub orders: Json,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
