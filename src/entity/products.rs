use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub category: String,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub price: Decimal,
    pub currency: String,
    pub quantity: i64,
    #[sea_orm(column_type = "JsonBinary")]
    pub pictures: Json,
    #[sea_orm(column_type = "JsonBinary")]
    pub videos: Json,
    #[sea_orm(column_type = "JsonBinary")]
    pub features: Json,
    #[sea_orm(column_type = "JsonBinary")]
    pub reviews: Json,
    pub review_count: i64,
    pub order_count: i64,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))", nullable)]
    pub slashed_price: Option<Decimal>,
    pub minimum_order: Option<i64>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
