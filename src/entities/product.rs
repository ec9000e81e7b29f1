use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Global SKU; first invoice line with an unseen SKU creates the product.
    #[sea_orm(unique)]
    pub sku: String,
    pub name: String,
    pub category_id: Uuid,
    pub unit: Option<String>,
    pub packaging: Option<String>,
    /// Last-write-wins: overwritten by every invoice line carrying a price.
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub price: Option<Decimal>,
    pub price_updated_at: Option<DateTimeUtc>,
    pub active: bool,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product_category::Entity",
        from = "Column::CategoryId",
        to = "super::product_category::Column::Id"
    )]
    Category,
}

impl Related<super::product_category::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Category.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
