use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;

/// Invoice lifecycle. Every invoice is created `Pending`; `Delivered` and
/// `Cancelled` are terminal.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, EnumString, Serialize, Deserialize, ToSchema)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Pending,
    Delivered,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "invoices")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub agent_id: Uuid,
    pub supplier: Option<String>,
    pub document_type: Option<String>,
    pub invoice_number: Option<String>,
    pub invoice_date: Option<Date>,
    pub client_name: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub total_excl_tax: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub total_tax: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub total_incl_tax: Option<Decimal>,
    pub delivery_location: Option<String>,
    /// Verbatim model output kept for audit.
    pub raw_extraction: Option<Json>,
    pub status: String,
    #[schema(value_type = String, format = DateTime)]
    pub delivered_at: Option<DateTimeUtc>,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: DateTimeUtc,
    #[schema(value_type = String, format = DateTime)]
    pub updated_at: DateTimeUtc,
}

impl Model {
    pub fn status(&self) -> Option<InvoiceStatus> {
        self.status.parse().ok()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::invoice_item::Entity")]
    InvoiceItems,
    #[sea_orm(has_many = "super::invoice_photo::Entity")]
    InvoicePhotos,
}

impl Related<super::invoice_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::InvoiceItems.def()
    }
}

impl Related<super::invoice_photo::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::InvoicePhotos.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
