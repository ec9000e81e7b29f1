use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Semantic direction of a movement. `Adjustment` sets the balance and logs
/// only the magnitude of the change.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MovementKind {
    In,
    Out,
    Adjustment,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::In => "in",
            Self::Out => "out",
            Self::Adjustment => "adjustment",
        }
    }
}

/// Closed set of documents a movement can point at. Resolved explicitly by
/// the reader; not a foreign key.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReferenceKind {
    Invoice,
    Order,
}

impl ReferenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invoice => "invoice",
            Self::Order => "order",
        }
    }
}

/// Append-only audit row. Never updated or deleted in normal operation.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_movements")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub agent_id: Uuid,
    pub product_id: Uuid,
    pub kind: String,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub quantity: Decimal,
    pub reference_kind: Option<String>,
    pub reference_id: Option<Uuid>,
    pub note: Option<String>,
    pub created_at: DateTimeUtc,
}

impl Model {
    pub fn kind(&self) -> Option<MovementKind> {
        self.kind.parse().ok()
    }

    pub fn reference_kind(&self) -> Option<ReferenceKind> {
        self.reference_kind.as_deref().and_then(|k| k.parse().ok())
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
