use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Structured invoice document recovered from the model response. Field names
/// match the JSON shape the extraction prompt asks for.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ExtractedInvoice {
    #[serde(default)]
    pub supplier: Option<String>,
    #[serde(default)]
    pub document_type: Option<String>,
    #[serde(default)]
    pub invoice_number: Option<String>,
    /// ISO date string as printed on the document, when legible.
    #[serde(default)]
    pub invoice_date: Option<String>,
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub total_excl_tax: Option<Decimal>,
    #[serde(default)]
    pub total_tax: Option<Decimal>,
    #[serde(default)]
    pub total_incl_tax: Option<Decimal>,
    #[serde(default)]
    pub delivery_location: Option<String>,
    #[serde(default)]
    pub items: Vec<ExtractedItem>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ExtractedItem {
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub designation: String,
    #[serde(default)]
    pub quantity: Option<Decimal>,
    #[serde(default)]
    pub unit_price: Option<Decimal>,
    #[serde(default)]
    pub line_total: Option<Decimal>,
    #[serde(default)]
    pub depot: Option<String>,
}

/// One entry of the classifier's batch reply.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassificationEntry {
    pub reference: Option<String>,
    #[serde(default)]
    pub designation: Option<String>,
    /// Existing category id, when the model matched one.
    #[serde(default)]
    pub category_id: Option<uuid::Uuid>,
    /// Suggested new category, when nothing in the tree fit.
    #[serde(default)]
    pub new_category_code: Option<String>,
    #[serde(default)]
    pub new_category_name: Option<String>,
}
