//! Catalog resolution for extracted invoice lines: match by SKU or create,
//! with last-write-wins pricing and OCR_IMPORT-only recategorization.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::entities::product::{self, Entity as Product};
use crate::entities::product_category::FALLBACK_CATEGORY_CODE;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::extraction::types::ExtractedItem;
use crate::services::categories;

pub struct ProductResolver {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl ProductResolver {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Resolve one line to a catalog product id. Lines without a reference
    /// stay unlinked; resolution is not attempted.
    #[instrument(skip(self, line), fields(reference = %line.reference))]
    pub async fn resolve(
        &self,
        line: &ExtractedItem,
        classified_category: Option<Uuid>,
    ) -> Result<Option<Uuid>, ServiceError> {
        let sku = line.reference.trim();
        if sku.is_empty() {
            return Ok(None);
        }

        let existing = Product::find()
            .filter(product::Column::Sku.eq(sku))
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;

        match existing {
            Some(found) => self.update_existing(found, line, classified_category).await,
            None => self.create_new(sku, line, classified_category).await,
        }
    }

    async fn update_existing(
        &self,
        found: product::Model,
        line: &ExtractedItem,
        classified_category: Option<Uuid>,
    ) -> Result<Option<Uuid>, ServiceError> {
        let id = found.id;
        let mut active: product::ActiveModel = found.clone().into();
        let mut dirty = false;

        // A classifier result may only replace the fallback category; a
        // manually curated category is never overwritten. A read suffices
        // here: when no fallback row exists, no product can be in it.
        if let Some(category_id) = classified_category {
            if category_id != found.category_id {
                let fallback =
                    categories::find_by_code(self.db.as_ref(), FALLBACK_CATEGORY_CODE).await?;
                if fallback.map(|f| f.id) == Some(found.category_id) {
                    active.category_id = Set(category_id);
                    dirty = true;
                }
            }
        }

        // Price is last-write-wins on every line that carries one.
        if let Some(price) = line.unit_price {
            if found.price != Some(price) {
                active.price = Set(Some(price));
                active.price_updated_at = Set(Some(Utc::now()));
                dirty = true;
            }
        }

        if dirty {
            active.updated_at = Set(Utc::now());
            active.update(self.db.as_ref()).await.map_err(ServiceError::db_error)?;
            debug!(%id, "product refreshed from invoice line");
        }

        Ok(Some(id))
    }

    async fn create_new(
        &self,
        sku: &str,
        line: &ExtractedItem,
        classified_category: Option<Uuid>,
    ) -> Result<Option<Uuid>, ServiceError> {
        let category_id = match classified_category {
            Some(id) => id,
            None => {
                let (fallback, _) = categories::find_or_create_by_code(
                    self.db.as_ref(),
                    FALLBACK_CATEGORY_CODE,
                    "OCR import",
                )
                .await?;
                fallback.id
            }
        };

        let name = if line.designation.trim().is_empty() {
            sku.to_string()
        } else {
            line.designation.trim().to_string()
        };

        let now = Utc::now();
        let row = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            sku: Set(sku.to_string()),
            name: Set(name),
            category_id: Set(category_id),
            unit: Set(None),
            packaging: Set(None),
            price: Set(line.unit_price),
            price_updated_at: Set(line.unit_price.map(|_| now)),
            active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = match row.insert(self.db.as_ref()).await {
            Ok(created) => created,
            // Concurrent capture created the SKU first; reuse its row.
            Err(_) => {
                let winner = Product::find()
                    .filter(product::Column::Sku.eq(sku))
                    .one(self.db.as_ref())
                    .await
                    .map_err(ServiceError::db_error)?
                    .ok_or_else(|| {
                        ServiceError::InternalError(format!(
                            "product {} neither inserted nor readable",
                            sku
                        ))
                    })?;
                return Ok(Some(winner.id));
            }
        };

        let _ = self
            .event_sender
            .send(Event::ProductCreated {
                product_id: created.id,
                sku: created.sku.clone(),
            })
            .await;

        Ok(Some(created.id))
    }
}
