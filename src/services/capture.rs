//! Capture orchestration: store the photos, prepare them for transport, call
//! the vision model, parse the reply, then classify and resolve every line
//! against the catalog. No invoice row is written here; the agent reviews the
//! result and commits separately.
//!
//! Failure handling is compensating, not transactional. An unreachable
//! endpoint erases the photos entirely (blobs and rows) so a retry starts
//! clean; an answer that parses to nothing keeps the photo rows marked
//! `failed` for diagnosis but still releases the blobs.

use bytes::Bytes;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::ImageConfig;
use crate::entities::invoice_photo::{self, Entity as InvoicePhoto, OcrStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::extraction::cache::{content_hash, ExtractionCache};
use crate::extraction::image::{self, PreparedImage};
use crate::extraction::parser;
use crate::extraction::types::{ExtractedInvoice, ExtractedItem};
use crate::extraction::vision::{VisionClient, VisionError};
use crate::services::classifier::CategoryClassifier;
use crate::services::products::ProductResolver;
use crate::storage::BlobStore;

/// One extracted line after catalog reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ResolvedLine {
    #[serde(flatten)]
    pub item: ExtractedItem,
    /// Catalog product the line matched or created; absent for
    /// reference-less lines.
    pub product_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
}

/// What the agent gets back to review before committing.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CaptureOutcome {
    pub photo_ids: Vec<Uuid>,
    pub invoice: ExtractedInvoice,
    pub lines: Vec<ResolvedLine>,
    /// True when a byte-identical photo set was extracted before and the
    /// vision call was skipped.
    pub from_cache: bool,
}

pub struct CaptureService {
    db: Arc<DatabaseConnection>,
    store: Arc<dyn BlobStore>,
    vision: Arc<dyn VisionClient>,
    classifier: Arc<CategoryClassifier>,
    resolver: Arc<ProductResolver>,
    cache: Arc<ExtractionCache>,
    image_cfg: ImageConfig,
    event_sender: EventSender,
}

struct StoredPhoto {
    id: Uuid,
    path: String,
}

impl CaptureService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<DatabaseConnection>,
        store: Arc<dyn BlobStore>,
        vision: Arc<dyn VisionClient>,
        classifier: Arc<CategoryClassifier>,
        resolver: Arc<ProductResolver>,
        cache: Arc<ExtractionCache>,
        image_cfg: ImageConfig,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            store,
            vision,
            classifier,
            resolver,
            cache,
            image_cfg,
            event_sender,
        }
    }

    /// Run the whole pipeline over one photographed document (1..N pages,
    /// reading order).
    #[instrument(skip(self, pages), fields(%agent_id, pages = pages.len()))]
    pub async fn capture(
        &self,
        agent_id: Uuid,
        pages: Vec<Bytes>,
    ) -> Result<CaptureOutcome, ServiceError> {
        if pages.is_empty() {
            return Err(ServiceError::ValidationError(
                "at least one photo is required".into(),
            ));
        }

        let hash = content_hash(&pages);
        let stored = self.store_photos(agent_id, &hash, &pages).await?;
        let photo_ids: Vec<Uuid> = stored.iter().map(|p| p.id).collect();

        let (invoice, from_cache) = match self.cache.get(&hash) {
            Some(cached) => {
                info!(%hash, "extraction served from content cache");
                (cached, true)
            }
            None => {
                let extracted = match self.extract(&pages).await {
                    Ok(extracted) => extracted,
                    Err(err) => {
                        self.compensate(&stored, &err).await;
                        if matches!(err, ServiceError::ExtractionFailed(_)) {
                            let _ = self
                                .event_sender
                                .send(Event::ExtractionFailed {
                                    agent_id,
                                    reason: err.to_string(),
                                })
                                .await;
                        }
                        return Err(err);
                    }
                };
                self.cache.put(hash.clone(), extracted.clone());
                (extracted, false)
            }
        };

        self.mark_photos(&photo_ids, OcrStatus::Processed).await?;

        let assignments = self.classifier.classify_batch(&invoice.items).await;

        let mut lines = Vec::with_capacity(invoice.items.len());
        for (idx, item) in invoice.items.iter().enumerate() {
            let category_id = assignments.get(&idx).copied();
            let product_id = self.resolver.resolve(item, category_id).await?;
            lines.push(ResolvedLine {
                item: item.clone(),
                product_id,
                category_id,
            });
        }

        let _ = self
            .event_sender
            .send(Event::InvoiceCaptured {
                agent_id,
                photo_ids: photo_ids.clone(),
                line_count: lines.len(),
            })
            .await;

        Ok(CaptureOutcome {
            photo_ids,
            invoice,
            lines,
            from_cache,
        })
    }

    /// Persist blobs and their pending photo rows before any network call,
    /// so a crash mid-extraction leaves an auditable trail.
    async fn store_photos(
        &self,
        agent_id: Uuid,
        hash: &str,
        pages: &[Bytes],
    ) -> Result<Vec<StoredPhoto>, ServiceError> {
        let mut stored = Vec::with_capacity(pages.len());
        for page in pages {
            let id = Uuid::new_v4();
            let ext = sniff_extension(page);
            let path = format!("{}/{}.{}", agent_id, id, ext);
            self.store.put(&path, page.clone()).await?;

            let row = invoice_photo::ActiveModel {
                id: Set(id),
                agent_id: Set(agent_id),
                storage_path: Set(path.clone()),
                content_hash: Set(hash.to_string()),
                ocr_status: Set(OcrStatus::Pending.as_str().to_string()),
                invoice_id: Set(None),
                created_at: Set(chrono::Utc::now()),
            };
            row.insert(self.db.as_ref())
                .await
                .map_err(ServiceError::db_error)?;

            stored.push(StoredPhoto { id, path });
        }
        Ok(stored)
    }

    async fn extract(&self, pages: &[Bytes]) -> Result<ExtractedInvoice, ServiceError> {
        let mut prepared: Vec<PreparedImage> = Vec::with_capacity(pages.len());
        for page in pages {
            prepared.push(image::prepare(page, &self.image_cfg)?);
        }

        let raw = match self.vision.extract_invoice(&prepared).await {
            Ok(raw) => raw,
            Err(VisionError::Unavailable(detail)) => {
                return Err(ServiceError::ExtractionUnavailable(detail));
            }
            Err(VisionError::Provider(detail)) => {
                return Err(ServiceError::ExtractionFailed(detail));
            }
        };

        parser::parse_first::<ExtractedInvoice>(&raw).ok_or_else(|| {
            ServiceError::ExtractionFailed("no structured invoice in model reply".into())
        })
    }

    /// Undo the photo writes after a failed extraction. Blob deletes are
    /// idempotent; row handling depends on the failure class.
    async fn compensate(&self, stored: &[StoredPhoto], err: &ServiceError) {
        for photo in stored {
            if let Err(e) = self.store.delete(&photo.path).await {
                warn!(path = %photo.path, error = %e, "photo blob cleanup failed");
            }
        }

        let ids: Vec<Uuid> = stored.iter().map(|p| p.id).collect();
        let outcome = match err {
            // Keep the rows as a diagnosable trace of the bad document.
            ServiceError::ExtractionFailed(_) => self.mark_photos(&ids, OcrStatus::Failed).await,
            // Transport never saw the document; erase the attempt entirely.
            _ => InvoicePhoto::delete_many()
                .filter(invoice_photo::Column::Id.is_in(ids))
                .exec(self.db.as_ref())
                .await
                .map_err(ServiceError::db_error)
                .map(|_| ()),
        };
        if let Err(e) = outcome {
            warn!(error = %e, "photo row cleanup failed");
        }
    }

    async fn mark_photos(&self, ids: &[Uuid], status: OcrStatus) -> Result<(), ServiceError> {
        InvoicePhoto::update_many()
            .col_expr(
                invoice_photo::Column::OcrStatus,
                sea_orm::sea_query::Expr::value(status.as_str()),
            )
            .filter(invoice_photo::Column::Id.is_in(ids.to_vec()))
            .exec(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;
        Ok(())
    }
}

fn sniff_extension(bytes: &[u8]) -> &'static str {
    image::extension_of(bytes).unwrap_or("bin")
}
