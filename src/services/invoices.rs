//! Invoice lifecycle: commit (pending), item replacement while pending,
//! delivery and cancellation. Stock effects always run as their own
//! transactions after the invoice row has reached its new state.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionError, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entities::invoice::{self, Entity as Invoice, InvoiceStatus};
use crate::entities::invoice_item::{self, Entity as InvoiceItem};
use crate::entities::invoice_photo::{self, Entity as InvoicePhoto};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::stock::StockService;

/// One line as the agent confirms it, catalog link already resolved.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CommitLineInput {
    #[serde(default)]
    pub product_id: Option<Uuid>,
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub designation: String,
    pub quantity: Decimal,
    #[serde(default)]
    pub unit_price: Option<Decimal>,
    #[serde(default)]
    pub line_total: Option<Decimal>,
    #[serde(default)]
    pub depot: Option<String>,
}

/// Confirmed invoice header plus its lines and the capture photos to attach.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, Validate)]
pub struct CommitInvoiceInput {
    #[serde(default)]
    #[validate(length(max = 128))]
    pub supplier: Option<String>,
    #[serde(default)]
    pub document_type: Option<String>,
    #[serde(default)]
    #[validate(length(max = 64))]
    pub invoice_number: Option<String>,
    #[serde(default)]
    pub invoice_date: Option<NaiveDate>,
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
    /// Verbatim extraction payload, kept on the invoice for audit.
    #[serde(default)]
    pub raw_extraction: Option<serde_json::Value>,
    #[serde(default)]
    pub photo_ids: Vec<Uuid>,
    #[validate(length(min = 1, message = "an invoice needs at least one line"))]
    pub lines: Vec<CommitLineInput>,
}

/// An invoice together with its line items.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InvoiceWithItems {
    #[serde(flatten)]
    pub invoice: invoice::Model,
    pub items: Vec<invoice_item::Model>,
}

pub struct InvoiceService {
    db: Arc<DatabaseConnection>,
    stock: Arc<StockService>,
    event_sender: EventSender,
}

impl InvoiceService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        stock: Arc<StockService>,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            stock,
            event_sender,
        }
    }

    /// Persist a confirmed invoice as `pending` with its items and photo
    /// attachments in one transaction, then load the inventoried lines onto
    /// the agent's vehicle.
    #[instrument(skip(self, input), fields(%agent_id, lines = input.lines.len()))]
    pub async fn commit(
        &self,
        agent_id: Uuid,
        input: CommitInvoiceInput,
    ) -> Result<InvoiceWithItems, ServiceError> {
        input.validate()?;
        validate_lines(&input.lines)?;

        let invoice_id = Uuid::new_v4();
        let lines = input.lines.clone();
        let photo_ids = input.photo_ids.clone();
        let header = input;

        let (created, items) = self
            .db
            .transaction::<_, (invoice::Model, Vec<invoice_item::Model>), ServiceError>(
                move |txn| {
                    Box::pin(async move {
                        let now = Utc::now();
                        let row = invoice::ActiveModel {
                            id: Set(invoice_id),
                            agent_id: Set(agent_id),
                            supplier: Set(header.supplier),
                            document_type: Set(header.document_type),
                            invoice_number: Set(header.invoice_number),
                            invoice_date: Set(header.invoice_date),
                            client_name: Set(header.client_name),
                            total_excl_tax: Set(header.total_excl_tax),
                            total_tax: Set(header.total_tax),
                            total_incl_tax: Set(header.total_incl_tax),
                            delivery_location: Set(header.delivery_location),
                            raw_extraction: Set(header.raw_extraction),
                            status: Set(InvoiceStatus::Pending.as_str().to_string()),
                            delivered_at: Set(None),
                            created_at: Set(now),
                            updated_at: Set(now),
                        };
                        let created = row.insert(txn).await.map_err(ServiceError::db_error)?;

                        let items = insert_lines(txn, invoice_id, &lines).await?;

                        if !photo_ids.is_empty() {
                            InvoicePhoto::update_many()
                                .col_expr(
                                    invoice_photo::Column::InvoiceId,
                                    sea_orm::sea_query::Expr::value(invoice_id),
                                )
                                .filter(invoice_photo::Column::Id.is_in(photo_ids))
                                .filter(invoice_photo::Column::AgentId.eq(agent_id))
                                .exec(txn)
                                .await
                                .map_err(ServiceError::db_error)?;
                        }

                        Ok((created, items))
                    })
                },
            )
            .await
            .map_err(unwrap_txn_err)?;

        self.stock.load_invoice(agent_id, invoice_id, &items).await?;

        let _ = self
            .event_sender
            .send(Event::InvoiceCommitted {
                invoice_id,
                agent_id,
            })
            .await;
        info!(%invoice_id, "invoice committed");

        Ok(InvoiceWithItems {
            invoice: created,
            items,
        })
    }

    /// Replace all items on a pending invoice. The old lines' loads are
    /// reversed and the new lines loaded so vehicle balances keep tracking
    /// what the invoice says.
    #[instrument(skip(self, lines), fields(%invoice_id, lines = lines.len()))]
    pub async fn replace_items(
        &self,
        agent_id: Uuid,
        invoice_id: Uuid,
        lines: Vec<CommitLineInput>,
    ) -> Result<InvoiceWithItems, ServiceError> {
        validate_lines(&lines)?;

        let new_lines = lines;
        let (updated, old_items, new_items) = self
            .db
            .transaction::<_, (invoice::Model, Vec<invoice_item::Model>, Vec<invoice_item::Model>), ServiceError>(
                move |txn| {
                    Box::pin(async move {
                        let found = Invoice::find_by_id(invoice_id)
                            .filter(invoice::Column::AgentId.eq(agent_id))
                            .lock_exclusive()
                            .one(txn)
                            .await
                            .map_err(ServiceError::db_error)?
                            .ok_or_else(|| {
                                ServiceError::NotFound(format!("invoice {} not found", invoice_id))
                            })?;

                        if found.status() != Some(InvoiceStatus::Pending) {
                            return Err(ServiceError::Conflict(format!(
                                "invoice {} is {}; items can only change while pending",
                                invoice_id, found.status
                            )));
                        }

                        let old_items = found
                            .find_related(InvoiceItem)
                            .all(txn)
                            .await
                            .map_err(ServiceError::db_error)?;

                        InvoiceItem::delete_many()
                            .filter(invoice_item::Column::InvoiceId.eq(invoice_id))
                            .exec(txn)
                            .await
                            .map_err(ServiceError::db_error)?;

                        let new_items = insert_lines(txn, invoice_id, &new_lines).await?;

                        let mut active: invoice::ActiveModel = found.into();
                        active.updated_at = Set(Utc::now());
                        let updated = active.update(txn).await.map_err(ServiceError::db_error)?;

                        Ok((updated, old_items, new_items))
                    })
                },
            )
            .await
            .map_err(unwrap_txn_err)?;

        self.stock
            .unload_invoice(agent_id, invoice_id, &old_items)
            .await?;
        self.stock
            .load_invoice(agent_id, invoice_id, &new_items)
            .await?;

        Ok(InvoiceWithItems {
            invoice: updated,
            items: new_items,
        })
    }

    /// Deliver a pending invoice: status flips to `delivered` atomically,
    /// then the inventoried lines are unloaded. Delivered and cancelled
    /// invoices are rejected with no ledger effect.
    #[instrument(skip(self), fields(%invoice_id))]
    pub async fn deliver(
        &self,
        agent_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<InvoiceWithItems, ServiceError> {
        let (updated, items) =
            self.transition(agent_id, invoice_id, InvoiceStatus::Delivered).await?;

        self.stock.unload_invoice(agent_id, invoice_id, &items).await?;

        let _ = self
            .event_sender
            .send(Event::InvoiceDelivered {
                invoice_id,
                agent_id,
            })
            .await;
        info!(%invoice_id, "invoice delivered");

        Ok(InvoiceWithItems {
            invoice: updated,
            items,
        })
    }

    /// Cancel a pending invoice. No ledger effect either way.
    #[instrument(skip(self), fields(%invoice_id))]
    pub async fn cancel(
        &self,
        agent_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<InvoiceWithItems, ServiceError> {
        let (updated, items) =
            self.transition(agent_id, invoice_id, InvoiceStatus::Cancelled).await?;

        let _ = self
            .event_sender
            .send(Event::InvoiceCancelled {
                invoice_id,
                agent_id,
            })
            .await;

        Ok(InvoiceWithItems {
            invoice: updated,
            items,
        })
    }

    /// Single guarded pending -> terminal transition. The invoice row is
    /// locked so two racing delivery requests cannot both succeed.
    async fn transition(
        &self,
        agent_id: Uuid,
        invoice_id: Uuid,
        target: InvoiceStatus,
    ) -> Result<(invoice::Model, Vec<invoice_item::Model>), ServiceError> {
        self.db
            .transaction::<_, (invoice::Model, Vec<invoice_item::Model>), ServiceError>(
                move |txn| {
                    Box::pin(async move {
                        let found = Invoice::find_by_id(invoice_id)
                            .filter(invoice::Column::AgentId.eq(agent_id))
                            .lock_exclusive()
                            .one(txn)
                            .await
                            .map_err(ServiceError::db_error)?
                            .ok_or_else(|| {
                                ServiceError::NotFound(format!("invoice {} not found", invoice_id))
                            })?;

                        if found.status() != Some(InvoiceStatus::Pending) {
                            return Err(ServiceError::Conflict(format!(
                                "invoice {} is already {}",
                                invoice_id, found.status
                            )));
                        }

                        let items = found
                            .find_related(InvoiceItem)
                            .all(txn)
                            .await
                            .map_err(ServiceError::db_error)?;

                        let now = Utc::now();
                        let mut active: invoice::ActiveModel = found.into();
                        active.status = Set(target.as_str().to_string());
                        if target == InvoiceStatus::Delivered {
                            active.delivered_at = Set(Some(now));
                        }
                        active.updated_at = Set(now);
                        let updated = active.update(txn).await.map_err(ServiceError::db_error)?;

                        Ok((updated, items))
                    })
                },
            )
            .await
            .map_err(unwrap_txn_err)
    }

    pub async fn get(
        &self,
        agent_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<InvoiceWithItems, ServiceError> {
        let found = Invoice::find_by_id(invoice_id)
            .filter(invoice::Column::AgentId.eq(agent_id))
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("invoice {} not found", invoice_id)))?;

        let items = found
            .find_related(InvoiceItem)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;

        Ok(InvoiceWithItems {
            invoice: found,
            items,
        })
    }

    /// One agent's invoices, newest first, optionally narrowed by status.
    pub async fn list(
        &self,
        agent_id: Uuid,
        status: Option<InvoiceStatus>,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<invoice::Model>, u64), ServiceError> {
        let mut query = Invoice::find().filter(invoice::Column::AgentId.eq(agent_id));
        if let Some(status) = status {
            query = query.filter(invoice::Column::Status.eq(status.as_str()));
        }
        let paginator = query
            .order_by_desc(invoice::Column::CreatedAt)
            .paginate(self.db.as_ref(), per_page.max(1));

        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let rows = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::db_error)?;
        Ok((rows, total))
    }
}

fn validate_lines(lines: &[CommitLineInput]) -> Result<(), ServiceError> {
    if lines.is_empty() {
        return Err(ServiceError::ValidationError(
            "an invoice needs at least one line".into(),
        ));
    }
    for (idx, line) in lines.iter().enumerate() {
        if line.quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "line {}: quantity must be positive",
                idx + 1
            )));
        }
        if line.reference.trim().is_empty() && line.designation.trim().is_empty() {
            return Err(ServiceError::ValidationError(format!(
                "line {}: reference or designation is required",
                idx + 1
            )));
        }
    }
    Ok(())
}

async fn insert_lines<C: sea_orm::ConnectionTrait>(
    txn: &C,
    invoice_id: Uuid,
    lines: &[CommitLineInput],
) -> Result<Vec<invoice_item::Model>, ServiceError> {
    let mut items = Vec::with_capacity(lines.len());
    for line in lines {
        let row = invoice_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            invoice_id: Set(invoice_id),
            product_id: Set(line.product_id),
            reference: Set(line.reference.trim().to_string()),
            designation: Set(line.designation.trim().to_string()),
            quantity: Set(line.quantity),
            unit_price: Set(line.unit_price),
            line_total: Set(line.line_total),
            depot: Set(line.depot.clone()),
        };
        items.push(row.insert(txn).await.map_err(ServiceError::db_error)?);
    }
    Ok(items)
}

fn unwrap_txn_err(e: TransactionError<ServiceError>) -> ServiceError {
    match e {
        TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
        TransactionError::Transaction(service_err) => service_err,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(reference: &str, quantity: Decimal) -> CommitLineInput {
        CommitLineInput {
            product_id: None,
            reference: reference.to_string(),
            designation: "item".to_string(),
            quantity,
            unit_price: None,
            line_total: None,
            depot: None,
        }
    }

    #[test]
    fn commit_input_with_no_lines_fails_validation() {
        let input = CommitInvoiceInput::default();
        assert!(input.validate().is_err());

        let input = CommitInvoiceInput {
            lines: vec![line("REF-1", dec!(1))],
            ..Default::default()
        };
        assert!(input.validate().is_ok());
    }

    #[test]
    fn commit_input_rejects_oversized_header_fields() {
        let input = CommitInvoiceInput {
            invoice_number: Some("9".repeat(65)),
            lines: vec![line("REF-1", dec!(1))],
            ..Default::default()
        };
        assert!(input.validate().is_err());
    }

    #[test]
    fn rejects_empty_line_sets() {
        assert!(matches!(
            validate_lines(&[]),
            Err(ServiceError::ValidationError(_))
        ));
    }

    #[test]
    fn rejects_non_positive_quantities() {
        assert!(validate_lines(&[line("REF-1", dec!(0))]).is_err());
        assert!(validate_lines(&[line("REF-1", dec!(-2))]).is_err());
        assert!(validate_lines(&[line("REF-1", dec!(0.5))]).is_ok());
    }

    #[test]
    fn rejects_lines_with_no_identity() {
        let anonymous = CommitLineInput {
            product_id: None,
            reference: "  ".to_string(),
            designation: "".to_string(),
            quantity: dec!(1),
            unit_price: None,
            line_total: None,
            depot: None,
        };
        assert!(validate_lines(&[anonymous]).is_err());
    }
}
