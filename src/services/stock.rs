//! Per-agent stock ledger. Balances in `stock_levels` are only ever written
//! together with an append-only row in `stock_movements`, in one transaction,
//! so the balance always equals the signed sum of the movement history.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionError, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::entities::invoice_item;
use crate::entities::stock_level::{self, Entity as StockLevel};
use crate::entities::stock_movement::{self, Entity as StockMovement, MovementKind, ReferenceKind};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

pub struct StockService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl StockService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Record an invoice's inventoried lines as loads onto the agent's
    /// vehicle. Lines without a catalog link are skipped; the whole batch is
    /// one transaction.
    #[instrument(skip(self, items), fields(%agent_id, %invoice_id))]
    pub async fn load_invoice(
        &self,
        agent_id: Uuid,
        invoice_id: Uuid,
        items: &[invoice_item::Model],
    ) -> Result<(), ServiceError> {
        self.apply_invoice(agent_id, invoice_id, items, MovementKind::In)
            .await
    }

    /// Record an invoice's inventoried lines as unloads (delivery to the
    /// client). The mirror of [`load_invoice`](Self::load_invoice).
    #[instrument(skip(self, items), fields(%agent_id, %invoice_id))]
    pub async fn unload_invoice(
        &self,
        agent_id: Uuid,
        invoice_id: Uuid,
        items: &[invoice_item::Model],
    ) -> Result<(), ServiceError> {
        self.apply_invoice(agent_id, invoice_id, items, MovementKind::Out)
            .await
    }

    async fn apply_invoice(
        &self,
        agent_id: Uuid,
        invoice_id: Uuid,
        items: &[invoice_item::Model],
        kind: MovementKind,
    ) -> Result<(), ServiceError> {
        let lines: Vec<(Uuid, Decimal)> = items
            .iter()
            .filter_map(|item| item.product_id.map(|pid| (pid, item.quantity)))
            .collect();
        if lines.is_empty() {
            return Ok(());
        }

        self.db
            .transaction::<_, (), ServiceError>(move |txn| {
                Box::pin(async move {
                    for (product_id, quantity) in lines {
                        let delta = match kind {
                            MovementKind::In => quantity,
                            MovementKind::Out => -quantity,
                            MovementKind::Adjustment => quantity,
                        };
                        apply_delta(
                            txn,
                            agent_id,
                            product_id,
                            delta,
                            quantity,
                            kind,
                            Some((ReferenceKind::Invoice, invoice_id)),
                            None,
                        )
                        .await?;
                    }
                    Ok(())
                })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })?;

        info!(%agent_id, %invoice_id, kind = kind.as_str(), "invoice applied to stock ledger");
        Ok(())
    }

    /// Set one balance to a target value. The movement row records the
    /// magnitude of the change; a target equal to the current balance still
    /// writes a zero-quantity movement so the correction is auditable.
    #[instrument(skip(self), fields(%agent_id, %product_id, %target))]
    pub async fn adjust(
        &self,
        agent_id: Uuid,
        product_id: Uuid,
        target: Decimal,
        note: Option<String>,
    ) -> Result<stock_level::Model, ServiceError> {
        let updated = self
            .db
            .transaction::<_, stock_level::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let current = current_balance(txn, agent_id, product_id).await?;
                    let delta = target - current;
                    apply_delta(
                        txn,
                        agent_id,
                        product_id,
                        delta,
                        delta.abs(),
                        MovementKind::Adjustment,
                        None,
                        note,
                    )
                    .await
                })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })?;

        let _ = self
            .event_sender
            .send(Event::StockAdjusted {
                agent_id,
                product_id,
                new_quantity: updated.quantity,
            })
            .await;

        Ok(updated)
    }

    /// All balances for one agent, page-numbered from 1.
    pub async fn balances(
        &self,
        agent_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<stock_level::Model>, u64), ServiceError> {
        let paginator = StockLevel::find()
            .filter(stock_level::Column::AgentId.eq(agent_id))
            .order_by_asc(stock_level::Column::ProductId)
            .paginate(self.db.as_ref(), per_page.max(1));

        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let rows = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::db_error)?;
        Ok((rows, total))
    }

    /// Movement history for one agent, newest first, optionally narrowed to
    /// one product.
    pub async fn movements(
        &self,
        agent_id: Uuid,
        product_id: Option<Uuid>,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<stock_movement::Model>, u64), ServiceError> {
        let mut query = StockMovement::find()
            .filter(stock_movement::Column::AgentId.eq(agent_id));
        if let Some(product_id) = product_id {
            query = query.filter(stock_movement::Column::ProductId.eq(product_id));
        }
        let paginator = query
            .order_by_desc(stock_movement::Column::CreatedAt)
            .paginate(self.db.as_ref(), per_page.max(1));

        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let rows = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::db_error)?;
        Ok((rows, total))
    }
}

async fn current_balance<C: ConnectionTrait>(
    txn: &C,
    agent_id: Uuid,
    product_id: Uuid,
) -> Result<Decimal, ServiceError> {
    Ok(StockLevel::find()
        .filter(stock_level::Column::AgentId.eq(agent_id))
        .filter(stock_level::Column::ProductId.eq(product_id))
        .one(txn)
        .await
        .map_err(ServiceError::db_error)?
        .map(|row| row.quantity)
        .unwrap_or(Decimal::ZERO))
}

/// Move one balance by `delta` and append the matching movement row. Callers
/// run this inside a transaction; the balance row is locked for the duration.
#[allow(clippy::too_many_arguments)]
async fn apply_delta<C: ConnectionTrait>(
    txn: &C,
    agent_id: Uuid,
    product_id: Uuid,
    delta: Decimal,
    movement_quantity: Decimal,
    kind: MovementKind,
    reference: Option<(ReferenceKind, Uuid)>,
    note: Option<String>,
) -> Result<stock_level::Model, ServiceError> {
    let now = Utc::now();

    let existing = StockLevel::find()
        .filter(stock_level::Column::AgentId.eq(agent_id))
        .filter(stock_level::Column::ProductId.eq(product_id))
        .lock_exclusive()
        .one(txn)
        .await
        .map_err(ServiceError::db_error)?;

    let updated = match existing {
        Some(row) => {
            let new_quantity = row.quantity + delta;
            let mut active: stock_level::ActiveModel = row.into();
            active.quantity = Set(new_quantity);
            active.updated_at = Set(now);
            active.update(txn).await.map_err(ServiceError::db_error)?
        }
        None => {
            let row = stock_level::ActiveModel {
                id: Set(Uuid::new_v4()),
                agent_id: Set(agent_id),
                product_id: Set(product_id),
                quantity: Set(delta),
                updated_at: Set(now),
            };
            row.insert(txn).await.map_err(ServiceError::db_error)?
        }
    };

    let (reference_kind, reference_id) = match reference {
        Some((kind, id)) => (Some(kind.as_str().to_string()), Some(id)),
        None => (None, None),
    };

    let movement = stock_movement::ActiveModel {
        id: Set(Uuid::new_v4()),
        agent_id: Set(agent_id),
        product_id: Set(product_id),
        kind: Set(kind.as_str().to_string()),
        quantity: Set(movement_quantity),
        reference_kind: Set(reference_kind),
        reference_id: Set(reference_id),
        note: Set(note),
        created_at: Set(now),
    };
    movement.insert(txn).await.map_err(ServiceError::db_error)?;

    Ok(updated)
}
