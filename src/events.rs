use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Events emitted by the capture and ledger flows. Consumed by a single
/// background task; delivery is best-effort and never blocks a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    InvoiceCaptured {
        agent_id: Uuid,
        photo_ids: Vec<Uuid>,
        line_count: usize,
    },
    InvoiceCommitted {
        invoice_id: Uuid,
        agent_id: Uuid,
    },
    InvoiceDelivered {
        invoice_id: Uuid,
        agent_id: Uuid,
    },
    InvoiceCancelled {
        invoice_id: Uuid,
        agent_id: Uuid,
    },
    ProductCreated {
        product_id: Uuid,
        sku: String,
    },
    CategoryCreated {
        category_id: Uuid,
        code: String,
    },
    StockAdjusted {
        agent_id: Uuid,
        product_id: Uuid,
        new_quantity: Decimal,
    },
    ExtractionFailed {
        agent_id: Uuid,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Drain the event channel, logging each event. A real deployment would fan
/// these out to webhooks or a queue; the log is the contract here.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::InvoiceDelivered {
                invoice_id,
                agent_id,
            } => {
                info!(%invoice_id, %agent_id, "invoice delivered");
            }
            Event::ExtractionFailed { agent_id, reason } => {
                warn!(%agent_id, %reason, "extraction failed");
            }
            other => {
                info!(event = ?other, "event processed");
            }
        }
    }
    info!("Event channel closed; processor exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sender_delivers_to_processor() {
        let (tx, mut rx) = mpsc::channel(8);
        let sender = EventSender::new(tx);
        sender
            .send(Event::ProductCreated {
                product_id: Uuid::new_v4(),
                sku: "SKU-1".into(),
            })
            .await
            .expect("send should succeed");

        match rx.recv().await {
            Some(Event::ProductCreated { sku, .. }) => assert_eq!(sku, "SKU-1"),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
