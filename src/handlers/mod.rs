pub mod categories;
pub mod invoices;
pub mod stock;

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::services::{capture::CaptureService, invoices::InvoiceService, stock::StockService};

/// Service handles shared by every handler through the app state.
#[derive(Clone)]
pub struct AppServices {
    pub capture: Arc<CaptureService>,
    pub invoices: Arc<InvoiceService>,
    pub stock: Arc<StockService>,
}

/// Calling agent, taken from the `X-Agent-Id` header. Authentication proper
/// lives in front of this service; the header is trusted as-is.
pub struct AgentId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AgentId
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get("x-agent-id")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Uuid::parse_str(value.trim()).ok())
            .map(AgentId)
            .ok_or_else(|| {
                ServiceError::ValidationError(
                    "missing or invalid X-Agent-Id header (expected a UUID)".into(),
                )
            })
    }
}
