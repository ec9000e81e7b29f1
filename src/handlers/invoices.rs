use axum::extract::{Json, Path, Query, State};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::entities::invoice::{self, InvoiceStatus};
use crate::errors::ServiceError;
use crate::handlers::AgentId;
use crate::services::capture::CaptureOutcome;
use crate::services::invoices::{CommitInvoiceInput, CommitLineInput, InvoiceWithItems};
use crate::{ApiResponse, ApiResult, AppState, PaginatedResponse};

/// Photographed document pages, base64-encoded, in reading order.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CaptureRequest {
    pub pages: Vec<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReplaceItemsRequest {
    pub lines: Vec<CommitLineInput>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct InvoiceListQuery {
    #[serde(default = "crate::default_page")]
    pub page: u64,
    #[serde(default = "crate::default_limit")]
    pub limit: u64,
    pub status: Option<InvoiceStatus>,
}

/// Run the extraction pipeline over uploaded photos. Nothing is committed;
/// the agent reviews the outcome first.
#[utoipa::path(
    post,
    path = "/api/v1/invoices/capture",
    request_body = CaptureRequest,
    responses(
        (status = 200, description = "Extraction outcome for review"),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 422, description = "Model reply held no invoice", body = crate::errors::ErrorResponse),
        (status = 502, description = "Vision endpoint unavailable", body = crate::errors::ErrorResponse)
    ),
    tag = "invoices"
)]
pub async fn capture_invoice(
    State(state): State<AppState>,
    AgentId(agent_id): AgentId,
    Json(request): Json<CaptureRequest>,
) -> ApiResult<CaptureOutcome> {
    let mut pages = Vec::with_capacity(request.pages.len());
    for (idx, encoded) in request.pages.iter().enumerate() {
        let decoded = STANDARD.decode(encoded.trim()).map_err(|e| {
            ServiceError::ValidationError(format!("page {} is not valid base64: {}", idx + 1, e))
        })?;
        pages.push(Bytes::from(decoded));
    }

    let outcome = state.services.capture.capture(agent_id, pages).await?;
    Ok(Json(ApiResponse::success(outcome)))
}

/// Persist a reviewed invoice and load its lines onto the agent's vehicle.
#[utoipa::path(
    post,
    path = "/api/v1/invoices",
    request_body = CommitInvoiceInput,
    responses(
        (status = 200, description = "Invoice committed as pending"),
        (status = 400, description = "Invalid lines", body = crate::errors::ErrorResponse)
    ),
    tag = "invoices"
)]
pub async fn commit_invoice(
    State(state): State<AppState>,
    AgentId(agent_id): AgentId,
    Json(input): Json<CommitInvoiceInput>,
) -> ApiResult<InvoiceWithItems> {
    let committed = state.services.invoices.commit(agent_id, input).await?;
    Ok(Json(ApiResponse::success(committed)))
}

#[utoipa::path(
    get,
    path = "/api/v1/invoices",
    params(InvoiceListQuery),
    responses((status = 200, description = "Agent's invoices, newest first")),
    tag = "invoices"
)]
pub async fn list_invoices(
    State(state): State<AppState>,
    AgentId(agent_id): AgentId,
    Query(query): Query<InvoiceListQuery>,
) -> ApiResult<PaginatedResponse<invoice::Model>> {
    let (rows, total) = state
        .services
        .invoices
        .list(agent_id, query.status, query.page, query.limit)
        .await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        rows,
        total,
        query.page,
        query.limit,
    ))))
}

#[utoipa::path(
    get,
    path = "/api/v1/invoices/{id}",
    responses(
        (status = 200, description = "Invoice with items"),
        (status = 404, description = "Unknown invoice", body = crate::errors::ErrorResponse)
    ),
    tag = "invoices"
)]
pub async fn get_invoice(
    State(state): State<AppState>,
    AgentId(agent_id): AgentId,
    Path(id): Path<Uuid>,
) -> ApiResult<InvoiceWithItems> {
    let found = state.services.invoices.get(agent_id, id).await?;
    Ok(Json(ApiResponse::success(found)))
}

/// Replace every item on a pending invoice.
#[utoipa::path(
    put,
    path = "/api/v1/invoices/{id}/items",
    request_body = ReplaceItemsRequest,
    responses(
        (status = 200, description = "Items replaced"),
        (status = 409, description = "Invoice no longer pending", body = crate::errors::ErrorResponse)
    ),
    tag = "invoices"
)]
pub async fn replace_invoice_items(
    State(state): State<AppState>,
    AgentId(agent_id): AgentId,
    Path(id): Path<Uuid>,
    Json(request): Json<ReplaceItemsRequest>,
) -> ApiResult<InvoiceWithItems> {
    let updated = state
        .services
        .invoices
        .replace_items(agent_id, id, request.lines)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

/// Mark a pending invoice delivered and unload its lines from the vehicle.
#[utoipa::path(
    post,
    path = "/api/v1/invoices/{id}/deliver",
    responses(
        (status = 200, description = "Invoice delivered"),
        (status = 409, description = "Invoice already terminal", body = crate::errors::ErrorResponse)
    ),
    tag = "invoices"
)]
pub async fn deliver_invoice(
    State(state): State<AppState>,
    AgentId(agent_id): AgentId,
    Path(id): Path<Uuid>,
) -> ApiResult<InvoiceWithItems> {
    let delivered = state.services.invoices.deliver(agent_id, id).await?;
    Ok(Json(ApiResponse::success(delivered)))
}

#[utoipa::path(
    post,
    path = "/api/v1/invoices/{id}/cancel",
    responses(
        (status = 200, description = "Invoice cancelled"),
        (status = 409, description = "Invoice already terminal", body = crate::errors::ErrorResponse)
    ),
    tag = "invoices"
)]
pub async fn cancel_invoice(
    State(state): State<AppState>,
    AgentId(agent_id): AgentId,
    Path(id): Path<Uuid>,
) -> ApiResult<InvoiceWithItems> {
    let cancelled = state.services.invoices.cancel(agent_id, id).await?;
    Ok(Json(ApiResponse::success(cancelled)))
}
