use axum::extract::{Json, Query, State};
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::entities::{stock_level, stock_movement};
use crate::handlers::AgentId;
use crate::{ApiResponse, ApiResult, AppState, PaginatedResponse};

#[derive(Debug, Deserialize, IntoParams)]
pub struct StockListQuery {
    #[serde(default = "crate::default_page")]
    pub page: u64,
    #[serde(default = "crate::default_limit")]
    pub limit: u64,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct MovementListQuery {
    #[serde(default = "crate::default_page")]
    pub page: u64,
    #[serde(default = "crate::default_limit")]
    pub limit: u64,
    pub product_id: Option<Uuid>,
}

/// Manual balance correction after a physical count.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AdjustStockRequest {
    pub product_id: Uuid,
    /// The counted quantity the balance should now show.
    pub quantity: Decimal,
    pub note: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/stock",
    params(StockListQuery),
    responses((status = 200, description = "Vehicle balances for the agent")),
    tag = "stock"
)]
pub async fn list_balances(
    State(state): State<AppState>,
    AgentId(agent_id): AgentId,
    Query(query): Query<StockListQuery>,
) -> ApiResult<PaginatedResponse<stock_level::Model>> {
    let (rows, total) = state
        .services
        .stock
        .balances(agent_id, query.page, query.limit)
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
    path = "/api/v1/stock/movements",
    params(MovementListQuery),
    responses((status = 200, description = "Movement history, newest first")),
    tag = "stock"
)]
pub async fn list_movements(
    State(state): State<AppState>,
    AgentId(agent_id): AgentId,
    Query(query): Query<MovementListQuery>,
) -> ApiResult<PaginatedResponse<stock_movement::Model>> {
    let (rows, total) = state
        .services
        .stock
        .movements(agent_id, query.product_id, query.page, query.limit)
        .await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        rows,
        total,
        query.page,
        query.limit,
    ))))
}

/// Set one balance to a counted value; the delta lands in the movement log.
#[utoipa::path(
    post,
    path = "/api/v1/stock/adjust",
    request_body = AdjustStockRequest,
    responses((status = 200, description = "Balance corrected")),
    tag = "stock"
)]
pub async fn adjust_stock(
    State(state): State<AppState>,
    AgentId(agent_id): AgentId,
    Json(request): Json<AdjustStockRequest>,
) -> ApiResult<stock_level::Model> {
    let updated = state
        .services
        .stock
        .adjust(agent_id, request.product_id, request.quantity, request.note)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}
