//! Fieldstock API Library
//!
//! Invoice capture and mobile inventory backend: photographed invoices go
//! through vision-model extraction and catalog reconciliation, and every
//! commit or delivery moves a per-agent stock ledger.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod extraction;
pub mod handlers;
pub mod openapi;
pub mod services;
pub mod storage;

use axum::{
    extract::State,
    response::Json,
    routing::{get, post, put},
    Router,
};
use chrono::Utc;
use sea_orm::{ConnectionTrait, DatabaseConnection};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use utoipa::ToSchema;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
}

// Common query parameter defaults for list endpoints
pub(crate) fn default_page() -> u64 {
    1
}
pub(crate) fn default_limit() -> u64 {
    20
}

// Common response wrappers
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: u64, page: u64, limit: u64) -> Self {
        let limit = limit.max(1);
        Self {
            items,
            total,
            page,
            limit,
            total_pages: total.div_ceil(limit),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/invoices/capture", post(handlers::invoices::capture_invoice))
        .route(
            "/invoices",
            get(handlers::invoices::list_invoices).post(handlers::invoices::commit_invoice),
        )
        .route("/invoices/:id", get(handlers::invoices::get_invoice))
        .route(
            "/invoices/:id/items",
            put(handlers::invoices::replace_invoice_items),
        )
        .route(
            "/invoices/:id/deliver",
            post(handlers::invoices::deliver_invoice),
        )
        .route(
            "/invoices/:id/cancel",
            post(handlers::invoices::cancel_invoice),
        )
        .route("/stock", get(handlers::stock::list_balances))
        .route("/stock/movements", get(handlers::stock::list_movements))
        .route("/stock/adjust", post(handlers::stock::adjust_stock))
        .route("/categories", get(handlers::categories::list_categories))
}

/// Liveness probe.
pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Readiness probe: verifies the database answers.
pub async fn app_status(State(state): State<AppState>) -> Json<Value> {
    let db_ok = state
        .db
        .execute_unprepared("SELECT 1")
        .await
        .is_ok();

    Json(json!({
        "status": if db_ok { "ok" } else { "degraded" },
        "database": db_ok,
        "environment": state.config.environment,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}
