use axum::extract::State;
use axum::Json;

use crate::entities::product_category;
use crate::services::classifier;
use crate::{ApiResponse, ApiResult, AppState};

/// Read-only listing of the active category tree, for the review UI.
#[utoipa::path(
    get,
    path = "/api/v1/categories",
    responses((status = 200, description = "Active categories")),
    tag = "categories"
)]
pub async fn list_categories(
    State(state): State<AppState>,
) -> ApiResult<Vec<product_category::Model>> {
    let rows = classifier::list_categories(state.db.as_ref()).await?;
    Ok(Json(ApiResponse::success(rows)))
}
