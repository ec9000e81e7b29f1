use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};
use tracing::debug;
use uuid::Uuid;

use crate::entities::product_category::{self, Entity as ProductCategory};
use crate::errors::ServiceError;

/// Look a category up by code. Never creates.
pub async fn find_by_code<C: ConnectionTrait>(
    db: &C,
    code: &str,
) -> Result<Option<product_category::Model>, ServiceError> {
    ProductCategory::find()
        .filter(product_category::Column::Code.eq(code))
        .one(db)
        .await
        .map_err(ServiceError::db_error)
}

/// Look a category up by code, creating it when absent. The flag reports
/// whether this call created the row.
///
/// Category codes carry a unique index; two requests racing to create the
/// same code resolve by re-reading the winner's row instead of failing.
pub async fn find_or_create_by_code<C: ConnectionTrait>(
    db: &C,
    code: &str,
    name: &str,
) -> Result<(product_category::Model, bool), ServiceError> {
    if let Some(existing) = find_by_code(db, code).await? {
        return Ok((existing, false));
    }

    let row = product_category::ActiveModel {
        id: Set(Uuid::new_v4()),
        code: Set(code.to_string()),
        name: Set(name.to_string()),
        parent_id: Set(None),
        active: Set(true),
        created_at: Set(Utc::now()),
    };

    match row.insert(db).await {
        Ok(created) => {
            debug!(code, "category created");
            Ok((created, true))
        }
        // Lost the race on the unique code index; the other writer's row wins.
        Err(_) => ProductCategory::find()
            .filter(product_category::Column::Code.eq(code))
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .map(|row| (row, false))
            .ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "category {} neither inserted nor readable",
                    code
                ))
            }),
    }
}

/// All categories currently eligible for classification.
pub async fn list_active<C: ConnectionTrait>(
    db: &C,
) -> Result<Vec<product_category::Model>, ServiceError> {
    ProductCategory::find()
        .filter(product_category::Column::Active.eq(true))
        .all(db)
        .await
        .map_err(ServiceError::db_error)
}
