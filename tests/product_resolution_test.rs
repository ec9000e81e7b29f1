mod common;

use chrono::Utc;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use fieldstock_api::entities::product::{self, Entity as Product};
use fieldstock_api::entities::product_category::{self, FALLBACK_CATEGORY_CODE};
use fieldstock_api::extraction::types::ExtractedItem;

fn extracted(reference: &str, designation: &str, price: Option<rust_decimal::Decimal>) -> ExtractedItem {
    ExtractedItem {
        reference: reference.to_string(),
        designation: designation.to_string(),
        quantity: Some(dec!(1)),
        unit_price: price,
        line_total: None,
        depot: None,
    }
}

async fn create_category(app: &common::TestApp, code: &str) -> Uuid {
    let row = product_category::ActiveModel {
        id: Set(Uuid::new_v4()),
        code: Set(code.to_string()),
        name: Set(code.to_string()),
        parent_id: Set(None),
        active: Set(true),
        created_at: Set(Utc::now()),
    };
    row.insert(app.db.as_ref()).await.expect("category").id
}

async fn product_by_sku(app: &common::TestApp, sku: &str) -> product::Model {
    Product::find()
        .filter(product::Column::Sku.eq(sku))
        .one(app.db.as_ref())
        .await
        .expect("query")
        .expect("product exists")
}

#[tokio::test]
async fn lines_without_reference_stay_unlinked() {
    let app = common::spawn_app().await;
    let resolved = app
        .resolver
        .resolve(&extracted("  ", "Unlabeled crate", None), None)
        .await
        .expect("resolve");
    assert!(resolved.is_none());
    assert!(Product::find().all(app.db.as_ref()).await.expect("all").is_empty());
}

#[tokio::test]
async fn unknown_sku_creates_product_in_fallback_category() {
    let app = common::spawn_app().await;

    let id = app
        .resolver
        .resolve(&extracted("SKU-9", "Olive oil 5L", Some(dec!(12.40))), None)
        .await
        .expect("resolve")
        .expect("product id");

    let created = product_by_sku(&app, "SKU-9").await;
    assert_eq!(created.id, id);
    assert_eq!(created.name, "Olive oil 5L");
    assert_eq!(created.price, Some(dec!(12.40)));

    let fallback = product_category::Entity::find()
        .filter(product_category::Column::Code.eq(FALLBACK_CATEGORY_CODE))
        .one(app.db.as_ref())
        .await
        .expect("query")
        .expect("fallback created lazily");
    assert_eq!(created.category_id, fallback.id);
}

#[tokio::test]
async fn repeated_sku_keeps_one_product_with_the_latest_price() {
    let app = common::spawn_app().await;

    let first = app
        .resolver
        .resolve(&extracted("SKU-7", "Flour 25kg", Some(dec!(18.00))), None)
        .await
        .expect("resolve")
        .expect("id");
    let second = app
        .resolver
        .resolve(&extracted("SKU-7", "Flour 25kg", Some(dec!(17.10))), None)
        .await
        .expect("resolve")
        .expect("id");

    assert_eq!(first, second);
    let row = product_by_sku(&app, "SKU-7").await;
    assert_eq!(row.price, Some(dec!(17.10)));
    assert!(row.price_updated_at.is_some());

    let all = Product::find().all(app.db.as_ref()).await.expect("all");
    assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn priceless_lines_leave_the_stored_price_alone() {
    let app = common::spawn_app().await;

    app.resolver
        .resolve(&extracted("SKU-5", "Sugar", Some(dec!(9.90))), None)
        .await
        .expect("resolve");
    app.resolver
        .resolve(&extracted("SKU-5", "Sugar", None), None)
        .await
        .expect("resolve");

    assert_eq!(product_by_sku(&app, "SKU-5").await.price, Some(dec!(9.90)));
}

#[tokio::test]
async fn fallback_categorized_products_can_be_reclassified() {
    let app = common::spawn_app().await;

    app.resolver
        .resolve(&extracted("SKU-3", "Sparkling water", None), None)
        .await
        .expect("resolve");

    let beverages = create_category(&app, "BEV").await;
    app.resolver
        .resolve(&extracted("SKU-3", "Sparkling water", None), Some(beverages))
        .await
        .expect("resolve");

    assert_eq!(product_by_sku(&app, "SKU-3").await.category_id, beverages);
}

#[tokio::test]
async fn manually_categorized_products_are_never_recategorized() {
    let app = common::spawn_app().await;

    let dairy = create_category(&app, "DAIRY").await;
    let snacks = create_category(&app, "SNACKS").await;

    app.resolver
        .resolve(&extracted("SKU-2", "Yogurt", None), Some(dairy))
        .await
        .expect("resolve");
    // A later classifier opinion must not move it.
    app.resolver
        .resolve(&extracted("SKU-2", "Yogurt", None), Some(snacks))
        .await
        .expect("resolve");

    assert_eq!(product_by_sku(&app, "SKU-2").await.category_id, dairy);

    // Checking against the fallback must not create the fallback row as a
    // side effect.
    let fallback = product_category::Entity::find()
        .filter(product_category::Column::Code.eq(FALLBACK_CATEGORY_CODE))
        .one(app.db.as_ref())
        .await
        .expect("query");
    assert!(fallback.is_none());
}
