mod common;

use rust_decimal_macros::dec;
use sea_orm::EntityTrait;
use serde_json::json;
use uuid::Uuid;

use fieldstock_api::entities::invoice_photo::{Entity as InvoicePhoto, OcrStatus};
use fieldstock_api::errors::ServiceError;
use fieldstock_api::extraction::vision::VisionError;

fn extraction_reply() -> String {
    json!({
        "supplier": "ACME Distribution",
        "document_type": "invoice",
        "invoice_number": "F-2026-088",
        "invoice_date": "2026-08-12",
        "client_name": "Store 4",
        "total_excl_tax": 43.0,
        "total_tax": 8.6,
        "total_incl_tax": 51.6,
        "delivery_location": null,
        "items": [
            { "reference": "SKU-1", "designation": "Cola 33cl", "quantity": 10, "unit_price": 2.5 },
            { "reference": "SKU-2", "designation": "Napkins", "quantity": 3, "unit_price": 6.0 }
        ]
    })
    .to_string()
}

fn classification_reply() -> String {
    json!([
        { "reference": "SKU-1", "new_category_code": "BEV", "new_category_name": "Beverages" },
        { "reference": "SKU-2", "new_category_code": "HOME", "new_category_name": "Household" }
    ])
    .to_string()
}

#[tokio::test]
async fn capture_extracts_classifies_and_resolves_every_line() {
    let app = common::spawn_app().await;
    let agent = Uuid::new_v4();

    app.vision.push_extraction(Ok(extraction_reply()));
    app.vision.push_classification(Ok(classification_reply()));

    let outcome = app
        .capture
        .capture(agent, vec![common::sample_photo(1), common::sample_photo(2)])
        .await
        .expect("capture");

    assert!(!outcome.from_cache);
    assert_eq!(outcome.photo_ids.len(), 2);
    assert_eq!(outcome.invoice.invoice_number.as_deref(), Some("F-2026-088"));
    assert_eq!(outcome.lines.len(), 2);
    for line in &outcome.lines {
        assert!(line.product_id.is_some());
        assert!(line.category_id.is_some());
    }
    assert_eq!(outcome.lines[0].item.quantity, Some(dec!(10)));

    // Photos stay stored and flip to processed.
    assert_eq!(app.store.len(), 2);
    let photos = InvoicePhoto::find().all(app.db.as_ref()).await.expect("photos");
    assert_eq!(photos.len(), 2);
    for photo in &photos {
        assert_eq!(photo.ocr_status, OcrStatus::Processed.as_str());
        assert!(photo.invoice_id.is_none());
    }
}

#[tokio::test]
async fn identical_photo_set_is_served_from_cache_without_a_model_call() {
    let app = common::spawn_app().await;
    let agent = Uuid::new_v4();

    app.vision.push_extraction(Ok(extraction_reply()));
    app.vision.push_classification(Ok(classification_reply()));
    app.vision.push_classification(Ok(classification_reply()));

    let first = app
        .capture
        .capture(agent, vec![common::sample_photo(7)])
        .await
        .expect("first capture");
    assert!(!first.from_cache);
    assert_eq!(app.vision.remaining_extractions(), 0);

    // Same bytes again: no extraction left in the script, yet this succeeds.
    let second = app
        .capture
        .capture(agent, vec![common::sample_photo(7)])
        .await
        .expect("second capture");
    assert!(second.from_cache);
    assert_eq!(
        second.invoice.invoice_number,
        first.invoice.invoice_number
    );
    // Both captures stored their own photo rows.
    assert_eq!(app.store.len(), 2);
}

#[tokio::test]
async fn unreachable_endpoint_erases_photos_entirely() {
    let app = common::spawn_app().await;
    let agent = Uuid::new_v4();

    app.vision
        .push_extraction(Err(VisionError::Unavailable("connect timeout".into())));

    let result = app.capture.capture(agent, vec![common::sample_photo(3)]).await;
    assert!(matches!(result, Err(ServiceError::ExtractionUnavailable(_))));

    // A retry must start from a clean slate: no blobs, no rows.
    assert!(app.store.is_empty());
    let photos = InvoicePhoto::find().all(app.db.as_ref()).await.expect("photos");
    assert!(photos.is_empty());
}

#[tokio::test]
async fn ungradeable_reply_keeps_failed_rows_but_releases_blobs() {
    let mut app = common::spawn_app().await;
    let agent = Uuid::new_v4();

    app.vision
        .push_extraction(Ok("The photo was too blurry to read.".into()));

    let result = app.capture.capture(agent, vec![common::sample_photo(4)]).await;
    assert!(matches!(result, Err(ServiceError::ExtractionFailed(_))));

    assert!(app.store.is_empty());
    let photos = InvoicePhoto::find().all(app.db.as_ref()).await.expect("photos");
    assert_eq!(photos.len(), 1);
    assert_eq!(photos[0].ocr_status, OcrStatus::Failed.as_str());

    // The failure is announced on the event channel.
    let mut saw_failure = false;
    while let Ok(event) = app.events.try_recv() {
        if matches!(event, fieldstock_api::events::Event::ExtractionFailed { .. }) {
            saw_failure = true;
        }
    }
    assert!(saw_failure);
}

#[tokio::test]
async fn capture_requires_at_least_one_page() {
    let app = common::spawn_app().await;
    let result = app.capture.capture(Uuid::new_v4(), vec![]).await;
    assert!(matches!(result, Err(ServiceError::ValidationError(_))));
}
