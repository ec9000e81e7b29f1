mod common;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use fieldstock_api::entities::invoice_item;
use fieldstock_api::entities::stock_movement::MovementKind;

fn item(product_id: Uuid, quantity: Decimal) -> invoice_item::Model {
    invoice_item::Model {
        id: Uuid::new_v4(),
        invoice_id: Uuid::new_v4(),
        product_id: Some(product_id),
        reference: "REF".into(),
        designation: "item".into(),
        quantity,
        unit_price: None,
        line_total: None,
        depot: None,
    }
}

async fn balance_of(app: &common::TestApp, agent: Uuid, product: Uuid) -> Decimal {
    let (rows, _) = app.stock.balances(agent, 1, 500).await.expect("balances");
    rows.iter()
        .find(|r| r.product_id == product)
        .map(|r| r.quantity)
        .unwrap_or(Decimal::ZERO)
}

/// Net effect of the in/out movement history for one (agent, product).
async fn signed_movement_sum(app: &common::TestApp, agent: Uuid, product: Uuid) -> Decimal {
    let (rows, _) = app
        .stock
        .movements(agent, Some(product), 1, 500)
        .await
        .expect("movements");
    rows.iter().fold(Decimal::ZERO, |acc, m| match m.kind() {
        Some(MovementKind::In) => acc + m.quantity,
        Some(MovementKind::Out) => acc - m.quantity,
        _ => acc,
    })
}

#[tokio::test]
async fn balance_tracks_signed_movement_sum_through_load_and_unload() {
    let app = common::spawn_app().await;
    let agent = Uuid::new_v4();
    let product = Uuid::new_v4();
    let invoice_id = Uuid::new_v4();

    let items = vec![item(product, dec!(10))];
    app.stock
        .load_invoice(agent, invoice_id, &items)
        .await
        .expect("load");
    assert_eq!(balance_of(&app, agent, product).await, dec!(10));

    app.stock
        .load_invoice(agent, Uuid::new_v4(), &[item(product, dec!(2.5))])
        .await
        .expect("second load");
    app.stock
        .unload_invoice(agent, invoice_id, &items)
        .await
        .expect("unload");

    let balance = balance_of(&app, agent, product).await;
    assert_eq!(balance, dec!(2.5));
    assert_eq!(balance, signed_movement_sum(&app, agent, product).await);
}

#[tokio::test]
async fn unload_without_load_goes_negative() {
    let app = common::spawn_app().await;
    let agent = Uuid::new_v4();
    let product = Uuid::new_v4();

    app.stock
        .unload_invoice(agent, Uuid::new_v4(), &[item(product, dec!(3))])
        .await
        .expect("unload");

    assert_eq!(balance_of(&app, agent, product).await, dec!(-3));
}

#[tokio::test]
async fn items_without_product_link_produce_no_movements() {
    let app = common::spawn_app().await;
    let agent = Uuid::new_v4();

    let mut unlinked = item(Uuid::new_v4(), dec!(4));
    unlinked.product_id = None;
    app.stock
        .load_invoice(agent, Uuid::new_v4(), &[unlinked])
        .await
        .expect("load");

    let (movements, total) = app.stock.movements(agent, None, 1, 50).await.expect("movements");
    assert!(movements.is_empty());
    assert_eq!(total, 0);
}

#[tokio::test]
async fn adjustment_sets_balance_and_logs_the_magnitude() {
    let app = common::spawn_app().await;
    let agent = Uuid::new_v4();
    let product = Uuid::new_v4();

    app.stock
        .load_invoice(agent, Uuid::new_v4(), &[item(product, dec!(10))])
        .await
        .expect("load");

    let updated = app
        .stock
        .adjust(agent, product, dec!(4), Some("physical count".into()))
        .await
        .expect("adjust down");
    assert_eq!(updated.quantity, dec!(4));

    let (movements, _) = app
        .stock
        .movements(agent, Some(product), 1, 50)
        .await
        .expect("movements");
    let adjustment = movements
        .iter()
        .find(|m| m.kind() == Some(MovementKind::Adjustment))
        .expect("adjustment row");
    assert_eq!(adjustment.quantity, dec!(6));
    assert_eq!(adjustment.note.as_deref(), Some("physical count"));

    // Adjusting to the current value still writes an auditable zero row.
    app.stock
        .adjust(agent, product, dec!(4), None)
        .await
        .expect("no-op adjust");
    let (movements, _) = app
        .stock
        .movements(agent, Some(product), 1, 50)
        .await
        .expect("movements");
    let zero = movements
        .iter()
        .filter(|m| m.kind() == Some(MovementKind::Adjustment))
        .find(|m| m.quantity == Decimal::ZERO);
    assert!(zero.is_some());
    assert_eq!(balance_of(&app, agent, product).await, dec!(4));
}

#[tokio::test]
async fn concurrent_invoices_over_different_products_keep_both_balances_right() {
    let app = common::spawn_app().await;
    let agent = Uuid::new_v4();
    let product_a = Uuid::new_v4();
    let product_b = Uuid::new_v4();

    let mut loads = Vec::new();
    for round in 1..=5u32 {
        let qty = Decimal::from(round);
        for (product, quantity) in [(product_a, qty), (product_b, qty * dec!(2))] {
            let stock = app.stock.clone();
            let items = vec![item(product, quantity)];
            loads.push(async move {
                stock.load_invoice(agent, Uuid::new_v4(), &items).await
            });
        }
    }
    for result in futures::future::join_all(loads).await {
        result.expect("load");
    }

    // 1+2+3+4+5 and its double
    assert_eq!(balance_of(&app, agent, product_a).await, dec!(15));
    assert_eq!(balance_of(&app, agent, product_b).await, dec!(30));
    assert_eq!(
        signed_movement_sum(&app, agent, product_a).await,
        dec!(15)
    );
    assert_eq!(
        signed_movement_sum(&app, agent, product_b).await,
        dec!(30)
    );
}
