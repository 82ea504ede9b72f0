//! Store-side receiving scenarios: the good/missing/damaged round trip and
//! discrepancy emission toward the claims collaborator.

use ladle_core::{OrderStatus, ShipmentStatus};
use ladle_engine::receiving::{self, ReceiptLine};
use ladle_engine::storage::{Storage, StorageTx};
use ladle_engine::{orders, shipments, EngineError};
use ladle_integration_tests::{TestContext, STORE_WAREHOUSE};
use rust_decimal_macros::dec;

fn receipt(batch_id: ladle_core::BatchId, actual: rust_decimal::Decimal, damaged: rust_decimal::Decimal) -> ReceiptLine {
    ReceiptLine {
        batch_id,
        actual_quantity: actual,
        damaged_quantity: damaged,
        reason: Some("crushed cartons".to_string()),
        evidence_urls: vec!["https://cdn.example.com/evidence/123.jpg".to_string()],
    }
}

#[tokio::test]
async fn test_receiving_round_trip_with_discrepancy() {
    let ctx = TestContext::new();
    let batch = ctx.seed_batch(1, "B-1", (2026, 2, 1), dec!(100)).await;
    let order = ctx.place_order(&[(1, dec!(100))]).await;
    let approval = orders::approve(&ctx.storage, &ctx.catalog, order.id)
        .await
        .expect("approve");
    shipments::finalize_dispatch(&ctx.storage, approval.shipment_id)
        .await
        .expect("dispatch");

    // Shipped 100; 90 arrived, 10 of those damaged.
    let report = receiving::receive_shipment(
        &ctx.storage,
        &ctx.claims,
        approval.shipment_id,
        &[receipt(batch, dec!(90), dec!(10))],
    )
    .await
    .expect("receive");

    let line = report.lines.first().expect("line");
    assert_eq!(line.good_quantity, dec!(80));
    assert_eq!(line.missing_quantity, dec!(10));

    // Good quantity entered the store's own inventory.
    let store_record = ctx.record(STORE_WAREHOUSE, batch).await.expect("record");
    assert_eq!(store_record.quantity, dec!(80));
    assert_eq!(store_record.reserved_quantity, dec!(0));

    // Exactly one discrepancy reached the claims sink.
    let recorded = ctx.claims.recorded().await;
    assert_eq!(recorded.len(), 1);
    let discrepancy = recorded.first().expect("discrepancy");
    assert_eq!(discrepancy.quantity_missing, dec!(10));
    assert_eq!(discrepancy.quantity_damaged, dec!(10));
    assert_eq!(discrepancy.batch_id, batch);
    assert_eq!(discrepancy.reason.as_deref(), Some("crushed cartons"));

    // Terminal transitions.
    let mut tx = ctx.storage.begin().await.expect("begin");
    let shipment = tx
        .shipment(approval.shipment_id)
        .await
        .expect("fetch")
        .expect("shipment");
    assert_eq!(shipment.status, ShipmentStatus::Completed);
    // Release the read transaction before re-entering the store below; the
    // memory storage holds an exclusive guard per open transaction.
    drop(tx);
    assert_eq!(ctx.order(order.id).await.status, OrderStatus::Completed);
}

#[tokio::test]
async fn test_clean_receipt_emits_no_discrepancy() {
    let ctx = TestContext::new();
    let batch = ctx.seed_batch(1, "B-1", (2026, 2, 1), dec!(60)).await;
    let order = ctx.place_order(&[(1, dec!(60))]).await;
    let approval = orders::approve(&ctx.storage, &ctx.catalog, order.id)
        .await
        .expect("approve");
    shipments::finalize_dispatch(&ctx.storage, approval.shipment_id)
        .await
        .expect("dispatch");

    let report = receiving::receive_shipment(
        &ctx.storage,
        &ctx.claims,
        approval.shipment_id,
        &[ReceiptLine {
            batch_id: batch,
            actual_quantity: dec!(60),
            damaged_quantity: dec!(0),
            reason: None,
            evidence_urls: Vec::new(),
        }],
    )
    .await
    .expect("receive");

    assert!(report.discrepancies.is_empty());
    assert!(ctx.claims.recorded().await.is_empty());
    let store_record = ctx.record(STORE_WAREHOUSE, batch).await.expect("record");
    assert_eq!(store_record.quantity, dec!(60));
}

#[tokio::test]
async fn test_invalid_counts_leave_state_untouched() {
    let ctx = TestContext::new();
    let batch = ctx.seed_batch(1, "B-1", (2026, 2, 1), dec!(50)).await;
    let order = ctx.place_order(&[(1, dec!(50))]).await;
    let approval = orders::approve(&ctx.storage, &ctx.catalog, order.id)
        .await
        .expect("approve");
    shipments::finalize_dispatch(&ctx.storage, approval.shipment_id)
        .await
        .expect("dispatch");

    let err = receiving::receive_shipment(
        &ctx.storage,
        &ctx.claims,
        approval.shipment_id,
        &[receipt(batch, dec!(20), dec!(30))],
    )
    .await
    .expect_err("damaged exceeds actual");
    assert!(matches!(err, EngineError::InvalidState(_)));

    // Nothing was imported and the shipment is still in transit.
    assert!(ctx.record(STORE_WAREHOUSE, batch).await.is_none());
    let mut tx = ctx.storage.begin().await.expect("begin");
    let shipment = tx
        .shipment(approval.shipment_id)
        .await
        .expect("fetch")
        .expect("shipment");
    assert_eq!(shipment.status, ShipmentStatus::InTransit);
    assert!(ctx.claims.recorded().await.is_empty());
}

#[tokio::test]
async fn test_receiving_requires_in_transit() {
    let ctx = TestContext::new();
    let batch = ctx.seed_batch(1, "B-1", (2026, 2, 1), dec!(50)).await;
    let order = ctx.place_order(&[(1, dec!(50))]).await;
    let approval = orders::approve(&ctx.storage, &ctx.catalog, order.id)
        .await
        .expect("approve");

    let err = receiving::receive_shipment(
        &ctx.storage,
        &ctx.claims,
        approval.shipment_id,
        &[receipt(batch, dec!(50), dec!(0))],
    )
    .await
    .expect_err("cannot receive before dispatch");
    assert!(matches!(
        err,
        EngineError::InvalidTransition { entity: "shipment", .. }
    ));
}

#[tokio::test]
async fn test_every_shipment_item_needs_a_receipt() {
    let ctx = TestContext::new();
    ctx.seed_batch(1, "B-1", (2026, 2, 1), dec!(40)).await;
    ctx.seed_batch(2, "B-2", (2026, 2, 1), dec!(40)).await;
    let order = ctx.place_order(&[(1, dec!(40)), (2, dec!(40))]).await;
    let approval = orders::approve(&ctx.storage, &ctx.catalog, order.id)
        .await
        .expect("approve");
    shipments::finalize_dispatch(&ctx.storage, approval.shipment_id)
        .await
        .expect("dispatch");

    let first_batch = approval
        .lines
        .first()
        .expect("line")
        .allocations
        .first()
        .expect("allocation")
        .batch_id;
    let err = receiving::receive_shipment(
        &ctx.storage,
        &ctx.claims,
        approval.shipment_id,
        &[receipt(first_batch, dec!(40), dec!(0))],
    )
    .await
    .expect_err("second item has no receipt");
    assert!(matches!(err, EngineError::InvalidState(_)));
}
