//! Order fulfillment scenarios: FEFO allocation, partial fulfillment, and
//! the order decision operations.

use ladle_core::{OrderId, OrderStatus, ProductId, ShipmentStatus};
use ladle_engine::storage::{Storage, StorageTx};
use ladle_engine::{orders, EngineError};
use ladle_integration_tests::{TestContext, CENTRAL};
use rust_decimal_macros::dec;

// =============================================================================
// FEFO Allocation
// =============================================================================

#[tokio::test]
async fn test_approve_consumes_earliest_expiring_batch_first() {
    let ctx = TestContext::new();
    let early = ctx.seed_batch(1, "B-EARLY", (2026, 2, 1), dec!(50)).await;
    let late = ctx.seed_batch(1, "B-LATE", (2026, 2, 15), dec!(100)).await;

    let order = ctx.place_order(&[(1, dec!(70))]).await;
    let report = orders::approve(&ctx.storage, &ctx.catalog, order.id)
        .await
        .expect("approve");

    let line = report.lines.first().expect("one line");
    assert_eq!(line.quantity_approved, dec!(70));
    assert_eq!(line.shortfall, dec!(0));
    // The earlier batch is fully consumed before the later one is touched.
    let pairs: Vec<_> = line
        .allocations
        .iter()
        .map(|a| (a.batch_id, a.quantity))
        .collect();
    assert_eq!(pairs, vec![(early, dec!(50)), (late, dec!(20))]);

    // Reservations landed on the right records.
    let early_record = ctx.record(CENTRAL, early).await.expect("record");
    assert_eq!(early_record.reserved_quantity, dec!(50));
    let late_record = ctx.record(CENTRAL, late).await.expect("record");
    assert_eq!(late_record.reserved_quantity, dec!(20));
}

#[tokio::test]
async fn test_shipment_items_mirror_allocations() {
    let ctx = TestContext::new();
    let b1 = ctx.seed_batch(1, "B-1", (2026, 2, 1), dec!(30)).await;
    let b2 = ctx.seed_batch(2, "B-2", (2026, 3, 1), dec!(40)).await;

    let order = ctx.place_order(&[(1, dec!(30)), (2, dec!(15))]).await;
    let report = orders::approve(&ctx.storage, &ctx.catalog, order.id)
        .await
        .expect("approve");

    let mut tx = ctx.storage.begin().await.expect("begin");
    let shipment = tx
        .shipment(report.shipment_id)
        .await
        .expect("fetch")
        .expect("shipment exists");
    assert_eq!(shipment.status, ShipmentStatus::Preparing);
    assert_eq!(shipment.order_id, order.id);

    let mut items: Vec<_> = tx
        .shipment_items(shipment.id)
        .await
        .expect("items")
        .into_iter()
        .map(|item| (item.batch_id, item.quantity))
        .collect();
    items.sort();
    assert_eq!(items, vec![(b1, dec!(30)), (b2, dec!(15))]);
}

// =============================================================================
// Partial Fulfillment
// =============================================================================

#[tokio::test]
async fn test_shortfall_is_reported_not_raised() {
    let ctx = TestContext::new();
    ctx.seed_batch(1, "B-1", (2026, 2, 1), dec!(100)).await;
    ctx.seed_batch(1, "B-2", (2026, 2, 15), dec!(50)).await;

    let order = ctx.place_order(&[(1, dec!(200))]).await;
    let report = orders::approve(&ctx.storage, &ctx.catalog, order.id)
        .await
        .expect("partial fulfillment is not an error");

    let line = report.lines.first().expect("one line");
    assert_eq!(line.quantity_approved, dec!(150));
    assert_eq!(line.shortfall, dec!(50));
    assert!(!report.is_fully_allocated());

    // The approved quantity is recorded on the item, once and finally.
    let mut tx = ctx.storage.begin().await.expect("begin");
    let items = tx.order_items(order.id).await.expect("items");
    assert_eq!(
        items.first().expect("item").quantity_approved,
        Some(dec!(150))
    );
}

#[tokio::test]
async fn test_approve_with_no_stock_creates_empty_shipment() {
    let ctx = TestContext::new();
    let order = ctx.place_order(&[(1, dec!(10))]).await;

    let report = orders::approve(&ctx.storage, &ctx.catalog, order.id)
        .await
        .expect("approve");
    let line = report.lines.first().expect("one line");
    assert_eq!(line.quantity_approved, dec!(0));
    assert_eq!(line.shortfall, dec!(10));

    let mut tx = ctx.storage.begin().await.expect("begin");
    let items = tx.shipment_items(report.shipment_id).await.expect("items");
    assert!(items.is_empty());
}

// =============================================================================
// State Machine
// =============================================================================

#[tokio::test]
async fn test_approve_requires_pending() {
    let ctx = TestContext::new();
    ctx.seed_batch(1, "B-1", (2026, 2, 1), dec!(50)).await;
    let order = ctx.place_order(&[(1, dec!(10))]).await;

    orders::approve(&ctx.storage, &ctx.catalog, order.id)
        .await
        .expect("first approve");
    let err = orders::approve(&ctx.storage, &ctx.catalog, order.id)
        .await
        .expect_err("second approve must fail");
    assert!(matches!(err, EngineError::InvalidTransition { entity: "order", .. }));
}

#[tokio::test]
async fn test_reject_and_cancel_only_from_pending() {
    let ctx = TestContext::new();
    ctx.seed_batch(1, "B-1", (2026, 2, 1), dec!(50)).await;

    let order = ctx.place_order(&[(1, dec!(10))]).await;
    orders::reject(&ctx.storage, order.id, "store closed for renovation")
        .await
        .expect("reject pending");
    let rejected = ctx.order(order.id).await;
    assert_eq!(rejected.status, OrderStatus::Rejected);
    assert_eq!(
        rejected.decision_reason.as_deref(),
        Some("store closed for renovation")
    );

    // No reservations were ever made for a rejected order.
    let review = orders::review(&ctx.storage, &ctx.catalog, order.id)
        .await
        .expect("review");
    assert_eq!(review.first().expect("line").quantity_available, dec!(50));

    let approved = ctx.place_order(&[(1, dec!(10))]).await;
    orders::approve(&ctx.storage, &ctx.catalog, approved.id)
        .await
        .expect("approve");
    let err = orders::cancel(&ctx.storage, approved.id, "changed my mind")
        .await
        .expect_err("cancel after approval must fail");
    assert!(matches!(err, EngineError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_approve_unknown_order() {
    let ctx = TestContext::new();
    let err = orders::approve(&ctx.storage, &ctx.catalog, OrderId::new(404))
        .await
        .expect_err("unknown order");
    assert!(matches!(err, EngineError::NotFound { entity: "order", .. }));
}

// =============================================================================
// Review Projection
// =============================================================================

#[tokio::test]
async fn test_review_reports_availability_without_reserving() {
    let ctx = TestContext::new();
    let batch = ctx.seed_batch(1, "B-1", (2026, 2, 1), dec!(80)).await;
    let order = ctx.place_order(&[(1, dec!(100))]).await;

    let review = orders::review(&ctx.storage, &ctx.catalog, order.id)
        .await
        .expect("review");
    let line = review.first().expect("line");
    assert_eq!(line.quantity_requested, dec!(100));
    assert_eq!(line.quantity_available, dec!(80));
    assert!(!line.can_fulfill());

    // Review took nothing.
    let record = ctx.record(CENTRAL, batch).await.expect("record");
    assert_eq!(record.reserved_quantity, dec!(0));
}

#[tokio::test]
async fn test_place_validates_products_and_quantities() {
    let ctx = TestContext::new();

    let err = ctx_place(&ctx, &[]).await.expect_err("empty order");
    assert!(matches!(err, EngineError::InvalidState(_)));

    let err = ctx_place(&ctx, &[(99, dec!(5))]).await.expect_err("unknown product");
    assert!(matches!(err, EngineError::NotFound { entity: "product", .. }));

    let err = ctx_place(&ctx, &[(1, dec!(0))]).await.expect_err("zero quantity");
    assert!(matches!(err, EngineError::InvalidState(_)));
}

async fn ctx_place(
    ctx: &TestContext,
    lines: &[(i32, rust_decimal::Decimal)],
) -> Result<ladle_engine::models::Order, EngineError> {
    use ladle_engine::models::{OrderLineInput, PlaceOrderInput};
    orders::place(
        &ctx.storage,
        &ctx.catalog,
        PlaceOrderInput {
            store_id: ladle_integration_tests::STORE,
            delivery_date: ladle_integration_tests::date((2026, 6, 1)),
            note: None,
            placed_by: ladle_integration_tests::OPERATOR,
            lines: lines
                .iter()
                .map(|&(product_id, quantity)| OrderLineInput {
                    product_id: ProductId::new(product_id),
                    quantity,
                })
                .collect(),
        },
    )
    .await
}
