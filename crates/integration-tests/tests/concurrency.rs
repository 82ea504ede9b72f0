//! Concurrent approval scenarios: reservations must never exceed on-hand
//! stock, no matter how approvals interleave.

use ladle_engine::orders;
use ladle_integration_tests::{TestContext, CENTRAL};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

#[tokio::test]
async fn test_concurrent_approvals_never_oversell() {
    let ctx = TestContext::new();
    let batch = ctx.seed_batch(1, "B-ONLY", (2026, 2, 1), dec!(50)).await;

    // Two orders for 30 each against 50 on hand.
    let first = ctx.place_order(&[(1, dec!(30))]).await;
    let second = ctx.place_order(&[(1, dec!(30))]).await;

    let task = |order_id| {
        let storage = ctx.storage.clone();
        let catalog = ctx.catalog.clone();
        tokio::spawn(async move { orders::approve(&storage, &catalog, order_id).await })
    };
    let (left, right) = tokio::join!(task(first.id), task(second.id));
    let left = left.expect("join").expect("approve");
    let right = right.expect("join").expect("approve");

    // One approval wins in full, the other gets the remainder - never both.
    let mut approved: Vec<Decimal> = [&left, &right]
        .iter()
        .map(|report| report.lines.first().expect("line").quantity_approved)
        .collect();
    approved.sort();
    assert_eq!(approved, vec![dec!(20), dec!(30)]);

    let record = ctx.record(CENTRAL, batch).await.expect("record");
    assert_eq!(record.reserved_quantity, dec!(50));
    assert!(record.reserved_quantity <= record.quantity);
}

#[tokio::test]
async fn test_many_concurrent_approvals_stay_within_stock() {
    let ctx = TestContext::new();
    let batch = ctx.seed_batch(1, "B-ONLY", (2026, 2, 1), dec!(100)).await;

    let mut order_ids = Vec::new();
    for _ in 0..6 {
        order_ids.push(ctx.place_order(&[(1, dec!(30))]).await.id);
    }

    let mut handles = Vec::new();
    for order_id in order_ids {
        let storage = ctx.storage.clone();
        let catalog = ctx.catalog.clone();
        handles.push(tokio::spawn(async move {
            orders::approve(&storage, &catalog, order_id).await
        }));
    }

    let mut total_approved = Decimal::ZERO;
    for handle in handles {
        let report = handle.await.expect("join").expect("approve");
        total_approved += report.lines.first().expect("line").quantity_approved;
    }

    // 6 x 30 = 180 requested against 100 on hand; exactly the stock is
    // reserved and not a unit more.
    assert_eq!(total_approved, dec!(100));
    let record = ctx.record(CENTRAL, batch).await.expect("record");
    assert_eq!(record.reserved_quantity, dec!(100));
    assert!(record.reserved_quantity <= record.quantity);
}
