//! Postgres-backed engine tests.
//!
//! Ignored by default; run them against a disposable database with
//!
//! ```bash
//! DATABASE_URL=postgres://localhost/ladle_test \
//!     cargo test -p ladle-integration-tests -- --ignored
//! ```

use std::time::Duration;

use ladle_core::{ProductId, TransactionKind};
use ladle_engine::config::EngineConfig;
use ladle_engine::models::NewBatch;
use ladle_engine::storage::postgres::PgStorage;
use ladle_engine::storage::{Storage, StorageTx};
use ladle_engine::{batches, ledger, orders, shipments};
use ladle_integration_tests::{date, CENTRAL};
use rust_decimal_macros::dec;
use secrecy::SecretString;

async fn pg_storage() -> PgStorage {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must point at a test database");
    let config = EngineConfig {
        database_url: SecretString::from(url),
        db_max_connections: 4,
        db_acquire_timeout: Duration::from_secs(5),
    };
    let storage = PgStorage::connect(&config).await.expect("connect");
    storage.migrate().await.expect("migrate");
    storage
}

fn unique_batch_number(prefix: &str) -> String {
    // Distinct per run so repeated invocations against the same database
    // don't collide.
    format!("{prefix}-{}", std::process::id())
}

#[tokio::test]
#[ignore = "requires DATABASE_URL pointing at a migrated Postgres"]
async fn test_pg_ledger_reserve_dispatch_roundtrip() {
    let storage = pg_storage().await;
    let catalog = ladle_engine::catalog::StaticCatalog::new(CENTRAL).with_product(
        ladle_engine::catalog::ProductInfo {
            id: ProductId::new(1),
            sku: "DOUGH-01".to_string(),
            unit: "kg".to_string(),
            shelf_life_days: 14,
            is_active: true,
        },
    );

    let batch = batches::register(
        &storage,
        &catalog,
        NewBatch {
            product_id: ProductId::new(1),
            batch_number: unique_batch_number("PG"),
            expiry_date: date((2026, 9, 1)),
        },
    )
    .await
    .expect("register");
    batches::mark_available(&storage, batch.id).await.expect("available");

    let mut tx = storage.begin().await.expect("begin");
    ledger::receive(
        &mut tx,
        CENTRAL,
        batch.id,
        dec!(25),
        TransactionKind::Import,
        None,
        None,
    )
    .await
    .expect("import");
    ledger::reserve(&mut tx, CENTRAL, batch.id, dec!(10)).await.expect("reserve");
    ledger::dispatch(&mut tx, CENTRAL, batch.id, dec!(10), "shipment:test")
        .await
        .expect("dispatch");
    tx.commit().await.expect("commit");

    let mut tx = storage.begin().await.expect("begin");
    let record = tx
        .inventory_record_for_update(CENTRAL, batch.id)
        .await
        .expect("fetch")
        .expect("record");
    assert_eq!(record.quantity, dec!(15));
    assert_eq!(record.reserved_quantity, dec!(0));

    let entries = tx.transactions_for(CENTRAL, batch.id).await.expect("entries");
    let total: rust_decimal::Decimal = entries.iter().map(|entry| entry.quantity_change).sum();
    assert_eq!(total, record.quantity);
    tx.rollback().await.expect("rollback");
}

#[tokio::test]
#[ignore = "requires DATABASE_URL pointing at a migrated Postgres"]
async fn test_pg_full_fulfillment_flow() {
    let storage = pg_storage().await;
    let store_warehouse = ladle_integration_tests::STORE_WAREHOUSE;
    let catalog = ladle_engine::catalog::StaticCatalog::new(CENTRAL)
        .with_store(ladle_integration_tests::STORE, store_warehouse)
        .with_product(ladle_engine::catalog::ProductInfo {
            id: ProductId::new(1),
            sku: "DOUGH-01".to_string(),
            unit: "kg".to_string(),
            shelf_life_days: 14,
            is_active: true,
        });

    let batch = batches::register(
        &storage,
        &catalog,
        NewBatch {
            product_id: ProductId::new(1),
            batch_number: unique_batch_number("PG-CONC"),
            expiry_date: date((2026, 9, 1)),
        },
    )
    .await
    .expect("register");
    batches::mark_available(&storage, batch.id).await.expect("available");

    let mut tx = storage.begin().await.expect("begin");
    ledger::receive(
        &mut tx,
        CENTRAL,
        batch.id,
        dec!(50),
        TransactionKind::Import,
        None,
        None,
    )
    .await
    .expect("import");
    tx.commit().await.expect("commit");

    // Drain the batch with one order, then dispatch so the stock leaves and
    // row locking has been exercised end to end.
    let order = orders::place(
        &storage,
        &catalog,
        ladle_engine::models::PlaceOrderInput {
            store_id: ladle_integration_tests::STORE,
            delivery_date: date((2026, 9, 15)),
            note: None,
            placed_by: ladle_integration_tests::OPERATOR,
            lines: vec![ladle_engine::models::OrderLineInput {
                product_id: ProductId::new(1),
                quantity: dec!(50),
            }],
        },
    )
    .await
    .expect("place");
    let approval = orders::approve(&storage, &catalog, order.id).await.expect("approve");
    shipments::finalize_dispatch(&storage, approval.shipment_id)
        .await
        .expect("dispatch");

    let mut tx = storage.begin().await.expect("begin");
    let record = tx
        .inventory_record_for_update(CENTRAL, batch.id)
        .await
        .expect("fetch")
        .expect("record");
    assert_eq!(record.quantity, dec!(0));
    assert_eq!(record.reserved_quantity, dec!(0));
    tx.rollback().await.expect("rollback");
}
