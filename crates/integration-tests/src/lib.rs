//! Integration tests for Ladle.
//!
//! Scenario tests exercise the whole fulfillment flow - intake, order
//! placement, approval, dispatch, replacement, receiving - against the
//! in-memory transactional store, a static catalog, and a recording claims
//! sink. The shared [`TestContext`] wires those three together.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p ladle-integration-tests
//! ```

use chrono::NaiveDate;
use rust_decimal::Decimal;

use ladle_core::{BatchId, OrderId, ProductId, StoreId, TransactionKind, UserId, WarehouseId};
use ladle_engine::catalog::{ProductInfo, StaticCatalog};
use ladle_engine::claims::MemoryClaims;
use ladle_engine::models::{
    InventoryRecord, NewBatch, Order, OrderLineInput, PlaceOrderInput,
};
use ladle_engine::storage::memory::MemoryStorage;
use ladle_engine::storage::{Storage, StorageTx};
use ladle_engine::{batches, ledger, orders};

/// Central warehouse every order is fulfilled from.
pub const CENTRAL: WarehouseId = WarehouseId::new(1);
/// The test franchise store.
pub const STORE: StoreId = StoreId::new(5);
/// The test store's internal warehouse.
pub const STORE_WAREHOUSE: WarehouseId = WarehouseId::new(50);
/// User placing and approving orders in tests.
pub const OPERATOR: UserId = UserId::new(1);

/// Shared wiring for scenario tests.
pub struct TestContext {
    pub storage: MemoryStorage,
    pub catalog: StaticCatalog,
    pub claims: MemoryClaims,
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TestContext {
    /// Fresh store with three active products and one franchise store.
    ///
    /// Installs a test subscriber once so `RUST_LOG` surfaces engine traces
    /// while debugging failures.
    #[must_use]
    pub fn new() -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let catalog = StaticCatalog::new(CENTRAL)
            .with_store(STORE, STORE_WAREHOUSE)
            .with_product(product(1, "DOUGH-01", "kg", 14))
            .with_product(product(2, "SAUCE-01", "kg", 10))
            .with_product(product(3, "CHEESE-01", "kg", 21));
        Self {
            storage: MemoryStorage::new(),
            catalog,
            claims: MemoryClaims::new(),
        }
    }

    /// Register an available batch and import `quantity` into the central
    /// warehouse.
    pub async fn seed_batch(
        &self,
        product_id: i32,
        batch_number: &str,
        expiry: (i32, u32, u32),
        quantity: Decimal,
    ) -> BatchId {
        let batch = batches::register(
            &self.storage,
            &self.catalog,
            NewBatch {
                product_id: ProductId::new(product_id),
                batch_number: batch_number.to_string(),
                expiry_date: date(expiry),
            },
        )
        .await
        .expect("register batch");
        batches::mark_available(&self.storage, batch.id)
            .await
            .expect("mark available");

        let mut tx = self.storage.begin().await.expect("begin");
        ledger::receive(
            &mut tx,
            CENTRAL,
            batch.id,
            quantity,
            TransactionKind::Import,
            Some(format!("intake:{batch_number}")),
            None,
        )
        .await
        .expect("import stock");
        tx.commit().await.expect("commit");
        batch.id
    }

    /// Place a pending order for `(product_id, quantity)` lines.
    pub async fn place_order(&self, lines: &[(i32, Decimal)]) -> Order {
        orders::place(
            &self.storage,
            &self.catalog,
            PlaceOrderInput {
                store_id: STORE,
                delivery_date: date((2026, 6, 1)),
                note: None,
                placed_by: OPERATOR,
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
        .expect("place order")
    }

    /// Current inventory record, if one exists.
    pub async fn record(
        &self,
        warehouse_id: WarehouseId,
        batch_id: BatchId,
    ) -> Option<InventoryRecord> {
        let mut tx = self.storage.begin().await.expect("begin");
        tx.inventory_record_for_update(warehouse_id, batch_id)
            .await
            .expect("fetch record")
    }

    /// Current order state.
    pub async fn order(&self, order_id: OrderId) -> Order {
        let mut tx = self.storage.begin().await.expect("begin");
        tx.order(order_id)
            .await
            .expect("fetch order")
            .expect("order exists")
    }
}

fn product(id: i32, sku: &str, unit: &str, shelf_life_days: i32) -> ProductInfo {
    ProductInfo {
        id: ProductId::new(id),
        sku: sku.to_string(),
        unit: unit.to_string(),
        shelf_life_days,
        is_active: true,
    }
}

/// Build a `NaiveDate` from a `(year, month, day)` tuple.
#[must_use]
pub fn date((year, month, day): (i32, u32, u32)) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}
