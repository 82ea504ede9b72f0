//! Transactional storage abstraction.
//!
//! Every public engine operation runs inside exactly one [`StorageTx`]. The
//! transaction is passed explicitly to the ledger and allocator by their
//! caller - nothing ever falls back to an un-transacted connection, which is
//! what keeps multi-step operations atomic.
//!
//! Two implementations ship with the engine:
//!
//! - [`PgStorage`](postgres::PgStorage) - Postgres via sqlx; candidate rows
//!   are locked with `SELECT ... FOR UPDATE` before any reservation is
//!   applied, closing the read-then-reserve race.
//! - [`MemoryStorage`](memory::MemoryStorage) - in-process store for tests
//!   and local development; transactions serialize through a single writer
//!   lock and stage their writes, applied atomically on commit (equivalent
//!   to serializable isolation).

pub mod memory;
pub mod postgres;

use chrono::{DateTime, Utc};
use ladle_core::{
    BatchId, BatchStatus, OrderId, OrderItemId, OrderStatus, ProductId, ShipmentId,
    ShipmentStatus, WarehouseId,
};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::{
    Batch, BatchStock, InventoryRecord, InventoryTransaction, NewBatch, NewInventoryTransaction,
    NewOrder, NewOrderItem, NewShipment, NewShipmentItem, Order, OrderItem, Shipment, ShipmentItem,
};

/// Storage-layer error.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend failure (connection, query, decode).
    #[error("storage backend error: {0}")]
    Backend(String),

    /// Transaction-level serialization conflict; the caller retries the whole
    /// operation from scratch.
    #[error("serialization conflict, retry the operation")]
    Conflict,
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        // 40001 = serialization_failure, 40P01 = deadlock_detected. Both are
        // resolved by retrying the whole transaction.
        if let sqlx::Error::Database(db_err) = &err {
            if matches!(db_err.code().as_deref(), Some("40001" | "40P01")) {
                return Self::Conflict;
            }
        }
        Self::Backend(err.to_string())
    }
}

/// Handle to a transactional store.
#[allow(async_fn_in_trait)]
pub trait Storage: Send + Sync {
    /// The transaction type this store produces.
    type Tx: StorageTx;

    /// Begin a transaction. Dropping the transaction without committing
    /// rolls it back.
    async fn begin(&self) -> Result<Self::Tx, StorageError>;
}

/// One open transaction.
///
/// `*_for_update` reads lock the returned rows until commit or rollback;
/// they must be used for every read that precedes a write to the same rows.
#[allow(async_fn_in_trait)]
pub trait StorageTx: Send + Sized {
    /// Commit all staged writes atomically.
    async fn commit(self) -> Result<(), StorageError>;

    /// Explicitly roll back. Equivalent to dropping the transaction.
    async fn rollback(self) -> Result<(), StorageError>;

    // -------------------------------------------------------------------------
    // Batches
    // -------------------------------------------------------------------------

    async fn insert_batch(&mut self, batch: NewBatch) -> Result<Batch, StorageError>;

    async fn batch(&mut self, id: BatchId) -> Result<Option<Batch>, StorageError>;

    async fn update_batch_status(
        &mut self,
        id: BatchId,
        status: BatchStatus,
    ) -> Result<(), StorageError>;

    /// Delete a batch row. Returns whether a row was deleted. Callers enforce
    /// the lifecycle rules (pending status, zero ledger history).
    async fn delete_batch(&mut self, id: BatchId) -> Result<bool, StorageError>;

    /// Whether any ledger entry references this batch in any warehouse.
    async fn batch_has_history(&mut self, id: BatchId) -> Result<bool, StorageError>;

    // -------------------------------------------------------------------------
    // Inventory records & ledger
    // -------------------------------------------------------------------------

    /// Locking read of one `(warehouse, batch)` record.
    async fn inventory_record_for_update(
        &mut self,
        warehouse_id: WarehouseId,
        batch_id: BatchId,
    ) -> Result<Option<InventoryRecord>, StorageError>;

    /// Create or update the record for `(record.warehouse_id, record.batch_id)`.
    async fn upsert_inventory_record(
        &mut self,
        record: &InventoryRecord,
    ) -> Result<(), StorageError>;

    /// Append one ledger entry (write-once).
    async fn append_transaction(
        &mut self,
        entry: NewInventoryTransaction,
    ) -> Result<InventoryTransaction, StorageError>;

    /// Full ledger history for a `(warehouse, batch)` pair, oldest first.
    async fn transactions_for(
        &mut self,
        warehouse_id: WarehouseId,
        batch_id: BatchId,
    ) -> Result<Vec<InventoryTransaction>, StorageError>;

    /// Stock records for `(warehouse, product)` joined to available batches,
    /// ordered ascending by `(expiry_date, batch_id)`. Non-locking; used by
    /// read-only projections.
    async fn stock_levels(
        &mut self,
        warehouse_id: WarehouseId,
        product_id: ProductId,
    ) -> Result<Vec<BatchStock>, StorageError>;

    /// Allocator candidate set: like [`StorageTx::stock_levels`] but locking
    /// the underlying records and filtered to `quantity - reserved > 0`.
    async fn stock_levels_for_update(
        &mut self,
        warehouse_id: WarehouseId,
        product_id: ProductId,
    ) -> Result<Vec<BatchStock>, StorageError>;

    // -------------------------------------------------------------------------
    // Orders
    // -------------------------------------------------------------------------

    async fn insert_order(&mut self, order: NewOrder) -> Result<Order, StorageError>;

    async fn insert_order_item(&mut self, item: NewOrderItem) -> Result<OrderItem, StorageError>;

    async fn order(&mut self, id: OrderId) -> Result<Option<Order>, StorageError>;

    /// Locking read of one order row.
    async fn order_for_update(&mut self, id: OrderId) -> Result<Option<Order>, StorageError>;

    async fn order_items(&mut self, order_id: OrderId) -> Result<Vec<OrderItem>, StorageError>;

    async fn update_order_status(
        &mut self,
        id: OrderId,
        status: OrderStatus,
        decision_reason: Option<String>,
    ) -> Result<(), StorageError>;

    /// Record the allocation outcome for one item (set exactly once).
    async fn set_quantity_approved(
        &mut self,
        item_id: OrderItemId,
        quantity: Decimal,
    ) -> Result<(), StorageError>;

    // -------------------------------------------------------------------------
    // Shipments
    // -------------------------------------------------------------------------

    async fn insert_shipment(&mut self, shipment: NewShipment) -> Result<Shipment, StorageError>;

    async fn shipment(&mut self, id: ShipmentId) -> Result<Option<Shipment>, StorageError>;

    /// Locking read of one shipment row.
    async fn shipment_for_update(
        &mut self,
        id: ShipmentId,
    ) -> Result<Option<Shipment>, StorageError>;

    async fn shipment_for_order(
        &mut self,
        order_id: OrderId,
    ) -> Result<Option<Shipment>, StorageError>;

    async fn shipment_items(
        &mut self,
        shipment_id: ShipmentId,
    ) -> Result<Vec<ShipmentItem>, StorageError>;

    /// Add stock to a shipment; quantities sum if the `(shipment, batch)`
    /// row already exists.
    async fn upsert_shipment_item(
        &mut self,
        item: NewShipmentItem,
    ) -> Result<ShipmentItem, StorageError>;

    /// Remove one `(shipment, batch)` row. Returns whether a row was deleted.
    async fn delete_shipment_item(
        &mut self,
        shipment_id: ShipmentId,
        batch_id: BatchId,
    ) -> Result<bool, StorageError>;

    async fn update_shipment_status(
        &mut self,
        id: ShipmentId,
        status: ShipmentStatus,
        ship_date: Option<DateTime<Utc>>,
    ) -> Result<(), StorageError>;

    /// Batches previously rejected (damage-replaced) on this shipment.
    async fn rejected_batches(
        &mut self,
        shipment_id: ShipmentId,
    ) -> Result<Vec<BatchId>, StorageError>;

    async fn insert_rejected_batch(
        &mut self,
        shipment_id: ShipmentId,
        batch_id: BatchId,
    ) -> Result<(), StorageError>;
}
