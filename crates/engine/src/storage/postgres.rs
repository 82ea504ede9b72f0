//! Postgres-backed transactional store.
//!
//! Row locking discipline: every read that precedes a write to the same rows
//! goes through `SELECT ... FOR UPDATE`, so two concurrent approvals against
//! the same candidate batches serialize on the inventory record rows before
//! either applies a reservation. Serialization failures and deadlocks map to
//! [`StorageError::Conflict`] and the caller retries the whole operation.

use chrono::{DateTime, NaiveDate, Utc};
use ladle_core::{
    BatchId, BatchStatus, OrderId, OrderItemId, OrderStatus, ProductId, ShipmentId,
    ShipmentItemId, ShipmentStatus, StoreId, TransactionId, TransactionKind, UserId, WarehouseId,
};
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};

use crate::config::EngineConfig;
use crate::models::{
    Batch, BatchStock, InventoryRecord, InventoryTransaction, NewBatch, NewInventoryTransaction,
    NewOrder, NewOrderItem, NewShipment, NewShipmentItem, Order, OrderItem, Shipment, ShipmentItem,
};

use super::{Storage, StorageError, StorageTx};

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct BatchRow {
    id: BatchId,
    product_id: ProductId,
    batch_number: String,
    expiry_date: NaiveDate,
    status: BatchStatus,
    created_at: DateTime<Utc>,
}

impl From<BatchRow> for Batch {
    fn from(row: BatchRow) -> Self {
        Self {
            id: row.id,
            product_id: row.product_id,
            batch_number: row.batch_number,
            expiry_date: row.expiry_date,
            status: row.status,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct InventoryRecordRow {
    warehouse_id: WarehouseId,
    batch_id: BatchId,
    quantity: Decimal,
    reserved_quantity: Decimal,
    updated_at: DateTime<Utc>,
}

impl From<InventoryRecordRow> for InventoryRecord {
    fn from(row: InventoryRecordRow) -> Self {
        Self {
            warehouse_id: row.warehouse_id,
            batch_id: row.batch_id,
            quantity: row.quantity,
            reserved_quantity: row.reserved_quantity,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct InventoryTransactionRow {
    id: TransactionId,
    warehouse_id: WarehouseId,
    batch_id: BatchId,
    kind: TransactionKind,
    quantity_change: Decimal,
    reference: Option<String>,
    reason: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<InventoryTransactionRow> for InventoryTransaction {
    fn from(row: InventoryTransactionRow) -> Self {
        Self {
            id: row.id,
            warehouse_id: row.warehouse_id,
            batch_id: row.batch_id,
            kind: row.kind,
            quantity_change: row.quantity_change,
            reference: row.reference,
            reason: row.reason,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct BatchStockRow {
    batch_id: BatchId,
    product_id: ProductId,
    expiry_date: NaiveDate,
    quantity: Decimal,
    reserved_quantity: Decimal,
}

impl From<BatchStockRow> for BatchStock {
    fn from(row: BatchStockRow) -> Self {
        Self {
            batch_id: row.batch_id,
            product_id: row.product_id,
            expiry_date: row.expiry_date,
            quantity: row.quantity,
            reserved_quantity: row.reserved_quantity,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    store_id: StoreId,
    status: OrderStatus,
    delivery_date: NaiveDate,
    note: Option<String>,
    placed_by: UserId,
    decision_reason: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<OrderRow> for Order {
    fn from(row: OrderRow) -> Self {
        Self {
            id: row.id,
            store_id: row.store_id,
            status: row.status,
            delivery_date: row.delivery_date,
            note: row.note,
            placed_by: row.placed_by,
            decision_reason: row.decision_reason,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    id: OrderItemId,
    order_id: OrderId,
    product_id: ProductId,
    quantity_requested: Decimal,
    quantity_approved: Option<Decimal>,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        Self {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            quantity_requested: row.quantity_requested,
            quantity_approved: row.quantity_approved,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ShipmentRow {
    id: ShipmentId,
    order_id: OrderId,
    from_warehouse_id: WarehouseId,
    to_warehouse_id: WarehouseId,
    status: ShipmentStatus,
    ship_date: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<ShipmentRow> for Shipment {
    fn from(row: ShipmentRow) -> Self {
        Self {
            id: row.id,
            order_id: row.order_id,
            from_warehouse_id: row.from_warehouse_id,
            to_warehouse_id: row.to_warehouse_id,
            status: row.status,
            ship_date: row.ship_date,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ShipmentItemRow {
    id: ShipmentItemId,
    shipment_id: ShipmentId,
    batch_id: BatchId,
    quantity: Decimal,
}

impl From<ShipmentItemRow> for ShipmentItem {
    fn from(row: ShipmentItemRow) -> Self {
        Self {
            id: row.id,
            shipment_id: row.shipment_id,
            batch_id: row.batch_id,
            quantity: row.quantity,
        }
    }
}

// =============================================================================
// Storage
// =============================================================================

/// Postgres-backed store.
#[derive(Debug, Clone)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    /// Connect using engine configuration.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Backend` if the pool cannot be established.
    pub async fn connect(config: &EngineConfig) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .acquire_timeout(config.db_acquire_timeout)
            .connect(config.database_url.expose_secret())
            .await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run the embedded schema migrations.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Backend` if a migration fails.
    pub async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))
    }
}

impl Storage for PgStorage {
    type Tx = PgTx;

    async fn begin(&self) -> Result<Self::Tx, StorageError> {
        let tx = self.pool.begin().await?;
        Ok(PgTx { tx })
    }
}

/// One open Postgres transaction.
#[derive(Debug)]
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

impl StorageTx for PgTx {
    async fn commit(self) -> Result<(), StorageError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), StorageError> {
        self.tx.rollback().await?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Batches
    // -------------------------------------------------------------------------

    async fn insert_batch(&mut self, batch: NewBatch) -> Result<Batch, StorageError> {
        let row = sqlx::query_as::<_, BatchRow>(
            r"
            INSERT INTO batches (product_id, batch_number, expiry_date, status)
            VALUES ($1, $2, $3, 'pending')
            RETURNING id, product_id, batch_number, expiry_date, status, created_at
            ",
        )
        .bind(batch.product_id)
        .bind(&batch.batch_number)
        .bind(batch.expiry_date)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row.into())
    }

    async fn batch(&mut self, id: BatchId) -> Result<Option<Batch>, StorageError> {
        let row = sqlx::query_as::<_, BatchRow>(
            r"
            SELECT id, product_id, batch_number, expiry_date, status, created_at
            FROM batches
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn update_batch_status(
        &mut self,
        id: BatchId,
        status: BatchStatus,
    ) -> Result<(), StorageError> {
        sqlx::query("UPDATE batches SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn delete_batch(&mut self, id: BatchId) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM batches WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn batch_has_history(&mut self, id: BatchId) -> Result<bool, StorageError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM inventory_transactions WHERE batch_id = $1)",
        )
        .bind(id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(exists)
    }

    // -------------------------------------------------------------------------
    // Inventory records & ledger
    // -------------------------------------------------------------------------

    async fn inventory_record_for_update(
        &mut self,
        warehouse_id: WarehouseId,
        batch_id: BatchId,
    ) -> Result<Option<InventoryRecord>, StorageError> {
        let row = sqlx::query_as::<_, InventoryRecordRow>(
            r"
            SELECT warehouse_id, batch_id, quantity, reserved_quantity, updated_at
            FROM inventory_records
            WHERE warehouse_id = $1 AND batch_id = $2
            FOR UPDATE
            ",
        )
        .bind(warehouse_id)
        .bind(batch_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn upsert_inventory_record(
        &mut self,
        record: &InventoryRecord,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO inventory_records (warehouse_id, batch_id, quantity, reserved_quantity)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (warehouse_id, batch_id) DO UPDATE
            SET quantity = EXCLUDED.quantity,
                reserved_quantity = EXCLUDED.reserved_quantity,
                updated_at = now()
            ",
        )
        .bind(record.warehouse_id)
        .bind(record.batch_id)
        .bind(record.quantity)
        .bind(record.reserved_quantity)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn append_transaction(
        &mut self,
        entry: NewInventoryTransaction,
    ) -> Result<InventoryTransaction, StorageError> {
        let row = sqlx::query_as::<_, InventoryTransactionRow>(
            r"
            INSERT INTO inventory_transactions
                (warehouse_id, batch_id, kind, quantity_change, reference, reason)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, warehouse_id, batch_id, kind, quantity_change,
                      reference, reason, created_at
            ",
        )
        .bind(entry.warehouse_id)
        .bind(entry.batch_id)
        .bind(entry.kind)
        .bind(entry.quantity_change)
        .bind(&entry.reference)
        .bind(&entry.reason)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row.into())
    }

    async fn transactions_for(
        &mut self,
        warehouse_id: WarehouseId,
        batch_id: BatchId,
    ) -> Result<Vec<InventoryTransaction>, StorageError> {
        let rows = sqlx::query_as::<_, InventoryTransactionRow>(
            r"
            SELECT id, warehouse_id, batch_id, kind, quantity_change,
                   reference, reason, created_at
            FROM inventory_transactions
            WHERE warehouse_id = $1 AND batch_id = $2
            ORDER BY id ASC
            ",
        )
        .bind(warehouse_id)
        .bind(batch_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn stock_levels(
        &mut self,
        warehouse_id: WarehouseId,
        product_id: ProductId,
    ) -> Result<Vec<BatchStock>, StorageError> {
        let rows = sqlx::query_as::<_, BatchStockRow>(
            r"
            SELECT r.batch_id, b.product_id, b.expiry_date, r.quantity, r.reserved_quantity
            FROM inventory_records r
            INNER JOIN batches b ON b.id = r.batch_id
            WHERE r.warehouse_id = $1 AND b.product_id = $2 AND b.status = 'available'
            ORDER BY b.expiry_date ASC, r.batch_id ASC
            ",
        )
        .bind(warehouse_id)
        .bind(product_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn stock_levels_for_update(
        &mut self,
        warehouse_id: WarehouseId,
        product_id: ProductId,
    ) -> Result<Vec<BatchStock>, StorageError> {
        // Locks the candidate record rows before the caller reserves against
        // them; a concurrent allocation for the same product blocks here.
        let rows = sqlx::query_as::<_, BatchStockRow>(
            r"
            SELECT r.batch_id, b.product_id, b.expiry_date, r.quantity, r.reserved_quantity
            FROM inventory_records r
            INNER JOIN batches b ON b.id = r.batch_id
            WHERE r.warehouse_id = $1 AND b.product_id = $2 AND b.status = 'available'
              AND r.quantity - r.reserved_quantity > 0
            ORDER BY b.expiry_date ASC, r.batch_id ASC
            FOR UPDATE OF r
            ",
        )
        .bind(warehouse_id)
        .bind(product_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    // -------------------------------------------------------------------------
    // Orders
    // -------------------------------------------------------------------------

    async fn insert_order(&mut self, order: NewOrder) -> Result<Order, StorageError> {
        let row = sqlx::query_as::<_, OrderRow>(
            r"
            INSERT INTO orders (store_id, status, delivery_date, note, placed_by)
            VALUES ($1, 'pending', $2, $3, $4)
            RETURNING id, store_id, status, delivery_date, note, placed_by,
                      decision_reason, created_at
            ",
        )
        .bind(order.store_id)
        .bind(order.delivery_date)
        .bind(&order.note)
        .bind(order.placed_by)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row.into())
    }

    async fn insert_order_item(&mut self, item: NewOrderItem) -> Result<OrderItem, StorageError> {
        let row = sqlx::query_as::<_, OrderItemRow>(
            r"
            INSERT INTO order_items (order_id, product_id, quantity_requested)
            VALUES ($1, $2, $3)
            RETURNING id, order_id, product_id, quantity_requested, quantity_approved
            ",
        )
        .bind(item.order_id)
        .bind(item.product_id)
        .bind(item.quantity_requested)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row.into())
    }

    async fn order(&mut self, id: OrderId) -> Result<Option<Order>, StorageError> {
        let row = sqlx::query_as::<_, OrderRow>(
            r"
            SELECT id, store_id, status, delivery_date, note, placed_by,
                   decision_reason, created_at
            FROM orders
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn order_for_update(&mut self, id: OrderId) -> Result<Option<Order>, StorageError> {
        let row = sqlx::query_as::<_, OrderRow>(
            r"
            SELECT id, store_id, status, delivery_date, note, placed_by,
                   decision_reason, created_at
            FROM orders
            WHERE id = $1
            FOR UPDATE
            ",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn order_items(&mut self, order_id: OrderId) -> Result<Vec<OrderItem>, StorageError> {
        let rows = sqlx::query_as::<_, OrderItemRow>(
            r"
            SELECT id, order_id, product_id, quantity_requested, quantity_approved
            FROM order_items
            WHERE order_id = $1
            ORDER BY id ASC
            ",
        )
        .bind(order_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn update_order_status(
        &mut self,
        id: OrderId,
        status: OrderStatus,
        decision_reason: Option<String>,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
            UPDATE orders
            SET status = $2,
                decision_reason = COALESCE($3, decision_reason)
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(status)
        .bind(&decision_reason)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn set_quantity_approved(
        &mut self,
        item_id: OrderItemId,
        quantity: Decimal,
    ) -> Result<(), StorageError> {
        sqlx::query("UPDATE order_items SET quantity_approved = $2 WHERE id = $1")
            .bind(item_id)
            .bind(quantity)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Shipments
    // -------------------------------------------------------------------------

    async fn insert_shipment(&mut self, shipment: NewShipment) -> Result<Shipment, StorageError> {
        let row = sqlx::query_as::<_, ShipmentRow>(
            r"
            INSERT INTO shipments (order_id, from_warehouse_id, to_warehouse_id, status)
            VALUES ($1, $2, $3, 'preparing')
            RETURNING id, order_id, from_warehouse_id, to_warehouse_id, status,
                      ship_date, created_at
            ",
        )
        .bind(shipment.order_id)
        .bind(shipment.from_warehouse_id)
        .bind(shipment.to_warehouse_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row.into())
    }

    async fn shipment(&mut self, id: ShipmentId) -> Result<Option<Shipment>, StorageError> {
        let row = sqlx::query_as::<_, ShipmentRow>(
            r"
            SELECT id, order_id, from_warehouse_id, to_warehouse_id, status,
                   ship_date, created_at
            FROM shipments
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn shipment_for_update(
        &mut self,
        id: ShipmentId,
    ) -> Result<Option<Shipment>, StorageError> {
        let row = sqlx::query_as::<_, ShipmentRow>(
            r"
            SELECT id, order_id, from_warehouse_id, to_warehouse_id, status,
                   ship_date, created_at
            FROM shipments
            WHERE id = $1
            FOR UPDATE
            ",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn shipment_for_order(
        &mut self,
        order_id: OrderId,
    ) -> Result<Option<Shipment>, StorageError> {
        let row = sqlx::query_as::<_, ShipmentRow>(
            r"
            SELECT id, order_id, from_warehouse_id, to_warehouse_id, status,
                   ship_date, created_at
            FROM shipments
            WHERE order_id = $1
            ",
        )
        .bind(order_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn shipment_items(
        &mut self,
        shipment_id: ShipmentId,
    ) -> Result<Vec<ShipmentItem>, StorageError> {
        let rows = sqlx::query_as::<_, ShipmentItemRow>(
            r"
            SELECT id, shipment_id, batch_id, quantity
            FROM shipment_items
            WHERE shipment_id = $1
            ORDER BY id ASC
            ",
        )
        .bind(shipment_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn upsert_shipment_item(
        &mut self,
        item: NewShipmentItem,
    ) -> Result<ShipmentItem, StorageError> {
        let row = sqlx::query_as::<_, ShipmentItemRow>(
            r"
            INSERT INTO shipment_items (shipment_id, batch_id, quantity)
            VALUES ($1, $2, $3)
            ON CONFLICT (shipment_id, batch_id) DO UPDATE
            SET quantity = shipment_items.quantity + EXCLUDED.quantity
            RETURNING id, shipment_id, batch_id, quantity
            ",
        )
        .bind(item.shipment_id)
        .bind(item.batch_id)
        .bind(item.quantity)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row.into())
    }

    async fn delete_shipment_item(
        &mut self,
        shipment_id: ShipmentId,
        batch_id: BatchId,
    ) -> Result<bool, StorageError> {
        let result =
            sqlx::query("DELETE FROM shipment_items WHERE shipment_id = $1 AND batch_id = $2")
                .bind(shipment_id)
                .bind(batch_id)
                .execute(&mut *self.tx)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_shipment_status(
        &mut self,
        id: ShipmentId,
        status: ShipmentStatus,
        ship_date: Option<DateTime<Utc>>,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
            UPDATE shipments
            SET status = $2,
                ship_date = COALESCE($3, ship_date)
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(status)
        .bind(ship_date)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn rejected_batches(
        &mut self,
        shipment_id: ShipmentId,
    ) -> Result<Vec<BatchId>, StorageError> {
        let batches = sqlx::query_scalar::<_, BatchId>(
            r"
            SELECT batch_id
            FROM shipment_rejected_batches
            WHERE shipment_id = $1
            ORDER BY batch_id ASC
            ",
        )
        .bind(shipment_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(batches)
    }

    async fn insert_rejected_batch(
        &mut self,
        shipment_id: ShipmentId,
        batch_id: BatchId,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO shipment_rejected_batches (shipment_id, batch_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            ",
        )
        .bind(shipment_id)
        .bind(batch_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }
}
