//! In-memory transactional store.
//!
//! Intended for tests and local development. Transactions acquire the single
//! writer lock for their whole lifetime and mutate a staged copy of the
//! state; `commit` swaps the staged copy in atomically and dropping the
//! transaction discards it. One writer at a time is strictly stronger than
//! the row locking the Postgres implementation uses, so every interleaving
//! that is possible here is also possible there.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ladle_core::{
    BatchId, BatchStatus, OrderId, OrderItemId, OrderStatus, ProductId, ShipmentId,
    ShipmentItemId, ShipmentStatus, TransactionId, WarehouseId,
};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::models::{
    Batch, BatchStock, InventoryRecord, InventoryTransaction, NewBatch, NewInventoryTransaction,
    NewOrder, NewOrderItem, NewShipment, NewShipmentItem, Order, OrderItem, Shipment, ShipmentItem,
};

use super::{Storage, StorageError, StorageTx};

#[derive(Debug, Default, Clone)]
struct MemoryState {
    batches: BTreeMap<BatchId, Batch>,
    records: BTreeMap<(WarehouseId, BatchId), InventoryRecord>,
    transactions: Vec<InventoryTransaction>,
    orders: BTreeMap<OrderId, Order>,
    order_items: BTreeMap<OrderItemId, OrderItem>,
    shipments: BTreeMap<ShipmentId, Shipment>,
    shipment_items: BTreeMap<ShipmentItemId, ShipmentItem>,
    rejected_batches: BTreeSet<(ShipmentId, BatchId)>,
    next_id: i32,
}

impl MemoryState {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-process transactional store.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStorage {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<Self::Tx, StorageError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let staged = guard.clone();
        Ok(MemoryTx { guard, staged })
    }
}

/// One open transaction against a [`MemoryStorage`].
#[derive(Debug)]
pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
}

impl StorageTx for MemoryTx {
    async fn commit(mut self) -> Result<(), StorageError> {
        *self.guard = self.staged;
        Ok(())
    }

    async fn rollback(self) -> Result<(), StorageError> {
        // Dropping the staged state discards every write.
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Batches
    // -------------------------------------------------------------------------

    async fn insert_batch(&mut self, batch: NewBatch) -> Result<Batch, StorageError> {
        let id = BatchId::new(self.staged.next_id());
        let batch = Batch {
            id,
            product_id: batch.product_id,
            batch_number: batch.batch_number,
            expiry_date: batch.expiry_date,
            status: BatchStatus::Pending,
            created_at: Utc::now(),
        };
        self.staged.batches.insert(id, batch.clone());
        Ok(batch)
    }

    async fn batch(&mut self, id: BatchId) -> Result<Option<Batch>, StorageError> {
        Ok(self.staged.batches.get(&id).cloned())
    }

    async fn update_batch_status(
        &mut self,
        id: BatchId,
        status: BatchStatus,
    ) -> Result<(), StorageError> {
        if let Some(batch) = self.staged.batches.get_mut(&id) {
            batch.status = status;
        }
        Ok(())
    }

    async fn delete_batch(&mut self, id: BatchId) -> Result<bool, StorageError> {
        Ok(self.staged.batches.remove(&id).is_some())
    }

    async fn batch_has_history(&mut self, id: BatchId) -> Result<bool, StorageError> {
        Ok(self
            .staged
            .transactions
            .iter()
            .any(|entry| entry.batch_id == id))
    }

    // -------------------------------------------------------------------------
    // Inventory records & ledger
    // -------------------------------------------------------------------------

    async fn inventory_record_for_update(
        &mut self,
        warehouse_id: WarehouseId,
        batch_id: BatchId,
    ) -> Result<Option<InventoryRecord>, StorageError> {
        // The transaction already holds the store's writer lock.
        Ok(self.staged.records.get(&(warehouse_id, batch_id)).cloned())
    }

    async fn upsert_inventory_record(
        &mut self,
        record: &InventoryRecord,
    ) -> Result<(), StorageError> {
        self.staged
            .records
            .insert((record.warehouse_id, record.batch_id), record.clone());
        Ok(())
    }

    async fn append_transaction(
        &mut self,
        entry: NewInventoryTransaction,
    ) -> Result<InventoryTransaction, StorageError> {
        let entry = InventoryTransaction {
            id: TransactionId::new(self.staged.next_id()),
            warehouse_id: entry.warehouse_id,
            batch_id: entry.batch_id,
            kind: entry.kind,
            quantity_change: entry.quantity_change,
            reference: entry.reference,
            reason: entry.reason,
            created_at: Utc::now(),
        };
        self.staged.transactions.push(entry.clone());
        Ok(entry)
    }

    async fn transactions_for(
        &mut self,
        warehouse_id: WarehouseId,
        batch_id: BatchId,
    ) -> Result<Vec<InventoryTransaction>, StorageError> {
        Ok(self
            .staged
            .transactions
            .iter()
            .filter(|entry| entry.warehouse_id == warehouse_id && entry.batch_id == batch_id)
            .cloned()
            .collect())
    }

    async fn stock_levels(
        &mut self,
        warehouse_id: WarehouseId,
        product_id: ProductId,
    ) -> Result<Vec<BatchStock>, StorageError> {
        Ok(self.collect_stock(warehouse_id, product_id, false))
    }

    async fn stock_levels_for_update(
        &mut self,
        warehouse_id: WarehouseId,
        product_id: ProductId,
    ) -> Result<Vec<BatchStock>, StorageError> {
        Ok(self.collect_stock(warehouse_id, product_id, true))
    }

    // -------------------------------------------------------------------------
    // Orders
    // -------------------------------------------------------------------------

    async fn insert_order(&mut self, order: NewOrder) -> Result<Order, StorageError> {
        let id = OrderId::new(self.staged.next_id());
        let order = Order {
            id,
            store_id: order.store_id,
            status: OrderStatus::Pending,
            delivery_date: order.delivery_date,
            note: order.note,
            placed_by: order.placed_by,
            decision_reason: None,
            created_at: Utc::now(),
        };
        self.staged.orders.insert(id, order.clone());
        Ok(order)
    }

    async fn insert_order_item(&mut self, item: NewOrderItem) -> Result<OrderItem, StorageError> {
        let id = OrderItemId::new(self.staged.next_id());
        let item = OrderItem {
            id,
            order_id: item.order_id,
            product_id: item.product_id,
            quantity_requested: item.quantity_requested,
            quantity_approved: None,
        };
        self.staged.order_items.insert(id, item.clone());
        Ok(item)
    }

    async fn order(&mut self, id: OrderId) -> Result<Option<Order>, StorageError> {
        Ok(self.staged.orders.get(&id).cloned())
    }

    async fn order_for_update(&mut self, id: OrderId) -> Result<Option<Order>, StorageError> {
        Ok(self.staged.orders.get(&id).cloned())
    }

    async fn order_items(&mut self, order_id: OrderId) -> Result<Vec<OrderItem>, StorageError> {
        Ok(self
            .staged
            .order_items
            .values()
            .filter(|item| item.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn update_order_status(
        &mut self,
        id: OrderId,
        status: OrderStatus,
        decision_reason: Option<String>,
    ) -> Result<(), StorageError> {
        if let Some(order) = self.staged.orders.get_mut(&id) {
            order.status = status;
            if decision_reason.is_some() {
                order.decision_reason = decision_reason;
            }
        }
        Ok(())
    }

    async fn set_quantity_approved(
        &mut self,
        item_id: OrderItemId,
        quantity: Decimal,
    ) -> Result<(), StorageError> {
        if let Some(item) = self.staged.order_items.get_mut(&item_id) {
            item.quantity_approved = Some(quantity);
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Shipments
    // -------------------------------------------------------------------------

    async fn insert_shipment(&mut self, shipment: NewShipment) -> Result<Shipment, StorageError> {
        let id = ShipmentId::new(self.staged.next_id());
        let shipment = Shipment {
            id,
            order_id: shipment.order_id,
            from_warehouse_id: shipment.from_warehouse_id,
            to_warehouse_id: shipment.to_warehouse_id,
            status: ShipmentStatus::Preparing,
            ship_date: None,
            created_at: Utc::now(),
        };
        self.staged.shipments.insert(id, shipment.clone());
        Ok(shipment)
    }

    async fn shipment(&mut self, id: ShipmentId) -> Result<Option<Shipment>, StorageError> {
        Ok(self.staged.shipments.get(&id).cloned())
    }

    async fn shipment_for_update(
        &mut self,
        id: ShipmentId,
    ) -> Result<Option<Shipment>, StorageError> {
        Ok(self.staged.shipments.get(&id).cloned())
    }

    async fn shipment_for_order(
        &mut self,
        order_id: OrderId,
    ) -> Result<Option<Shipment>, StorageError> {
        Ok(self
            .staged
            .shipments
            .values()
            .find(|shipment| shipment.order_id == order_id)
            .cloned())
    }

    async fn shipment_items(
        &mut self,
        shipment_id: ShipmentId,
    ) -> Result<Vec<ShipmentItem>, StorageError> {
        Ok(self
            .staged
            .shipment_items
            .values()
            .filter(|item| item.shipment_id == shipment_id)
            .cloned()
            .collect())
    }

    async fn upsert_shipment_item(
        &mut self,
        item: NewShipmentItem,
    ) -> Result<ShipmentItem, StorageError> {
        let existing = self
            .staged
            .shipment_items
            .values_mut()
            .find(|row| row.shipment_id == item.shipment_id && row.batch_id == item.batch_id);
        if let Some(row) = existing {
            row.quantity += item.quantity;
            return Ok(row.clone());
        }

        let id = ShipmentItemId::new(self.staged.next_id());
        let row = ShipmentItem {
            id,
            shipment_id: item.shipment_id,
            batch_id: item.batch_id,
            quantity: item.quantity,
        };
        self.staged.shipment_items.insert(id, row.clone());
        Ok(row)
    }

    async fn delete_shipment_item(
        &mut self,
        shipment_id: ShipmentId,
        batch_id: BatchId,
    ) -> Result<bool, StorageError> {
        let key = self
            .staged
            .shipment_items
            .iter()
            .find(|(_, item)| item.shipment_id == shipment_id && item.batch_id == batch_id)
            .map(|(id, _)| *id);
        Ok(key
            .and_then(|id| self.staged.shipment_items.remove(&id))
            .is_some())
    }

    async fn update_shipment_status(
        &mut self,
        id: ShipmentId,
        status: ShipmentStatus,
        ship_date: Option<DateTime<Utc>>,
    ) -> Result<(), StorageError> {
        if let Some(shipment) = self.staged.shipments.get_mut(&id) {
            shipment.status = status;
            if ship_date.is_some() {
                shipment.ship_date = ship_date;
            }
        }
        Ok(())
    }

    async fn rejected_batches(
        &mut self,
        shipment_id: ShipmentId,
    ) -> Result<Vec<BatchId>, StorageError> {
        Ok(self
            .staged
            .rejected_batches
            .iter()
            .filter(|(shipment, _)| *shipment == shipment_id)
            .map(|(_, batch)| *batch)
            .collect())
    }

    async fn insert_rejected_batch(
        &mut self,
        shipment_id: ShipmentId,
        batch_id: BatchId,
    ) -> Result<(), StorageError> {
        self.staged.rejected_batches.insert((shipment_id, batch_id));
        Ok(())
    }
}

impl MemoryTx {
    fn collect_stock(
        &self,
        warehouse_id: WarehouseId,
        product_id: ProductId,
        available_only: bool,
    ) -> Vec<BatchStock> {
        let mut stock: Vec<BatchStock> = self
            .staged
            .records
            .values()
            .filter(|record| record.warehouse_id == warehouse_id)
            .filter_map(|record| {
                let batch = self.staged.batches.get(&record.batch_id)?;
                if batch.product_id != product_id || batch.status != BatchStatus::Available {
                    return None;
                }
                Some(BatchStock {
                    batch_id: batch.id,
                    product_id: batch.product_id,
                    expiry_date: batch.expiry_date,
                    quantity: record.quantity,
                    reserved_quantity: record.reserved_quantity,
                })
            })
            .filter(|stock| !available_only || stock.available() > Decimal::ZERO)
            .collect();
        stock.sort_by_key(|stock| (stock.expiry_date, stock.batch_id));
        stock
    }
}
