//! Read-only derived views over the ledger and order history.
//!
//! Nothing here is part of the write path; every function opens a
//! transaction only to read a consistent snapshot.

use ladle_core::{BatchId, OrderId, ProductId, WarehouseId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::models::InventoryTransaction;
use crate::storage::{Storage, StorageTx};

/// Aggregate stock position for one product in one warehouse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockOnHand {
    /// Warehouse queried.
    pub warehouse_id: WarehouseId,
    /// Product queried.
    pub product_id: ProductId,
    /// Physical quantity across all batches.
    pub quantity: Decimal,
    /// Reserved quantity across all batches.
    pub reserved_quantity: Decimal,
    /// Quantity open to new allocation.
    pub available: Decimal,
    /// Number of batches holding stock.
    pub batch_count: usize,
}

/// Fulfillment outcome of one approved order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FulfillmentSummary {
    /// Order summarized.
    pub order_id: OrderId,
    /// Total quantity requested across items.
    pub requested_total: Decimal,
    /// Total quantity approved across items (zero until approval).
    pub approved_total: Decimal,
    /// `approved / requested`, or 1 for an empty request.
    pub fulfillment_rate: Decimal,
}

/// Ledger history for one `(warehouse, batch)` pair with the reconciliation
/// check applied: the signed sum of entries must equal the record quantity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerAudit {
    /// Warehouse audited.
    pub warehouse_id: WarehouseId,
    /// Batch audited.
    pub batch_id: BatchId,
    /// All entries, oldest first.
    pub entries: Vec<InventoryTransaction>,
    /// Signed sum of `quantity_change`.
    pub total_change: Decimal,
    /// Current record quantity (zero when no record exists).
    pub record_quantity: Decimal,
}

impl LedgerAudit {
    /// Whether the ledger reconciles with the record.
    #[must_use]
    pub fn is_reconciled(&self) -> bool {
        self.total_change == self.record_quantity
    }
}

/// Aggregate stock position for `(warehouse, product)`.
///
/// # Errors
///
/// Propagates storage failures.
pub async fn stock_on_hand<S: Storage>(
    storage: &S,
    warehouse_id: WarehouseId,
    product_id: ProductId,
) -> Result<StockOnHand, EngineError> {
    let mut tx = storage.begin().await?;
    let stock = tx.stock_levels(warehouse_id, product_id).await?;
    let quantity: Decimal = stock.iter().map(|s| s.quantity).sum();
    let reserved: Decimal = stock.iter().map(|s| s.reserved_quantity).sum();
    Ok(StockOnHand {
        warehouse_id,
        product_id,
        quantity,
        reserved_quantity: reserved,
        available: quantity - reserved,
        batch_count: stock.len(),
    })
}

/// Requested vs. approved totals for one order.
///
/// # Errors
///
/// `NotFound` if the order does not exist.
pub async fn fulfillment_summary<S: Storage>(
    storage: &S,
    order_id: OrderId,
) -> Result<FulfillmentSummary, EngineError> {
    let mut tx = storage.begin().await?;
    let order = tx.order(order_id).await?.ok_or(EngineError::NotFound {
        entity: "order",
        id: order_id.as_i32(),
    })?;
    let items = tx.order_items(order.id).await?;
    let requested: Decimal = items.iter().map(|item| item.quantity_requested).sum();
    let approved: Decimal = items
        .iter()
        .filter_map(|item| item.quantity_approved)
        .sum();
    let rate = if requested.is_zero() {
        Decimal::ONE
    } else {
        approved / requested
    };
    Ok(FulfillmentSummary {
        order_id: order.id,
        requested_total: requested,
        approved_total: approved,
        fulfillment_rate: rate,
    })
}

/// Ledger history plus reconciliation check for `(warehouse, batch)`.
///
/// # Errors
///
/// Propagates storage failures.
pub async fn ledger_audit<S: Storage>(
    storage: &S,
    warehouse_id: WarehouseId,
    batch_id: BatchId,
) -> Result<LedgerAudit, EngineError> {
    let mut tx = storage.begin().await?;
    let entries = tx.transactions_for(warehouse_id, batch_id).await?;
    let total_change: Decimal = entries.iter().map(|entry| entry.quantity_change).sum();
    let record_quantity = tx
        .inventory_record_for_update(warehouse_id, batch_id)
        .await?
        .map_or(Decimal::ZERO, |record| record.quantity);
    Ok(LedgerAudit {
        warehouse_id,
        batch_id,
        entries,
        total_change,
        record_quantity,
    })
}
