//! Inventory domain models: batches, per-warehouse stock records, and the
//! append-only transaction ledger.

use chrono::{DateTime, NaiveDate, Utc};
use ladle_core::{BatchId, BatchStatus, ProductId, TransactionId, TransactionKind, WarehouseId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A physical batch of one product with a fixed expiry date.
///
/// Created during stock intake. The expiry date is immutable once created;
/// a batch with any ledger history is never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    /// Unique batch ID.
    pub id: BatchId,
    /// Product this batch belongs to (exactly one, for its whole life).
    pub product_id: ProductId,
    /// Batch/lot number identifier.
    pub batch_number: String,
    /// Expiry date driving FEFO allocation order.
    pub expiry_date: NaiveDate,
    /// Lifecycle status (`pending` until released for allocation).
    pub status: BatchStatus,
    /// When the batch was created.
    pub created_at: DateTime<Utc>,
}

/// Input for registering a new batch at stock intake.
#[derive(Debug, Clone, Deserialize)]
pub struct NewBatch {
    /// Product this batch belongs to.
    pub product_id: ProductId,
    /// Batch/lot number identifier.
    pub batch_number: String,
    /// Expiry date (immutable after creation).
    pub expiry_date: NaiveDate,
}

/// Authoritative stock state for one `(warehouse, batch)` pair.
///
/// Invariant at every committed state: `0 <= reserved_quantity <= quantity`.
/// Rows are never deleted; zero-quantity rows persist as history anchors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryRecord {
    /// Warehouse holding the stock.
    pub warehouse_id: WarehouseId,
    /// Batch the stock belongs to.
    pub batch_id: BatchId,
    /// Physical on-hand quantity.
    pub quantity: Decimal,
    /// Soft-held quantity awaiting dispatch or release.
    pub reserved_quantity: Decimal,
    /// When the record was last mutated.
    pub updated_at: DateTime<Utc>,
}

impl InventoryRecord {
    /// Quantity still open to new reservations.
    #[must_use]
    pub fn available(&self) -> Decimal {
        self.quantity - self.reserved_quantity
    }

    /// Whether the record satisfies `0 <= reserved <= quantity`.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        !self.reserved_quantity.is_sign_negative()
            && !self.quantity.is_sign_negative()
            && self.reserved_quantity <= self.quantity
    }
}

/// One append-only ledger entry.
///
/// The sum of `quantity_change` for a `(warehouse, batch)` pair always equals
/// the current quantity of its [`InventoryRecord`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryTransaction {
    /// Unique transaction ID.
    pub id: TransactionId,
    /// Warehouse the movement happened in.
    pub warehouse_id: WarehouseId,
    /// Batch the movement applies to.
    pub batch_id: BatchId,
    /// Movement kind.
    pub kind: TransactionKind,
    /// Signed quantity delta (positive for import, negative otherwise).
    pub quantity_change: Decimal,
    /// Opaque reference to the triggering document (e.g. `shipment:12`).
    pub reference: Option<String>,
    /// Free-form reason recorded by the operator.
    pub reason: Option<String>,
    /// When the entry was written.
    pub created_at: DateTime<Utc>,
}

/// Input for appending a ledger entry.
#[derive(Debug, Clone)]
pub struct NewInventoryTransaction {
    pub warehouse_id: WarehouseId,
    pub batch_id: BatchId,
    pub kind: TransactionKind,
    pub quantity_change: Decimal,
    pub reference: Option<String>,
    pub reason: Option<String>,
}

/// A stock record joined to its batch, as seen by the allocator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchStock {
    /// Batch the stock belongs to.
    pub batch_id: BatchId,
    /// Product the batch belongs to.
    pub product_id: ProductId,
    /// Expiry date (allocation sort key).
    pub expiry_date: NaiveDate,
    /// Physical on-hand quantity.
    pub quantity: Decimal,
    /// Currently reserved quantity.
    pub reserved_quantity: Decimal,
}

impl BatchStock {
    /// Quantity open to new reservations.
    #[must_use]
    pub fn available(&self) -> Decimal {
        self.quantity - self.reserved_quantity
    }
}
