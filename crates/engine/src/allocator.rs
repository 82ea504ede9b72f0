//! FEFO (First-Expired-First-Out) batch allocation.
//!
//! [`plan`] is a pure function over an already-fetched candidate list;
//! [`allocate`] runs it against a locking read inside the caller's
//! transaction so the reservation that follows cannot race the snapshot.
//! An unmet remainder is returned as `shortfall` - partial fulfillment is a
//! valid outcome, never an error.

use std::collections::BTreeSet;

use ladle_core::{BatchId, ProductId, WarehouseId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::models::BatchStock;
use crate::storage::StorageTx;

/// One `(batch, quantity)` pair selected by the allocator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    /// Batch to take from.
    pub batch_id: BatchId,
    /// Quantity to take.
    pub quantity: Decimal,
}

/// Result of one allocation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationOutcome {
    /// Ordered `(batch, quantity)` pairs, earliest expiry first.
    pub allocations: Vec<Allocation>,
    /// Requested quantity that could not be covered.
    pub shortfall: Decimal,
}

impl AllocationOutcome {
    /// Total quantity covered by the allocations.
    #[must_use]
    pub fn allocated_total(&self) -> Decimal {
        self.allocations
            .iter()
            .map(|allocation| allocation.quantity)
            .sum()
    }

    /// Whether the full requested quantity was covered.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.shortfall.is_zero()
    }
}

/// Greedily consume candidates in FEFO order.
///
/// Candidates are sorted ascending by `(expiry_date, batch_id)` - the batch
/// id tie-break keeps the selection deterministic - and consumed earliest
/// first with `take = min(remaining, available)`. Batches in `exclude` and
/// batches with nothing available are skipped.
#[must_use]
pub fn plan(
    candidates: &[BatchStock],
    quantity_needed: Decimal,
    exclude: &BTreeSet<BatchId>,
) -> AllocationOutcome {
    let mut ordered: Vec<&BatchStock> = candidates
        .iter()
        .filter(|stock| !exclude.contains(&stock.batch_id))
        .filter(|stock| stock.available() > Decimal::ZERO)
        .collect();
    ordered.sort_by_key(|stock| (stock.expiry_date, stock.batch_id));

    let mut allocations = Vec::new();
    let mut remaining = quantity_needed;
    for stock in ordered {
        if remaining <= Decimal::ZERO {
            break;
        }
        let take = remaining.min(stock.available());
        allocations.push(Allocation {
            batch_id: stock.batch_id,
            quantity: take,
        });
        remaining -= take;
    }

    AllocationOutcome {
        allocations,
        shortfall: remaining.max(Decimal::ZERO),
    }
}

/// Allocate against live stock inside the caller's transaction.
///
/// The candidate rows are locked by the read; callers apply
/// [`crate::ledger::reserve`] for each returned pair within the same
/// transaction.
///
/// # Errors
///
/// Propagates storage failures; shortfall is returned as data.
pub async fn allocate<T: StorageTx>(
    tx: &mut T,
    warehouse_id: WarehouseId,
    product_id: ProductId,
    quantity_needed: Decimal,
    exclude: &BTreeSet<BatchId>,
) -> Result<AllocationOutcome, EngineError> {
    let candidates = tx.stock_levels_for_update(warehouse_id, product_id).await?;
    Ok(plan(&candidates, quantity_needed, exclude))
}
