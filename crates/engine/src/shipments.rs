//! Shipment dispatch and in-warehouse batch replacement.
//!
//! Dispatch converts reservations into physical deductions and freezes the
//! shipment's item set. Replacement handles damage discovered before
//! dispatch: the damaged batch is released and re-allocated all-or-nothing,
//! so the shipment is never left partially unreserved.

use std::collections::BTreeSet;

use chrono::Utc;
use ladle_core::{BatchId, OrderId, OrderStatus, ShipmentId, ShipmentStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::allocator::{self, Allocation};
use crate::error::EngineError;
use crate::ledger;
use crate::models::{NewShipmentItem, Shipment};
use crate::orders::ensure_order_transition;
use crate::storage::{Storage, StorageTx};

/// Result of a successful damaged-batch replacement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplacementReport {
    /// Shipment the replacement happened on.
    pub shipment_id: ShipmentId,
    /// Batch removed from the shipment.
    pub rejected_batch_id: BatchId,
    /// Quantity that was released and re-covered.
    pub quantity: Decimal,
    /// The replacement `(batch, quantity)` pairs now on the shipment.
    pub replacements: Vec<Allocation>,
}

/// Finalize dispatch of a prepared shipment.
///
/// For every shipment item the ledger deducts physical and reserved stock
/// together and appends an `export` entry. The shipment becomes `in_transit`
/// with `ship_date = now` and the parent order moves to `delivering`.
/// All-or-nothing per shipment; re-invoking on an already dispatched
/// shipment fails with `InvalidTransition` and deducts nothing.
///
/// # Errors
///
/// `NotFound` if the shipment is missing; `InvalidTransition` unless it is
/// `preparing`. Ledger errors propagate unmodified and roll everything back.
pub async fn finalize_dispatch<S: Storage>(
    storage: &S,
    shipment_id: ShipmentId,
) -> Result<Shipment, EngineError> {
    let mut tx = storage.begin().await?;
    let shipment = tx
        .shipment_for_update(shipment_id)
        .await?
        .ok_or(EngineError::NotFound {
            entity: "shipment",
            id: shipment_id.as_i32(),
        })?;
    ensure_shipment_transition(&shipment, ShipmentStatus::InTransit)?;

    let items = tx.shipment_items(shipment.id).await?;
    if items.is_empty() {
        tracing::warn!(%shipment_id, "dispatching shipment with no items");
    }
    let reference = format!("shipment:{shipment_id}");
    for item in &items {
        ledger::dispatch(
            &mut tx,
            shipment.from_warehouse_id,
            item.batch_id,
            item.quantity,
            &reference,
        )
        .await?;
    }

    let ship_date = Utc::now();
    tx.update_shipment_status(shipment.id, ShipmentStatus::InTransit, Some(ship_date))
        .await?;
    advance_order_to_delivering(&mut tx, shipment.order_id).await?;
    tx.commit().await?;

    tracing::info!(%shipment_id, items = items.len(), "shipment dispatched");
    Ok(Shipment {
        status: ShipmentStatus::InTransit,
        ship_date: Some(ship_date),
        ..shipment
    })
}

/// Replace a batch found damaged while the shipment is still `preparing`.
///
/// In one transaction: the damaged batch's item row is removed, its
/// reservation released, and the same quantity re-allocated FEFO excluding
/// the damaged batch and every batch previously rejected on this shipment.
/// If the re-allocation cannot cover the full quantity the whole operation
/// fails with `InsufficientReplacement` and rolls back, leaving the original
/// item and reservation untouched.
///
/// # Errors
///
/// `NotFound` if the shipment, item, or batch is missing;
/// `InvalidTransition` unless the shipment is `preparing`;
/// `InsufficientReplacement` when full coverage is impossible.
pub async fn report_damaged_batch<S: Storage>(
    storage: &S,
    shipment_id: ShipmentId,
    batch_id: BatchId,
) -> Result<ReplacementReport, EngineError> {
    let mut tx = storage.begin().await?;
    let shipment = tx
        .shipment_for_update(shipment_id)
        .await?
        .ok_or(EngineError::NotFound {
            entity: "shipment",
            id: shipment_id.as_i32(),
        })?;
    if shipment.status != ShipmentStatus::Preparing {
        return Err(EngineError::InvalidTransition {
            entity: "shipment",
            from: shipment.status.to_string(),
            to: ShipmentStatus::Preparing.to_string(),
        });
    }

    let item = tx
        .shipment_items(shipment.id)
        .await?
        .into_iter()
        .find(|item| item.batch_id == batch_id)
        .ok_or(EngineError::NotFound {
            entity: "shipment item",
            id: batch_id.as_i32(),
        })?;
    let batch = tx.batch(batch_id).await?.ok_or(EngineError::NotFound {
        entity: "batch",
        id: batch_id.as_i32(),
    })?;

    tx.delete_shipment_item(shipment.id, batch_id).await?;
    ledger::release(&mut tx, shipment.from_warehouse_id, batch_id, item.quantity).await?;

    // Batches rejected earlier on this shipment stay excluded so a
    // replacement never lands back on stock already reported damaged.
    let mut exclude: BTreeSet<BatchId> =
        tx.rejected_batches(shipment.id).await?.into_iter().collect();
    exclude.insert(batch_id);

    let outcome = allocator::allocate(
        &mut tx,
        shipment.from_warehouse_id,
        batch.product_id,
        item.quantity,
        &exclude,
    )
    .await?;
    if !outcome.is_complete() {
        // Roll back; the damaged batch keeps its reservation rather than
        // leaving the shipment partially unreserved.
        return Err(EngineError::InsufficientReplacement {
            shipment: shipment.id,
            batch: batch_id,
            needed: item.quantity,
            covered: outcome.allocated_total(),
        });
    }

    for allocation in &outcome.allocations {
        ledger::reserve(
            &mut tx,
            shipment.from_warehouse_id,
            allocation.batch_id,
            allocation.quantity,
        )
        .await?;
        tx.upsert_shipment_item(NewShipmentItem {
            shipment_id: shipment.id,
            batch_id: allocation.batch_id,
            quantity: allocation.quantity,
        })
        .await?;
    }
    tx.insert_rejected_batch(shipment.id, batch_id).await?;
    tx.commit().await?;

    tracing::info!(
        %shipment_id,
        rejected_batch = %batch_id,
        replacements = outcome.allocations.len(),
        "damaged batch replaced"
    );
    Ok(ReplacementReport {
        shipment_id: shipment.id,
        rejected_batch_id: batch_id,
        quantity: item.quantity,
        replacements: outcome.allocations,
    })
}

fn ensure_shipment_transition(
    shipment: &Shipment,
    next: ShipmentStatus,
) -> Result<(), EngineError> {
    if shipment.status.can_transition_to(next) {
        return Ok(());
    }
    Err(EngineError::InvalidTransition {
        entity: "shipment",
        from: shipment.status.to_string(),
        to: next.to_string(),
    })
}

/// Walk the parent order forward to `delivering`, passing through `picking`
/// when dispatch happens straight from `approved`.
async fn advance_order_to_delivering<T: StorageTx>(
    tx: &mut T,
    order_id: OrderId,
) -> Result<(), EngineError> {
    let order = tx
        .order_for_update(order_id)
        .await?
        .ok_or(EngineError::NotFound {
            entity: "order",
            id: order_id.as_i32(),
        })?;

    let mut status = order.status;
    if status == OrderStatus::Approved {
        ensure_order_transition(&order, OrderStatus::Picking)?;
        tx.update_order_status(order_id, OrderStatus::Picking, None).await?;
        status = OrderStatus::Picking;
    }
    if !status.can_transition_to(OrderStatus::Delivering) {
        return Err(EngineError::InvalidTransition {
            entity: "order",
            from: status.to_string(),
            to: OrderStatus::Delivering.to_string(),
        });
    }
    tx.update_order_status(order_id, OrderStatus::Delivering, None).await?;
    Ok(())
}
