//! Order fulfillment orchestration.
//!
//! Drives the order state machine: stores place pending orders, a central
//! approver reviews available stock and approves, rejects, or cancels. The
//! approve path is the engine's main write operation - it allocates FEFO,
//! commits reservations through the ledger, records approved quantities, and
//! creates the shipment, all inside one transaction.

use std::collections::BTreeSet;

use ladle_core::{OrderId, OrderItemId, OrderStatus, ProductId, ShipmentId, WarehouseId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::allocator::{self, Allocation};
use crate::catalog::Catalog;
use crate::error::EngineError;
use crate::ledger;
use crate::models::{
    BatchStock, NewOrder, NewOrderItem, NewShipment, NewShipmentItem, Order, PlaceOrderInput,
};
use crate::storage::{Storage, StorageTx};

/// Per-item outcome of an approval pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalLine {
    /// Order item this line reports on.
    pub order_item_id: OrderItemId,
    /// Product requested.
    pub product_id: ProductId,
    /// Quantity the store asked for.
    pub quantity_requested: Decimal,
    /// Quantity granted by allocation.
    pub quantity_approved: Decimal,
    /// Unmet remainder. Reported once and never queued - there is no
    /// backorder path, so restocking later does not top this up.
    pub shortfall: Decimal,
    /// The `(batch, quantity)` pairs reserved for this item.
    pub allocations: Vec<Allocation>,
}

/// Result of a successful approval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalReport {
    /// Approved order.
    pub order_id: OrderId,
    /// Shipment created for the order (exactly one).
    pub shipment_id: ShipmentId,
    /// Warehouse the stock was reserved in.
    pub warehouse_id: WarehouseId,
    /// Per-item outcomes.
    pub lines: Vec<ApprovalLine>,
}

impl ApprovalReport {
    /// Whether every item was covered in full.
    #[must_use]
    pub fn is_fully_allocated(&self) -> bool {
        self.lines.iter().all(|line| line.shortfall.is_zero())
    }
}

/// One row of the pre-approval review projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewLine {
    /// Order item reviewed.
    pub order_item_id: OrderItemId,
    /// Product requested.
    pub product_id: ProductId,
    /// Quantity the store asked for.
    pub quantity_requested: Decimal,
    /// Stock currently open to allocation in the central warehouse.
    pub quantity_available: Decimal,
}

impl ReviewLine {
    /// Whether the request could currently be covered in full.
    #[must_use]
    pub fn can_fulfill(&self) -> bool {
        self.quantity_available >= self.quantity_requested
    }
}

/// Place a new replenishment order in `pending`.
///
/// # Errors
///
/// `InvalidState` for an empty order or non-positive quantities; `NotFound`
/// for an unknown store or product; `InvalidState` for inactive products.
pub async fn place<S: Storage, C: Catalog>(
    storage: &S,
    catalog: &C,
    input: PlaceOrderInput,
) -> Result<Order, EngineError> {
    if input.lines.is_empty() {
        return Err(EngineError::InvalidState(
            "order must contain at least one line".to_string(),
        ));
    }
    for line in &input.lines {
        if line.quantity <= Decimal::ZERO {
            return Err(EngineError::InvalidState(format!(
                "requested quantity for product {} must be positive, got {}",
                line.product_id, line.quantity
            )));
        }
        let product = catalog
            .product(line.product_id)
            .await?
            .ok_or(EngineError::NotFound {
                entity: "product",
                id: line.product_id.as_i32(),
            })?;
        if !product.is_active {
            return Err(EngineError::InvalidState(format!(
                "product {} is inactive and cannot be ordered",
                product.id
            )));
        }
    }
    // The store must resolve to an internal warehouse before we accept the
    // order; receiving will import into it later.
    catalog
        .store_warehouse(input.store_id)
        .await?
        .ok_or(EngineError::NotFound {
            entity: "store",
            id: input.store_id.as_i32(),
        })?;

    let mut tx = storage.begin().await?;
    let order = tx
        .insert_order(NewOrder {
            store_id: input.store_id,
            delivery_date: input.delivery_date,
            note: input.note,
            placed_by: input.placed_by,
        })
        .await?;
    for line in input.lines {
        tx.insert_order_item(NewOrderItem {
            order_id: order.id,
            product_id: line.product_id,
            quantity_requested: line.quantity,
        })
        .await?;
    }
    tx.commit().await?;
    tracing::info!(order_id = %order.id, store_id = %order.store_id, "order placed");
    Ok(order)
}

/// Read-only projection for the human approver: requested vs. currently
/// available per item. Performs no reservation and takes no locks.
///
/// # Errors
///
/// `NotFound` if the order does not exist.
pub async fn review<S: Storage, C: Catalog>(
    storage: &S,
    catalog: &C,
    order_id: OrderId,
) -> Result<Vec<ReviewLine>, EngineError> {
    let central = catalog.central_warehouse().await?;
    let mut tx = storage.begin().await?;
    let order = tx.order(order_id).await?.ok_or(EngineError::NotFound {
        entity: "order",
        id: order_id.as_i32(),
    })?;

    let mut lines = Vec::new();
    for item in tx.order_items(order.id).await? {
        let stock = tx.stock_levels(central, item.product_id).await?;
        let available: Decimal = stock.iter().map(BatchStock::available).sum();
        lines.push(ReviewLine {
            order_item_id: item.id,
            product_id: item.product_id,
            quantity_requested: item.quantity_requested,
            quantity_available: available.max(Decimal::ZERO),
        });
    }
    Ok(lines)
}

/// Approve a pending order: allocate FEFO against the central warehouse,
/// reserve every pair, set approved quantities, and create the shipment.
///
/// The whole operation is one transaction - either every item allocates
/// (possibly with shortfalls, which is allowed) and the shipment exists, or
/// nothing is persisted.
///
/// # Errors
///
/// `NotFound` if the order or the store's warehouse is missing;
/// `InvalidTransition` unless the order is `pending`. Ledger errors
/// propagate unmodified and roll the transaction back.
pub async fn approve<S: Storage, C: Catalog>(
    storage: &S,
    catalog: &C,
    order_id: OrderId,
) -> Result<ApprovalReport, EngineError> {
    let central = catalog.central_warehouse().await?;

    let mut tx = storage.begin().await?;
    let order = tx
        .order_for_update(order_id)
        .await?
        .ok_or(EngineError::NotFound {
            entity: "order",
            id: order_id.as_i32(),
        })?;
    ensure_order_transition(&order, OrderStatus::Approved)?;

    let store_warehouse = catalog
        .store_warehouse(order.store_id)
        .await?
        .ok_or(EngineError::NotFound {
            entity: "store",
            id: order.store_id.as_i32(),
        })?;

    let mut lines = Vec::new();
    for item in tx.order_items(order.id).await? {
        let outcome = allocator::allocate(
            &mut tx,
            central,
            item.product_id,
            item.quantity_requested,
            &BTreeSet::new(),
        )
        .await?;
        for allocation in &outcome.allocations {
            ledger::reserve(&mut tx, central, allocation.batch_id, allocation.quantity).await?;
        }
        let approved = outcome.allocated_total();
        tx.set_quantity_approved(item.id, approved).await?;
        lines.push(ApprovalLine {
            order_item_id: item.id,
            product_id: item.product_id,
            quantity_requested: item.quantity_requested,
            quantity_approved: approved,
            shortfall: outcome.shortfall,
            allocations: outcome.allocations,
        });
    }

    tx.update_order_status(order.id, OrderStatus::Approved, None).await?;
    let shipment = tx
        .insert_shipment(NewShipment {
            order_id: order.id,
            from_warehouse_id: central,
            to_warehouse_id: store_warehouse,
        })
        .await?;
    for line in &lines {
        for allocation in &line.allocations {
            tx.upsert_shipment_item(NewShipmentItem {
                shipment_id: shipment.id,
                batch_id: allocation.batch_id,
                quantity: allocation.quantity,
            })
            .await?;
        }
    }
    tx.commit().await?;

    let report = ApprovalReport {
        order_id: order.id,
        shipment_id: shipment.id,
        warehouse_id: central,
        lines,
    };
    tracing::info!(
        order_id = %order.id,
        shipment_id = %shipment.id,
        fully_allocated = report.is_fully_allocated(),
        "order approved"
    );
    Ok(report)
}

/// Reject a pending order. No inventory was reserved yet, so there are no
/// inventory side effects.
///
/// # Errors
///
/// `NotFound` if the order is missing; `InvalidTransition` unless `pending`.
pub async fn reject<S: Storage>(
    storage: &S,
    order_id: OrderId,
    reason: &str,
) -> Result<(), EngineError> {
    decide(storage, order_id, OrderStatus::Rejected, reason).await
}

/// Cancel a pending order. Same preconditions as [`reject`].
///
/// # Errors
///
/// `NotFound` if the order is missing; `InvalidTransition` unless `pending`.
pub async fn cancel<S: Storage>(
    storage: &S,
    order_id: OrderId,
    reason: &str,
) -> Result<(), EngineError> {
    decide(storage, order_id, OrderStatus::Cancelled, reason).await
}

/// Mark an approved order as being picked in the warehouse.
///
/// # Errors
///
/// `NotFound` if the order is missing; `InvalidTransition` unless `approved`.
pub async fn start_picking<S: Storage>(storage: &S, order_id: OrderId) -> Result<(), EngineError> {
    let mut tx = storage.begin().await?;
    let order = tx
        .order_for_update(order_id)
        .await?
        .ok_or(EngineError::NotFound {
            entity: "order",
            id: order_id.as_i32(),
        })?;
    ensure_order_transition(&order, OrderStatus::Picking)?;
    tx.update_order_status(order_id, OrderStatus::Picking, None).await?;
    tx.commit().await?;
    Ok(())
}

async fn decide<S: Storage>(
    storage: &S,
    order_id: OrderId,
    status: OrderStatus,
    reason: &str,
) -> Result<(), EngineError> {
    let mut tx = storage.begin().await?;
    let order = tx
        .order_for_update(order_id)
        .await?
        .ok_or(EngineError::NotFound {
            entity: "order",
            id: order_id.as_i32(),
        })?;
    ensure_order_transition(&order, status)?;
    tx.update_order_status(order_id, status, Some(reason.to_string())).await?;
    tx.commit().await?;
    tracing::info!(%order_id, %status, reason, "order decided");
    Ok(())
}

pub(crate) fn ensure_order_transition(
    order: &Order,
    next: OrderStatus,
) -> Result<(), EngineError> {
    if order.status.can_transition_to(next) {
        return Ok(());
    }
    Err(EngineError::InvalidTransition {
        entity: "order",
        from: order.status.to_string(),
        to: next.to_string(),
    })
}
