//! Store-side receiving reconciliation.
//!
//! When a shipment arrives, the store counts what actually landed. The good
//! quantity enters the store's own inventory through the ledger; shortfalls
//! and damage become discrepancy records for the claims collaborator.

use ladle_core::{BatchId, OrderStatus, ProductId, ShipmentId, ShipmentStatus, TransactionKind};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::claims::ClaimsSink;
use crate::error::EngineError;
use crate::ledger;
use crate::models::Discrepancy;
use crate::orders::ensure_order_transition;
use crate::storage::{Storage, StorageTx};

/// The store's count for one shipment line.
#[derive(Debug, Clone, Deserialize)]
pub struct ReceiptLine {
    /// Batch being counted.
    pub batch_id: BatchId,
    /// Quantity that physically arrived.
    pub actual_quantity: Decimal,
    /// Portion of the arrived quantity that is unusable.
    pub damaged_quantity: Decimal,
    /// Free-form reason for shortfall or damage.
    pub reason: Option<String>,
    /// Supporting evidence (photo URLs etc.).
    pub evidence_urls: Vec<String>,
}

/// Per-line outcome of receiving.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptOutcome {
    /// Batch counted.
    pub batch_id: BatchId,
    /// Product the batch belongs to.
    pub product_id: ProductId,
    /// Quantity the shipment said was coming.
    pub expected_quantity: Decimal,
    /// Quantity that arrived.
    pub actual_quantity: Decimal,
    /// Quantity arrived unusable.
    pub damaged_quantity: Decimal,
    /// `actual - damaged`; added to store inventory.
    pub good_quantity: Decimal,
    /// `max(0, expected - actual)`.
    pub missing_quantity: Decimal,
}

/// Result of receiving one shipment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceivingReport {
    /// Shipment received.
    pub shipment_id: ShipmentId,
    /// Per-line outcomes.
    pub lines: Vec<ReceiptOutcome>,
    /// Discrepancies emitted to the claims collaborator.
    pub discrepancies: Vec<Discrepancy>,
}

/// Process store-side receipt of an in-transit shipment.
///
/// One transaction: for every shipment item the good quantity is imported
/// into the store's warehouse, discrepancies are handed to the claims sink,
/// the shipment completes, and the order completes. Whether the claims
/// collaborator later marks the order `claimed` is its decision, not ours.
///
/// # Errors
///
/// `NotFound` for a missing shipment or a receipt for a batch not on it;
/// `InvalidTransition` unless the shipment is `in_transit`; `InvalidState`
/// when a line has `damaged > actual`, a negative count, or a shipment item
/// has no receipt.
pub async fn receive_shipment<S: Storage, K: ClaimsSink>(
    storage: &S,
    claims: &K,
    shipment_id: ShipmentId,
    receipts: &[ReceiptLine],
) -> Result<ReceivingReport, EngineError> {
    let mut tx = storage.begin().await?;
    let shipment = tx
        .shipment_for_update(shipment_id)
        .await?
        .ok_or(EngineError::NotFound {
            entity: "shipment",
            id: shipment_id.as_i32(),
        })?;
    if !shipment.status.can_transition_to(ShipmentStatus::Completed) {
        return Err(EngineError::InvalidTransition {
            entity: "shipment",
            from: shipment.status.to_string(),
            to: ShipmentStatus::Completed.to_string(),
        });
    }

    let items = tx.shipment_items(shipment.id).await?;
    for receipt in receipts {
        if !items.iter().any(|item| item.batch_id == receipt.batch_id) {
            return Err(EngineError::NotFound {
                entity: "shipment item",
                id: receipt.batch_id.as_i32(),
            });
        }
    }

    let reference = format!("shipment:{shipment_id}");
    let mut lines = Vec::new();
    let mut discrepancies = Vec::new();
    for item in &items {
        let receipt = receipts
            .iter()
            .find(|receipt| receipt.batch_id == item.batch_id)
            .ok_or_else(|| {
                EngineError::InvalidState(format!(
                    "no receipt provided for batch {} on shipment {shipment_id}",
                    item.batch_id
                ))
            })?;
        validate_counts(receipt)?;

        let batch = tx.batch(item.batch_id).await?.ok_or(EngineError::NotFound {
            entity: "batch",
            id: item.batch_id.as_i32(),
        })?;

        let good = receipt.actual_quantity - receipt.damaged_quantity;
        let missing = (item.quantity - receipt.actual_quantity).max(Decimal::ZERO);
        if good > Decimal::ZERO {
            ledger::receive(
                &mut tx,
                shipment.to_warehouse_id,
                item.batch_id,
                good,
                TransactionKind::Import,
                Some(reference.clone()),
                None,
            )
            .await?;
        }
        if missing > Decimal::ZERO || receipt.damaged_quantity > Decimal::ZERO {
            discrepancies.push(Discrepancy {
                shipment_id: shipment.id,
                product_id: batch.product_id,
                batch_id: item.batch_id,
                quantity_missing: missing,
                quantity_damaged: receipt.damaged_quantity,
                reason: receipt.reason.clone(),
                evidence_urls: receipt.evidence_urls.clone(),
            });
        }
        lines.push(ReceiptOutcome {
            batch_id: item.batch_id,
            product_id: batch.product_id,
            expected_quantity: item.quantity,
            actual_quantity: receipt.actual_quantity,
            damaged_quantity: receipt.damaged_quantity,
            good_quantity: good,
            missing_quantity: missing,
        });
    }

    if !discrepancies.is_empty() {
        claims
            .record_discrepancies(shipment.id, &discrepancies)
            .await?;
    }

    tx.update_shipment_status(shipment.id, ShipmentStatus::Completed, None)
        .await?;
    let order = tx
        .order_for_update(shipment.order_id)
        .await?
        .ok_or(EngineError::NotFound {
            entity: "order",
            id: shipment.order_id.as_i32(),
        })?;
    ensure_order_transition(&order, OrderStatus::Completed)?;
    tx.update_order_status(order.id, OrderStatus::Completed, None).await?;
    tx.commit().await?;

    tracing::info!(
        %shipment_id,
        lines = lines.len(),
        discrepancies = discrepancies.len(),
        "shipment received"
    );
    Ok(ReceivingReport {
        shipment_id: shipment.id,
        lines,
        discrepancies,
    })
}

fn validate_counts(receipt: &ReceiptLine) -> Result<(), EngineError> {
    if receipt.actual_quantity.is_sign_negative() || receipt.damaged_quantity.is_sign_negative() {
        return Err(EngineError::InvalidState(format!(
            "receipt counts for batch {} must be non-negative",
            receipt.batch_id
        )));
    }
    if receipt.damaged_quantity > receipt.actual_quantity {
        return Err(EngineError::InvalidState(format!(
            "damaged quantity {} exceeds actual quantity {} for batch {}",
            receipt.damaged_quantity, receipt.actual_quantity, receipt.batch_id
        )));
    }
    Ok(())
}
