//! Batch lifecycle: intake registration, release for allocation, removal.
//!
//! A batch belongs to exactly one product for its whole life and its expiry
//! date is immutable. Removal is permitted only while the batch is still a
//! `pending` intake draft with zero ledger history.

use ladle_core::{BatchId, BatchStatus};

use crate::catalog::Catalog;
use crate::error::EngineError;
use crate::models::{Batch, NewBatch};
use crate::storage::{Storage, StorageTx};

/// Register a new batch at stock intake.
///
/// # Errors
///
/// `NotFound` if the product is unknown; `InvalidState` if it is inactive.
pub async fn register<S: Storage, C: Catalog>(
    storage: &S,
    catalog: &C,
    batch: NewBatch,
) -> Result<Batch, EngineError> {
    let product = catalog
        .product(batch.product_id)
        .await?
        .ok_or(EngineError::NotFound {
            entity: "product",
            id: batch.product_id.as_i32(),
        })?;
    if !product.is_active {
        return Err(EngineError::InvalidState(format!(
            "product {} is inactive",
            product.id
        )));
    }

    let mut tx = storage.begin().await?;
    let batch = tx.insert_batch(batch).await?;
    tx.commit().await?;
    tracing::info!(batch_id = %batch.id, product_id = %batch.product_id, "registered batch");
    Ok(batch)
}

/// Release a pending batch for allocation.
///
/// # Errors
///
/// `NotFound` if the batch does not exist; `InvalidTransition` if it is
/// already available.
pub async fn mark_available<S: Storage>(
    storage: &S,
    batch_id: BatchId,
) -> Result<(), EngineError> {
    let mut tx = storage.begin().await?;
    let batch = tx.batch(batch_id).await?.ok_or(EngineError::NotFound {
        entity: "batch",
        id: batch_id.as_i32(),
    })?;
    if batch.status != BatchStatus::Pending {
        return Err(EngineError::InvalidTransition {
            entity: "batch",
            from: batch.status.to_string(),
            to: BatchStatus::Available.to_string(),
        });
    }
    tx.update_batch_status(batch_id, BatchStatus::Available).await?;
    tx.commit().await?;
    Ok(())
}

/// Delete a batch that never entered the ledger.
///
/// # Errors
///
/// `NotFound` if the batch does not exist; `InvalidState` if it is already
/// available or has any transaction history.
pub async fn remove<S: Storage>(storage: &S, batch_id: BatchId) -> Result<(), EngineError> {
    let mut tx = storage.begin().await?;
    let batch = tx.batch(batch_id).await?.ok_or(EngineError::NotFound {
        entity: "batch",
        id: batch_id.as_i32(),
    })?;
    if batch.status != BatchStatus::Pending {
        return Err(EngineError::InvalidState(format!(
            "batch {batch_id} is {} and can no longer be deleted",
            batch.status
        )));
    }
    if tx.batch_has_history(batch_id).await? {
        return Err(EngineError::InvalidState(format!(
            "batch {batch_id} has ledger history and can never be deleted"
        )));
    }
    tx.delete_batch(batch_id).await?;
    tx.commit().await?;
    tracing::info!(%batch_id, "removed draft batch");
    Ok(())
}
