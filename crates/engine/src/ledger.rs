//! Inventory ledger: the four authoritative stock mutations.
//!
//! Every `(warehouse, batch)` record is mutated exclusively through this
//! module, inside a transaction owned by the caller, with the record row
//! locked for the duration. The allocator never requests more than it saw
//! available, but each operation re-validates against the locked row anyway.
//!
//! Reservations do not move physical stock, so only [`dispatch`] and
//! [`receive`] append ledger entries; the signed sum of entries for a pair
//! always equals the record's current quantity.

use chrono::Utc;
use ladle_core::{BatchId, TransactionKind, WarehouseId};
use rust_decimal::Decimal;

use crate::error::EngineError;
use crate::models::{InventoryRecord, NewInventoryTransaction};
use crate::storage::StorageTx;

/// Increase the reservation on a `(warehouse, batch)` pair.
///
/// # Errors
///
/// `InsufficientCapacity` if the resulting reservation would exceed the
/// on-hand quantity; `InvalidState` for non-positive quantities.
pub async fn reserve<T: StorageTx>(
    tx: &mut T,
    warehouse_id: WarehouseId,
    batch_id: BatchId,
    quantity: Decimal,
) -> Result<(), EngineError> {
    let mut record = locked_record(tx, warehouse_id, batch_id, quantity).await?;

    if record.reserved_quantity + quantity > record.quantity {
        return Err(EngineError::InsufficientCapacity {
            warehouse: warehouse_id,
            batch: batch_id,
            requested: quantity,
            available: record.available(),
        });
    }

    record.reserved_quantity += quantity;
    record.updated_at = Utc::now();
    tx.upsert_inventory_record(&record).await?;
    tracing::debug!(%warehouse_id, %batch_id, %quantity, "reserved stock");
    Ok(())
}

/// Return reserved quantity to the available pool.
///
/// # Errors
///
/// `InvalidState` if more than the current reservation would be released.
pub async fn release<T: StorageTx>(
    tx: &mut T,
    warehouse_id: WarehouseId,
    batch_id: BatchId,
    quantity: Decimal,
) -> Result<(), EngineError> {
    let mut record = locked_record(tx, warehouse_id, batch_id, quantity).await?;

    if quantity > record.reserved_quantity {
        return Err(EngineError::InvalidState(format!(
            "cannot release {quantity} from warehouse {warehouse_id} batch {batch_id}: \
             only {} reserved",
            record.reserved_quantity
        )));
    }

    record.reserved_quantity -= quantity;
    record.updated_at = Utc::now();
    tx.upsert_inventory_record(&record).await?;
    tracing::debug!(%warehouse_id, %batch_id, %quantity, "released reservation");
    Ok(())
}

/// Convert a reservation into a physical deduction: both `quantity` and
/// `reserved_quantity` drop by `quantity`, and an `export` entry is appended.
///
/// # Errors
///
/// `InvalidState` if the deduction exceeds the current reservation.
pub async fn dispatch<T: StorageTx>(
    tx: &mut T,
    warehouse_id: WarehouseId,
    batch_id: BatchId,
    quantity: Decimal,
    reference: &str,
) -> Result<(), EngineError> {
    let mut record = locked_record(tx, warehouse_id, batch_id, quantity).await?;

    if quantity > record.reserved_quantity {
        return Err(EngineError::InvalidState(format!(
            "cannot dispatch {quantity} from warehouse {warehouse_id} batch {batch_id}: \
             only {} reserved",
            record.reserved_quantity
        )));
    }

    record.quantity -= quantity;
    record.reserved_quantity -= quantity;
    record.updated_at = Utc::now();
    ensure_consistent(&record)?;
    tx.upsert_inventory_record(&record).await?;
    tx.append_transaction(NewInventoryTransaction {
        warehouse_id,
        batch_id,
        kind: TransactionKind::Export,
        quantity_change: -quantity,
        reference: Some(reference.to_string()),
        reason: None,
    })
    .await?;
    tracing::debug!(%warehouse_id, %batch_id, %quantity, reference, "dispatched stock");
    Ok(())
}

/// Record a physical stock movement that does not touch reservations:
/// `import` increases quantity, `waste`/`adjustment` decrease it.
///
/// # Errors
///
/// `InvalidState` for `export` (only [`dispatch`] records exports), for
/// non-positive quantities, or when a decrease would cut into reserved or
/// non-existent stock.
pub async fn receive<T: StorageTx>(
    tx: &mut T,
    warehouse_id: WarehouseId,
    batch_id: BatchId,
    quantity: Decimal,
    kind: TransactionKind,
    reference: Option<String>,
    reason: Option<String>,
) -> Result<(), EngineError> {
    if quantity <= Decimal::ZERO {
        return Err(EngineError::InvalidState(format!(
            "ledger quantity must be positive, got {quantity}"
        )));
    }

    let quantity_change = match kind {
        TransactionKind::Import => quantity,
        TransactionKind::Waste | TransactionKind::Adjustment => -quantity,
        TransactionKind::Export => {
            return Err(EngineError::InvalidState(
                "export entries are recorded by dispatch, not receive".to_string(),
            ));
        }
    };

    let existing = tx.inventory_record_for_update(warehouse_id, batch_id).await?;
    let mut record = match existing {
        Some(record) => {
            ensure_consistent(&record)?;
            record
        }
        // First movement into this pair creates the record.
        None => InventoryRecord {
            warehouse_id,
            batch_id,
            quantity: Decimal::ZERO,
            reserved_quantity: Decimal::ZERO,
            updated_at: Utc::now(),
        },
    };

    let new_quantity = record.quantity + quantity_change;
    if new_quantity < record.reserved_quantity {
        return Err(EngineError::InvalidState(format!(
            "{kind} of {quantity} on warehouse {warehouse_id} batch {batch_id} would leave \
             quantity {new_quantity} below reservation {}",
            record.reserved_quantity
        )));
    }

    record.quantity = new_quantity;
    record.updated_at = Utc::now();
    tx.upsert_inventory_record(&record).await?;
    tx.append_transaction(NewInventoryTransaction {
        warehouse_id,
        batch_id,
        kind,
        quantity_change,
        reference,
        reason,
    })
    .await?;
    tracing::debug!(%warehouse_id, %batch_id, %kind, %quantity_change, "recorded stock movement");
    Ok(())
}

/// Fetch and validate the locked record for a reservation-path operation.
async fn locked_record<T: StorageTx>(
    tx: &mut T,
    warehouse_id: WarehouseId,
    batch_id: BatchId,
    quantity: Decimal,
) -> Result<InventoryRecord, EngineError> {
    if quantity <= Decimal::ZERO {
        return Err(EngineError::InvalidState(format!(
            "ledger quantity must be positive, got {quantity}"
        )));
    }

    let record = tx
        .inventory_record_for_update(warehouse_id, batch_id)
        .await?
        .ok_or_else(|| EngineError::InsufficientCapacity {
            warehouse: warehouse_id,
            batch: batch_id,
            requested: quantity,
            available: Decimal::ZERO,
        })?;
    ensure_consistent(&record)?;
    Ok(record)
}

fn ensure_consistent(record: &InventoryRecord) -> Result<(), EngineError> {
    if record.is_consistent() {
        return Ok(());
    }
    let violation = format!(
        "inventory record warehouse {} batch {} violates 0 <= reserved <= quantity \
         (quantity {}, reserved {})",
        record.warehouse_id, record.batch_id, record.quantity, record.reserved_quantity
    );
    tracing::error!(
        warehouse_id = %record.warehouse_id,
        batch_id = %record.batch_id,
        quantity = %record.quantity,
        reserved_quantity = %record.reserved_quantity,
        "consistency violation detected, aborting transaction"
    );
    Err(EngineError::ConsistencyViolation(violation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewBatch;
    use crate::storage::memory::MemoryStorage;
    use crate::storage::Storage;
    use chrono::NaiveDate;
    use ladle_core::ProductId;
    use rust_decimal_macros::dec;

    const WAREHOUSE: WarehouseId = WarehouseId::new(1);

    async fn seeded_batch(storage: &MemoryStorage, quantity: Decimal) -> BatchId {
        let mut tx = storage.begin().await.expect("begin");
        let batch = tx
            .insert_batch(NewBatch {
                product_id: ProductId::new(1),
                batch_number: "B-001".to_string(),
                expiry_date: NaiveDate::from_ymd_opt(2026, 2, 1).expect("valid date"),
            })
            .await
            .expect("batch");
        receive(
            &mut tx,
            WAREHOUSE,
            batch.id,
            quantity,
            TransactionKind::Import,
            None,
            None,
        )
        .await
        .expect("import");
        tx.commit().await.expect("commit");
        batch.id
    }

    async fn record(storage: &MemoryStorage, batch_id: BatchId) -> InventoryRecord {
        let mut tx = storage.begin().await.expect("begin");
        tx.inventory_record_for_update(WAREHOUSE, batch_id)
            .await
            .expect("fetch")
            .expect("record exists")
    }

    #[tokio::test]
    async fn test_reserve_within_capacity() {
        let storage = MemoryStorage::new();
        let batch_id = seeded_batch(&storage, dec!(50)).await;

        let mut tx = storage.begin().await.expect("begin");
        reserve(&mut tx, WAREHOUSE, batch_id, dec!(30)).await.expect("reserve");
        tx.commit().await.expect("commit");

        let rec = record(&storage, batch_id).await;
        assert_eq!(rec.quantity, dec!(50));
        assert_eq!(rec.reserved_quantity, dec!(30));
    }

    #[tokio::test]
    async fn test_reserve_rejects_oversell() {
        let storage = MemoryStorage::new();
        let batch_id = seeded_batch(&storage, dec!(50)).await;

        let mut tx = storage.begin().await.expect("begin");
        reserve(&mut tx, WAREHOUSE, batch_id, dec!(30)).await.expect("first reserve");
        let err = reserve(&mut tx, WAREHOUSE, batch_id, dec!(30))
            .await
            .expect_err("second reserve exceeds capacity");
        match err {
            EngineError::InsufficientCapacity { available, requested, .. } => {
                assert_eq!(available, dec!(20));
                assert_eq!(requested, dec!(30));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_release_cannot_exceed_reservation() {
        let storage = MemoryStorage::new();
        let batch_id = seeded_batch(&storage, dec!(50)).await;

        let mut tx = storage.begin().await.expect("begin");
        reserve(&mut tx, WAREHOUSE, batch_id, dec!(10)).await.expect("reserve");
        let err = release(&mut tx, WAREHOUSE, batch_id, dec!(11))
            .await
            .expect_err("release exceeds reservation");
        assert!(matches!(err, EngineError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_dispatch_moves_physical_and_reserved_together() {
        let storage = MemoryStorage::new();
        let batch_id = seeded_batch(&storage, dec!(50)).await;

        let mut tx = storage.begin().await.expect("begin");
        reserve(&mut tx, WAREHOUSE, batch_id, dec!(20)).await.expect("reserve");
        dispatch(&mut tx, WAREHOUSE, batch_id, dec!(20), "shipment:1")
            .await
            .expect("dispatch");
        tx.commit().await.expect("commit");

        let rec = record(&storage, batch_id).await;
        assert_eq!(rec.quantity, dec!(30));
        assert_eq!(rec.reserved_quantity, dec!(0));
    }

    #[tokio::test]
    async fn test_dispatch_requires_reservation() {
        let storage = MemoryStorage::new();
        let batch_id = seeded_batch(&storage, dec!(50)).await;

        let mut tx = storage.begin().await.expect("begin");
        let err = dispatch(&mut tx, WAREHOUSE, batch_id, dec!(5), "shipment:1")
            .await
            .expect_err("nothing reserved");
        assert!(matches!(err, EngineError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_waste_cannot_cut_into_reservation() {
        let storage = MemoryStorage::new();
        let batch_id = seeded_batch(&storage, dec!(50)).await;

        let mut tx = storage.begin().await.expect("begin");
        reserve(&mut tx, WAREHOUSE, batch_id, dec!(45)).await.expect("reserve");
        let err = receive(
            &mut tx,
            WAREHOUSE,
            batch_id,
            dec!(10),
            TransactionKind::Waste,
            None,
            Some("spoilage".to_string()),
        )
        .await
        .expect_err("waste would cut into reserved stock");
        assert!(matches!(err, EngineError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_ledger_sum_matches_record_quantity() {
        let storage = MemoryStorage::new();
        let batch_id = seeded_batch(&storage, dec!(100)).await;

        let mut tx = storage.begin().await.expect("begin");
        receive(
            &mut tx,
            WAREHOUSE,
            batch_id,
            dec!(7.5),
            TransactionKind::Waste,
            None,
            Some("expired".to_string()),
        )
        .await
        .expect("waste");
        reserve(&mut tx, WAREHOUSE, batch_id, dec!(40)).await.expect("reserve");
        dispatch(&mut tx, WAREHOUSE, batch_id, dec!(40), "shipment:9")
            .await
            .expect("dispatch");
        tx.commit().await.expect("commit");

        let mut tx = storage.begin().await.expect("begin");
        let entries = tx.transactions_for(WAREHOUSE, batch_id).await.expect("entries");
        let total: Decimal = entries.iter().map(|entry| entry.quantity_change).sum();
        let rec = tx
            .inventory_record_for_update(WAREHOUSE, batch_id)
            .await
            .expect("fetch")
            .expect("record");
        assert_eq!(total, rec.quantity);
        assert_eq!(rec.quantity, dec!(52.5));
    }
}
