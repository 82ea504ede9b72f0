//! Unified error handling for the fulfillment engine.

use ladle_core::{BatchId, ShipmentId, WarehouseId};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::catalog::CatalogError;
use crate::claims::ClaimsError;
use crate::storage::StorageError;

/// Engine-level error type.
///
/// Shortfalls during initial allocation are *not* errors - they are reported
/// as data on the approval result. Everything here aborts the operation and
/// rolls the enclosing transaction back.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A referenced order/shipment/batch/warehouse does not exist.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity kind, e.g. `"order"`.
        entity: &'static str,
        /// The identifier that failed to resolve.
        id: i32,
    },

    /// Operation attempted from a state that does not permit it.
    #[error("invalid {entity} transition: {from} -> {to}")]
    InvalidTransition {
        /// Entity kind, e.g. `"shipment"`.
        entity: &'static str,
        /// Current state.
        from: String,
        /// Requested state.
        to: String,
    },

    /// Operation input or precondition is invalid (e.g. releasing more than
    /// is reserved, receiving with `damaged > actual`).
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A reservation would exceed on-hand quantity.
    #[error(
        "insufficient capacity on warehouse {warehouse} batch {batch}: \
         requested {requested}, available {available}"
    )]
    InsufficientCapacity {
        warehouse: WarehouseId,
        batch: BatchId,
        requested: Decimal,
        available: Decimal,
    },

    /// A damaged-batch replacement could not be covered in full. Partial
    /// replacement is disallowed; the original reservation is preserved.
    #[error(
        "insufficient replacement stock for shipment {shipment} batch {batch}: \
         needed {needed}, covered {covered}"
    )]
    InsufficientReplacement {
        shipment: ShipmentId,
        batch: BatchId,
        needed: Decimal,
        covered: Decimal,
    },

    /// An invariant check failed unexpectedly (reserved > quantity, negative
    /// resulting quantity). Indicates a bug or a missed lock; never retried
    /// and never silently corrected.
    #[error("consistency violation: {0}")]
    ConsistencyViolation(String),

    /// Storage-layer failure, including retryable serialization conflicts.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Catalog collaborator failure.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Claims collaborator failure.
    #[error(transparent)]
    Claims(#[from] ClaimsError),
}

impl EngineError {
    /// Whether the caller should retry the whole operation from scratch.
    ///
    /// True only for transaction-level serialization conflicts; reservations
    /// are not partially visible until commit, so a retry is safe.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(StorageError::Conflict))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_error_display() {
        let err = EngineError::NotFound {
            entity: "order",
            id: 123,
        };
        assert_eq!(err.to_string(), "order 123 not found");

        let err = EngineError::InvalidTransition {
            entity: "shipment",
            from: "in_transit".to_string(),
            to: "in_transit".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid shipment transition: in_transit -> in_transit"
        );
    }

    #[test]
    fn test_capacity_error_carries_quantities() {
        let err = EngineError::InsufficientCapacity {
            warehouse: WarehouseId::new(1),
            batch: BatchId::new(9),
            requested: dec!(30),
            available: dec!(20),
        };
        let msg = err.to_string();
        assert!(msg.contains("requested 30"));
        assert!(msg.contains("available 20"));
    }

    #[test]
    fn test_only_conflicts_are_retryable() {
        assert!(EngineError::Storage(StorageError::Conflict).is_retryable());
        assert!(!EngineError::InvalidState("x".to_string()).is_retryable());
        assert!(!EngineError::ConsistencyViolation("x".to_string()).is_retryable());
    }
}
