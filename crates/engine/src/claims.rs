//! Claims collaborator boundary.
//!
//! Receiving reconciliation emits [`Discrepancy`] records; the claims
//! subsystem persists them and owns any formal claim raised afterwards.
//! [`MemoryClaims`] records emissions in memory for tests.

use ladle_core::ShipmentId;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::models::Discrepancy;

/// Claims delivery failure. Fails the enclosing receiving transaction.
#[derive(Debug, Error)]
pub enum ClaimsError {
    /// The claims sink could not accept the records.
    #[error("claims sink rejected discrepancies: {0}")]
    Sink(String),
}

/// Consumer of receiving discrepancies.
#[allow(async_fn_in_trait)]
pub trait ClaimsSink: Send + Sync {
    /// Persist the discrepancies found while receiving one shipment.
    async fn record_discrepancies(
        &self,
        shipment_id: ShipmentId,
        discrepancies: &[Discrepancy],
    ) -> Result<(), ClaimsError>;
}

/// Recording sink for tests and local development.
#[derive(Debug, Default)]
pub struct MemoryClaims {
    recorded: RwLock<Vec<Discrepancy>>,
}

impl MemoryClaims {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far.
    pub async fn recorded(&self) -> Vec<Discrepancy> {
        self.recorded.read().await.clone()
    }
}

impl ClaimsSink for MemoryClaims {
    async fn record_discrepancies(
        &self,
        _shipment_id: ShipmentId,
        discrepancies: &[Discrepancy],
    ) -> Result<(), ClaimsError> {
        self.recorded.write().await.extend_from_slice(discrepancies);
        Ok(())
    }
}
