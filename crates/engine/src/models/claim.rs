//! Discrepancy records emitted to the claims collaborator.

use ladle_core::{BatchId, ProductId, ShipmentId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A receiving discrepancy for one shipment line.
///
/// Emitted whenever a store receives less than was shipped or receives
/// damaged goods. The claims subsystem persists these and owns any formal
/// claim raised against the order afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discrepancy {
    /// Shipment the discrepancy was found on.
    pub shipment_id: ShipmentId,
    /// Product affected.
    pub product_id: ProductId,
    /// Batch affected.
    pub batch_id: BatchId,
    /// Quantity shipped but not received.
    pub quantity_missing: Decimal,
    /// Quantity received in unusable condition.
    pub quantity_damaged: Decimal,
    /// Free-form reason recorded by the receiver.
    pub reason: Option<String>,
    /// Supporting evidence (photo URLs etc.).
    pub evidence_urls: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_discrepancy_serializes_quantities_as_strings() {
        // The claims collaborator consumes these records as JSON; decimal
        // quantities cross the boundary as strings, never binary floats.
        let discrepancy = Discrepancy {
            shipment_id: ShipmentId::new(12),
            product_id: ProductId::new(3),
            batch_id: BatchId::new(7),
            quantity_missing: dec!(10),
            quantity_damaged: dec!(2.5),
            reason: None,
            evidence_urls: Vec::new(),
        };
        let json = serde_json::to_value(&discrepancy).expect("serialize");
        assert_eq!(json["quantity_missing"], "10");
        assert_eq!(json["quantity_damaged"], "2.5");
    }
}
