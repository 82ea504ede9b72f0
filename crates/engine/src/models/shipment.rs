//! Shipment domain models.

use chrono::{DateTime, Utc};
use ladle_core::{BatchId, OrderId, ShipmentId, ShipmentItemId, ShipmentStatus, WarehouseId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A shipment moving allocated stock from the central warehouse to a store.
///
/// Exactly one shipment exists per order, created at approval time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shipment {
    /// Unique shipment ID.
    pub id: ShipmentId,
    /// Order this shipment fulfills (1:1).
    pub order_id: OrderId,
    /// Origin warehouse (central).
    pub from_warehouse_id: WarehouseId,
    /// Destination warehouse (the store's internal warehouse).
    pub to_warehouse_id: WarehouseId,
    /// Lifecycle status; items are frozen once `in_transit`.
    pub status: ShipmentStatus,
    /// Set when dispatch is finalized.
    pub ship_date: Option<DateTime<Utc>>,
    /// When the shipment was created.
    pub created_at: DateTime<Utc>,
}

/// One batch line on a shipment.
///
/// The `(shipment, batch)` pair is unique; replacement operations add and
/// remove rows only while the shipment is `preparing`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipmentItem {
    /// Unique item ID.
    pub id: ShipmentItemId,
    /// Shipment this line belongs to.
    pub shipment_id: ShipmentId,
    /// Batch being shipped.
    pub batch_id: BatchId,
    /// Quantity of the batch on this shipment.
    pub quantity: Decimal,
}

/// Storage input for creating a shipment row.
#[derive(Debug, Clone)]
pub struct NewShipment {
    pub order_id: OrderId,
    pub from_warehouse_id: WarehouseId,
    pub to_warehouse_id: WarehouseId,
}

/// Storage input for adding stock to a shipment.
#[derive(Debug, Clone)]
pub struct NewShipmentItem {
    pub shipment_id: ShipmentId,
    pub batch_id: BatchId,
    pub quantity: Decimal,
}
