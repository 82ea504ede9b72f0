//! Domain models for the fulfillment engine.

pub mod claim;
pub mod inventory;
pub mod order;
pub mod shipment;

pub use claim::Discrepancy;
pub use inventory::{
    Batch, BatchStock, InventoryRecord, InventoryTransaction, NewBatch, NewInventoryTransaction,
};
pub use order::{NewOrder, NewOrderItem, Order, OrderItem, OrderLineInput, PlaceOrderInput};
pub use shipment::{NewShipment, NewShipmentItem, Shipment, ShipmentItem};
