//! Replenishment order domain models.

use chrono::{DateTime, NaiveDate, Utc};
use ladle_core::{OrderId, OrderItemId, OrderStatus, ProductId, StoreId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A store's replenishment order against the central warehouse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Unique order ID.
    pub id: OrderId,
    /// Store that placed the order.
    pub store_id: StoreId,
    /// Lifecycle status (one-way state machine).
    pub status: OrderStatus,
    /// Requested delivery date.
    pub delivery_date: NaiveDate,
    /// Optional note from the store.
    pub note: Option<String>,
    /// User who placed the order.
    pub placed_by: UserId,
    /// Reason recorded on rejection or cancellation.
    pub decision_reason: Option<String>,
    /// When the order was created.
    pub created_at: DateTime<Utc>,
}

/// One product line on an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    /// Unique item ID.
    pub id: OrderItemId,
    /// Order this line belongs to.
    pub order_id: OrderId,
    /// Requested product.
    pub product_id: ProductId,
    /// Quantity the store asked for.
    pub quantity_requested: Decimal,
    /// Quantity granted by allocation; set exactly once during approval and
    /// final thereafter (shortfall is not topped up later).
    pub quantity_approved: Option<Decimal>,
}

impl OrderItem {
    /// Unmet portion of the request after approval, if approved.
    #[must_use]
    pub fn shortfall(&self) -> Option<Decimal> {
        self.quantity_approved
            .map(|approved| self.quantity_requested - approved)
    }
}

/// Input for placing a new order.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaceOrderInput {
    /// Store placing the order.
    pub store_id: StoreId,
    /// Requested delivery date.
    pub delivery_date: NaiveDate,
    /// Optional note.
    pub note: Option<String>,
    /// User placing the order.
    pub placed_by: UserId,
    /// Product lines; must be non-empty with positive quantities.
    pub lines: Vec<OrderLineInput>,
}

/// One requested product line.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderLineInput {
    /// Requested product.
    pub product_id: ProductId,
    /// Requested quantity (> 0).
    pub quantity: Decimal,
}

/// Storage input for creating an order row.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub store_id: StoreId,
    pub delivery_date: NaiveDate,
    pub note: Option<String>,
    pub placed_by: UserId,
}

/// Storage input for creating an order item row.
#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity_requested: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_shortfall() {
        let mut item = OrderItem {
            id: OrderItemId::new(1),
            order_id: OrderId::new(1),
            product_id: ProductId::new(1),
            quantity_requested: dec!(200),
            quantity_approved: None,
        };
        assert_eq!(item.shortfall(), None);

        item.quantity_approved = Some(dec!(150));
        assert_eq!(item.shortfall(), Some(dec!(50)));

        item.quantity_approved = Some(dec!(200));
        assert_eq!(item.shortfall(), Some(dec!(0)));
    }
}
