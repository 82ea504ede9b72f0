//! Lifecycle status enums for orders, shipments, and batches.
//!
//! Every transition table here is one-way: once an entity leaves a state it
//! can never return to it. Services check `can_transition_to` before any
//! status mutation and surface violations as `InvalidTransition`.

use serde::{Deserialize, Serialize};

/// Replenishment order lifecycle.
///
/// ```text
/// pending ──> approved ──> picking ──> delivering ──> completed
///    │                                      └───────> claimed
///    ├──────> rejected
///    └──────> cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "order_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Cancelled,
    Picking,
    Delivering,
    Completed,
    Claimed,
}

impl OrderStatus {
    /// Whether the one-way state machine permits moving to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Approved | Self::Rejected | Self::Cancelled)
                | (Self::Approved, Self::Picking)
                | (Self::Picking, Self::Delivering)
                | (Self::Delivering, Self::Completed | Self::Claimed)
        )
    }

    /// Terminal states permit no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Rejected | Self::Cancelled | Self::Completed | Self::Claimed
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
            Self::Picking => "picking",
            Self::Delivering => "delivering",
            Self::Completed => "completed",
            Self::Claimed => "claimed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "cancelled" => Ok(Self::Cancelled),
            "picking" => Ok(Self::Picking),
            "delivering" => Ok(Self::Delivering),
            "completed" => Ok(Self::Completed),
            "claimed" => Ok(Self::Claimed),
            _ => Err(format!("invalid order status: {s}")),
        }
    }
}

/// Shipment lifecycle.
///
/// Shipment items are mutable only while `preparing`; dispatch freezes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "shipment_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentStatus {
    #[default]
    Preparing,
    InTransit,
    Delivered,
    Completed,
    Cancelled,
}

impl ShipmentStatus {
    /// Whether the one-way state machine permits moving to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Preparing, Self::InTransit)
                | (
                    Self::InTransit,
                    Self::Delivered | Self::Completed | Self::Cancelled
                )
        )
    }

    /// Terminal states permit no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Completed | Self::Cancelled)
    }
}

impl std::fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Preparing => "preparing",
            Self::InTransit => "in_transit",
            Self::Delivered => "delivered",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ShipmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "preparing" => Ok(Self::Preparing),
            "in_transit" => Ok(Self::InTransit),
            "delivered" => Ok(Self::Delivered),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("invalid shipment status: {s}")),
        }
    }
}

/// Batch lifecycle.
///
/// A batch is created `pending` during stock intake and becomes `available`
/// once it may be allocated. Batches with ledger history are never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "batch_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    #[default]
    Pending,
    Available,
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Available => write!(f, "available"),
        }
    }
}

/// Inventory transaction kinds recorded in the append-only ledger.
///
/// `import` is the only kind that increases quantity; `export`, `waste`,
/// and `adjustment` record decreases as negative `quantity_change`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "transaction_kind", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Import,
    Export,
    Waste,
    Adjustment,
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Import => "import",
            Self::Export => "export",
            Self::Waste => "waste",
            Self::Adjustment => "adjustment",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "import" => Ok(Self::Import),
            "export" => Ok(Self::Export),
            "waste" => Ok(Self::Waste),
            "adjustment" => Ok(Self::Adjustment),
            _ => Err(format!("invalid transaction kind: {s}")),
        }
    }
}
