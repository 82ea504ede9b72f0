//! Ladle Engine - Inventory allocation & fulfillment for central kitchens.
//!
//! Franchise stores place replenishment orders against a central warehouse.
//! This crate owns the part of that flow with real invariants: expiry-ordered
//! (FEFO) batch allocation, reservation against concurrent demand, an
//! append-only inventory ledger, shipment dispatch with in-warehouse batch
//! replacement, and store-side receiving reconciliation feeding the claims
//! collaborator.
//!
//! # Architecture
//!
//! Every public operation is a single storage transaction: it either commits
//! all of its effects or none of them. The [`storage`] module abstracts the
//! transactional store behind the [`storage::Storage`] / [`storage::StorageTx`]
//! traits, with a Postgres implementation (row locks via `SELECT ... FOR
//! UPDATE`) and an in-memory implementation for tests and local development.
//!
//! Inventory quantities are [`rust_decimal::Decimal`] throughout - binary
//! floats are never used for quantity math.
//!
//! # Modules
//!
//! - [`ledger`] - the four authoritative stock mutations (reserve, release,
//!   dispatch, receive) and the append-only transaction log
//! - [`allocator`] - pure FEFO batch selection
//! - [`orders`] - order state machine: place, review, approve, reject, cancel
//! - [`shipments`] - dispatch finalization and damaged-batch replacement
//! - [`receiving`] - store-side receipt, discrepancy emission
//! - [`batches`] - batch lifecycle (intake registration, removal rules)
//! - [`catalog`] / [`claims`] - collaborator boundaries
//! - [`reports`] - read-only derived views (stock on hand, fulfillment rate)

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod allocator;
pub mod batches;
pub mod catalog;
pub mod claims;
pub mod config;
pub mod error;
pub mod ledger;
pub mod models;
pub mod orders;
pub mod receiving;
pub mod reports;
pub mod shipments;
pub mod storage;

pub use error::EngineError;
