//! Data structures for the Tollgate admission-control engine.
//!
//! This crate provides the domain types shared across the Tollgate
//! crates. It contains no storage or network logic, only type
//! definitions with serialization support and the visitor status
//! state machine.
//!
//! # Module Organization
//!
//! - [`enums`] - Enumeration types (VisitorStatus, PaymentStatus, etc.)
//! - [`error`] - The crate error type
//! - [`visitor`] - Visitor entity and status transitions
//! - [`request`] - Recorded request snapshots
//! - [`payment`] - Payment entity and amount conversions
//!
//! # Type Conventions
//!
//! - Timestamps are epoch milliseconds (`Timestamp` = `i64`)
//! - Monetary amounts are integers in the payment method's base unit
//!   (satoshis for bitcoin); decimal strings only appear at the API
//!   boundary
//! - Enums with database codes use explicit discriminants; the codes
//!   are part of the on-disk format and must never be renumbered

/// Crate version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod enums;
pub mod error;
pub mod payment;
pub mod request;
pub mod visitor;

/// Epoch milliseconds.
pub type Timestamp = i64;

pub use enums::{AddressScheme, Network, PaymentMethod, PaymentStatus, Verdict, VisitorStatus};
pub use error::{Result, TypesError};
pub use payment::{amount_from_decimal, amount_to_decimal, Payment};
pub use request::{Request, RequestSnapshot};
pub use visitor::{StatusUntil, Visitor};
