//! Payment layer: HD address derivation, payment demand allocation,
//! balance reconciliation and settlement.
//!
//! A blocked visitor is issued a payment demand against an address
//! derived from a watch-only extended public key. The checker
//! periodically asks a [`BalanceSource`] what each open address has
//! received; a demand whose funds reach the owed amount settles, which
//! flips the visitor to ALLOWED in the same transaction.

pub mod allocator;
pub mod balance;
pub mod checker;
pub mod derive;
pub mod error;
pub mod settle;

pub use allocator::{AllocatorConfig, PaymentAllocator};
pub use balance::{BalanceSource, HttpBalanceSource, StaticBalanceSource, DEFAULT_BATCH_SIZE};
pub use checker::{CheckOutcome, PaymentChecker};
pub use derive::HdAddressDeriver;
pub use error::{PayError, Result};
pub use settle::{NoopHooks, PaymentHooks, Settler};
