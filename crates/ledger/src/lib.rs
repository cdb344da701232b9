//! Read-only mirror of the paymaster's allowance and pass ledger.
//!
//! The ledger itself lives in the paymaster world. [`LedgerMirror`] reads it
//! through a [`LedgerSource`] and checks the invariants the contract keeps:
//! each user's allowances form one doubly linked list ordered by amount.

pub mod error;
pub mod mirror;
pub mod source;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use error::LedgerError;
pub use mirror::LedgerMirror;
pub use source::{LedgerSource, StoreLedgerSource};
