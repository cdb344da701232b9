//! Shared primitives for the Quarry sponsor relay: user operation wire types,
//! contract bindings, store table layouts and the allowance/pass data model.

pub mod abi;
pub mod ledger;
pub mod logger;
pub mod store;
pub mod user_operation;

pub use ledger::{
    Allowance, AllowanceList, GrantRecord, PassConfig, PassHolder, PassStatus, Spender,
};
pub use user_operation::{
    EntryPointVersion, TransactionReceipt, UserOperation, UserOperationReceipt, UserOperationV06,
    UserOperationV07,
};
