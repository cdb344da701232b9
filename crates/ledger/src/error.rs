use alloy_primitives::Address;
use quarry_relay::TransportError;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// The allowance list of `user` does not form a well-ordered chain.
    #[error("corrupt allowance list for {user}: {detail}")]
    CorruptLedger { user: Address, detail: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("failed to decode {table} record: {reason}")]
    Decode { table: &'static str, reason: String },
}

impl LedgerError {
    pub(crate) fn corrupt(user: Address, detail: impl Into<String>) -> Self {
        Self::CorruptLedger { user, detail: detail.into() }
    }
}
