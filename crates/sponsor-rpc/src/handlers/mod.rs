//! One handler per [`Operation`].

pub mod allowance;
pub mod pass;

use std::time::Instant;

use alloy_primitives::{Address, B256};
use quarry_ledger::LedgerError;
use quarry_relay::{Call, Execution, RelayError};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

pub use allowance::{list_allowances, remove_allowance, request_allowance};
pub use pass::{claim_allowance, issue_pass, pass_status};

use crate::{context::AppContext, dispatch::Operation, metrics::Metrics};

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("User {0} already received a grant.")]
    AlreadyGranted(Address),

    /// The mirrored pass state rules the claim out before submitting.
    #[error("{0}")]
    PassNotClaimable(String),

    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("failed to encode result: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Result of an operation that went on chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Submitted {
    pub message: String,
    /// Hash of the accepted user operation.
    pub hash: B256,
    pub transaction_hash: B256,
}

impl Submitted {
    fn new(message: String, execution: &Execution) -> Self {
        Self { message, hash: execution.user_op_hash, transaction_hash: execution.transaction_hash() }
    }
}

pub async fn handle(ctx: &AppContext, metrics: &Metrics, operation: Operation) -> Result<Value, HandlerError> {
    let value = match operation {
        Operation::RequestAllowance { receiver } => {
            serde_json::to_value(request_allowance(ctx, metrics, receiver).await?)?
        }
        Operation::ClaimAllowance { pass_id, receiver } => {
            serde_json::to_value(claim_allowance(ctx, metrics, pass_id, receiver).await?)?
        }
        Operation::IssuePass { pass_id, receiver } => {
            serde_json::to_value(issue_pass(ctx, metrics, pass_id, receiver).await?)?
        }
        Operation::RemoveAllowance { user, sponsor } => {
            serde_json::to_value(remove_allowance(ctx, metrics, user, sponsor).await?)?
        }
        Operation::ListAllowances { user } => serde_json::to_value(list_allowances(ctx, user).await?)?,
        Operation::GetPassStatus { user, pass_id } => {
            serde_json::to_value(pass_status(ctx, user, pass_id).await?)?
        }
    };
    Ok(value)
}

/// Builds one operation from `calls`, submits it and waits for the receipt.
async fn relay(
    ctx: &AppContext,
    metrics: &Metrics,
    calls: &[Call],
    action: &str,
) -> Result<Execution, HandlerError> {
    let start = Instant::now();
    let op = ctx.builder.build(calls, None).await?;
    debug!(message = "sending user operation", action, calls = calls.len());
    let execution = ctx.relay.execute(&op, action, None).await;
    metrics.relay_duration.record(start.elapsed().as_secs_f64());
    Ok(execution?)
}
