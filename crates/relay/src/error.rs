//! Error types for the relay layer.

use thiserror::Error;

use crate::revert::RevertExplanation;

/// Errors produced by an [`RpcTransport`](crate::RpcTransport).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The upstream answered with a JSON-RPC error object.
    #[error("rpc error {code}: {message}")]
    Rpc {
        code: i32,
        message: String,
        /// Raw `data` member, if any.
        data: Option<String>,
    },

    /// The upstream did not answer within the request timeout.
    #[error("request timed out")]
    Timeout,

    /// Connection-level failure.
    #[error("network error: {0}")]
    Network(String),

    /// The result could not be decoded into the expected shape.
    #[error("failed to decode {method} result: {reason}")]
    Decode { method: String, reason: String },

    /// A submission method returned no receipt.
    #[error("{method} returned no receipt")]
    SubmissionFailed { method: String },
}

/// Errors produced while building, submitting or awaiting an operation.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Transport(TransportError),

    /// The bundler accepted nothing.
    #[error("submission failed: {0}")]
    SubmissionFailed(String),

    /// No terminal receipt arrived before the deadline.
    #[error("timed out waiting for user operation {user_op_hash}")]
    Timeout { user_op_hash: String },

    /// The operation was included but reverted.
    #[error("{0}")]
    ExecutionReverted(RevertExplanation),

    #[error("operation has no calls")]
    EmptyOperation,

    /// The account cannot express the requested calls.
    #[error("unsupported calls: {0}")]
    UnsupportedCalls(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("paymaster data: {0}")]
    Paymaster(String),

    #[error("failed to decode {what}: {reason}")]
    Decode { what: &'static str, reason: String },
}

impl From<TransportError> for RelayError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::SubmissionFailed { method } => {
                Self::SubmissionFailed(format!("{method} returned no receipt"))
            }
            other => Self::Transport(other),
        }
    }
}
