//! Routing of named operations to their handlers.
//!
//! Both the JSON-RPC and the REST surface resolve a `namespace`/`method` pair
//! to a [`Method`], decode the positional parameters into a typed
//! [`Operation`] and hand it to [`handlers::handle`].

use std::{fmt, str::FromStr, sync::Arc, time::Instant};

use alloy_primitives::{Address, B256, hex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{context::AppContext, handlers, metrics::Metrics};

/// JSON-RPC code for malformed requests, unknown methods and bad parameters.
pub const INVALID_REQUEST_CODE: i32 = -32601;

/// JSON-RPC code for handler failures.
pub const INTERNAL_ERROR_CODE: i32 = -32603;

/// Why a request could not be served.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Malformed request or parameters.
    #[error("{0}")]
    Validation(String),

    /// No such `namespace`/`method` pair.
    #[error("method {0} not found")]
    MethodNotFound(String),

    /// The handler failed.
    #[error("{0}")]
    Internal(String),
}

impl DispatchError {
    /// JSON-RPC error code for this error.
    pub const fn code(&self) -> i32 {
        match self {
            Self::Validation(_) | Self::MethodNotFound(_) => INVALID_REQUEST_CODE,
            Self::Internal(_) => INTERNAL_ERROR_CODE,
        }
    }
}

/// Every operation the service exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// `sponsor_requestAllowance`
    RequestAllowance,
    /// `quarry_claimAllowance`
    ClaimAllowance,
    /// `quarry_issuePass`
    IssuePass,
    /// `quarry_removeAllowance`
    RemoveAllowance,
    /// `quarry_listAllowances`
    ListAllowances,
    /// `quarry_getPassStatus`
    GetPassStatus,
}

impl Method {
    /// All methods, in registration order.
    pub const ALL: [Self; 6] = [
        Self::RequestAllowance,
        Self::ClaimAllowance,
        Self::IssuePass,
        Self::RemoveAllowance,
        Self::ListAllowances,
        Self::GetPassStatus,
    ];

    /// Namespace the method is registered under.
    pub const fn namespace(self) -> &'static str {
        match self {
            Self::RequestAllowance => "sponsor",
            _ => "quarry",
        }
    }

    /// Method name within its namespace.
    pub const fn name(self) -> &'static str {
        match self {
            Self::RequestAllowance => "requestAllowance",
            Self::ClaimAllowance => "claimAllowance",
            Self::IssuePass => "issuePass",
            Self::RemoveAllowance => "removeAllowance",
            Self::ListAllowances => "listAllowances",
            Self::GetPassStatus => "getPassStatus",
        }
    }

    /// Looks up the method registered as `namespace`/`name`.
    pub fn resolve(namespace: &str, name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.namespace() == namespace && m.name() == name)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace(), self.name())
    }
}

/// A positional parameter. Parameter lists are flat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Param {
    /// JSON boolean.
    Bool(bool),
    /// JSON number.
    Number(serde_json::Number),
    /// JSON string, including hex values.
    String(String),
}

impl Param {
    fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

/// A resolved method with decoded parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Operation {
    /// Grant the configured allowance to `receiver`.
    RequestAllowance { receiver: Address },
    /// Claim from pass `pass_id` on behalf of `receiver`.
    ClaimAllowance { pass_id: B256, receiver: Address },
    /// Issue pass `pass_id` to `receiver`.
    IssuePass { pass_id: B256, receiver: Address },
    /// Remove `sponsor`'s allowance for `user`.
    RemoveAllowance { user: Address, sponsor: Address },
    /// List `user`'s allowances.
    ListAllowances { user: Address },
    /// Report where `user` stands on pass `pass_id`.
    GetPassStatus { user: Address, pass_id: B256 },
}

impl Operation {
    /// Decodes the positional parameters of `method`.
    pub fn decode(method: Method, params: &[Param]) -> Result<Self, DispatchError> {
        let params = Params(params);
        let op = match method {
            Method::RequestAllowance => {
                params.expect_len(1)?;
                Self::RequestAllowance { receiver: params.address(0, "receiver")? }
            }
            Method::ClaimAllowance => {
                params.expect_len(2)?;
                Self::ClaimAllowance {
                    pass_id: params.pass_id(0)?,
                    receiver: params.address(1, "receiver")?,
                }
            }
            Method::IssuePass => {
                params.expect_len(2)?;
                Self::IssuePass { pass_id: params.pass_id(0)?, receiver: params.address(1, "receiver")? }
            }
            Method::RemoveAllowance => {
                params.expect_len(2)?;
                Self::RemoveAllowance {
                    user: params.address(0, "user")?,
                    sponsor: params.address(1, "sponsor")?,
                }
            }
            Method::ListAllowances => {
                params.expect_len(1)?;
                Self::ListAllowances { user: params.address(0, "user")? }
            }
            Method::GetPassStatus => {
                params.expect_len(2)?;
                Self::GetPassStatus { user: params.address(0, "user")?, pass_id: params.pass_id(1)? }
            }
        };
        Ok(op)
    }
}

struct Params<'a>(&'a [Param]);

impl Params<'_> {
    fn expect_len(&self, len: usize) -> Result<(), DispatchError> {
        if self.0.len() != len {
            return Err(DispatchError::Validation(format!(
                "expected {len} parameter{}, got {}",
                if len == 1 { "" } else { "s" },
                self.0.len()
            )));
        }
        Ok(())
    }

    fn hex(&self, index: usize, name: &str) -> Result<&str, DispatchError> {
        self.0
            .get(index)
            .and_then(Param::as_str)
            .filter(|s| s.starts_with("0x"))
            .ok_or_else(|| {
                DispatchError::Validation(format!("{name} must be a Hex string (`0x...`)"))
            })
    }

    fn address(&self, index: usize, name: &str) -> Result<Address, DispatchError> {
        let value = self.hex(index, name)?;
        Address::from_str(value).map_err(|_| {
            DispatchError::Validation(format!("{name} must be a 20-byte address, got {value}"))
        })
    }

    /// Pass ids are at most 32 bytes and left-padded.
    fn pass_id(&self, index: usize) -> Result<B256, DispatchError> {
        let value = self.hex(index, "passId")?;
        let digits = &value[2..];
        let digits =
            if digits.len() % 2 == 1 { format!("0{digits}") } else { digits.to_string() };
        let invalid = || DispatchError::Validation(format!("passId must be at most 32 bytes of hex, got {value}"));
        let bytes = hex::decode(digits).map_err(|_| invalid())?;
        if bytes.len() > 32 {
            return Err(invalid());
        }
        Ok(B256::left_padding_from(&bytes))
    }
}

/// Lifecycle of one request. Each transition is logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestState {
    Received,
    Validated,
    Dispatched,
    Succeeded,
    Failed,
}

impl RequestState {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Validated => "validated",
            Self::Dispatched => "dispatched",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

/// Entry point shared by the JSON-RPC and REST surfaces.
#[derive(Clone)]
pub struct Dispatcher {
    context: Arc<AppContext>,
    metrics: Metrics,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher").field("context", &self.context).finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(context: Arc<AppContext>) -> Self {
        Self { context, metrics: Metrics::default() }
    }

    /// Shared service state.
    pub fn context(&self) -> &Arc<AppContext> {
        &self.context
    }

    /// Resolves, decodes and runs one operation. Nothing is retried.
    pub async fn dispatch(
        &self,
        namespace: &str,
        method: &str,
        params: &[Param],
    ) -> Result<Value, DispatchError> {
        let wire = format!("{namespace}.{method}");
        self.metrics.requests.increment(1);
        transition(&wire, RequestState::Received);

        let result = self.run(&wire, namespace, method, params).await;
        if let Err(err) = &result {
            self.metrics.failures.increment(1);
            warn!(
                message = "request transition",
                method = %wire,
                state = RequestState::Failed.as_str(),
                code = err.code(),
                error = %err
            );
        }
        result
    }

    async fn run(
        &self,
        wire: &str,
        namespace: &str,
        method: &str,
        params: &[Param],
    ) -> Result<Value, DispatchError> {
        let method = Method::resolve(namespace, method)
            .ok_or_else(|| DispatchError::MethodNotFound(wire.to_string()))?;
        let operation = Operation::decode(method, params)?;
        transition(wire, RequestState::Validated);

        let start = Instant::now();
        transition(wire, RequestState::Dispatched);
        let result = handlers::handle(&self.context, &self.metrics, operation).await;
        self.metrics.handler_duration.record(start.elapsed().as_secs_f64());

        let value = result.map_err(|e| DispatchError::Internal(e.to_string()))?;
        info!(
            message = "request transition",
            method = %wire,
            state = RequestState::Succeeded.as_str(),
            duration_ms = start.elapsed().as_millis() as u64
        );
        Ok(value)
    }
}

fn transition(wire: &str, state: RequestState) {
    debug!(message = "request transition", method = %wire, state = state.as_str());
}
