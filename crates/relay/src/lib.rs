//! Relaying of sponsored user operations.
//!
//! [`InterceptingTransport`] sits between the relay and the chain and rewrites
//! submissions to low-latency methods. [`OperationBuilder`] turns contract calls
//! into signed user operations for a [`SmartAccount`], [`RelayClient`] submits
//! them and waits for the outcome, and [`RevertDecoder`] explains failures.

pub mod account;
pub mod builder;
pub mod client;
pub mod error;
pub mod interceptor;
pub mod paymaster;
pub mod revert;
pub mod transport;

pub use account::{SimpleSmartAccount, SmartAccount};
pub use builder::{Call, GasParams, OperationBuilder};
pub use client::{Execution, RelayClient};
pub use error::{RelayError, TransportError};
pub use interceptor::{InterceptingTransport, InterceptorConfig, RewriteMethods};
pub use paymaster::{PaymasterData, PaymasterDataProvider, StaticPaymaster};
pub use revert::{DecodedRevert, RevertDecoder, RevertExplanation, RevertKind};
pub use transport::{HttpTransport, RpcTransport};
