//! Sponsor relay service.
//!
//! Serves the named sponsor operations over JSON-RPC (`POST /rpc`) and REST
//! (`GET /api/{namespace}/{method}`). Each request is resolved by the
//! [`Dispatcher`], checked against the mirrored ledger and relayed as a
//! sponsored user operation.

pub mod config;
pub mod context;
pub mod dispatch;
pub mod handlers;
pub mod metrics;
pub mod server;
pub mod setup;

pub use config::Config;
pub use context::AppContext;
pub use dispatch::{DispatchError, Dispatcher, Method, Operation, Param};
pub use handlers::{HandlerError, Submitted};
pub use server::router;
