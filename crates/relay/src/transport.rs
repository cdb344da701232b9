//! JSON-RPC transport seam.
//!
//! Everything that talks to a node or bundler goes through [`RpcTransport`],
//! so the interceptor can wrap any upstream and tests can swap in fakes.

use std::{fmt::Debug, time::Duration};

use alloy_primitives::{Address, Bytes, U64, U256};
use async_trait::async_trait;
use jsonrpsee::{
    core::{ClientError, client::ClientT, params::ArrayParams},
    http_client::{HttpClient, HttpClientBuilder},
};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;
use url::Url;

use crate::error::TransportError;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RpcTransport: Send + Sync + Debug {
    /// Issues a single JSON-RPC call and returns the raw `result` member.
    async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value, TransportError>;
}

/// Upstream transport over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: HttpClient,
    url: Url,
}

impl HttpTransport {
    pub fn new(url: Url, request_timeout: Duration) -> Result<Self, TransportError> {
        let client = HttpClientBuilder::default()
            .request_timeout(request_timeout)
            .build(url.as_str())
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self { client, url })
    }

    pub const fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value, TransportError> {
        let mut array = ArrayParams::new();
        for param in params {
            array.insert(param).map_err(|e| TransportError::Decode {
                method: method.to_string(),
                reason: e.to_string(),
            })?;
        }

        debug!(message = "upstream request", method, url = %self.url);
        self.client.request::<Value, _>(method, array).await.map_err(|e| match e {
            ClientError::Call(err) => TransportError::Rpc {
                code: err.code(),
                message: err.message().to_string(),
                data: err.data().map(|d| d.get().to_string()),
            },
            ClientError::RequestTimeout => TransportError::Timeout,
            ClientError::ParseError(err) => TransportError::Decode {
                method: method.to_string(),
                reason: err.to_string(),
            },
            other => TransportError::Network(other.to_string()),
        })
    }
}

/// Calls `method` and deserializes the result.
pub async fn call<R: DeserializeOwned>(
    transport: &dyn RpcTransport,
    method: &str,
    params: Vec<Value>,
) -> Result<R, TransportError> {
    let value = transport.request(method, params).await?;
    serde_json::from_value(value).map_err(|e| TransportError::Decode {
        method: method.to_string(),
        reason: e.to_string(),
    })
}

/// `eth_call` against the latest block.
pub async fn eth_call(
    transport: &dyn RpcTransport,
    to: Address,
    data: Bytes,
) -> Result<Bytes, TransportError> {
    call(transport, "eth_call", vec![json!({ "to": to, "data": data }), json!("latest")]).await
}

pub async fn chain_id(transport: &dyn RpcTransport) -> Result<u64, TransportError> {
    let id: U64 = call(transport, "eth_chainId", vec![]).await?;
    Ok(id.to::<u64>())
}

pub async fn get_code(transport: &dyn RpcTransport, address: Address) -> Result<Bytes, TransportError> {
    call(transport, "eth_getCode", vec![json!(address), json!("latest")]).await
}

/// Native balance at the latest block, in wei.
pub async fn get_balance(transport: &dyn RpcTransport, address: Address) -> Result<U256, TransportError> {
    call(transport, "eth_getBalance", vec![json!(address), json!("latest")]).await
}
