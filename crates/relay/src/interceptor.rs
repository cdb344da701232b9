//! Request rewriting and caching in front of an upstream transport.
//!
//! Chains with a low-latency inclusion backend expose submission methods that
//! return the receipt directly. The interceptor rewrites the standard
//! submission calls to those methods, caches what they return and serves the
//! follow-up receipt lookups from the cache.

use std::{sync::Arc, time::Duration};

use alloy_primitives::B256;
use async_trait::async_trait;
use moka::future::Cache;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::{error::TransportError, transport::RpcTransport};

/// Low-latency replacement for `eth_sendRawTransaction`.
pub const DEFAULT_SEND_RAW_TRANSACTION: &str = "wiresaw_sendRawTransaction";
/// Low-latency replacement for `eth_sendUserOperation`.
pub const DEFAULT_SEND_USER_OPERATION: &str = "pimlico_sendUserOperationNow";

/// Methods the standard submission calls are rewritten to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteMethods {
    /// Target of `eth_sendRawTransaction`.
    pub send_raw_transaction: String,
    /// Target of `eth_sendUserOperation`.
    pub send_user_operation: String,
}

impl Default for RewriteMethods {
    fn default() -> Self {
        Self {
            send_raw_transaction: DEFAULT_SEND_RAW_TRANSACTION.to_string(),
            send_user_operation: DEFAULT_SEND_USER_OPERATION.to_string(),
        }
    }
}

/// Settings of an [`InterceptingTransport`].
#[derive(Debug, Clone)]
pub struct InterceptorConfig {
    /// `None` forwards submissions unchanged.
    pub rewrites: Option<RewriteMethods>,
    /// Maximum entries per receipt cache.
    pub cache_capacity: u64,
    /// Lifetime of a cached receipt.
    pub cache_ttl: Duration,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            rewrites: Some(RewriteMethods::default()),
            cache_capacity: 10_000,
            cache_ttl: Duration::from_secs(600),
        }
    }
}

/// Outcome of a cache-miss lookup that should not populate the cache.
#[derive(Debug, Clone)]
enum Miss {
    Pending,
    Failed(TransportError),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TxReceiptKey {
    transaction_hash: B256,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserOpReceiptKey {
    user_op_hash: B256,
    receipt: Value,
}

/// Transport that rewrites submissions and serves receipts from cache.
#[derive(Debug)]
pub struct InterceptingTransport<T> {
    inner: T,
    rewrites: Option<RewriteMethods>,
    chain_id: OnceCell<Value>,
    tx_receipts: Cache<B256, Value>,
    user_op_receipts: Cache<B256, Value>,
}

impl<T: RpcTransport> InterceptingTransport<T> {
    /// Wraps `inner` with empty caches.
    pub fn new(inner: T, config: InterceptorConfig) -> Self {
        let cache = || {
            Cache::builder()
                .max_capacity(config.cache_capacity)
                .time_to_live(config.cache_ttl)
                .build()
        };
        Self {
            inner,
            rewrites: config.rewrites.clone(),
            chain_id: OnceCell::new(),
            tx_receipts: cache(),
            user_op_receipts: cache(),
        }
    }

    /// The wrapped transport.
    pub const fn inner(&self) -> &T {
        &self.inner
    }

    async fn chain_id(&self) -> Result<Value, TransportError> {
        self.chain_id
            .get_or_try_init(|| self.inner.request("eth_chainId", vec![]))
            .await
            .cloned()
    }

    async fn send_raw_transaction(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<Value, TransportError> {
        let receipt = self.inner.request(method, params).await?;
        if receipt.is_null() {
            return Err(TransportError::SubmissionFailed { method: method.to_string() });
        }
        let key = parse_receipt_key::<TxReceiptKey>(method, &receipt)?;
        self.tx_receipts.insert(key.transaction_hash, receipt).await;
        debug!(message = "cached transaction receipt", tx_hash = %key.transaction_hash);
        Ok(serde_json::json!(key.transaction_hash))
    }

    async fn send_user_operation(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<Value, TransportError> {
        let receipt = self.inner.request(method, params).await?;
        if receipt.is_null() {
            return Err(TransportError::SubmissionFailed { method: method.to_string() });
        }
        let key = parse_receipt_key::<UserOpReceiptKey>(method, &receipt)?;
        if let Ok(tx) = serde_json::from_value::<TxReceiptKey>(key.receipt.clone()) {
            self.tx_receipts.insert(tx.transaction_hash, key.receipt).await;
        }
        self.user_op_receipts.insert(key.user_op_hash, receipt).await;
        debug!(message = "cached user operation receipt", user_op_hash = %key.user_op_hash);
        Ok(serde_json::json!(key.user_op_hash))
    }

    /// Serves `method` from `cache`, collapsing concurrent misses for the same
    /// hash into one upstream call. Null results are returned but not cached.
    async fn cached_lookup(
        &self,
        cache: &Cache<B256, Value>,
        method: &str,
        params: Vec<Value>,
    ) -> Result<Value, TransportError> {
        let Some(hash) = params.first().and_then(|p| serde_json::from_value::<B256>(p.clone()).ok())
        else {
            return self.inner.request(method, params).await;
        };

        let lookup = async {
            match self.inner.request(method, params).await {
                Ok(Value::Null) => Err(Miss::Pending),
                Ok(value) => Ok(value),
                Err(err) => Err(Miss::Failed(err)),
            }
        };

        match cache.try_get_with(hash, lookup).await {
            Ok(value) => Ok(value),
            Err(miss) => match Arc::unwrap_or_clone(miss) {
                Miss::Pending => Ok(Value::Null),
                Miss::Failed(err) => Err(err),
            },
        }
    }
}

fn parse_receipt_key<K: for<'de> Deserialize<'de>>(
    method: &str,
    receipt: &Value,
) -> Result<K, TransportError> {
    serde_json::from_value(receipt.clone()).map_err(|e| {
        warn!(message = "unexpected receipt shape", method, error = %e);
        TransportError::Decode { method: method.to_string(), reason: e.to_string() }
    })
}

#[async_trait]
impl<T: RpcTransport> RpcTransport for InterceptingTransport<T> {
    async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value, TransportError> {
        match (method, &self.rewrites) {
            ("eth_chainId", _) => self.chain_id().await,
            ("eth_sendRawTransaction", Some(rewrites)) => {
                self.send_raw_transaction(&rewrites.send_raw_transaction, params).await
            }
            ("eth_sendUserOperation", Some(rewrites)) => {
                self.send_user_operation(&rewrites.send_user_operation, params).await
            }
            ("eth_getTransactionReceipt", _) => {
                self.cached_lookup(&self.tx_receipts, method, params).await
            }
            ("eth_getUserOperationReceipt", _) => {
                self.cached_lookup(&self.user_op_receipts, method, params).await
            }
            _ => self.inner.request(method, params).await,
        }
    }
}
