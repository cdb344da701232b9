use std::sync::Arc;

use alloy_primitives::{Address, U256};
use chrono::Utc;
use quarry_core::store::{self, Table};
use quarry_ledger::{LedgerMirror, StoreLedgerSource};
use quarry_relay::{
    HttpTransport, InterceptingTransport, OperationBuilder, RelayClient, RpcTransport, SimpleSmartAccount,
    SmartAccount, StaticPaymaster,
};
use tracing::info;

use crate::config::Config;

/// Everything a handler needs. Built once at startup and shared read-only.
#[derive(Debug, Clone)]
pub struct AppContext {
    /// The paymaster world. All calls and store reads target it.
    pub paymaster: Address,
    pub allowance_amount: U256,
    /// Grants table of the configured namespace; `None` disables grant tracking.
    pub grants: Option<Table>,
    /// Chain RPC, used for reads and setup.
    pub chain: Arc<dyn RpcTransport>,
    pub builder: OperationBuilder,
    pub relay: RelayClient,
    pub ledger: LedgerMirror,
    /// Current unix time in seconds.
    pub clock: fn() -> u64,
}

impl AppContext {
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let interceptor = config.interceptor_config();
        let chain: Arc<dyn RpcTransport> = Arc::new(InterceptingTransport::new(
            HttpTransport::new(config.rpc_url.clone(), config.request_timeout())?,
            interceptor.clone(),
        ));
        let bundler: Arc<dyn RpcTransport> = if config.bundler_url() == &config.rpc_url {
            chain.clone()
        } else {
            Arc::new(InterceptingTransport::new(
                HttpTransport::new(config.bundler_url().clone(), config.request_timeout())?,
                interceptor,
            ))
        };

        let account = SimpleSmartAccount::connect(
            chain.clone(),
            config.signer()?,
            config.entry_point_version,
            config.account_factory(),
        )
        .await?
        .with_paymaster(Arc::new(StaticPaymaster::new(config.paymaster_address)));

        info!(
            message = "sponsor account ready",
            account = %account.address(),
            owner = %account.owner(),
            entry_point = %account.entry_point()
        );

        let account: Arc<dyn SmartAccount> = Arc::new(account);
        let relay = RelayClient::new(
            bundler,
            account.entry_point(),
            config.poll_interval(),
            config.receipt_timeout(),
        );
        let source = StoreLedgerSource::new(chain.clone(), config.paymaster_address, config.namespace.as_deref());

        Ok(Self {
            paymaster: config.paymaster_address,
            allowance_amount: config.allowance_amount,
            grants: config.namespace.as_deref().map(store::grants_table),
            builder: OperationBuilder::new(account, chain.clone(), config.gas_params()),
            relay,
            ledger: LedgerMirror::new(Arc::new(source), config.namespace.is_some()),
            chain,
            clock: unix_now,
        })
    }

    pub fn now(&self) -> u64 {
        (self.clock)()
    }

    pub fn account(&self) -> &Arc<dyn SmartAccount> {
        self.builder.account()
    }
}

pub fn unix_now() -> u64 {
    Utc::now().timestamp().max(0) as u64
}
