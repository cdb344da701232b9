//! Where the mirror reads records from.

use std::{fmt::Debug, sync::Arc};

use alloy_primitives::{Address, B256};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use quarry_core::{
    Allowance, AllowanceList, GrantRecord, PassConfig, PassHolder, Spender,
    abi::IQuarryPaymaster,
    store::{self, StaticRecord, Table},
};
use quarry_relay::{RpcTransport, transport};
use tracing::trace;

use crate::error::LedgerError;

/// Record lookups against the paymaster's store. Unset records are `None`.
#[async_trait]
pub trait LedgerSource: Send + Sync + Debug {
    async fn allowance(&self, user: Address, sponsor: Address) -> Result<Option<Allowance>, LedgerError>;

    async fn allowance_list(&self, user: Address) -> Result<AllowanceList, LedgerError>;

    async fn spender(&self, spender: Address) -> Result<Option<Spender>, LedgerError>;

    async fn pass_config(&self, pass_id: B256) -> Result<Option<PassConfig>, LedgerError>;

    async fn pass_holder(&self, user: Address, pass_id: B256) -> Result<Option<PassHolder>, LedgerError>;

    /// Always `None` when the deployment does not track grants.
    async fn grant(&self, user: Address) -> Result<Option<GrantRecord>, LedgerError>;
}

/// Reads records with `getRecord` calls against the world contract.
#[derive(Debug, Clone)]
pub struct StoreLedgerSource {
    transport: Arc<dyn RpcTransport>,
    world: Address,
    allowance: Table,
    allowance_list: Table,
    spender: Table,
    pass_config: Table,
    pass_holder: Table,
    grants: Option<Table>,
}

impl StoreLedgerSource {
    pub fn new(transport: Arc<dyn RpcTransport>, world: Address, grants_namespace: Option<&str>) -> Self {
        Self {
            transport,
            world,
            allowance: store::allowance_table(),
            allowance_list: store::allowance_list_table(),
            spender: store::spender_table(),
            pass_config: store::pass_config_table(),
            pass_holder: store::pass_holder_table(),
            grants: grants_namespace.map(store::grants_table),
        }
    }

    /// Reads the static fields of any table in the world.
    pub async fn record(&self, table: &Table, key: Vec<B256>) -> Result<StaticRecord, LedgerError> {
        let call = IQuarryPaymaster::getRecordCall {
            tableId: table.table_id(),
            keyTuple: key,
            fieldLayout: table.field_layout(),
        };
        let output =
            transport::eth_call(self.transport.as_ref(), self.world, call.abi_encode().into()).await?;
        let record = IQuarryPaymaster::getRecordCall::abi_decode_returns(&output)
            .map_err(|e| LedgerError::Decode { table: table.name, reason: e.to_string() })?;
        trace!(message = "read record", table = table.name, bytes = record.staticData.len());
        Ok(table.decode_static(&record.staticData))
    }
}

#[async_trait]
impl LedgerSource for StoreLedgerSource {
    async fn allowance(&self, user: Address, sponsor: Address) -> Result<Option<Allowance>, LedgerError> {
        let record = self
            .record(&self.allowance, vec![store::address_key(user), store::address_key(sponsor)])
            .await?;
        Ok((!record.is_empty()).then(|| Allowance {
            user,
            sponsor,
            amount: record.uint(0),
            next: record.address(1),
            previous: record.address(2),
        }))
    }

    async fn allowance_list(&self, user: Address) -> Result<AllowanceList, LedgerError> {
        let record = self.record(&self.allowance_list, vec![store::address_key(user)]).await?;
        Ok(AllowanceList { user, first: record.address(0), length: record.uint(1) })
    }

    async fn spender(&self, spender: Address) -> Result<Option<Spender>, LedgerError> {
        let record = self.record(&self.spender, vec![store::address_key(spender)]).await?;
        Ok((!record.is_empty()).then(|| Spender { spender, user: record.address(0) }))
    }

    async fn pass_config(&self, pass_id: B256) -> Result<Option<PassConfig>, LedgerError> {
        let record = self.record(&self.pass_config, vec![pass_id]).await?;
        Ok((!record.is_empty()).then(|| PassConfig {
            pass_id,
            claim_amount: record.uint(0),
            claim_interval: record.uint(1),
            validity_period: record.uint(2),
            grantor: record.address(3),
        }))
    }

    async fn pass_holder(&self, user: Address, pass_id: B256) -> Result<Option<PassHolder>, LedgerError> {
        let record =
            self.record(&self.pass_holder, vec![store::address_key(user), pass_id]).await?;
        Ok((!record.is_empty()).then(|| PassHolder {
            user,
            pass_id,
            last_claimed: record.uint(0),
            last_renewed: record.uint(1),
        }))
    }

    async fn grant(&self, user: Address) -> Result<Option<GrantRecord>, LedgerError> {
        let Some(grants) = &self.grants else {
            return Ok(None);
        };
        let record = self.record(grants, vec![store::address_key(user)]).await?;
        Ok((!record.is_empty()).then(|| GrantRecord {
            user,
            amount: record.uint(0),
            updated_at: record.uint(1).saturating_to(),
        }))
    }
}
