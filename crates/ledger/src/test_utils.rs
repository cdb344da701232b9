//! In-memory [`LedgerSource`] for tests.

use std::{collections::HashMap, sync::RwLock};

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use quarry_core::{Allowance, AllowanceList, GrantRecord, PassConfig, PassHolder, Spender};

use crate::{error::LedgerError, source::LedgerSource};

#[derive(Debug, Default)]
struct Records {
    allowances: HashMap<(Address, Address), Allowance>,
    lists: HashMap<Address, AllowanceList>,
    spenders: HashMap<Address, Spender>,
    pass_configs: HashMap<B256, PassConfig>,
    pass_holders: HashMap<(Address, B256), PassHolder>,
    grants: HashMap<Address, GrantRecord>,
}

#[derive(Debug, Default)]
pub struct InMemoryLedgerSource {
    records: RwLock<Records>,
}

impl InMemoryLedgerSource {
    /// Replaces `user`'s allowances with a well-formed list in the given order.
    pub fn set_allowances(&self, user: Address, entries: &[(Address, u64)]) {
        let mut records = self.records.write().unwrap();
        records.allowances.retain(|(u, _), _| *u != user);
        for (i, (sponsor, amount)) in entries.iter().enumerate() {
            let previous = if i == 0 { Address::ZERO } else { entries[i - 1].0 };
            let next = entries.get(i + 1).map(|(s, _)| *s).unwrap_or(Address::ZERO);
            records.allowances.insert(
                (user, *sponsor),
                Allowance { user, sponsor: *sponsor, amount: U256::from(*amount), next, previous },
            );
        }
        records.lists.insert(
            user,
            AllowanceList {
                user,
                first: entries.first().map(|(s, _)| *s).unwrap_or(Address::ZERO),
                length: U256::from(entries.len()),
            },
        );
    }

    pub fn set_list_length(&self, user: Address, length: u64) {
        let mut records = self.records.write().unwrap();
        if let Some(list) = records.lists.get_mut(&user) {
            list.length = U256::from(length);
        }
    }

    pub fn update_allowance(&self, user: Address, sponsor: Address, f: impl FnOnce(&mut Allowance)) {
        let mut records = self.records.write().unwrap();
        if let Some(allowance) = records.allowances.get_mut(&(user, sponsor)) {
            f(allowance);
        }
    }

    pub fn put_spender(&self, spender: Spender) {
        self.records.write().unwrap().spenders.insert(spender.spender, spender);
    }

    pub fn put_pass_config(&self, config: PassConfig) {
        self.records.write().unwrap().pass_configs.insert(config.pass_id, config);
    }

    pub fn put_pass_holder(&self, holder: PassHolder) {
        self.records.write().unwrap().pass_holders.insert((holder.user, holder.pass_id), holder);
    }

    pub fn put_grant(&self, grant: GrantRecord) {
        self.records.write().unwrap().grants.insert(grant.user, grant);
    }
}

#[async_trait]
impl LedgerSource for InMemoryLedgerSource {
    async fn allowance(&self, user: Address, sponsor: Address) -> Result<Option<Allowance>, LedgerError> {
        Ok(self.records.read().unwrap().allowances.get(&(user, sponsor)).cloned())
    }

    async fn allowance_list(&self, user: Address) -> Result<AllowanceList, LedgerError> {
        Ok(self.records.read().unwrap().lists.get(&user).copied().unwrap_or(AllowanceList {
            user,
            first: Address::ZERO,
            length: U256::ZERO,
        }))
    }

    async fn spender(&self, spender: Address) -> Result<Option<Spender>, LedgerError> {
        Ok(self.records.read().unwrap().spenders.get(&spender).copied())
    }

    async fn pass_config(&self, pass_id: B256) -> Result<Option<PassConfig>, LedgerError> {
        Ok(self.records.read().unwrap().pass_configs.get(&pass_id).copied())
    }

    async fn pass_holder(&self, user: Address, pass_id: B256) -> Result<Option<PassHolder>, LedgerError> {
        Ok(self.records.read().unwrap().pass_holders.get(&(user, pass_id)).copied())
    }

    async fn grant(&self, user: Address) -> Result<Option<GrantRecord>, LedgerError> {
        Ok(self.records.read().unwrap().grants.get(&user).copied())
    }
}
