use std::{collections::HashSet, sync::Arc};

use alloy_primitives::{Address, B256, U256};
use quarry_core::{Allowance, PassStatus, Spender};
use tracing::{debug, warn};

use crate::{error::LedgerError, source::LedgerSource};

/// Read-only view of the allowance and pass tables. Values may lag the chain.
#[derive(Debug, Clone)]
pub struct LedgerMirror {
    source: Arc<dyn LedgerSource>,
    grant_tracking: bool,
}

impl LedgerMirror {
    pub fn new(source: Arc<dyn LedgerSource>, grant_tracking: bool) -> Self {
        Self { source, grant_tracking }
    }

    pub const fn grant_tracking(&self) -> bool {
        self.grant_tracking
    }

    /// The user's allowances in spending order, smallest first.
    pub async fn list_allowances(&self, user: Address) -> Result<Vec<Allowance>, LedgerError> {
        let list = self.source.allowance_list(user).await?;
        let length: usize = list.length.saturating_to();

        let mut allowances = Vec::with_capacity(length.min(64));
        let mut visited = HashSet::new();
        let mut current = list.first;
        let mut previous = Address::ZERO;
        let mut last_amount = U256::ZERO;

        for index in 0..length {
            if current.is_zero() {
                return Err(corrupt(user, format!("list ends after {index} of {length} entries")));
            }
            if !visited.insert(current) {
                return Err(corrupt(user, format!("sponsor {current} appears twice")));
            }
            let Some(allowance) = self.source.allowance(user, current).await? else {
                return Err(corrupt(user, format!("no allowance record for sponsor {current}")));
            };
            if allowance.previous != previous {
                return Err(corrupt(
                    user,
                    format!(
                        "sponsor {current} points back to {} instead of {previous}",
                        allowance.previous
                    ),
                ));
            }
            if allowance.amount < last_amount {
                return Err(corrupt(
                    user,
                    format!("allowance of sponsor {current} is smaller than the one before it"),
                ));
            }

            previous = current;
            last_amount = allowance.amount;
            current = allowance.next;
            allowances.push(allowance);
        }

        if !current.is_zero() {
            return Err(corrupt(user, format!("entry after the last one points to {current}")));
        }

        debug!(message = "listed allowances", user = %user, count = allowances.len());
        Ok(allowances)
    }

    pub async fn pass_status(&self, user: Address, pass_id: B256, now: u64) -> Result<PassStatus, LedgerError> {
        let Some(config) = self.source.pass_config(pass_id).await? else {
            return Ok(PassStatus::UnknownPass);
        };
        let holder = self.source.pass_holder(user, pass_id).await?;
        Ok(PassStatus::evaluate(&config, holder.as_ref(), now))
    }

    pub async fn is_pass_eligible(&self, user: Address, pass_id: B256, now: u64) -> Result<bool, LedgerError> {
        Ok(self.pass_status(user, pass_id, now).await?.is_eligible())
    }

    /// Whether this deployment already granted `user` an allowance. Always
    /// false when grants are not tracked.
    pub async fn has_existing_grant(&self, user: Address) -> Result<bool, LedgerError> {
        if !self.grant_tracking {
            return Ok(false);
        }
        Ok(self.source.grant(user).await?.is_some_and(|grant| grant.is_granted()))
    }

    pub async fn spender(&self, spender: Address) -> Result<Option<Spender>, LedgerError> {
        self.source.spender(spender).await
    }
}

fn corrupt(user: Address, detail: String) -> LedgerError {
    warn!(message = "corrupt allowance list", user = %user, detail = %detail);
    LedgerError::corrupt(user, detail)
}
