//! Allowance and pass records as stored by the paymaster world.

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

/// A sponsor-granted, non-withdrawable spending credit. Each user's
/// allowances form a doubly linked list ordered by `amount`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Allowance {
    pub user: Address,
    pub sponsor: Address,
    pub amount: U256,
    pub next: Address,
    pub previous: Address,
}

/// Head of a user's allowance list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllowanceList {
    pub user: Address,
    pub first: Address,
    pub length: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Spender {
    pub spender: Address,
    pub user: Address,
}

/// Pass parameters. A zero grantor means the pass was never registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassConfig {
    pub pass_id: B256,
    pub claim_amount: U256,
    pub claim_interval: U256,
    pub validity_period: U256,
    pub grantor: Address,
}

impl PassConfig {
    pub fn is_registered(&self) -> bool {
        !self.grantor.is_zero()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassHolder {
    pub user: Address,
    pub pass_id: B256,
    pub last_claimed: U256,
    pub last_renewed: U256,
}

impl PassHolder {
    /// Timestamp at which the pass stops being valid.
    pub fn expires_at(&self, config: &PassConfig) -> u64 {
        seconds(self.last_renewed).saturating_add(seconds(config.validity_period))
    }

    pub fn is_active(&self, config: &PassConfig, now: u64) -> bool {
        now < self.expires_at(config)
    }

    /// Earliest time of the next claim; `None` if the pass was never claimed.
    pub fn next_claim_at(&self, config: &PassConfig) -> Option<u64> {
        if self.last_claimed.is_zero() {
            return None;
        }
        Some(seconds(self.last_claimed).saturating_add(seconds(config.claim_interval)))
    }

    pub fn is_claim_eligible(&self, config: &PassConfig, now: u64) -> bool {
        self.is_active(config, now) && self.next_claim_at(config).is_none_or(|at| now >= at)
    }
}

/// Record of an allowance handed out by this deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantRecord {
    pub user: Address,
    pub amount: U256,
    pub updated_at: u32,
}

impl GrantRecord {
    pub fn is_granted(&self) -> bool {
        !self.amount.is_zero()
    }
}

/// Where a user stands with respect to claiming from a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum PassStatus {
    UnknownPass,
    NeverHeld,
    Expired { at: u64 },
    Cooldown { until: u64 },
    Eligible,
}

impl PassStatus {
    pub fn evaluate(config: &PassConfig, holder: Option<&PassHolder>, now: u64) -> Self {
        if !config.is_registered() {
            return Self::UnknownPass;
        }
        let Some(holder) = holder.filter(|h| !h.last_renewed.is_zero()) else {
            return Self::NeverHeld;
        };
        if !holder.is_active(config, now) {
            return Self::Expired { at: holder.expires_at(config) };
        }
        match holder.next_claim_at(config) {
            Some(until) if now < until => Self::Cooldown { until },
            _ => Self::Eligible,
        }
    }

    pub const fn is_eligible(&self) -> bool {
        matches!(self, Self::Eligible)
    }
}

fn seconds(value: U256) -> u64 {
    value.saturating_to()
}
