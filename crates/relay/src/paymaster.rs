//! Paymaster data providers.

use std::fmt::Debug;

use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use quarry_core::{UserOperation, UserOperationV06, UserOperationV07};

use crate::error::RelayError;

/// Paymaster fields for an operation, in whichever shape the provider speaks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymasterData {
    Split { paymaster: Address, data: Bytes },
    /// `paymaster ‖ data` as a single blob.
    Combined(Bytes),
}

impl PaymasterData {
    /// The v0.6 `paymasterAndData` field.
    pub fn into_combined(self) -> Bytes {
        match self {
            Self::Combined(blob) => blob,
            Self::Split { paymaster, data } => {
                let mut buf = Vec::with_capacity(20 + data.len());
                buf.extend_from_slice(paymaster.as_slice());
                buf.extend_from_slice(&data);
                Bytes::from(buf)
            }
        }
    }

    /// The v0.7 `(paymaster, paymasterData)` pair. A combined blob is split
    /// after the 20-byte address.
    pub fn into_split(self) -> Result<(Address, Bytes), RelayError> {
        match self {
            Self::Split { paymaster, data } => Ok((paymaster, data)),
            Self::Combined(blob) if blob.len() >= 20 => {
                Ok((Address::from_slice(&blob[..20]), blob.slice(20..)))
            }
            Self::Combined(blob) => Err(RelayError::Paymaster(format!(
                "paymasterAndData is {} bytes, expected at least 20",
                blob.len()
            ))),
        }
    }
}

/// Gas limits charged to the paymaster on v0.7 entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymasterGas {
    pub verification_gas_limit: U256,
    pub post_op_gas_limit: U256,
}

#[async_trait]
pub trait PaymasterDataProvider: Send + Sync + Debug {
    /// Called with the unsigned operation, before paymaster fields are set.
    async fn paymaster_data(&self, op: &UserOperation) -> Result<PaymasterData, RelayError>;
}

/// A paymaster that sponsors based on on-chain allowances and needs no data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticPaymaster {
    paymaster: Address,
}

impl StaticPaymaster {
    pub const fn new(paymaster: Address) -> Self {
        Self { paymaster }
    }

    pub const fn address(&self) -> Address {
        self.paymaster
    }
}

#[async_trait]
impl PaymasterDataProvider for StaticPaymaster {
    async fn paymaster_data(&self, _op: &UserOperation) -> Result<PaymasterData, RelayError> {
        Ok(PaymasterData::Split { paymaster: self.paymaster, data: Bytes::new() })
    }
}

/// Writes `data` into the operation's paymaster fields for its entry point version.
pub fn apply_paymaster(
    op: &mut UserOperation,
    data: PaymasterData,
    gas: PaymasterGas,
) -> Result<(), RelayError> {
    match op {
        UserOperation::V06(UserOperationV06 { paymaster_and_data, .. }) => {
            *paymaster_and_data = data.into_combined();
        }
        UserOperation::V07(op) => {
            let (paymaster, paymaster_data) = data.into_split()?;
            apply_v07(op, paymaster, paymaster_data, gas);
        }
    }
    Ok(())
}

fn apply_v07(op: &mut UserOperationV07, paymaster: Address, data: Bytes, gas: PaymasterGas) {
    op.paymaster = Some(paymaster);
    op.paymaster_data = Some(data);
    op.paymaster_verification_gas_limit = Some(gas.verification_gas_limit);
    op.paymaster_post_op_gas_limit = Some(gas.post_op_gas_limit);
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, bytes};

    const PAYMASTER: Address = address!("3333333333333333333333333333333333333333");

    #[test]
    fn split_data_is_concatenated_for_v06() {
        let data = PaymasterData::Split { paymaster: PAYMASTER, data: bytes!("beef") };
        assert_eq!(data.into_combined(), bytes!("3333333333333333333333333333333333333333beef"));
    }

    #[test]
    fn combined_blob_is_split_for_v07() {
        let data = PaymasterData::Combined(bytes!("3333333333333333333333333333333333333333beef"));
        assert_eq!(data.into_split().unwrap(), (PAYMASTER, bytes!("beef")));

        let short = PaymasterData::Combined(bytes!("3333"));
        assert!(matches!(short.into_split(), Err(RelayError::Paymaster(_))));
    }

    #[tokio::test]
    async fn static_paymaster_has_no_data() {
        let op = UserOperation::V06(UserOperationV06 {
            sender: Address::ZERO,
            nonce: U256::ZERO,
            init_code: Bytes::new(),
            call_data: Bytes::new(),
            call_gas_limit: U256::ZERO,
            verification_gas_limit: U256::ZERO,
            pre_verification_gas: U256::ZERO,
            max_fee_per_gas: U256::ZERO,
            max_priority_fee_per_gas: U256::ZERO,
            paymaster_and_data: Bytes::new(),
            signature: Bytes::new(),
        });
        let data = StaticPaymaster::new(PAYMASTER).paymaster_data(&op).await.unwrap();
        assert_eq!(data.into_combined(), Bytes::copy_from_slice(PAYMASTER.as_slice()));
    }
}
