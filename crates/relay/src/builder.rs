//! Assembles and signs user operations from contract calls.

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;
use quarry_core::{UserOperation, UserOperationV06, UserOperationV07};
use tracing::debug;

use crate::{
    account::SmartAccount,
    error::RelayError,
    paymaster::{PaymasterGas, apply_paymaster},
    transport::{self, RpcTransport},
};

/// One call to execute from the smart account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

impl Call {
    pub fn new<C: SolCall>(to: Address, call: &C) -> Self {
        Self { to, value: U256::ZERO, data: call.abi_encode().into() }
    }

    pub const fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }
}

/// Gas fields of an operation. No estimation is done; the defaults are fixed
/// upper bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasParams {
    pub pre_verification_gas: U256,
    pub verification_gas_limit: U256,
    pub call_gas_limit: U256,
    pub paymaster_verification_gas_limit: U256,
    pub paymaster_post_op_gas_limit: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
}

impl Default for GasParams {
    fn default() -> Self {
        Self {
            pre_verification_gas: U256::from(100_000),
            verification_gas_limit: U256::from(1_000_000),
            call_gas_limit: U256::from(1_000_000),
            paymaster_verification_gas_limit: U256::from(100_000),
            paymaster_post_op_gas_limit: U256::from(100_000),
            max_fee_per_gas: U256::from(100_000),
            max_priority_fee_per_gas: U256::ZERO,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OperationBuilder {
    account: Arc<dyn SmartAccount>,
    transport: Arc<dyn RpcTransport>,
    gas: GasParams,
}

impl OperationBuilder {
    pub fn new(account: Arc<dyn SmartAccount>, transport: Arc<dyn RpcTransport>, gas: GasParams) -> Self {
        Self { account, transport, gas }
    }

    pub fn account(&self) -> &Arc<dyn SmartAccount> {
        &self.account
    }

    /// Builds and signs an operation executing `calls` in order. `gas`
    /// replaces the configured defaults for this operation only.
    pub async fn build(&self, calls: &[Call], gas: Option<GasParams>) -> Result<UserOperation, RelayError> {
        if calls.is_empty() {
            return Err(RelayError::EmptyOperation);
        }
        let gas = gas.unwrap_or(self.gas);
        let account = &self.account;
        let sender = account.address();

        let (nonce, factory_args, chain_id) = tokio::try_join!(
            account.nonce(),
            account.factory_args(),
            async { transport::chain_id(self.transport.as_ref()).await.map_err(RelayError::from) },
        )?;
        let call_data = account.encode_calls(calls)?;

        let mut op = match account.entry_point_version() {
            quarry_core::EntryPointVersion::V06 => UserOperation::V06(UserOperationV06 {
                sender,
                nonce,
                init_code: factory_args
                    .map(|(factory, data)| {
                        let mut buf = factory.to_vec();
                        buf.extend_from_slice(&data);
                        Bytes::from(buf)
                    })
                    .unwrap_or_default(),
                call_data,
                call_gas_limit: gas.call_gas_limit,
                verification_gas_limit: gas.verification_gas_limit,
                pre_verification_gas: gas.pre_verification_gas,
                max_fee_per_gas: gas.max_fee_per_gas,
                max_priority_fee_per_gas: gas.max_priority_fee_per_gas,
                paymaster_and_data: Bytes::new(),
                signature: Bytes::new(),
            }),
            quarry_core::EntryPointVersion::V07 => {
                let (factory, factory_data) = factory_args.unzip();
                UserOperation::V07(UserOperationV07 {
                    sender,
                    nonce,
                    factory,
                    factory_data,
                    call_data,
                    call_gas_limit: gas.call_gas_limit,
                    verification_gas_limit: gas.verification_gas_limit,
                    pre_verification_gas: gas.pre_verification_gas,
                    max_fee_per_gas: gas.max_fee_per_gas,
                    max_priority_fee_per_gas: gas.max_priority_fee_per_gas,
                    paymaster: None,
                    paymaster_verification_gas_limit: None,
                    paymaster_post_op_gas_limit: None,
                    paymaster_data: None,
                    signature: Bytes::new(),
                })
            }
        };

        if let Some(paymaster) = account.paymaster() {
            let data = paymaster.paymaster_data(&op).await?;
            apply_paymaster(
                &mut op,
                data,
                PaymasterGas {
                    verification_gas_limit: gas.paymaster_verification_gas_limit,
                    post_op_gas_limit: gas.paymaster_post_op_gas_limit,
                },
            )?;
        }

        let hash = op.hash(account.entry_point(), chain_id);
        let signature = account.sign_user_operation_hash(hash).await?;
        op.set_signature(signature);

        debug!(
            message = "built user operation",
            sender = %sender,
            nonce = %nonce,
            calls = calls.len(),
            user_op_hash = %hash
        );
        Ok(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paymaster::{PaymasterDataProvider, StaticPaymaster};
    use alloy_primitives::{B256, address};
    use async_trait::async_trait;
    use quarry_core::{EntryPointVersion, abi::IQuarryPaymaster};
    use serde_json::{Value, json};

    const SENDER: Address = address!("5555555555555555555555555555555555555555");
    const PAYMASTER: Address = address!("3333333333333333333333333333333333333333");

    #[derive(Debug)]
    struct FixedAccount {
        version: EntryPointVersion,
        deployed: bool,
        paymaster: Option<Arc<dyn PaymasterDataProvider>>,
    }

    #[async_trait]
    impl SmartAccount for FixedAccount {
        fn entry_point_version(&self) -> EntryPointVersion {
            self.version
        }
        fn address(&self) -> Address {
            SENDER
        }
        async fn nonce(&self) -> Result<U256, RelayError> {
            Ok(U256::from(3))
        }
        async fn factory_args(&self) -> Result<Option<(Address, Bytes)>, RelayError> {
            Ok((!self.deployed).then(|| (self.version.default_factory(), Bytes::from_static(&[0xaa]))))
        }
        fn encode_calls(&self, calls: &[Call]) -> Result<Bytes, RelayError> {
            Ok(calls[0].data.clone())
        }
        async fn sign_user_operation_hash(&self, hash: B256) -> Result<Bytes, RelayError> {
            Ok(Bytes::copy_from_slice(hash.as_slice()))
        }
        fn paymaster(&self) -> Option<Arc<dyn PaymasterDataProvider>> {
            self.paymaster.clone()
        }
    }

    #[derive(Debug)]
    struct ChainOnly;

    #[async_trait]
    impl RpcTransport for ChainOnly {
        async fn request(&self, method: &str, _params: Vec<Value>) -> Result<Value, crate::TransportError> {
            assert_eq!(method, "eth_chainId");
            Ok(json!("0x7a69"))
        }
    }

    fn builder(version: EntryPointVersion, deployed: bool) -> OperationBuilder {
        let account = FixedAccount {
            version,
            deployed,
            paymaster: Some(Arc::new(StaticPaymaster::new(PAYMASTER))),
        };
        OperationBuilder::new(Arc::new(account), Arc::new(ChainOnly), GasParams::default())
    }

    fn grant() -> Call {
        Call::new(
            PAYMASTER,
            &IQuarryPaymaster::grantAllowanceCall { user: SENDER, allowance: U256::from(1) },
        )
    }

    #[tokio::test]
    async fn v07_operation_uses_split_paymaster_fields() {
        let op = builder(EntryPointVersion::V07, true).build(&[grant()], None).await.unwrap();
        let UserOperation::V07(inner) = &op else { panic!("expected v0.7 operation") };

        assert_eq!(inner.nonce, U256::from(3));
        assert_eq!(inner.factory, None);
        assert_eq!(inner.paymaster, Some(PAYMASTER));
        assert_eq!(inner.paymaster_verification_gas_limit, Some(U256::from(100_000)));
        assert_eq!(inner.max_priority_fee_per_gas, U256::ZERO);
        assert_eq!(inner.call_data, grant().data);
        // the fake account signs by echoing the hash
        let mut unsigned = op.clone();
        unsigned.set_signature(Bytes::new());
        assert_eq!(
            inner.signature.as_ref(),
            unsigned.hash(EntryPointVersion::V07.address(), 31337).as_slice()
        );
    }

    #[tokio::test]
    async fn v06_operation_uses_combined_paymaster_and_init_code() {
        let op = builder(EntryPointVersion::V06, false).build(&[grant()], None).await.unwrap();
        let UserOperation::V06(inner) = op else { panic!("expected v0.6 operation") };

        assert_eq!(inner.paymaster_and_data.as_ref(), PAYMASTER.as_slice());
        assert_eq!(inner.init_code.len(), 21);
        assert_eq!(&inner.init_code[..20], EntryPointVersion::V06.default_factory().as_slice());
    }

    #[tokio::test]
    async fn gas_override_applies_to_one_operation() {
        let builder = builder(EntryPointVersion::V07, true);
        let custom = GasParams { call_gas_limit: U256::from(42), ..Default::default() };
        let UserOperation::V07(first) = builder.build(&[grant()], Some(custom)).await.unwrap() else {
            panic!("expected v0.7 operation")
        };
        let UserOperation::V07(second) = builder.build(&[grant()], None).await.unwrap() else {
            panic!("expected v0.7 operation")
        };
        assert_eq!(first.call_gas_limit, U256::from(42));
        assert_eq!(second.call_gas_limit, U256::from(1_000_000));
    }

    #[test]
    fn call_carries_encoded_data_and_value() {
        let call = grant().with_value(U256::from(7));
        assert_eq!(call.data[..4], IQuarryPaymaster::grantAllowanceCall::SELECTOR);
        assert_eq!(call.value, U256::from(7));
    }
}
