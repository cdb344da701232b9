//! Smart accounts that can originate user operations.

use std::{
    fmt::Debug,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use alloy_primitives::{Address, B256, Bytes, U256, aliases::U192};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use quarry_core::{
    EntryPointVersion,
    abi::{IEntryPoint, ISimpleAccount, ISimpleAccountFactory, ISimpleAccountV06},
};
use tracing::debug;

use crate::{
    builder::Call,
    error::RelayError,
    paymaster::PaymasterDataProvider,
    transport::{self, RpcTransport},
};

#[async_trait]
pub trait SmartAccount: Send + Sync + Debug {
    fn entry_point_version(&self) -> EntryPointVersion;

    fn entry_point(&self) -> Address {
        self.entry_point_version().address()
    }

    fn address(&self) -> Address;

    async fn nonce(&self) -> Result<U256, RelayError>;

    /// `(factory, factoryData)` while the account is not deployed yet.
    async fn factory_args(&self) -> Result<Option<(Address, Bytes)>, RelayError>;

    /// Encodes `calls` into the account's execution call data.
    fn encode_calls(&self, calls: &[Call]) -> Result<Bytes, RelayError>;

    /// Signature over a user operation hash.
    async fn sign_user_operation_hash(&self, hash: B256) -> Result<Bytes, RelayError>;

    /// Paymaster sponsoring this account's operations, if any.
    fn paymaster(&self) -> Option<Arc<dyn PaymasterDataProvider>>;
}

/// The reference `SimpleAccount`, owned by a single ECDSA key.
#[derive(Debug)]
pub struct SimpleSmartAccount {
    transport: Arc<dyn RpcTransport>,
    owner: PrivateKeySigner,
    version: EntryPointVersion,
    factory: Address,
    salt: U256,
    address: Address,
    deployed: AtomicBool,
    paymaster: Option<Arc<dyn PaymasterDataProvider>>,
}

impl SimpleSmartAccount {
    /// Resolves the counterfactual address of `owner`'s account through the factory.
    pub async fn connect(
        transport: Arc<dyn RpcTransport>,
        owner: PrivateKeySigner,
        version: EntryPointVersion,
        factory: Address,
    ) -> Result<Self, RelayError> {
        let salt = U256::ZERO;
        let call = ISimpleAccountFactory::getAddressCall { owner: owner.address(), salt };
        let output = transport::eth_call(transport.as_ref(), factory, call.abi_encode().into()).await?;
        let address = ISimpleAccountFactory::getAddressCall::abi_decode_returns(&output)
            .map_err(|e| RelayError::Decode { what: "getAddress result", reason: e.to_string() })?;

        debug!(message = "resolved smart account", owner = %owner.address(), account = %address);
        Ok(Self {
            transport,
            owner,
            version,
            factory,
            salt,
            address,
            deployed: AtomicBool::new(false),
            paymaster: None,
        })
    }

    pub fn with_paymaster(mut self, paymaster: Arc<dyn PaymasterDataProvider>) -> Self {
        self.paymaster = Some(paymaster);
        self
    }

    pub fn owner(&self) -> Address {
        self.owner.address()
    }

    async fn is_deployed(&self) -> Result<bool, RelayError> {
        if self.deployed.load(Ordering::Relaxed) {
            return Ok(true);
        }
        let code = transport::get_code(self.transport.as_ref(), self.address).await?;
        let deployed = !code.is_empty();
        if deployed {
            self.deployed.store(true, Ordering::Relaxed);
        }
        Ok(deployed)
    }
}

#[async_trait]
impl SmartAccount for SimpleSmartAccount {
    fn entry_point_version(&self) -> EntryPointVersion {
        self.version
    }

    fn address(&self) -> Address {
        self.address
    }

    async fn nonce(&self) -> Result<U256, RelayError> {
        let call = IEntryPoint::getNonceCall { sender: self.address, key: U192::ZERO };
        let output =
            transport::eth_call(self.transport.as_ref(), self.entry_point(), call.abi_encode().into())
                .await?;
        IEntryPoint::getNonceCall::abi_decode_returns(&output)
            .map_err(|e| RelayError::Decode { what: "getNonce result", reason: e.to_string() })
    }

    async fn factory_args(&self) -> Result<Option<(Address, Bytes)>, RelayError> {
        if self.is_deployed().await? {
            return Ok(None);
        }
        let call = ISimpleAccountFactory::createAccountCall { owner: self.owner.address(), salt: self.salt };
        Ok(Some((self.factory, call.abi_encode().into())))
    }

    fn encode_calls(&self, calls: &[Call]) -> Result<Bytes, RelayError> {
        if let [call] = calls {
            return Ok(ISimpleAccount::executeCall {
                dest: call.to,
                value: call.value,
                func: call.data.clone(),
            }
            .abi_encode()
            .into());
        }

        let dest = calls.iter().map(|c| c.to).collect();
        let func = calls.iter().map(|c| c.data.clone()).collect();
        let encoded = match self.version {
            // v0.6 executeBatch has no value array
            EntryPointVersion::V06 => {
                if calls.iter().any(|c| !c.value.is_zero()) {
                    return Err(RelayError::UnsupportedCalls(
                        "v0.6 accounts cannot attach value to batched calls".to_string(),
                    ));
                }
                ISimpleAccountV06::executeBatchCall { dest, func }.abi_encode()
            }
            EntryPointVersion::V07 => ISimpleAccount::executeBatchCall {
                dest,
                value: calls.iter().map(|c| c.value).collect(),
                func,
            }
            .abi_encode(),
        };
        Ok(encoded.into())
    }

    async fn sign_user_operation_hash(&self, hash: B256) -> Result<Bytes, RelayError> {
        let signature = self
            .owner
            .sign_message(hash.as_slice())
            .await
            .map_err(|e| RelayError::Signing(e.to_string()))?;
        Ok(Bytes::copy_from_slice(&signature.as_bytes()))
    }

    fn paymaster(&self) -> Option<Arc<dyn PaymasterDataProvider>> {
        self.paymaster.clone()
    }
}
