//! EIP-4337 Account Abstraction User Operation types

use alloy_primitives::{Address, B256, Bytes, FixedBytes, U256, keccak256};
use alloy_sol_types::{SolValue, sol};
use serde::{Deserialize, Serialize};

use crate::abi::{
    ENTRY_POINT_V06, ENTRY_POINT_V07, SIMPLE_ACCOUNT_FACTORY_V06, SIMPLE_ACCOUNT_FACTORY_V07,
};

sol! {
    struct PackedUserOperationV06 {
        address sender;
        uint256 nonce;
        bytes32 initCodeHash;
        bytes32 callDataHash;
        uint256 callGasLimit;
        uint256 verificationGasLimit;
        uint256 preVerificationGas;
        uint256 maxFeePerGas;
        uint256 maxPriorityFeePerGas;
        bytes32 paymasterAndDataHash;
    }

    struct PackedUserOperationV07 {
        address sender;
        uint256 nonce;
        bytes32 initCodeHash;
        bytes32 callDataHash;
        bytes32 accountGasLimits;
        uint256 preVerificationGas;
        bytes32 gasFees;
        bytes32 paymasterAndDataHash;
    }

    struct UserOperationHashInput {
        bytes32 packedHash;
        address entryPoint;
        uint256 chainId;
    }
}

/// Entry point generation a user operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryPointVersion {
    /// v0.6: `initCode` and `paymasterAndData` are single blobs.
    #[serde(rename = "0.6")]
    V06,
    /// v0.7: factory and paymaster fields are split out.
    #[serde(rename = "0.7")]
    V07,
}

impl EntryPointVersion {
    /// Canonical entry point address for this version.
    pub const fn address(self) -> Address {
        match self {
            Self::V06 => ENTRY_POINT_V06,
            Self::V07 => ENTRY_POINT_V07,
        }
    }

    /// Simple account factory paired with this entry point.
    pub const fn default_factory(self) -> Address {
        match self {
            Self::V06 => SIMPLE_ACCOUNT_FACTORY_V06,
            Self::V07 => SIMPLE_ACCOUNT_FACTORY_V07,
        }
    }
}

impl std::str::FromStr for EntryPointVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_start_matches('v') {
            "0.6" => Ok(Self::V06),
            "0.7" => Ok(Self::V07),
            other => Err(format!("unsupported entry point version: {other}")),
        }
    }
}

/// User Operation as defined by EIP-4337 v0.6
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationV06 {
    pub sender: Address,
    pub nonce: U256,
    pub init_code: Bytes,
    pub call_data: Bytes,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub paymaster_and_data: Bytes,
    pub signature: Bytes,
}

/// User Operation as defined by EIP-4337 v0.7+, in its unpacked RPC form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationV07 {
    pub sender: Address,
    pub nonce: U256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory_data: Option<Bytes>,
    pub call_data: Bytes,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_verification_gas_limit: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_post_op_gas_limit: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_data: Option<Bytes>,
    pub signature: Bytes,
}

impl UserOperationV07 {
    /// `factory ‖ factoryData`, or empty when the account is already deployed.
    pub fn init_code(&self) -> Bytes {
        match self.factory {
            Some(factory) => {
                let factory_data = self.factory_data.as_ref().map(|b| &b[..]).unwrap_or_default();
                let mut buf = Vec::with_capacity(20 + factory_data.len());
                buf.extend_from_slice(factory.as_slice());
                buf.extend_from_slice(factory_data);
                Bytes::from(buf)
            }
            None => Bytes::new(),
        }
    }

    /// `paymaster ‖ uint128 verificationGas ‖ uint128 postOpGas ‖ paymasterData`.
    pub fn paymaster_and_data(&self) -> Bytes {
        let Some(paymaster) = self.paymaster else {
            return Bytes::new();
        };
        let data = self.paymaster_data.as_ref().map(|b| &b[..]).unwrap_or_default();
        let mut buf = Vec::with_capacity(52 + data.len());
        buf.extend_from_slice(paymaster.as_slice());
        buf.extend_from_slice(&low_u128_bytes(
            self.paymaster_verification_gas_limit.unwrap_or_default(),
        ));
        buf.extend_from_slice(&low_u128_bytes(
            self.paymaster_post_op_gas_limit.unwrap_or_default(),
        ));
        buf.extend_from_slice(data);
        Bytes::from(buf)
    }
}

/// User Operation that can be either v0.6 or v0.7+
/// Automatically deserializes based on fields present
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserOperation {
    V06(UserOperationV06),
    V07(UserOperationV07),
}

impl UserOperation {
    /// Get the sender address
    pub const fn sender(&self) -> Address {
        match self {
            Self::V06(op) => op.sender,
            Self::V07(op) => op.sender,
        }
    }

    /// Get the nonce
    pub const fn nonce(&self) -> U256 {
        match self {
            Self::V06(op) => op.nonce,
            Self::V07(op) => op.nonce,
        }
    }

    pub const fn call_data(&self) -> &Bytes {
        match self {
            Self::V06(op) => &op.call_data,
            Self::V07(op) => &op.call_data,
        }
    }

    pub const fn version(&self) -> EntryPointVersion {
        match self {
            Self::V06(_) => EntryPointVersion::V06,
            Self::V07(_) => EntryPointVersion::V07,
        }
    }

    pub fn set_signature(&mut self, signature: Bytes) {
        match self {
            Self::V06(op) => op.signature = signature,
            Self::V07(op) => op.signature = signature,
        }
    }

    /// The hash the entry point hands to the account for signature validation:
    /// `keccak256(abi.encode(keccak256(pack(op)), entryPoint, chainId))`.
    pub fn hash(&self, entry_point: Address, chain_id: u64) -> B256 {
        let packed = match self {
            Self::V06(op) => PackedUserOperationV06 {
                sender: op.sender,
                nonce: op.nonce,
                initCodeHash: keccak256(&op.init_code),
                callDataHash: keccak256(&op.call_data),
                callGasLimit: op.call_gas_limit,
                verificationGasLimit: op.verification_gas_limit,
                preVerificationGas: op.pre_verification_gas,
                maxFeePerGas: op.max_fee_per_gas,
                maxPriorityFeePerGas: op.max_priority_fee_per_gas,
                paymasterAndDataHash: keccak256(&op.paymaster_and_data),
            }
            .abi_encode(),
            Self::V07(op) => PackedUserOperationV07 {
                sender: op.sender,
                nonce: op.nonce,
                initCodeHash: keccak256(op.init_code()),
                callDataHash: keccak256(&op.call_data),
                accountGasLimits: pack_u128_pair(op.verification_gas_limit, op.call_gas_limit),
                preVerificationGas: op.pre_verification_gas,
                gasFees: pack_u128_pair(op.max_priority_fee_per_gas, op.max_fee_per_gas),
                paymasterAndDataHash: keccak256(op.paymaster_and_data()),
            }
            .abi_encode(),
        };

        keccak256(
            UserOperationHashInput {
                packedHash: keccak256(packed),
                entryPoint: entry_point,
                chainId: U256::from(chain_id),
            }
            .abi_encode(),
        )
    }
}

/// Receipt returned by `eth_getUserOperationReceipt` and by the
/// immediate-inclusion submission method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationReceipt {
    pub user_op_hash: B256,
    #[serde(default)]
    pub entry_point: Address,
    #[serde(default)]
    pub sender: Address,
    #[serde(default)]
    pub nonce: U256,
    #[serde(default)]
    pub actual_gas_cost: U256,
    #[serde(default)]
    pub actual_gas_used: U256,
    pub success: bool,
    /// Hex revert payload when `success` is false. Kept as a string because
    /// some bundlers put plain text here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub receipt: TransactionReceipt,
}

/// The subset of a transaction receipt the relay looks at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<U256>,
}

fn low_u128_bytes(value: U256) -> [u8; 16] {
    let word = value.to_be_bytes::<32>();
    let mut out = [0u8; 16];
    out.copy_from_slice(&word[16..]);
    out
}

fn pack_u128_pair(hi: U256, lo: U256) -> FixedBytes<32> {
    let mask = (U256::from(1u64) << 128) - U256::from(1u64);
    let packed: U256 = ((hi & mask) << 128usize) | (lo & mask);
    FixedBytes::from(packed.to_be_bytes::<32>())
}
