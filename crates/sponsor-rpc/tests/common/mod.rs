#![allow(dead_code, unreachable_pub)]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use alloy_primitives::{Address, B256, Bytes, U256, address, hex, keccak256};
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::{SolCall, SolValue};
use async_trait::async_trait;
use quarry_core::{
    EntryPointVersion, UserOperation,
    abi::{IEntryPoint, IQuarryPaymaster, ISimpleAccount, ISimpleAccountFactory},
    store,
};
use quarry_ledger::{LedgerMirror, StoreLedgerSource};
use quarry_relay::{
    GasParams, InterceptingTransport, InterceptorConfig, OperationBuilder, RelayClient, RpcTransport,
    SimpleSmartAccount, SmartAccount, StaticPaymaster, TransportError,
};
use quarry_sponsor_rpc::AppContext;
use serde_json::{Value, json};

pub const PAYMASTER: Address = address!("3333333333333333333333333333333333333333");
pub const ACCOUNT: Address = address!("5555555555555555555555555555555555555555");
pub const CHAIN_ID: u64 = 31337;
pub const NOW: u64 = 1_700_000_000;

#[derive(Debug, Default)]
struct ChainState {
    /// Static fields per `(tableId, keyTuple)`, by field index.
    records: HashMap<(B256, Vec<B256>), HashMap<u8, Vec<u8>>>,
    nonce: U256,
    balance: U256,
    deposits: U256,
    executed: Vec<&'static str>,
    receipts: HashMap<B256, Value>,
    revert_with: Option<Bytes>,
}

/// Chain plus bundler in one: answers reads from an in-memory store and
/// "includes" user operations by applying their paymaster calls.
#[derive(Debug, Clone, Default)]
pub struct FakeChain {
    state: Arc<Mutex<ChainState>>,
}

impl FakeChain {
    pub fn set_balance(&self, balance: U256) {
        self.state.lock().unwrap().balance = balance;
    }

    pub fn set_record(&self, table_id: B256, key: Vec<B256>, fields: &[(u8, Vec<u8>)]) {
        let mut state = self.state.lock().unwrap();
        let record = state.records.entry((table_id, key)).or_default();
        for (index, data) in fields {
            record.insert(*index, data.clone());
        }
    }

    /// Every following operation reverts with `payload`.
    pub fn revert_with(&self, payload: Bytes) {
        self.state.lock().unwrap().revert_with = Some(payload);
    }

    pub fn executed(&self) -> Vec<&'static str> {
        self.state.lock().unwrap().executed.clone()
    }

    pub fn deposits(&self) -> U256 {
        self.state.lock().unwrap().deposits
    }

    pub fn field(&self, table_id: B256, key: Vec<B256>, index: u8) -> Option<Vec<u8>> {
        self.state.lock().unwrap().records.get(&(table_id, key)).and_then(|r| r.get(&index).cloned())
    }

    fn eth_call(&self, params: &[Value]) -> Result<Value, TransportError> {
        let data: Bytes = serde_json::from_value(params[0]["data"].clone()).map_err(decode_error)?;
        let selector: [u8; 4] = data[..4].try_into().map_err(|_| decode_error("short calldata"))?;
        let state = self.state.lock().unwrap();

        let output = match selector {
            IQuarryPaymaster::getRecordCall::SELECTOR => {
                let call = IQuarryPaymaster::getRecordCall::abi_decode(&data).map_err(decode_error)?;
                let record = state.records.get(&(call.tableId, call.keyTuple));
                let mut static_data = Vec::new();
                let num_static = call.fieldLayout[2];
                for index in 0..num_static {
                    let width = call.fieldLayout[4 + index as usize] as usize;
                    match record.and_then(|r| r.get(&index)) {
                        Some(field) => static_data.extend_from_slice(field),
                        None => static_data.extend(std::iter::repeat_n(0u8, width)),
                    }
                }
                (Bytes::from(static_data), B256::ZERO, Bytes::new()).abi_encode_params()
            }
            IEntryPoint::getNonceCall::SELECTOR => state.nonce.abi_encode(),
            ISimpleAccountFactory::getAddressCall::SELECTOR => ACCOUNT.abi_encode(),
            _ => return Err(decode_error(format!("unexpected call {}", hex::encode(selector)))),
        };
        Ok(json!(Bytes::from(output)))
    }

    /// Includes `op` and returns its user operation receipt.
    fn include(&self, op: Value) -> Result<Value, TransportError> {
        let op: UserOperation = serde_json::from_value(op).map_err(decode_error)?;
        let user_op_hash = op.hash(op.version().address(), CHAIN_ID);
        let mut state = self.state.lock().unwrap();
        let transaction_hash = keccak256(user_op_hash);

        let receipt = if let Some(payload) = state.revert_with.clone() {
            json!({
                "userOpHash": user_op_hash,
                "success": false,
                "reason": payload,
                "receipt": { "transactionHash": transaction_hash }
            })
        } else {
            for (to, value, data) in decode_calls(op.call_data())? {
                assert_eq!(to, PAYMASTER, "all calls go to the paymaster");
                state.apply(op.sender(), value, &data)?;
            }
            state.nonce += U256::from(1);
            json!({
                "userOpHash": user_op_hash,
                "success": true,
                "receipt": { "transactionHash": transaction_hash }
            })
        };
        state.receipts.insert(user_op_hash, receipt.clone());
        Ok(receipt)
    }
}

impl ChainState {
    fn apply(&mut self, sender: Address, value: U256, data: &[u8]) -> Result<(), TransportError> {
        let selector: [u8; 4] = data[..4].try_into().map_err(|_| decode_error("short calldata"))?;
        let name = match selector {
            IQuarryPaymaster::grantAllowanceCall::SELECTOR => "grantAllowance",
            IQuarryPaymaster::claimForCall::SELECTOR => "claimFor",
            IQuarryPaymaster::issuePassCall::SELECTOR => "issuePass",
            IQuarryPaymaster::removeAllowanceCall::SELECTOR => "removeAllowance",
            IQuarryPaymaster::setFieldCall::SELECTOR => {
                let call = IQuarryPaymaster::setFieldCall::abi_decode(data).map_err(decode_error)?;
                self.records
                    .entry((call.tableId, call.keyTuple))
                    .or_default()
                    .insert(call.fieldIndex, call.data.to_vec());
                "setField"
            }
            IQuarryPaymaster::registerNamespaceCall::SELECTOR => {
                let call = IQuarryPaymaster::registerNamespaceCall::abi_decode(data).map_err(decode_error)?;
                let owner_table = store::namespace_owner_table().table_id();
                self.records
                    .entry((owner_table, vec![call.namespaceId]))
                    .or_default()
                    .insert(0, sender.to_vec());
                "registerNamespace"
            }
            IQuarryPaymaster::registerTableCall::SELECTOR => {
                let call = IQuarryPaymaster::registerTableCall::abi_decode(data).map_err(decode_error)?;
                let resource_ids = store::resource_ids_table().table_id();
                self.records.entry((resource_ids, vec![call.tableId])).or_default().insert(0, vec![1]);
                "registerTable"
            }
            IQuarryPaymaster::depositToCall::SELECTOR => {
                self.deposits += value;
                self.balance -= value;
                "depositTo"
            }
            _ => return Err(decode_error(format!("unexpected paymaster call {}", hex::encode(selector)))),
        };
        self.executed.push(name);
        Ok(())
    }
}

/// Unpacks v0.7 `execute`/`executeBatch` call data.
fn decode_calls(call_data: &Bytes) -> Result<Vec<(Address, U256, Bytes)>, TransportError> {
    if let Ok(call) = ISimpleAccount::executeCall::abi_decode(call_data) {
        return Ok(vec![(call.dest, call.value, call.func)]);
    }
    let batch = ISimpleAccount::executeBatchCall::abi_decode(call_data).map_err(decode_error)?;
    Ok(batch
        .dest
        .into_iter()
        .zip(batch.value)
        .zip(batch.func)
        .map(|((to, value), data)| (to, value, data))
        .collect())
}

fn decode_error(reason: impl ToString) -> TransportError {
    TransportError::Decode { method: "fake chain".into(), reason: reason.to_string() }
}

#[async_trait]
impl RpcTransport for FakeChain {
    async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value, TransportError> {
        match method {
            "eth_chainId" => Ok(json!(format!("{CHAIN_ID:#x}"))),
            "eth_call" => self.eth_call(&params),
            "eth_getCode" => Ok(json!("0x01")),
            "eth_getBalance" => Ok(json!(self.state.lock().unwrap().balance)),
            "pimlico_sendUserOperationNow" => self.include(params[0].clone()),
            "eth_getUserOperationReceipt" => {
                let hash: B256 = serde_json::from_value(params[0].clone()).map_err(decode_error)?;
                Ok(self.state.lock().unwrap().receipts.get(&hash).cloned().unwrap_or(Value::Null))
            }
            other => Err(TransportError::Rpc { code: -32601, message: format!("{other} not supported"), data: None }),
        }
    }
}

/// A context wired to `chain` through the interceptor, with a fixed clock.
pub async fn context(chain: &FakeChain, namespace: Option<&str>) -> AppContext {
    let transport: Arc<dyn RpcTransport> =
        Arc::new(InterceptingTransport::new(chain.clone(), InterceptorConfig::default()));
    let owner = PrivateKeySigner::from_bytes(&B256::repeat_byte(0x42)).unwrap();
    let version = EntryPointVersion::V07;

    let account = SimpleSmartAccount::connect(transport.clone(), owner, version, version.default_factory())
        .await
        .unwrap()
        .with_paymaster(Arc::new(StaticPaymaster::new(PAYMASTER)));
    let account: Arc<dyn SmartAccount> = Arc::new(account);
    let relay =
        RelayClient::new(transport.clone(), account.entry_point(), Duration::from_millis(5), Duration::from_secs(5));
    let source = StoreLedgerSource::new(transport.clone(), PAYMASTER, namespace);

    AppContext {
        paymaster: PAYMASTER,
        allowance_amount: U256::from(1_000_000_000_000_000u64),
        grants: namespace.map(store::grants_table),
        chain: transport.clone(),
        builder: OperationBuilder::new(account, transport, GasParams::default()),
        relay,
        ledger: LedgerMirror::new(Arc::new(source), namespace.is_some()),
        clock: || NOW,
    }
}
