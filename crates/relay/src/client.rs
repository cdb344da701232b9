use std::{sync::Arc, time::Duration};

use alloy_primitives::{Address, B256};
use quarry_core::{UserOperation, UserOperationReceipt};
use serde_json::json;
use tracing::{info, warn};

use crate::{
    error::RelayError,
    revert::RevertDecoder,
    transport::{self, RpcTransport},
};

/// A user operation that made it on chain and succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub user_op_hash: B256,
    pub receipt: UserOperationReceipt,
}

impl Execution {
    pub const fn transaction_hash(&self) -> B256 {
        self.receipt.receipt.transaction_hash
    }
}

/// Submits user operations and waits for their outcome.
#[derive(Debug, Clone)]
pub struct RelayClient {
    transport: Arc<dyn RpcTransport>,
    entry_point: Address,
    poll_interval: Duration,
    timeout: Duration,
    decoder: RevertDecoder,
}

impl RelayClient {
    pub fn new(
        transport: Arc<dyn RpcTransport>,
        entry_point: Address,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self { transport, entry_point, poll_interval, timeout, decoder: RevertDecoder }
    }

    pub async fn send_user_operation(&self, op: &UserOperation) -> Result<B256, RelayError> {
        let hash: B256 = transport::call(
            self.transport.as_ref(),
            "eth_sendUserOperation",
            vec![json!(op), json!(self.entry_point)],
        )
        .await?;
        Ok(hash)
    }

    /// Polls until the receipt is available or the deadline passes.
    pub async fn wait_for_receipt(
        &self,
        user_op_hash: B256,
        timeout: Option<Duration>,
    ) -> Result<UserOperationReceipt, RelayError> {
        let deadline = timeout.unwrap_or(self.timeout);
        let poll = async {
            loop {
                let receipt: Option<UserOperationReceipt> = transport::call(
                    self.transport.as_ref(),
                    "eth_getUserOperationReceipt",
                    vec![json!(user_op_hash)],
                )
                .await?;
                if let Some(receipt) = receipt {
                    return Ok::<_, RelayError>(receipt);
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        };

        tokio::time::timeout(deadline, poll)
            .await
            .map_err(|_| RelayError::Timeout { user_op_hash: user_op_hash.to_string() })?
    }

    /// Submits `op` and waits for it. `action` names what the operation does
    /// ("grant allowance") for the message of an undecodable revert.
    pub async fn execute(
        &self,
        op: &UserOperation,
        action: &str,
        timeout: Option<Duration>,
    ) -> Result<Execution, RelayError> {
        let user_op_hash = self.send_user_operation(op).await?;
        let receipt = self.wait_for_receipt(user_op_hash, timeout).await?;

        if !receipt.success {
            let explanation = self.decoder.explain(
                receipt.reason.as_deref(),
                action,
                receipt.receipt.transaction_hash,
            );
            warn!(
                message = "user operation reverted",
                user_op_hash = %user_op_hash,
                tx_hash = %receipt.receipt.transaction_hash,
                error = explanation.decoded.as_ref().map(|d| d.name.as_str()).unwrap_or("unknown")
            );
            return Err(RelayError::ExecutionReverted(explanation));
        }

        info!(
            message = "user operation included",
            user_op_hash = %user_op_hash,
            tx_hash = %receipt.receipt.transaction_hash
        );
        Ok(Execution { user_op_hash, receipt })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::TransportError, revert::RevertKind, transport::MockRpcTransport};
    use alloy_primitives::{U256, hex};
    use alloy_sol_types::SolError;
    use mockall::predicate::{always, eq};
    use quarry_core::{UserOperationV06, abi::IQuarryPaymaster};
    use serde_json::Value;

    const OP_HASH: &str = "0x2222222222222222222222222222222222222222222222222222222222222222";
    const TX_HASH: &str = "0x1111111111111111111111111111111111111111111111111111111111111111";

    fn op() -> UserOperation {
        UserOperation::V06(UserOperationV06 {
            sender: Address::ZERO,
            nonce: U256::ZERO,
            init_code: Default::default(),
            call_data: Default::default(),
            call_gas_limit: U256::ZERO,
            verification_gas_limit: U256::ZERO,
            pre_verification_gas: U256::ZERO,
            max_fee_per_gas: U256::ZERO,
            max_priority_fee_per_gas: U256::ZERO,
            paymaster_and_data: Default::default(),
            signature: Default::default(),
        })
    }

    fn receipt(success: bool, reason: Option<String>) -> Value {
        json!({
            "userOpHash": OP_HASH,
            "success": success,
            "reason": reason,
            "receipt": { "transactionHash": TX_HASH }
        })
    }

    fn client(mock: MockRpcTransport, timeout: Duration) -> RelayClient {
        RelayClient::new(
            Arc::new(mock),
            quarry_core::abi::ENTRY_POINT_V06,
            Duration::from_millis(10),
            timeout,
        )
    }

    fn accept(mock: &mut MockRpcTransport) {
        mock.expect_request()
            .with(eq("eth_sendUserOperation"), always())
            .times(1)
            .returning(|_, _| Ok(json!(OP_HASH)));
    }

    #[tokio::test]
    async fn polls_until_receipt_arrives() {
        let mut mock = MockRpcTransport::new();
        accept(&mut mock);
        let mut seq = mockall::Sequence::new();
        mock.expect_request()
            .with(eq("eth_getUserOperationReceipt"), always())
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(Value::Null));
        mock.expect_request()
            .with(eq("eth_getUserOperationReceipt"), always())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(receipt(true, None)));

        let execution = client(mock, Duration::from_secs(5)).execute(&op(), "grant allowance", None).await.unwrap();
        assert_eq!(execution.user_op_hash.to_string(), OP_HASH);
        assert_eq!(execution.transaction_hash().to_string(), TX_HASH);
    }

    #[tokio::test]
    async fn reverted_operation_is_decoded() {
        let reason = hex::encode_prefixed(
            IQuarryPaymaster::GrantSystem_InsufficientBalance {
                balance: U256::from(1),
                allowance: U256::from(2),
            }
            .abi_encode(),
        );
        let mut mock = MockRpcTransport::new();
        accept(&mut mock);
        mock.expect_request()
            .with(eq("eth_getUserOperationReceipt"), always())
            .returning(move |_, _| Ok(receipt(false, Some(reason.clone()))));

        let err = client(mock, Duration::from_secs(5))
            .execute(&op(), "grant allowance", None)
            .await
            .unwrap_err();
        let RelayError::ExecutionReverted(explanation) = err else {
            panic!("expected a revert");
        };
        assert_eq!(explanation.kind(), Some(&RevertKind::InsufficientBalance));
        assert!(explanation.to_string().ends_with(&format!("Transaction hash: {TX_HASH}")));
    }

    #[tokio::test]
    async fn missing_receipt_times_out() {
        let mut mock = MockRpcTransport::new();
        accept(&mut mock);
        mock.expect_request()
            .with(eq("eth_getUserOperationReceipt"), always())
            .returning(|_, _| Ok(Value::Null));

        let err = client(mock, Duration::from_secs(5))
            .execute(&op(), "grant allowance", Some(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Timeout { .. }));
    }

    #[tokio::test]
    async fn transport_failure_is_not_a_revert() {
        let mut mock = MockRpcTransport::new();
        mock.expect_request()
            .returning(|_, _| Err(TransportError::Network("connection refused".into())));

        let err = client(mock, Duration::from_secs(5))
            .execute(&op(), "grant allowance", None)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Transport(TransportError::Network(_))));
    }
}
