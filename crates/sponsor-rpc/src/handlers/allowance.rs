use alloy_primitives::{Address, B256, U256};
use quarry_core::{
    Allowance,
    abi::IQuarryPaymaster,
    store::{self, Table},
};
use quarry_relay::Call;
use serde::Serialize;
use tracing::info;

use super::{HandlerError, Submitted, relay};
use crate::{context::AppContext, metrics::Metrics};

const GRANT_AMOUNT_FIELD: u8 = 0;
const GRANT_UPDATED_AT_FIELD: u8 = 1;

/// Grants the configured allowance to `receiver`, once per receiver when
/// grants are tracked.
pub async fn request_allowance(
    ctx: &AppContext,
    metrics: &Metrics,
    receiver: Address,
) -> Result<Submitted, HandlerError> {
    if ctx.ledger.has_existing_grant(receiver).await? {
        return Err(HandlerError::AlreadyGranted(receiver));
    }

    let amount = ctx.allowance_amount;
    let mut calls = vec![Call::new(
        ctx.paymaster,
        &IQuarryPaymaster::grantAllowanceCall { user: receiver, allowance: amount },
    )];
    if let Some(grants) = &ctx.grants {
        let key = vec![store::address_key(receiver)];
        calls.push(set_field(ctx.paymaster, grants, key.clone(), GRANT_AMOUNT_FIELD, amount));
        calls.push(set_field(ctx.paymaster, grants, key, GRANT_UPDATED_AT_FIELD, U256::from(ctx.now())));
    }

    let execution = relay(ctx, metrics, &calls, "grant allowance").await?;
    info!(message = "granted allowance", receiver = %receiver, amount = %amount, tx_hash = %execution.transaction_hash());
    Ok(Submitted::new(format!("Successfully granted allowance to {receiver}."), &execution))
}

pub async fn remove_allowance(
    ctx: &AppContext,
    metrics: &Metrics,
    user: Address,
    sponsor: Address,
) -> Result<Submitted, HandlerError> {
    let call = Call::new(ctx.paymaster, &IQuarryPaymaster::removeAllowanceCall { user, sponsor });
    let execution = relay(ctx, metrics, &[call], "remove allowance").await?;
    info!(message = "removed allowance", user = %user, sponsor = %sponsor);
    Ok(Submitted::new(
        format!("Successfully removed allowance of sponsor {sponsor} for {user}."),
        &execution,
    ))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllowanceListing {
    pub user: Address,
    /// Spending order, smallest first.
    pub allowances: Vec<Allowance>,
}

pub async fn list_allowances(ctx: &AppContext, user: Address) -> Result<AllowanceListing, HandlerError> {
    let allowances = ctx.ledger.list_allowances(user).await?;
    Ok(AllowanceListing { user, allowances })
}

/// `setField` on a static uint field, packed to the field's width.
fn set_field(paymaster: Address, table: &Table, key: Vec<B256>, index: u8, value: U256) -> Call {
    let ty = table.value[index as usize].ty;
    Call::new(
        paymaster,
        &IQuarryPaymaster::setFieldCall {
            tableId: table.table_id(),
            keyTuple: key,
            fieldIndex: index,
            data: ty.encode_uint(value).into(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_sol_types::SolCall;

    #[test]
    fn grant_fields_are_packed_to_their_width() {
        let table = store::grants_table("quarry");
        let key = vec![store::address_key(Address::repeat_byte(0x11))];

        let call = set_field(Address::ZERO, &table, key.clone(), GRANT_UPDATED_AT_FIELD, U256::from(1_700_000_000u64));
        let decoded = IQuarryPaymaster::setFieldCall::abi_decode(&call.data).unwrap();
        assert_eq!(decoded.tableId, table.table_id());
        assert_eq!(decoded.fieldIndex, 1);
        assert_eq!(decoded.data.as_ref(), &1_700_000_000u32.to_be_bytes());

        let call = set_field(Address::ZERO, &table, key, GRANT_AMOUNT_FIELD, U256::from(5));
        let decoded = IQuarryPaymaster::setFieldCall::abi_decode(&call.data).unwrap();
        assert_eq!(decoded.data.len(), 32);
        assert_eq!(decoded.data[31], 5);
    }
}
