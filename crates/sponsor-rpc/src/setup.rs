//! One-off preparation of the paymaster world for grant tracking.

use alloy_primitives::U256;
use anyhow::bail;
use quarry_core::{
    abi::IQuarryPaymaster,
    store::{self, Table},
};
use quarry_ledger::StoreLedgerSource;
use quarry_relay::{Call, transport};
use tracing::{debug, info, warn};

use crate::context::AppContext;

/// Native balance kept in the sponsor account for its own gas: 0.001 ETH.
pub const GAS_BUFFER: U256 = U256::from_limbs([1_000_000_000_000_000, 0, 0, 0]);

/// Registers the grants namespace and table and deposits the sponsor
/// account's spare balance into the paymaster. Does nothing when grants are
/// not tracked. Safe to run on every start.
pub async fn run(ctx: &AppContext) -> anyhow::Result<()> {
    let Some(grants) = &ctx.grants else {
        debug!(message = "no namespace configured, skipping setup");
        return Ok(());
    };

    let reader = StoreLedgerSource::new(ctx.chain.clone(), ctx.paymaster, None);
    ensure_namespace(ctx, &reader, &grants.namespace).await?;
    ensure_table(ctx, &reader, grants).await?;
    ensure_deposit(ctx).await
}

async fn ensure_namespace(ctx: &AppContext, reader: &StoreLedgerSource, namespace: &str) -> anyhow::Result<()> {
    let account = ctx.account().address();
    let namespace_id = store::namespace_id(namespace);
    let owner = reader.record(&store::namespace_owner_table(), vec![namespace_id]).await?.address(0);

    if owner == account {
        debug!(message = "namespace already owned by sponsor account", namespace);
        return Ok(());
    }
    if !owner.is_zero() {
        bail!("namespace {namespace} already exists and is owned by {owner}");
    }

    info!(message = "registering namespace", namespace);
    let call = Call::new(ctx.paymaster, &IQuarryPaymaster::registerNamespaceCall { namespaceId: namespace_id });
    submit(ctx, call, "register namespace").await
}

async fn ensure_table(ctx: &AppContext, reader: &StoreLedgerSource, table: &Table) -> anyhow::Result<()> {
    let table_id = table.table_id();
    if reader.record(&store::resource_ids_table(), vec![table_id]).await?.bool(0) {
        debug!(message = "table already registered", namespace = %table.namespace, table = table.name);
        return Ok(());
    }

    info!(message = "registering table", namespace = %table.namespace, table = table.name);
    let call = Call::new(
        ctx.paymaster,
        &IQuarryPaymaster::registerTableCall {
            tableId: table_id,
            fieldLayout: table.field_layout(),
            keySchema: table.key_schema(),
            valueSchema: table.value_schema(),
            keyNames: table.key_names(),
            fieldNames: table.field_names(),
        },
    );
    submit(ctx, call, "register table").await
}

async fn ensure_deposit(ctx: &AppContext) -> anyhow::Result<()> {
    let account = ctx.account().address();
    let balance = transport::get_balance(ctx.chain.as_ref(), account).await?;
    if balance <= GAS_BUFFER {
        warn!(message = "sponsor balance too low to top up", account = %account, balance = %balance);
        return Ok(());
    }

    let amount = balance - GAS_BUFFER;
    info!(message = "depositing sponsor balance", account = %account, amount = %amount);
    let call = Call::new(ctx.paymaster, &IQuarryPaymaster::depositToCall { to: account }).with_value(amount);
    submit(ctx, call, "deposit sponsor balance").await
}

async fn submit(ctx: &AppContext, call: Call, action: &str) -> anyhow::Result<()> {
    let op = ctx.builder.build(&[call], None).await?;
    let execution = ctx.relay.execute(&op, action, None).await?;
    debug!(message = "setup step done", action, tx_hash = %execution.transaction_hash());
    Ok(())
}
