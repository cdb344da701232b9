use alloy_primitives::{Address, B256};
use quarry_core::{PassStatus, abi::IQuarryPaymaster};
use quarry_relay::{Call, RevertKind};
use serde::Serialize;
use tracing::{debug, info};

use super::{HandlerError, Submitted, relay};
use crate::{context::AppContext, metrics::Metrics};

/// Claims `receiver`'s allowance from a pass. The mirrored pass state is
/// checked first so ineligible claims fail without spending gas.
pub async fn claim_allowance(
    ctx: &AppContext,
    metrics: &Metrics,
    pass_id: B256,
    receiver: Address,
) -> Result<Submitted, HandlerError> {
    let status = ctx.ledger.pass_status(receiver, pass_id, ctx.now()).await?;
    if let Some(reason) = ineligibility(status, pass_id, receiver) {
        debug!(message = "claim rejected before submission", pass_id = %pass_id, receiver = %receiver, reason = %reason);
        return Err(HandlerError::PassNotClaimable(reason));
    }

    let call = Call::new(ctx.paymaster, &IQuarryPaymaster::claimForCall { user: receiver, passId: pass_id });
    let execution = relay(ctx, metrics, &[call], "claim allowance").await?;
    info!(message = "claimed allowance", pass_id = %pass_id, receiver = %receiver);
    Ok(Submitted::new(
        format!("Successfully claimed allowance for {receiver} from pass {pass_id}."),
        &execution,
    ))
}

pub async fn issue_pass(
    ctx: &AppContext,
    metrics: &Metrics,
    pass_id: B256,
    receiver: Address,
) -> Result<Submitted, HandlerError> {
    let call = Call::new(ctx.paymaster, &IQuarryPaymaster::issuePassCall { passId: pass_id, user: receiver });
    let execution = relay(ctx, metrics, &[call], "issue pass").await?;
    info!(message = "issued pass", pass_id = %pass_id, receiver = %receiver);
    Ok(Submitted::new(format!("Successfully issued pass {pass_id} to {receiver}."), &execution))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassStatusReport {
    pub user: Address,
    pub pass_id: B256,
    #[serde(flatten)]
    pub status: PassStatus,
    pub eligible: bool,
}

pub async fn pass_status(ctx: &AppContext, user: Address, pass_id: B256) -> Result<PassStatusReport, HandlerError> {
    let status = ctx.ledger.pass_status(user, pass_id, ctx.now()).await?;
    Ok(PassStatusReport { user, pass_id, status, eligible: status.is_eligible() })
}

/// Same wording the contract's revert would get.
fn ineligibility(status: PassStatus, pass_id: B256, user: Address) -> Option<String> {
    let kind = match status {
        PassStatus::Eligible => return None,
        PassStatus::UnknownPass => {
            RevertKind::PassUnauthorized { pass_id, caller: Address::ZERO, grantor: Address::ZERO }
        }
        PassStatus::NeverHeld => RevertKind::PassExpired { pass_id, user, expired_at: None },
        PassStatus::Expired { at } => RevertKind::PassExpired { pass_id, user, expired_at: Some(at) },
        PassStatus::Cooldown { until } => RevertKind::PendingCooldown { pass_id, user, next_claim_at: until },
    };
    kind.explanation()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    const USER: Address = address!("1111111111111111111111111111111111111111");

    #[test]
    fn ineligible_claims_explain_themselves() {
        let pass_id = B256::with_last_byte(1);
        assert_eq!(ineligibility(PassStatus::Eligible, pass_id, USER), None);
        assert_eq!(
            ineligibility(PassStatus::UnknownPass, pass_id, USER).unwrap(),
            format!("Pass {pass_id} does not exist.")
        );
        assert_eq!(
            ineligibility(PassStatus::NeverHeld, pass_id, USER).unwrap(),
            format!("User {USER} doesn't have pass {pass_id}.")
        );
        assert_eq!(
            ineligibility(PassStatus::Cooldown { until: 1_727_784_000 }, pass_id, USER).unwrap(),
            format!("Next time user {USER} can claim from pass {pass_id} is Tue, 01 Oct 2024 12:00:00 GMT.")
        );
        assert!(
            ineligibility(PassStatus::Expired { at: 0 }, pass_id, USER)
                .unwrap()
                .ends_with("expired on Thu, 01 Jan 1970 00:00:00 GMT.")
        );
    }

    #[test]
    fn status_report_flattens_the_status() {
        let report = PassStatusReport {
            user: USER,
            pass_id: B256::ZERO,
            status: PassStatus::Cooldown { until: 10 },
            eligible: false,
        };
        let value = serde_json::to_value(report).unwrap();
        assert_eq!(value["status"], "cooldown");
        assert_eq!(value["until"], 10);
        assert_eq!(value["eligible"], false);
        assert!(value.get("passId").is_some());
    }
}
